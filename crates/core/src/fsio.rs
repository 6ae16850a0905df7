use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Read the raw bytes of `path`, returning `None` when the file does not exist.
///
/// Any other I/O failure is propagated.
pub fn read_if_exists(path: impl AsRef<Path>) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path.as_ref()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Atomically replace `path` with `contents`.
///
/// Crash-safety guarantee: the new content is written to a uniquely named
/// `.tmp` sibling, `fsync`'d, then renamed over the original.  A crash at any
/// point before the rename leaves the original file untouched; a reader sees
/// either the old or the new file, never a torn one.  The `.tmp` file is
/// removed on every error path.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_sibling(path);

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    Ok(())
}

/// Remove `path`, returning whether a file was actually deleted.
pub fn remove_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// `.{filename}.{uuid}.tmp` next to `path`, so the rename never crosses a
/// filesystem boundary.
fn temp_sibling(path: &Path) -> PathBuf {
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let simple = Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{filename}.{}.tmp", &simple[..12]))
}
