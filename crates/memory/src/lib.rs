pub mod document;
pub mod error;
pub mod index;
pub mod layout;
pub mod manager;
pub mod schema;

pub use document::DocumentStore;
pub use error::{MemoryError, Result};
pub use index::MemoryIndex;
pub use layout::{KeyLayout, SlugLayout};
pub use manager::{MemoryManager, MemoryStats, RecentFilter, SearchQuery};
pub use schema::{IndexRecord, MemoryEntry, MemorySource, SaveOptions, TagMode};
