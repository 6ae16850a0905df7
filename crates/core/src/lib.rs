//! Shared primitives for the assistant workspace: crash-safe text file
//! replacement and an injectable clock.

pub mod clock;
pub mod fsio;

pub use clock::{Clock, ManualClock, SystemClock};
