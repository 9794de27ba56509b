//! FeedRelay — core types for relaying a live numeric signal to an append-only store.

pub mod entry;
pub mod signal;
pub mod types;

pub use entry::{entry_key, Classification, Entry};
pub use signal::{normalize, Poll, SignalBaseline, UNIT_MARKER};
pub use types::*;
