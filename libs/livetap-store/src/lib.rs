//! Cursor persistence for LiveTap
//!
//! Implements the `CursorStore` port on the local filesystem and in memory.

pub mod infrastructure;

pub use infrastructure::{FileCursorStore, MemoryCursorStore};
