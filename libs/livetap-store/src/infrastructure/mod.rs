mod file_store;
mod memory_store;

pub use file_store::FileCursorStore;
pub use memory_store::MemoryCursorStore;
