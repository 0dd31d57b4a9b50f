//! Store backends.

mod json_file_store;
mod memory_store;

pub use json_file_store::{FileStoreError, JsonFileStore};
pub use memory_store::MemoryStore;
