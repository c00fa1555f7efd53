mod interface;
mod file_store;
mod memory_store;

pub use interface::{LedgerStore, Records};
pub use file_store::{FileStore, RecordNaming};
pub use memory_store::MemoryStore;
