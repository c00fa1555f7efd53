mod core;
pub mod backend;
pub mod config;

pub use crate::core::{PledgeRecord, Amount, Sequence, LedgerError, Result};
pub use crate::core::{Aggregator, MalformedPolicy, Summary, Progress};
pub use crate::backend::{LedgerStore, FileStore, MemoryStore, RecordNaming};
pub use crate::config::LedgerConfig;
