pub mod error;
pub mod pledge;
pub mod aggregator;
pub mod progress;

pub use error::{LedgerError, Result};
pub use pledge::{PledgeRecord, Amount, Sequence};
pub use aggregator::{Aggregator, MalformedPolicy, Summary};
pub use progress::Progress;
