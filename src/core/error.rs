use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::pledge::{Amount, Sequence};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A stored record does not read as `identity,amount`.
    /// `name` is the record's storage name (the file name for on-disk stores).
    #[error("invalid format in {name}: {content:?}")]
    Format {
        name: String,
        content: String
    },
    /// The storage location could not be created, scanned, read or written.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error
    },
    /// The identity would break the `identity,amount` line format.
    #[error("identity must not contain ',' or line breaks: {0:?}")]
    InvalidIdentity(String),
    #[error("pledge amount must not be negative: {0}")]
    InvalidAmount(Amount),
    /// The running total no longer fits in an `Amount`.
    #[error("total overflows adding {amount} to {total}")]
    Overflow {
        total: Amount,
        amount: Amount
    },
    /// The highest stored sequence is already the largest representable one.
    #[error("no sequence number left after {last}")]
    SequenceExhausted {
        last: Sequence
    },
    /// Every attempt to publish a record lost the race for its sequence number.
    #[error("no free sequence number after {attempts} attempts")]
    Contention {
        attempts: usize
    }
}

impl LedgerError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Storage { path: path.into(), source }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, LedgerError::Format { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
