use crate::core::{Amount, PledgeRecord, Sequence, Result};

/// Lazily produced records. An `Err` item means the enumeration is poisoned;
/// fail-fast readers stop there.
pub type Records<'a> = Box<dyn Iterator<Item = Result<PledgeRecord>> + 'a>;

pub trait LedgerStore {
    /// Durably records a pledge and returns the sequence number assigned to it.
    fn append(&self, identity: &str, amount: Amount) -> Result<Sequence>;
    /// Enumerates every record currently in storage, in no particular order.
    fn list(&self) -> Result<Records<'_>>;

    /// Collects `list()` sorted by sequence, failing on the first bad record.
    fn records(&self) -> Result<Vec<PledgeRecord>> {
        let mut records = self.list()?.collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|record| record.sequence);
        return Ok(records);
    }
}
