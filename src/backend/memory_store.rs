use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::backend::interface::{LedgerStore, Records};
use crate::core::{pledge, Amount, PledgeRecord, Result, Sequence};

/// In-process ledger that keeps raw record lines, parsed the same way
/// `FileStore` parses its files.
#[derive(Default)]
pub struct MemoryStore {
    lines: Mutex<BTreeMap<Sequence, String>>
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lines(&self) -> MutexGuard<'_, BTreeMap<Sequence, String>> {
        // the map is never left half-updated, so a poisoned lock is still usable
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a line verbatim under `sequence`, replacing any existing one.
    pub fn insert_raw(&self, sequence: Sequence, line: &str) {
        self.lines().insert(sequence, line.to_owned());
    }

    pub fn remove(&self, sequence: Sequence) -> bool {
        self.lines().remove(&sequence).is_some()
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for MemoryStore {
    fn append(&self, identity: &str, amount: Amount) -> Result<Sequence> {
        pledge::validate(identity, amount)?;

        let mut lines = self.lines();
        let sequence = pledge::next_sequence(lines.keys().next_back().copied())?;
        lines.insert(sequence, pledge::format_line(identity, amount));
        return Ok(sequence);
    }

    fn list(&self) -> Result<Records<'_>> {
        let snapshot: Vec<(Sequence, String)> = self.lines()
            .iter()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(sequence, line)| (*sequence, line.clone()))
            .collect();

        return Ok(Box::new(snapshot.into_iter().map(|(sequence, line)| {
            PledgeRecord::parse(Some(sequence), &format!("record {}", sequence), &line)
        })));
    }
}
