use log::warn;
use serde::{Serialize, Deserialize};

use crate::backend::LedgerStore;
use crate::core::error::{LedgerError, Result};
use crate::core::pledge::{Amount, PledgeRecord};

/// What a read does when it meets a record that does not parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedPolicy {
    /// Abort the read with the record's `Format` error.
    #[default]
    FailFast,
    /// Log the record and leave it out of the total.
    SkipAndLog
}

#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub total: Amount,
    pub pledges: usize,
    pub skipped: usize
}

/// Stateless read path over a store. Nothing is cached between calls.
pub struct Aggregator<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    policy: MalformedPolicy
}

impl<'a, S: LedgerStore + ?Sized> Aggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Aggregator { store, policy: MalformedPolicy::default() }
    }

    pub fn with_policy(store: &'a S, policy: MalformedPolicy) -> Self {
        Aggregator { store, policy }
    }

    pub fn policy(&self) -> MalformedPolicy {
        self.policy
    }

    pub fn total(&self) -> Result<Amount> {
        return Ok(self.summary()?.total);
    }

    pub fn summary(&self) -> Result<Summary> {
        let mut summary = Summary { total: Amount::ZERO, pledges: 0, skipped: 0 };

        for item in self.store.list()? {
            match self.screen(item)? {
                Some(record) => {
                    summary.total = summary.total.checked_add(record.amount)
                        .ok_or(LedgerError::Overflow { total: summary.total, amount: record.amount })?;
                    summary.pledges += 1;
                },
                None => summary.skipped += 1
            }
        }
        return Ok(summary);
    }

    /// All readable records sorted by sequence, malformed ones handled per policy.
    pub fn records(&self) -> Result<Vec<PledgeRecord>> {
        let mut records = Vec::new();
        for item in self.store.list()? {
            if let Some(record) = self.screen(item)? {
                records.push(record);
            }
        }
        records.sort_by_key(|record| record.sequence);
        return Ok(records);
    }

    /// `Ok(None)` for a malformed record the policy lets through.
    fn screen(&self, item: Result<PledgeRecord>) -> Result<Option<PledgeRecord>> {
        match item {
            Ok(record) => Ok(Some(record)),
            Err(err @ LedgerError::Format { .. }) if self.policy == MalformedPolicy::SkipAndLog => {
                warn!("leaving out malformed record: {}", err);
                Ok(None)
            },
            Err(err) => Err(err)
        }
    }
}
