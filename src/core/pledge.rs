use std::str::FromStr;

use colored::Colorize;
use rust_decimal::Decimal;
use serde::{Serialize, Deserialize};

use crate::core::error::{LedgerError, Result};

pub type Amount = Decimal;
pub type Sequence = u64;

const SEPARATOR: char = ',';

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PledgeRecord {
    /// `None` for records read from storage units outside the naming scheme.
    pub sequence: Option<Sequence>,
    pub identity: String,
    pub amount: Amount
}

impl std::fmt::Display for PledgeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sequence {
            Some(sequence) => write!(f, "#{} ", sequence)?,
            None => write!(f, "#- ")?
        }
        write!(f, "{}: {}", self.identity.bold(), self.amount)
    }
}

impl PledgeRecord {
    /// Parses one stored record line. `name` is only used to label the error.
    pub fn parse(sequence: Option<Sequence>, name: &str, line: &str) -> Result<PledgeRecord> {
        let format_error = || LedgerError::Format {
            name: name.to_owned(),
            content: line.to_owned()
        };

        let (identity, amount) = line.trim()
            .split_once(SEPARATOR)
            .ok_or_else(format_error)?;
        if amount.contains(SEPARATOR) {
            return Err(format_error());
        }

        let amount = parse_amount(amount.trim()).ok_or_else(format_error)?;
        if amount < Decimal::ZERO {
            return Err(format_error());
        }

        return Ok(PledgeRecord { sequence, identity: identity.to_owned(), amount });
    }
}

fn parse_amount(text: &str) -> Option<Amount> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Checks that a pledge can be written as a single, readable record line.
pub fn validate(identity: &str, amount: Amount) -> Result<()> {
    if identity.contains(|c: char| c == SEPARATOR || c == '\n' || c == '\r') {
        return Err(LedgerError::InvalidIdentity(identity.to_owned()));
    }
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    return Ok(());
}

/// Sequence following `max`, the highest one in use.
pub fn next_sequence(max: Option<Sequence>) -> Result<Sequence> {
    match max {
        None => Ok(0),
        Some(last) => last.checked_add(1).ok_or(LedgerError::SequenceExhausted { last })
    }
}

pub fn format_line(identity: &str, amount: Amount) -> String {
    format!("{}{}{}", identity, SEPARATOR, amount)
}
