use rust_decimal::prelude::ToPrimitive;

use crate::core::pledge::Amount;

/// A total measured against a funding goal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    pub total: Amount,
    pub goal: Amount
}

impl Progress {
    pub const DEFAULT_GOAL: u64 = 10_000;

    pub fn new(total: Amount, goal: Amount) -> Progress {
        Progress { total, goal }
    }

    /// Share of the goal reached, clamped to `0.0..=1.0`.
    /// A non-positive goal counts as reached once anything is pledged.
    pub fn fraction(&self) -> f64 {
        if self.goal <= Amount::ZERO {
            return if self.total > Amount::ZERO { 1.0 } else { 0.0 };
        }
        // a quotient too large for an Amount is far past the goal
        let ratio = self.total.checked_div(self.goal)
            .and_then(|ratio| ratio.to_f64())
            .unwrap_or(1.0);
        ratio.clamp(0.0, 1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    pub fn is_reached(&self) -> bool {
        self.fraction() >= 1.0
    }

    /// Number of filled cells out of `width`.
    pub fn filled(&self, width: usize) -> usize {
        ((self.fraction() * width as f64).round() as usize).min(width)
    }
}
