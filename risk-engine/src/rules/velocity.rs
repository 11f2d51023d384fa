//! Velocity rule: too many transactions in a trailing window

use super::{Rule, RuleContext, RuleVerdict};
use crate::config::{bounded_secs, VelocityConfig};
use chrono::Duration;

/// Blocks when the window already holds `max_transactions` approved records.
///
/// The window's lower bound is exclusive: a record exactly `window` old has
/// aged out. A window reaching past the earliest representable time covers
/// the whole history.
#[derive(Debug, Clone)]
pub struct VelocityRule {
    window: Duration,
    max_transactions: usize,
}

impl VelocityRule {
    /// Create rule
    pub fn new(window: Duration, max_transactions: usize) -> Self {
        Self {
            window,
            max_transactions,
        }
    }

    /// Create rule from configuration
    pub fn from_config(config: &VelocityConfig) -> Self {
        Self::new(
            bounded_secs(config.window_secs),
            config.max_transactions as usize,
        )
    }
}

impl Rule for VelocityRule {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn check(&self, ctx: &RuleContext<'_>) -> RuleVerdict {
        let recent = match ctx.now.checked_sub_signed(self.window) {
            Some(window_start) => ctx.profile.transactions_after(window_start),
            None => ctx.profile.transaction_history.len(),
        };

        if recent >= self.max_transactions {
            RuleVerdict::fail(format!(
                "Transaction velocity exceeded: {} transactions in {}s window (limit {})",
                recent,
                self.window.num_seconds(),
                self.max_transactions
            ))
        } else {
            RuleVerdict::pass(format!(
                "{} of {} transactions used in {}s window",
                recent,
                self.max_transactions,
                self.window.num_seconds()
            ))
        }
    }
}
