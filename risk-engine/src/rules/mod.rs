//! Fraud-detection rules
//!
//! Every rule is an independent predicate over a read-only profile snapshot
//! and the incoming request. Rules never mutate state; the evaluator commits
//! only after the whole set passes.

pub mod geo;
pub mod velocity;

pub use geo::GeoDiscrepancyRule;
pub use velocity::VelocityRule;

use crate::config::RiskConfig;
use crate::types::{TransactionRequest, UserProfile};
use chrono::{DateTime, Utc};
use std::fmt;

/// Inputs shared by every rule
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Profile snapshot taken under the user's lock
    pub profile: &'a UserProfile,

    /// Request being evaluated
    pub request: &'a TransactionRequest,

    /// Evaluation time
    pub now: DateTime<Utc>,
}

/// Outcome of a single rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    /// Whether the transaction may proceed
    pub passed: bool,

    /// Diagnostic reason
    pub reason: String,
}

impl RuleVerdict {
    /// Passing verdict
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    /// Blocking verdict
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// A single fraud signal
pub trait Rule: Send + Sync {
    /// Stable name reported with denials
    fn name(&self) -> &'static str;

    /// Evaluate the rule
    fn check(&self, ctx: &RuleContext<'_>) -> RuleVerdict;
}

/// First rule that blocked, with its verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rule name
    pub rule: &'static str,

    /// Failure reason
    pub reason: String,
}

/// Ordered rule list
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// Empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard pipeline: velocity, then geo-discrepancy
    pub fn standard(config: &RiskConfig) -> Self {
        Self::new()
            .with(VelocityRule::from_config(&config.velocity))
            .with(GeoDiscrepancyRule::from_config(&config.geo))
    }

    /// Append a rule (builder style)
    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.push(rule);
        self
    }

    /// Append a rule; it runs after every rule already present
    pub fn push(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Rule names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are configured
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run rules in order, stopping at the first failure
    pub fn first_violation(&self, ctx: &RuleContext<'_>) -> Option<Violation> {
        for rule in &self.rules {
            let verdict = rule.check(ctx);
            if !verdict.passed {
                return Some(Violation {
                    rule: rule.name(),
                    reason: verdict.reason,
                });
            }
            tracing::trace!(rule = rule.name(), reason = %verdict.reason, "Rule passed");
        }
        None
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).finish()
    }
}
