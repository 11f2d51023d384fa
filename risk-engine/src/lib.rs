//! Risk Engine for TxGuard
//!
//! Real-time transaction risk evaluation: an ordered set of fraud rules runs
//! against per-user history, and approved transactions are committed back to
//! the profile store.
//!
//! # Invariants
//!
//! - Denied or failed evaluations never mutate a profile
//! - Evaluations for one user are serialized from read through commit
//! - Transaction history is append-only outside the retention process

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod locks;
pub mod metrics;
pub mod rules;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RiskConfig;
pub use error::{Error, Result};
pub use evaluator::RiskEvaluator;
pub use rules::{Rule, RuleContext, RuleSet, RuleVerdict};
pub use store::{InMemoryProfileStore, ProfileStore};
pub use types::*;
