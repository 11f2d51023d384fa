//! Core types for risk engine

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// User identifier (unique profile key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Approved transaction kept in a profile's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction amount
    pub amount: Decimal,

    /// When the transaction was approved
    pub timestamp: DateTime<Utc>,
}

/// Per-user state consulted and updated by the risk engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Time of the last recorded login
    pub last_login_time: DateTime<Utc>,

    /// IP of the last recorded login, absent before the first one
    pub last_login_ip: Option<String>,

    /// Approved transactions in chronological order
    pub transaction_history: Vec<TransactionRecord>,
}

impl UserProfile {
    /// Profile with no login and no history
    pub fn new() -> Self {
        Self {
            last_login_time: DateTime::<Utc>::UNIX_EPOCH,
            last_login_ip: None,
            transaction_history: Vec::new(),
        }
    }

    /// Profile with a recorded login
    pub fn with_login(ip: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            last_login_time: time,
            last_login_ip: Some(ip.into()),
            transaction_history: Vec::new(),
        }
    }

    /// Append a history record (builder style, for provisioning)
    pub fn with_transaction(mut self, amount: Decimal, timestamp: DateTime<Utc>) -> Self {
        self.transaction_history.push(TransactionRecord { amount, timestamp });
        self
    }

    /// Number of history records strictly newer than `cutoff`
    pub fn transactions_after(&self, cutoff: DateTime<Utc>) -> usize {
        self.transaction_history
            .iter()
            .filter(|tx| tx.timestamp > cutoff)
            .count()
    }

    /// Apply an approved transaction: append and move the login marker
    pub(crate) fn record(&mut self, amount: Decimal, ip: &str, time: DateTime<Utc>) {
        self.transaction_history.push(TransactionRecord {
            amount,
            timestamp: time,
        });
        self.last_login_ip = Some(ip.to_string());
        self.last_login_time = time;
    }
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction submitted for evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Requesting user
    pub user_id: UserId,

    /// Amount, must be positive
    pub amount: Decimal,

    /// Origin IP address (v4 or v6)
    pub origin_ip: String,

    /// Request time; evaluation time is used when absent
    pub request_time: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    /// Create request stamped at evaluation time
    pub fn new(user_id: impl Into<UserId>, amount: Decimal, origin_ip: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            origin_ip: origin_ip.into(),
            request_time: None,
        }
    }

    /// Stamp the request with an explicit time
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.request_time = Some(time);
        self
    }

    /// Reject malformed requests before any rule runs
    pub fn validate(&self) -> Result<()> {
        if self.user_id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("user id is empty".to_string()));
        }

        if self.amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if self.origin_ip.parse::<IpAddr>().is_err() {
            return Err(Error::InvalidInput(format!(
                "malformed origin ip '{}'",
                self.origin_ip
            )));
        }

        Ok(())
    }
}

/// Terminal outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// All rules passed and the transaction was committed
    Approved,

    /// A rule blocked the transaction
    Denied {
        /// Rule that fired
        rule: String,
        /// Human-readable diagnostic
        reason: String,
    },

    /// The evaluation could not complete
    Error {
        /// What went wrong
        reason: String,
    },
}

impl Decision {
    /// Check if approved
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }

    /// Check if denied by a rule
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied { .. })
    }

    /// Denial or error reason
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Approved => None,
            Decision::Denied { reason, .. } | Decision::Error { reason } => Some(reason),
        }
    }

    /// Short label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied { .. } => "denied",
            Decision::Error { .. } => "error",
        }
    }
}

impl From<Error> for Decision {
    fn from(err: Error) -> Self {
        Decision::Error {
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approved => write!(f, "APPROVED"),
            Decision::Denied { reason, .. } => write!(f, "DENIED: {}", reason),
            Decision::Error { reason } => write!(f, "ERROR: {}", reason),
        }
    }
}
