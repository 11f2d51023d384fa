//! Risk evaluation pipeline
//!
//! # Flow
//!
//! ```text
//! evaluate(request)
//!   │
//!   ├─ validate input ─────────────────────────────► ERROR(invalid input)
//!   │
//!   ├─ acquire per-user lock ┐
//!   ├─ load profile snapshot │ deadline applies ───► ERROR(timeout)
//!   ├─ run rules in order    ┘ ────────────────────► DENIED(first violation)
//!   │
//!   ├─ commit record + login marker (lock still held, never cancelled)
//!   │
//!   └─ release lock ───────────────────────────────► APPROVED
//! ```
//!
//! Denials and errors never touch the store. Transient store failures are
//! retried with linear backoff before surfacing as `ERROR(store unavailable)`.

use crate::clock::{Clock, SystemClock};
use crate::config::{bounded_secs, RiskConfig};
use crate::locks::{UserLockGuard, UserLocks};
use crate::metrics::Metrics;
use crate::rules::{Rule, RuleContext, RuleSet, Violation};
use crate::store::ProfileStore;
use crate::types::{Decision, TransactionRequest, UserId, UserProfile};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of the screening phase, with the user's lock still held
struct Screening {
    guard: UserLockGuard,
    now: DateTime<Utc>,
    profile_exists: bool,
    violation: Option<Violation>,
}

/// Orchestrates rule execution and the state commit
pub struct RiskEvaluator {
    store: Arc<dyn ProfileStore>,
    rules: RuleSet,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
    config: RiskConfig,
    metrics: Metrics,
}

impl RiskEvaluator {
    /// Create evaluator with the standard rule set and the wall clock
    pub fn new(store: Arc<dyn ProfileStore>, config: RiskConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            rules: RuleSet::standard(&config),
            clock: Arc::new(SystemClock),
            locks: UserLocks::new(),
            metrics: Metrics::new()?,
            config,
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the rule set
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Append a rule after the existing ones
    pub fn push_rule(&mut self, rule: impl Rule + 'static) {
        self.rules.push(rule);
    }

    /// Active configuration
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Rules in execution order
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate a transaction, applying the configured default deadline if any
    pub async fn evaluate(&self, request: TransactionRequest) -> Decision {
        let deadline = self
            .config
            .evaluation_timeout_ms
            .and_then(|ms| {
                tokio::time::Instant::now().checked_add(Duration::from_millis(ms))
            });
        self.run(request, deadline).await
    }

    /// Evaluate a transaction within `timeout`.
    ///
    /// The deadline covers waiting for the user's lock, loading the profile
    /// and running the rules. Once every rule has passed the commit runs to
    /// completion, so a timed-out evaluation never leaves a partial update.
    /// A timeout too large to represent as an instant means no deadline.
    pub async fn evaluate_with_deadline(
        &self,
        request: TransactionRequest,
        timeout: Duration,
    ) -> Decision {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        self.run(request, deadline).await
    }

    /// Run the retention process if `history_retention_secs` is configured
    pub async fn prune_history(&self) -> Result<usize> {
        let Some(retention) = self.config.history_retention_secs else {
            return Ok(0);
        };
        // Nothing predates the earliest representable time
        let Some(cutoff) = self.clock.now().checked_sub_signed(bounded_secs(retention)) else {
            return Ok(0);
        };
        self.store.prune_history_before(cutoff).await
    }

    async fn run(
        &self,
        request: TransactionRequest,
        deadline: Option<tokio::time::Instant>,
    ) -> Decision {
        let started = Instant::now();

        let decision = match self.decide(&request, deadline).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "Evaluation failed");
                Decision::from(e)
            }
        };

        self.metrics
            .record_decision(&decision, started.elapsed().as_secs_f64());
        decision
    }

    async fn decide(
        &self,
        request: &TransactionRequest,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<Decision> {
        request.validate()?;

        let screening = match deadline {
            Some(at) => tokio::time::timeout_at(at, self.screen(request))
                .await
                .map_err(|_| Error::Timeout)??,
            None => self.screen(request).await?,
        };

        if let Some(violation) = screening.violation {
            warn!(
                user_id = %request.user_id,
                rule = violation.rule,
                reason = %violation.reason,
                "FRAUD ALERT: transaction denied"
            );
            return Ok(Decision::Denied {
                rule: violation.rule.to_string(),
                reason: violation.reason,
            });
        }

        self.commit(request, screening.now, screening.profile_exists)
            .await?;
        drop(screening.guard);

        info!(
            user_id = %request.user_id,
            amount = %request.amount,
            origin_ip = %request.origin_ip,
            "Transaction approved"
        );
        Ok(Decision::Approved)
    }

    /// Lock the user, snapshot the profile and run the rules
    async fn screen(&self, request: &TransactionRequest) -> Result<Screening> {
        let user_id = &request.user_id;
        let guard = self.locks.acquire(user_id).await;
        let now = request.request_time.unwrap_or_else(|| self.clock.now());

        let (profile, profile_exists) = match self
            .with_retry("get", user_id, || self.store.get(user_id))
            .await
        {
            Ok(profile) => (profile, true),
            Err(Error::UserNotFound(_)) if self.config.auto_provision => {
                debug!(user_id = %user_id, "Unknown user, evaluating against empty profile");
                (UserProfile::new(), false)
            }
            Err(e) => return Err(e),
        };

        let ctx = RuleContext {
            profile: &profile,
            request,
            now,
        };
        let violation = self.rules.first_violation(&ctx);

        Ok(Screening {
            guard,
            now,
            profile_exists,
            violation,
        })
    }

    /// Persist an approved transaction; caller holds the user's lock
    async fn commit(
        &self,
        request: &TransactionRequest,
        now: DateTime<Utc>,
        profile_exists: bool,
    ) -> Result<()> {
        let user_id = &request.user_id;

        if profile_exists {
            return self
                .with_retry("commit", user_id, || {
                    self.store
                        .commit(user_id, request.amount, &request.origin_ip, now)
                })
                .await;
        }

        let mut profile = UserProfile::new();
        profile.record(request.amount, &request.origin_ip, now);
        self.with_retry("provision", user_id, || {
            self.store.provision(user_id, profile.clone())
        })
        .await?;

        info!(user_id = %user_id, "Provisioned profile on first approved transaction");
        Ok(())
    }

    /// Retry transient store failures with linear backoff
    async fn with_retry<T, F, Fut>(&self, op: &'static str, user_id: &UserId, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.retry.max_attempts;
        let mut attempt = 1;

        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    self.metrics.record_store_retry();
                    debug!(
                        op,
                        user_id = %user_id,
                        attempt,
                        max_attempts,
                        error = ?e,
                        "Store call failed, retrying"
                    );
                    let backoff = self.config.retry.backoff_ms * attempt as u64;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    error!(
                        op,
                        user_id = %user_id,
                        attempts = attempt,
                        error = ?e,
                        "Store unavailable, giving up"
                    );
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for RiskEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEvaluator")
            .field("rules", &self.rules)
            .field("config", &self.config)
            .field("active_locks", &self.locks.active())
            .finish()
    }
}
