//! End-to-end tests for the risk evaluator
//!
//! Covers the decision pipeline against a live store:
//! - Approval / velocity / impossible-travel scenario
//! - Same-user concurrency (no read-modify-write race)
//! - Transient store failures and deadlines
//! - Auto-provisioning and custom rules

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use risk_engine::{
    Clock, Decision, Error, InMemoryProfileStore, ManualClock, ProfileStore, Result, RiskConfig,
    RiskEvaluator, Rule, RuleContext, RuleVerdict, TransactionRequest, UserId, UserProfile,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const HOME_IP: &str = "203.0.113.45";
const NEW_IP: &str = "192.168.1.1";

/// Store wrapper with injectable failures and latency
#[derive(Default)]
struct TestStore {
    inner: InMemoryProfileStore,
    failing_gets: AtomicU32,
    failing_commits: AtomicU32,
    get_delay_ms: u64,
    commits: AtomicU32,
}

impl TestStore {
    fn new(inner: InMemoryProfileStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProfileStore for TestStore {
    async fn get(&self, user_id: &UserId) -> Result<UserProfile> {
        if self.get_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.get_delay_ms)).await;
        }
        // Give other evaluations a chance to interleave
        tokio::task::yield_now().await;

        if take_failure(&self.failing_gets) {
            return Err(Error::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.get(user_id).await
    }

    async fn commit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        ip: &str,
        time: DateTime<Utc>,
    ) -> Result<()> {
        tokio::task::yield_now().await;

        if take_failure(&self.failing_commits) {
            return Err(Error::StoreUnavailable("write timeout".to_string()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(user_id, amount, ip, time).await
    }

    async fn provision(&self, user_id: &UserId, profile: UserProfile) -> Result<()> {
        self.inner.provision(user_id, profile).await
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn fast_retry_config() -> RiskConfig {
    let mut config = RiskConfig::default();
    config.retry.backoff_ms = 1;
    config
}

async fn provisioned(user: &str, profile: UserProfile) -> InMemoryProfileStore {
    let store = InMemoryProfileStore::new();
    store.provision(&UserId::new(user), profile).await.unwrap();
    store
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let t0 = Utc::now();
    let clock = Arc::new(ManualClock::new(t0));
    let profile = UserProfile::with_login(HOME_IP, t0 - Duration::hours(1))
        .with_transaction(dec!(50.00), t0 - Duration::seconds(20))
        .with_transaction(dec!(20.00), t0 - Duration::seconds(10));
    let store = provisioned("user123", profile).await;
    let evaluator = RiskEvaluator::new(Arc::new(store.clone()), RiskConfig::default())
        .unwrap()
        .with_clock(clock.clone());
    let user = UserId::new("user123");

    // 3rd recent transaction from the same IP
    let decision = evaluator
        .evaluate(TransactionRequest::new("user123", dec!(100.00), HOME_IP))
        .await;
    assert_eq!(decision, Decision::Approved);
    assert_eq!(store.get(&user).await.unwrap().transaction_history.len(), 3);

    // 4th, 5s later: three records inside the window
    clock.advance(Duration::seconds(5));
    let decision = evaluator
        .evaluate(TransactionRequest::new("user123", dec!(5.00), HOME_IP))
        .await;
    match &decision {
        Decision::Denied { rule, reason } => {
            assert_eq!(rule, "velocity");
            assert!(reason.contains("3 transactions"));
        }
        other => panic!("expected velocity denial, got {:?}", other),
    }
    assert_eq!(store.get(&user).await.unwrap().transaction_history.len(), 3);

    // Velocity is checked first, so a new IP here is still a velocity denial
    let decision = evaluator
        .evaluate(TransactionRequest::new("user123", dec!(500.00), NEW_IP))
        .await;
    assert!(matches!(decision, Decision::Denied { ref rule, .. } if rule == "velocity"));
}

#[tokio::test]
async fn test_impossible_travel_denied() {
    let t0 = Utc::now();
    let clock = Arc::new(ManualClock::new(t0));
    let profile = UserProfile::with_login(HOME_IP, t0 - Duration::seconds(1))
        .with_transaction(dec!(10), t0 - Duration::seconds(1));
    let store = provisioned("user456", profile.clone()).await;
    let evaluator = RiskEvaluator::new(Arc::new(store.clone()), RiskConfig::default())
        .unwrap()
        .with_clock(clock.clone());

    let decision = evaluator
        .evaluate(TransactionRequest::new("user456", dec!(500.00), NEW_IP))
        .await;
    match &decision {
        Decision::Denied { rule, reason } => {
            assert_eq!(rule, "geo_discrepancy");
            assert!(reason.contains(NEW_IP));
        }
        other => panic!("expected geo denial, got {:?}", other),
    }

    // Denial leaves the profile untouched
    assert_eq!(store.get(&UserId::new("user456")).await.unwrap(), profile);

    // Once the threshold has elapsed the new IP is accepted
    clock.advance(Duration::seconds(29));
    let decision = evaluator
        .evaluate(TransactionRequest::new("user456", dec!(500.00), NEW_IP))
        .await;
    assert!(decision.is_approved());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_user_respects_velocity() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let inner = provisioned("burst", UserProfile::new()).await;
    let store = Arc::new(TestStore::new(inner.clone()));
    let evaluator = Arc::new(
        RiskEvaluator::new(store.clone(), RiskConfig::default())
            .unwrap()
            .with_clock(clock),
    );

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move {
                evaluator
                    .evaluate(TransactionRequest::new("burst", dec!(1), HOME_IP))
                    .await
            })
        })
        .collect();

    let mut approved = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Decision::Approved => approved += 1,
            Decision::Denied { rule, .. } => {
                assert_eq!(rule, "velocity");
                denied += 1;
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    assert_eq!(approved, 3);
    assert_eq!(denied, 9);
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    let profile = inner.get(&UserId::new("burst")).await.unwrap();
    assert_eq!(profile.transaction_history.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_users_evaluate_independently() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = InMemoryProfileStore::new();
    for i in 0..8 {
        store
            .provision(&UserId::new(format!("user{}", i)), UserProfile::new())
            .await
            .unwrap();
    }
    let evaluator = Arc::new(
        RiskEvaluator::new(Arc::new(store.clone()), RiskConfig::default())
            .unwrap()
            .with_clock(clock),
    );

    let handles: Vec<_> = (0..8)
        .flat_map(|i| (0..2).map(move |_| i))
        .map(|i| {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move {
                evaluator
                    .evaluate(TransactionRequest::new(format!("user{}", i), dec!(1), HOME_IP))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_approved());
    }
    for i in 0..8 {
        let profile = store.get(&UserId::new(format!("user{}", i))).await.unwrap();
        assert_eq!(profile.transaction_history.len(), 2);
    }
}

#[tokio::test]
async fn test_transient_store_failure_is_retried() {
    let inner = provisioned("user1", UserProfile::new()).await;
    let store = Arc::new(TestStore::new(inner.clone()));
    store.failing_gets.store(2, Ordering::SeqCst);
    store.failing_commits.store(1, Ordering::SeqCst);
    let evaluator = RiskEvaluator::new(store.clone(), fast_retry_config()).unwrap();

    let decision = evaluator
        .evaluate(TransactionRequest::new("user1", dec!(10), HOME_IP))
        .await;

    assert!(decision.is_approved());
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert_eq!(evaluator.metrics().store_retries_total.get(), 3);
    let profile = inner.get(&UserId::new("user1")).await.unwrap();
    assert_eq!(profile.transaction_history.len(), 1);
}

#[tokio::test]
async fn test_store_unavailable_after_bounded_attempts() {
    let inner = provisioned("user1", UserProfile::new()).await;
    let store = Arc::new(TestStore::new(inner.clone()));
    store.failing_commits.store(10, Ordering::SeqCst);
    let evaluator = RiskEvaluator::new(store.clone(), fast_retry_config()).unwrap();

    let decision = evaluator
        .evaluate(TransactionRequest::new("user1", dec!(10), HOME_IP))
        .await;

    assert_eq!(
        decision,
        Decision::Error {
            reason: "store unavailable".to_string()
        }
    );
    // 3 attempts consumed, nothing written
    assert_eq!(store.failing_commits.load(Ordering::SeqCst), 7);
    let profile = inner.get(&UserId::new("user1")).await.unwrap();
    assert!(profile.transaction_history.is_empty());
    assert!(profile.last_login_ip.is_none());
}

#[tokio::test]
async fn test_deadline_exceeded_commits_nothing() {
    let inner = provisioned("user1", UserProfile::new()).await;
    let store = Arc::new(TestStore {
        get_delay_ms: 200,
        ..TestStore::new(inner.clone())
    });
    let evaluator = RiskEvaluator::new(store.clone(), RiskConfig::default()).unwrap();

    let decision = evaluator
        .evaluate_with_deadline(
            TransactionRequest::new("user1", dec!(10), HOME_IP),
            std::time::Duration::from_millis(20),
        )
        .await;

    assert_eq!(
        decision,
        Decision::Error {
            reason: "timeout".to_string()
        }
    );
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    let profile = inner.get(&UserId::new("user1")).await.unwrap();
    assert!(profile.transaction_history.is_empty());
}

#[tokio::test]
async fn test_deadline_covers_waiting_for_user_lock() {
    let inner = provisioned("user1", UserProfile::new()).await;
    let store = Arc::new(TestStore {
        get_delay_ms: 150,
        ..TestStore::new(inner.clone())
    });
    let evaluator = Arc::new(RiskEvaluator::new(store.clone(), RiskConfig::default()).unwrap());

    let slow = {
        let evaluator = Arc::clone(&evaluator);
        tokio::spawn(async move {
            evaluator
                .evaluate(TransactionRequest::new("user1", dec!(10), HOME_IP))
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let queued = evaluator
        .evaluate_with_deadline(
            TransactionRequest::new("user1", dec!(10), HOME_IP),
            std::time::Duration::from_millis(50),
        )
        .await;
    assert_eq!(queued.reason(), Some("timeout"));

    assert!(slow.await.unwrap().is_approved());
    let profile = inner.get(&UserId::new("user1")).await.unwrap();
    assert_eq!(profile.transaction_history.len(), 1);
}

#[tokio::test]
async fn test_configured_default_timeout() {
    let inner = provisioned("user1", UserProfile::new()).await;
    let store = Arc::new(TestStore {
        get_delay_ms: 200,
        ..TestStore::new(inner)
    });
    let config = RiskConfig {
        evaluation_timeout_ms: Some(20),
        ..RiskConfig::default()
    };
    let evaluator = RiskEvaluator::new(store, config).unwrap();

    let decision = evaluator
        .evaluate(TransactionRequest::new("user1", dec!(10), HOME_IP))
        .await;
    assert_eq!(decision.reason(), Some("timeout"));
}

#[tokio::test]
async fn test_auto_provision_creates_profile_on_approval() {
    let store = InMemoryProfileStore::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let config = RiskConfig {
        auto_provision: true,
        ..RiskConfig::default()
    };
    let evaluator = RiskEvaluator::new(Arc::new(store.clone()), config)
        .unwrap()
        .with_clock(clock.clone());

    let decision = evaluator
        .evaluate(TransactionRequest::new("newcomer", dec!(25), NEW_IP))
        .await;
    assert!(decision.is_approved());

    let profile = store.get(&UserId::new("newcomer")).await.unwrap();
    assert_eq!(profile.transaction_history.len(), 1);
    assert_eq!(profile.last_login_ip.as_deref(), Some(NEW_IP));
    assert_eq!(profile.last_login_time, clock.now());
}

#[tokio::test]
async fn test_auto_provision_skipped_on_invalid_input() {
    let store = InMemoryProfileStore::new();
    let config = RiskConfig {
        auto_provision: true,
        ..RiskConfig::default()
    };
    let evaluator = RiskEvaluator::new(Arc::new(store.clone()), config).unwrap();

    let decision = evaluator
        .evaluate(TransactionRequest::new("newcomer", dec!(25), "not-an-ip"))
        .await;
    assert!(matches!(decision, Decision::Error { .. }));
    assert!(store.is_empty());
}

/// Single-transaction ceiling, appended after the standard rules
struct AmountLimitRule {
    max: Decimal,
}

impl Rule for AmountLimitRule {
    fn name(&self) -> &'static str {
        "amount_limit"
    }

    fn check(&self, ctx: &RuleContext<'_>) -> RuleVerdict {
        if ctx.request.amount > self.max {
            RuleVerdict::fail(format!(
                "Transaction amount {} exceeds single transaction limit {}",
                ctx.request.amount, self.max
            ))
        } else {
            RuleVerdict::pass("within limit")
        }
    }
}

#[tokio::test]
async fn test_appended_rule_runs_last() {
    let store = provisioned("user1", UserProfile::new()).await;
    let mut evaluator = RiskEvaluator::new(Arc::new(store.clone()), RiskConfig::default()).unwrap();
    evaluator.push_rule(AmountLimitRule { max: dec!(1000) });
    assert_eq!(
        evaluator.rules().names(),
        vec!["velocity", "geo_discrepancy", "amount_limit"]
    );

    let decision = evaluator
        .evaluate(TransactionRequest::new("user1", dec!(5000), HOME_IP))
        .await;
    assert!(matches!(decision, Decision::Denied { ref rule, .. } if rule == "amount_limit"));

    let decision = evaluator
        .evaluate(TransactionRequest::new("user1", dec!(999.99), HOME_IP))
        .await;
    assert!(decision.is_approved());
    assert_eq!(
        store.get(&UserId::new("user1")).await.unwrap().transaction_history.len(),
        1
    );
}

#[tokio::test]
async fn test_request_time_at_earliest_instant() {
    let store = provisioned("user1", UserProfile::new()).await;
    let evaluator = Arc::new(
        RiskEvaluator::new(Arc::new(store.clone()), RiskConfig::default()).unwrap(),
    );
    let earliest = DateTime::<Utc>::MIN_UTC;

    let mut decisions = Vec::new();
    for _ in 0..4 {
        let evaluator = evaluator.clone();
        let handle = tokio::spawn(async move {
            evaluator
                .evaluate(TransactionRequest::new("user1", dec!(1), HOME_IP).at(earliest))
                .await
        });
        decisions.push(handle.await.expect("evaluation must not panic"));
    }

    // The window reaches past the earliest time, so every record counts
    assert!(decisions[..3].iter().all(Decision::is_approved));
    assert!(matches!(&decisions[3], Decision::Denied { rule, .. } if rule == "velocity"));

    let profile = store.get(&UserId::new("user1")).await.unwrap();
    assert_eq!(profile.transaction_history.len(), 3);
    assert_eq!(profile.last_login_time, earliest);
}
