//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `risk_decisions_total{outcome}` - Decisions by outcome
//! - `risk_rule_denials_total{rule}` - Denials by the rule that fired
//! - `risk_evaluation_duration_seconds` - Histogram of evaluation latencies
//! - `risk_store_retries_total` - Store calls retried after a transient failure

use crate::types::Decision;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Decisions by outcome
    pub decisions_total: IntCounterVec,

    /// Denials by rule
    pub rule_denials_total: IntCounterVec,

    /// Evaluation duration histogram
    pub evaluation_duration: Histogram,

    /// Store retries
    pub store_retries_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let decisions_total = IntCounterVec::new(
            Opts::new("risk_decisions_total", "Decisions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let rule_denials_total = IntCounterVec::new(
            Opts::new("risk_rule_denials_total", "Denials by the rule that fired"),
            &["rule"],
        )?;
        registry.register(Box::new(rule_denials_total.clone()))?;

        let evaluation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "risk_evaluation_duration_seconds",
                "Histogram of evaluation latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0]),
        )?;
        registry.register(Box::new(evaluation_duration.clone()))?;

        let store_retries_total = IntCounter::new(
            "risk_store_retries_total",
            "Store calls retried after a transient failure",
        )?;
        registry.register(Box::new(store_retries_total.clone()))?;

        Ok(Self {
            decisions_total,
            rule_denials_total,
            evaluation_duration,
            store_retries_total,
            registry,
        })
    }

    /// Record a finished evaluation
    pub fn record_decision(&self, decision: &Decision, duration_seconds: f64) {
        self.decisions_total
            .with_label_values(&[decision.outcome()])
            .inc();
        if let Decision::Denied { rule, .. } = decision {
            self.rule_denials_total.with_label_values(&[rule.as_str()]).inc();
        }
        self.evaluation_duration.observe(duration_seconds);
    }

    /// Record a store retry
    pub fn record_store_retry(&self) {
        self.store_retries_total.inc();
    }

    /// Count of decisions with the given outcome label
    pub fn decisions(&self, outcome: &str) -> u64 {
        self.decisions_total.with_label_values(&[outcome]).get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
