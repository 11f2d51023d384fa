//! Geo-discrepancy ("impossible travel") rule
//!
//! No geolocation is performed: an origin IP that differs from the last login
//! IP, seen sooner than the configured threshold, is treated as implausible
//! travel. Location lookup belongs to an external collaborator.

use super::{Rule, RuleContext, RuleVerdict};
use crate::config::{bounded_secs, GeoConfig};
use chrono::Duration;

/// Blocks an IP change that happens too soon after the last login
#[derive(Debug, Clone)]
pub struct GeoDiscrepancyRule {
    min_ip_change: Duration,
}

impl GeoDiscrepancyRule {
    /// Create rule
    pub fn new(min_ip_change: Duration) -> Self {
        Self { min_ip_change }
    }

    /// Create rule from configuration
    pub fn from_config(config: &GeoConfig) -> Self {
        Self::new(bounded_secs(config.min_ip_change_secs))
    }
}

impl Rule for GeoDiscrepancyRule {
    fn name(&self) -> &'static str {
        "geo_discrepancy"
    }

    fn check(&self, ctx: &RuleContext<'_>) -> RuleVerdict {
        let Some(last_ip) = ctx.profile.last_login_ip.as_deref() else {
            return RuleVerdict::pass("No prior login IP recorded");
        };

        let current_ip = ctx.request.origin_ip.as_str();
        if last_ip == current_ip {
            return RuleVerdict::pass("Origin IP matches last login");
        }

        let elapsed = ctx.now - ctx.profile.last_login_time;
        if elapsed < self.min_ip_change {
            return RuleVerdict::fail(format!(
                "Suspicious location change: IP changed from {} to {} in {:.2}s (minimum {}s)",
                last_ip,
                current_ip,
                elapsed.num_milliseconds() as f64 / 1000.0,
                self.min_ip_change.num_seconds()
            ));
        }

        RuleVerdict::pass(format!(
            "IP change after {}s is plausible",
            elapsed.num_seconds()
        ))
    }
}
