//! User profile storage
//!
//! [`ProfileStore`] is the access contract for the external record store.
//! Implementations must make `commit` all-or-nothing: either the history
//! record and the login marker both change, or neither does.
//!
//! Serializing read-then-commit sequences for one user is the evaluator's job
//! (see [`crate::locks`]), not the store's.

use crate::types::{UserId, UserProfile};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Per-user profile store
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Snapshot of a profile; `UserNotFound` when absent
    async fn get(&self, user_id: &UserId) -> Result<UserProfile>;

    /// Append a transaction record and move the last-login marker atomically;
    /// `UserNotFound` when absent
    async fn commit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        ip: &str,
        time: DateTime<Utc>,
    ) -> Result<()>;

    /// Create or replace a profile
    async fn provision(&self, user_id: &UserId, profile: UserProfile) -> Result<()>;

    /// Drop history records at or before `cutoff` across all profiles and
    /// return how many were removed.
    ///
    /// This is the retention process; evaluation never calls it. Stores
    /// without retention support keep everything.
    async fn prune_history_before(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}

/// In-memory profile store
///
/// Each profile lives in its own `DashMap` entry, so a commit mutates it under
/// that entry's shard lock and readers never see half an update.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProfileStore {
    // Map: user_id -> UserProfile
    profiles: Arc<DashMap<UserId, UserProfile>>,
}

impl InMemoryProfileStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if no profiles are stored
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: &UserId) -> Result<UserProfile> {
        self.profiles
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    async fn commit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        ip: &str,
        time: DateTime<Utc>,
    ) -> Result<()> {
        let mut entry = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        entry.value_mut().record(amount, ip, time);

        tracing::debug!(
            user_id = %user_id,
            history_len = entry.transaction_history.len(),
            "Profile committed"
        );
        Ok(())
    }

    async fn provision(&self, user_id: &UserId, profile: UserProfile) -> Result<()> {
        self.profiles.insert(user_id.clone(), profile);
        Ok(())
    }

    async fn prune_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for mut entry in self.profiles.iter_mut() {
            let history = &mut entry.value_mut().transaction_history;
            let before = history.len();
            history.retain(|tx| tx.timestamp > cutoff);
            removed += before - history.len();
        }

        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "Pruned transaction history");
        }
        Ok(removed)
    }
}
