//! Per-user lock table
//!
//! Evaluations for the same user must not interleave their read-then-commit
//! sequence. Each user id maps to its own async mutex; users never contend
//! with each other, and there is no table-wide lock held across an await.
//!
//! Entries are created on demand and removed when the last holder or waiter
//! releases, so the table only tracks users with an evaluation in flight.

use crate::types::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by user id
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Create empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    ///
    /// Dropping the returned future before it resolves still releases the
    /// caller's claim on the entry.
    pub async fn acquire(&self, user_id: &UserId) -> UserLockGuard {
        let entry = EntryRelease {
            user_id: user_id.clone(),
            locks: Arc::clone(&self.locks),
        };

        let lock = self
            .locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        // A cancelled wait drops the pending `lock_owned` (and its Arc)
        // before `entry`, so the release check sees the final count.
        let guard = lock.lock_owned().await;

        UserLockGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of users with a live lock entry
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one user; released on drop
#[derive(Debug)]
pub struct UserLockGuard {
    // Field order matters: the mutex guard is released before the entry check.
    _guard: OwnedMutexGuard<()>,
    _entry: EntryRelease,
}

/// Removes a user's entry once nobody holds or waits on its mutex
#[derive(Debug)]
struct EntryRelease {
    user_id: UserId,
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl Drop for EntryRelease {
    fn drop(&mut self) {
        // Only the table's reference left means no holder and no waiter.
        // Waiters clone under the same shard lock, so the check cannot race.
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = UserLocks::new();
        let user = UserId::new("user1");

        let guard = locks.acquire(&user).await;
        assert_eq!(locks.active(), 1);

        drop(guard);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = UserLocks::new();
        let user = UserId::new("user1");

        let guard = locks.acquire(&user).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&user)).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&user)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _a = locks.acquire(&UserId::new("a")).await;

        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&UserId::new("b")),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_entry_removed_when_waiter_cancelled() {
        let locks = UserLocks::new();
        let user = UserId::new("user1");

        let holder = locks.acquire(&user).await;
        let mut waiter = Box::pin(locks.acquire(&user));
        let pending = tokio::time::timeout(Duration::from_millis(10), &mut waiter).await;
        assert!(pending.is_err());

        drop(holder);
        assert_eq!(locks.active(), 1);

        drop(waiter);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_queued() {
        let locks = UserLocks::new();
        let user = UserId::new("user1");

        let holder = locks.acquire(&user).await;
        let waiter = {
            let locks = locks.clone();
            let user = user.clone();
            tokio::spawn(async move { locks.acquire(&user).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(holder);
        let guard = waiter.await.unwrap();
        assert_eq!(locks.active(), 1);

        drop(guard);
        assert_eq!(locks.active(), 0);
    }
}
