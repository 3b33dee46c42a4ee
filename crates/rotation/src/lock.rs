//! Per-role mutual exclusion

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while a role is being rotated, updated or deleted
///
/// Dropping the guard releases the lock on every exit path, panics included.
#[derive(Debug)]
pub struct RoleLockGuard {
    role: String,
    _guard: OwnedMutexGuard<()>,
}

impl RoleLockGuard {
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// One async lock per role name, created on first use
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, role: &str) -> Arc<Mutex<()>> {
        // Clone the handle out so no map shard stays locked across an await.
        Arc::clone(self.locks.entry(role.to_string()).or_default().value())
    }

    /// Wait for exclusive access to `role`
    pub async fn lock(&self, role: &str) -> RoleLockGuard {
        let guard = self.handle(role).lock_owned().await;
        RoleLockGuard {
            role: role.to_string(),
            _guard: guard,
        }
    }

    /// Exclusive access to `role` if nobody holds it
    pub fn try_lock(&self, role: &str) -> Option<RoleLockGuard> {
        let guard = self.handle(role).try_lock_owned().ok()?;
        Some(RoleLockGuard {
            role: role.to_string(),
            _guard: guard,
        })
    }

    pub fn is_locked(&self, role: &str) -> bool {
        self.locks
            .get(role)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Forget the lock of a deleted role
    ///
    /// The entry is kept while any guard or waiter still references it, so a
    /// task already queued on the lock keeps excluding newcomers.
    pub fn prune(&self, role: &str) -> bool {
        self.locks
            .remove_if(role, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    /// Number of tracked roles
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
