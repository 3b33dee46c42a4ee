//! Shared fixtures for the rotation integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use latchkey_rotation::{
    Clock, CredentialProvider, ProviderError, ROLE_KEY_PREFIX, RoleDefinition, RotationConfig,
    RotationManager, SecureString, StaticRole, WalJournal,
};
use latchkey_storage::{MemoryStore, Store, StoreError, StoreResult};
use parking_lot::Mutex;

/// Install a test subscriber once; `RUST_LOG=latchkey_rotation=debug` shows
/// the manager's events
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One `update_secret` call as the external system saw it
#[derive(Debug, Clone)]
pub struct UpdateCall {
    pub username: String,
    pub observed_last_rotation: Option<DateTime<Utc>>,
    pub new_secret: String,
}

/// Stand-in for the external database
///
/// Keeps the live password of every user, logs every call and flags any
/// overlapping updates of the same user.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    passwords: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<UpdateCall>>,
    revoked: Mutex<Vec<String>>,
    in_flight: Mutex<HashSet<String>>,
    overlapped: AtomicBool,
    failing: AtomicBool,
    failing_revoke: AtomicBool,
    delay: Mutex<Duration>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Each update takes `delay`, widening the window for overlaps
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let provider = Self::new();
        provider.set_delay(delay);
        provider
    }

    /// Change how long each later update takes
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_revoke(&self, failing: bool) {
        self.failing_revoke.store(failing, Ordering::SeqCst);
    }

    /// Live password of `username` in the external system
    pub fn password(&self, username: &str) -> Option<String> {
        self.passwords.lock().get(username).cloned()
    }

    pub fn calls_for(&self, username: &str) -> Vec<UpdateCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.username == username)
            .cloned()
            .collect()
    }

    pub fn update_count(&self, username: &str) -> usize {
        self.calls_for(username).len()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for RecordingProvider {
    async fn update_secret(
        &self,
        role: &StaticRole,
        new_secret: &SecureString,
    ) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::unavailable("database is down"));
        }
        if !self.in_flight.lock().insert(role.username.clone()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        // Cleared on drop too, so an update abandoned by a timeout does not
        // look like an overlap later.
        let _in_flight = InFlight {
            set: &self.in_flight,
            username: &role.username,
        };
        self.calls.lock().push(UpdateCall {
            username: role.username.clone(),
            observed_last_rotation: role.last_rotation_time,
            new_secret: new_secret.expose().to_string(),
        });

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.passwords
            .lock()
            .insert(role.username.clone(), new_secret.expose().to_string());
        Ok(())
    }

    async fn revoke_user(&self, role: &StaticRole) -> Result<(), ProviderError> {
        if self.failing_revoke.load(Ordering::SeqCst) {
            return Err(ProviderError::rejected("user owns objects"));
        }
        self.passwords.lock().remove(&role.username);
        self.revoked.lock().push(role.username.clone());
        Ok(())
    }
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    username: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.username);
    }
}

/// Memory store that can be told to fail role writes or deletes
///
/// Simulates a crash window: the journal and the provider succeed, the role
/// record never lands.
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_role_writes: AtomicBool,
    fail_role_deletes: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_role_writes: AtomicBool::new(false),
            fail_role_deletes: AtomicBool::new(false),
        })
    }

    pub fn fail_role_writes(&self, fail: bool) {
        self.fail_role_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_role_deletes(&self, fail: bool) {
        self.fail_role_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        if key.starts_with(ROLE_KEY_PREFIX) && self.fail_role_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if key.starts_with(ROLE_KEY_PREFIX) && self.fail_role_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read-only filesystem".into()));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list(prefix).await
    }
}

/// Config used by most tests: one-second ticks
pub fn fast_config() -> RotationConfig {
    RotationConfig::default()
        .with_tick_interval(Duration::from_secs(1))
        .with_operation_timeout(Duration::from_secs(5))
}

pub fn manager_with(
    store: Arc<dyn Store>,
    provider: Arc<RecordingProvider>,
    clock: Arc<dyn Clock>,
) -> RotationManager {
    RotationManager::builder()
        .store(store)
        .provider(provider)
        .clock(clock)
        .config(fast_config())
        .build()
        .expect("test config is valid")
}

pub fn manager(store: Arc<dyn Store>, provider: Arc<RecordingProvider>) -> RotationManager {
    RotationManager::builder()
        .store(store)
        .provider(provider)
        .config(fast_config())
        .build()
        .expect("test config is valid")
}

pub fn journal(store: Arc<dyn Store>) -> WalJournal {
    WalJournal::new(store, Duration::from_secs(5))
}

pub fn role(name: &str, period: Duration) -> RoleDefinition {
    RoleDefinition::new(name, "primary-db", format!("{name}_user"), period)
        .with_initial_secret(SecureString::new("initial-password"))
}

pub fn username(name: &str) -> String {
    format!("{name}_user")
}
