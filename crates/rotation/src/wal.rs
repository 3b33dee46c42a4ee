//! Write-ahead journal of in-flight rotations
//!
//! An intent is written before the external secret changes and deleted once
//! the role record holds the new secret. Anything left in the journal at
//! startup is a rotation whose outcome was never recorded; [`ReplayDecision`]
//! says what to do with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use latchkey_storage::{Store, StoreResult};
use serde::{Deserialize, Serialize};

use crate::codec::{decode, encode, with_deadline};
use crate::model::StaticRole;
use crate::secret::SecureString;

/// Namespace of rotation intents in the store
pub const WAL_KEY_PREFIX: &str = "wal/static-rotation/";

/// A rotation that is about to change, or has changed, the external secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationIntent {
    pub role_name: String,
    pub username: String,
    pub new_secret: SecureString,
    /// `last_rotation_time` of the role when the attempt started
    pub observed_last_rotation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RotationIntent {
    /// Intent to move `role` to `new_secret`
    pub fn new(role: &StaticRole, new_secret: SecureString, created_at: DateTime<Utc>) -> Self {
        Self {
            role_name: role.name.clone(),
            username: role.username.clone(),
            new_secret,
            observed_last_rotation: role.last_rotation_time,
            created_at,
        }
    }
}

/// Outcome of replaying a leftover intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayDecision {
    /// The role no longer exists; discard the intent
    Orphaned,
    /// The role rotated again after the intent was written; discard it and
    /// keep the current secret
    Stale,
    /// The external secret may already be the intent's; adopt it without
    /// calling the provider again
    Complete,
}

impl ReplayDecision {
    /// Decide how to replay `intent` against the stored `role`
    pub fn decide(intent: &RotationIntent, role: Option<&StaticRole>) -> Self {
        let Some(role) = role else {
            return Self::Orphaned;
        };
        match (role.last_rotation_time, intent.observed_last_rotation) {
            (Some(current), Some(observed)) if current > observed => Self::Stale,
            // First rotation recorded after the intent saw a never-rotated role.
            (Some(_), None) => Self::Stale,
            _ => Self::Complete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orphaned => "orphaned",
            Self::Stale => "stale",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for ReplayDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed access to rotation intents, one per role at most
#[derive(Clone)]
pub struct WalJournal {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl WalJournal {
    /// Journal in `store`, each access bounded by `timeout`
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn key(role: &str) -> String {
        format!("{WAL_KEY_PREFIX}{role}")
    }

    /// Record `intent`, replacing any earlier intent of the same role
    pub async fn put(&self, intent: &RotationIntent) -> StoreResult<()> {
        let key = Self::key(&intent.role_name);
        let bytes = encode(&key, intent)?;
        with_deadline(&key, self.timeout, self.store.put(&key, bytes)).await
    }

    pub async fn get(&self, role: &str) -> StoreResult<Option<RotationIntent>> {
        let key = Self::key(role);
        match with_deadline(&key, self.timeout, self.store.get(&key)).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, role: &str) -> StoreResult<()> {
        let key = Self::key(role);
        with_deadline(&key, self.timeout, self.store.delete(&key)).await
    }

    /// Role names with a pending intent, sorted
    pub async fn list(&self) -> StoreResult<Vec<String>> {
        let keys =
            with_deadline(WAL_KEY_PREFIX, self.timeout, self.store.list(WAL_KEY_PREFIX)).await?;
        let mut roles: Vec<String> = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(WAL_KEY_PREFIX).map(str::to_string))
            .collect();
        roles.sort();
        Ok(roles)
    }
}

impl std::fmt::Debug for WalJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalJournal")
            .field("timeout", &self.timeout)
            .finish()
    }
}
