//! Persistence of static role records

use std::sync::Arc;
use std::time::Duration;

use latchkey_storage::{Store, StoreResult};

use crate::codec::{decode, encode, with_deadline};
use crate::model::StaticRole;

/// Namespace of role records in the store
pub const ROLE_KEY_PREFIX: &str = "static-role/";

/// Typed access to role records
#[derive(Clone)]
pub struct RoleStore {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl RoleStore {
    /// Role records in `store`, each access bounded by `timeout`
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn key(name: &str) -> String {
        format!("{ROLE_KEY_PREFIX}{name}")
    }

    pub async fn get(&self, name: &str) -> StoreResult<Option<StaticRole>> {
        let key = Self::key(name);
        match with_deadline(&key, self.timeout, self.store.get(&key)).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Insert or replace the record for `role.name`
    pub async fn put(&self, role: &StaticRole) -> StoreResult<()> {
        let key = Self::key(&role.name);
        let bytes = encode(&key, role)?;
        with_deadline(&key, self.timeout, self.store.put(&key, bytes)).await
    }

    pub async fn delete(&self, name: &str) -> StoreResult<()> {
        let key = Self::key(name);
        with_deadline(&key, self.timeout, self.store.delete(&key)).await
    }

    /// Names of every stored role, sorted
    pub async fn list(&self) -> StoreResult<Vec<String>> {
        let keys =
            with_deadline(ROLE_KEY_PREFIX, self.timeout, self.store.list(ROLE_KEY_PREFIX)).await?;
        let mut names: Vec<String> = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(ROLE_KEY_PREFIX).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for RoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}
