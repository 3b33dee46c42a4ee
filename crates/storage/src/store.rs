use async_trait::async_trait;

use crate::error::StoreResult;

/// Durable key-value storage
///
/// Implementations must make a successful [`put`](Store::put) durable before
/// returning: the rotation engine relies on it to order its write-ahead
/// intent before the external credential change.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the value stored under `key`
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Load the value stored under `key`, `None` if absent
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Full keys starting with `prefix`, in no particular order
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
