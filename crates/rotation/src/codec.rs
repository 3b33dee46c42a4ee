//! JSON encoding and deadlines for store records

use std::future::Future;
use std::time::Duration;

use latchkey_storage::{StoreError, StoreResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Codec {
        key: key.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Codec {
        key: key.to_string(),
        source: Box::new(e),
    })
}

/// Run a store operation, failing with [`StoreError::Timeout`] past `timeout`
pub(crate) async fn with_deadline<T, F>(key: &str, timeout: Duration, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            key: key.to_string(),
            timeout,
        }),
    }
}
