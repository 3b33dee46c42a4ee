//! Error types for storage operations

use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`Store`](crate::Store) implementations
///
/// Every variant names the key involved so callers can report which record
/// could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key is empty or contains characters the backend cannot represent
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey {
        /// Offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Filesystem or device failure
    #[error("I/O failure for key '{key}': {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Value could not be encoded or decoded by the caller's codec
    #[error("Codec failure for key '{key}': {source}")]
    Codec {
        /// Key being accessed
        key: String,
        /// Underlying codec error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation did not finish within the caller's deadline
    #[error("Storage operation on key '{key}' timed out after {timeout:?}")]
    Timeout {
        /// Key being accessed
        key: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Backend-specific failure that does not fit the other variants
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Key associated with this error, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::InvalidKey { key, .. }
            | Self::Io { key, .. }
            | Self::Codec { key, .. }
            | Self::Timeout { key, .. } => Some(key),
            Self::Backend(_) => None,
        }
    }
}

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_error_keeps_source_chain() {
        let err = StoreError::Io {
            key: "static-role/app".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("static-role/app"));
        assert!(err.source().is_some());
        assert_eq!(err.key(), Some("static-role/app"));
    }

    #[test]
    fn test_timeout_message() {
        let err = StoreError::Timeout {
            key: "wal/x".to_string(),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(
            err.to_string(),
            "Storage operation on key 'wal/x' timed out after 3s"
        );
    }

    #[test]
    fn test_backend_has_no_key() {
        assert!(StoreError::Backend("down".into()).key().is_none());
    }
}
