//! Rotation error types
//!
//! Every variant that concerns a single role carries its name, so a caller
//! (or a log line) can always tell which credential failed.

use std::time::Duration;

use latchkey_storage::StoreError;
use thiserror::Error;

/// Failures reported by a [`CredentialProvider`](crate::CredentialProvider)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The external system refused the change
    #[error("external system rejected the request: {reason}")]
    Rejected { reason: String },

    /// The external system could not be reached
    #[error("external system unavailable: {reason}")]
    Unavailable { reason: String },

    /// The call did not complete within the operation timeout
    #[error("external call timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl ProviderError {
    /// Create a [`ProviderError::Rejected`]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create a [`ProviderError::Unavailable`]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Errors returned by the rotation engine
#[derive(Debug, Error)]
pub enum RotationError {
    /// No static role with this name exists
    #[error("no static role found for role name '{role}'")]
    NotStaticRole { role: String },

    /// The credential provider failed or timed out
    #[error("credential provider failed for role '{role}': {source}")]
    Provider {
        role: String,
        #[source]
        source: ProviderError,
    },

    /// Reading or writing a role record or journal intent failed
    #[error("storage failure for role '{role}': {source}")]
    Storage {
        role: String,
        #[source]
        source: StoreError,
    },

    /// Listing a whole namespace failed (recovery, `list_roles`)
    #[error("failed to scan {namespace}: {source}")]
    Scan {
        namespace: &'static str,
        #[source]
        source: StoreError,
    },

    /// The caller cancelled before the external change started
    #[error("rotation of role '{role}' was cancelled")]
    Cancelled { role: String },

    /// A role definition or update failed validation
    #[error("invalid role '{role}': {reason}")]
    InvalidRole { role: String, reason: String },

    /// A role with this name already exists
    #[error("static role '{role}' already exists")]
    RoleExists { role: String },

    /// Attempted to change a field fixed at creation
    #[error("field '{field}' of role '{role}' cannot be changed after creation")]
    ImmutableField { role: String, field: &'static str },

    /// `RotationConfig` failed validation
    #[error("invalid rotation config: {reason}")]
    InvalidConfig { reason: String },

    /// `start()` was called on a manager that already started
    #[error("rotation manager already started")]
    AlreadyStarted,

    /// A detached rotation task panicked or was aborted
    #[error("internal error: {0}")]
    Internal(String),
}

impl RotationError {
    pub(crate) fn storage(role: &str, source: StoreError) -> Self {
        Self::Storage {
            role: role.to_string(),
            source,
        }
    }

    pub(crate) fn provider(role: &str, source: ProviderError) -> Self {
        Self::Provider {
            role: role.to_string(),
            source,
        }
    }

    pub(crate) fn not_found(role: &str) -> Self {
        Self::NotStaticRole {
            role: role.to_string(),
        }
    }

    pub(crate) fn invalid_role(role: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRole {
            role: role.to_string(),
            reason: reason.into(),
        }
    }

    /// Role this error concerns, if it concerns a single role
    pub fn role(&self) -> Option<&str> {
        match self {
            Self::NotStaticRole { role }
            | Self::Provider { role, .. }
            | Self::Storage { role, .. }
            | Self::Cancelled { role }
            | Self::InvalidRole { role, .. }
            | Self::RoleExists { role }
            | Self::ImmutableField { role, .. } => Some(role),
            Self::Scan { .. }
            | Self::InvalidConfig { .. }
            | Self::AlreadyStarted
            | Self::Internal(_) => None,
        }
    }

    /// True for [`RotationError::NotStaticRole`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotStaticRole { .. })
    }
}

/// Result alias for rotation operations
pub type RotationResult<T> = Result<T, RotationError>;
