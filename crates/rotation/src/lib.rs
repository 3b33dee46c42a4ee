//! Latchkey Rotation - crash-safe rotation of static credentials
//!
//! A *static role* is a username/password pair that lives in an external
//! system (usually a database). The [`RotationManager`] changes each
//! password on a fixed period and keeps track of every change, even when the
//! process dies halfway through one.
//!
//! # Features
//!
//! - **Scheduling** - due-time priority queue drained by a background ticker
//! - **Per-role exclusion** - background and forced rotations share one lock
//!   per role, so a role never has two rotations in flight
//! - **Write-ahead journal** - every external change is preceded by a durable
//!   intent; startup replay adopts, or discards, whatever was left behind
//! - **Pluggable edges** - [`Store`](latchkey_storage::Store) for persistence,
//!   [`CredentialProvider`] for the external system, [`Clock`] for time
//!
//! ```ignore
//! let manager = RotationManager::builder()
//!     .store(Arc::new(FileStore::open("/var/lib/latchkey").await?))
//!     .provider(Arc::new(PostgresProvider::new(pool)))
//!     .build()?;
//! manager.start().await?;
//! manager
//!     .create_role(RoleDefinition::new("app", "primary", "app_user", Duration::from_secs(3600)))
//!     .await?;
//! ```
#![forbid(unsafe_code)]

mod clock;
mod codec;
mod config;
mod error;
mod lock;
mod manager;
mod model;
mod provider;
mod queue;
mod roles;
mod secret;
mod wal;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{MIN_SECRET_LENGTH, RotationConfig};
pub use error::{ProviderError, RotationError, RotationResult};
pub use lock::{LockTable, RoleLockGuard};
pub use manager::{
    Missing, RecoveryReport, RotationManager, RotationManagerBuilder, RotationReport, TickSummary,
};
pub use model::{MAX_ROLE_NAME_LEN, RoleDefinition, RoleUpdate, StaticCredential, StaticRole};
pub use provider::CredentialProvider;
pub use queue::{QueueItem, RotationQueue};
pub use roles::{ROLE_KEY_PREFIX, RoleStore};
pub use secret::{RandomSecretGenerator, SecretGenerator, SecureString};
pub use wal::{ReplayDecision, RotationIntent, WAL_KEY_PREFIX, WalJournal};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        CredentialProvider, ProviderError, RoleDefinition, RoleUpdate, RotationConfig,
        RotationError, RotationManager, RotationReport, RotationResult, SecureString,
        StaticCredential, StaticRole,
    };
}
