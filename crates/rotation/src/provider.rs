//! Seam to the external system that actually holds the credentials

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::StaticRole;
use crate::secret::SecureString;

/// Changes and revokes users in the external system (a database, usually)
///
/// The manager calls [`update_secret`](Self::update_secret) at most once per
/// journal intent and never concurrently for the same role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Set the password of `role.username` to `new_secret`
    ///
    /// `role` is the state before the rotation, so `role.current_secret` is
    /// the password being replaced.
    async fn update_secret(
        &self,
        role: &StaticRole,
        new_secret: &SecureString,
    ) -> Result<(), ProviderError>;

    /// Drop the external user of a deleted role
    async fn revoke_user(&self, role: &StaticRole) -> Result<(), ProviderError>;
}
