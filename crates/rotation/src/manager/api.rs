//! Operations invoked on behalf of API requests

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::RotationManager;
use super::routine::{Reschedule, RotationOutcome, RotationReport};
use crate::error::{ProviderError, RotationError, RotationResult};
use crate::model::{RoleDefinition, RoleUpdate, StaticCredential, StaticRole};
use crate::queue::QueueItem;

impl RotationManager {
    /// Create a role and rotate it right away
    ///
    /// The role is stored and queued as due before the first rotation runs.
    /// If that rotation fails the role still exists and stays queued; the
    /// error is returned.
    pub async fn create_role(&self, definition: RoleDefinition) -> RotationResult<RotationReport> {
        definition.validate(&self.inner.config)?;
        let name = definition.name.clone();

        {
            let _guard = self.inner.locks.lock(&name).await;
            if self.load(&name).await?.is_some() {
                return Err(RotationError::RoleExists { role: name });
            }
            let role = definition.into_role();
            self.inner
                .roles
                .put(&role)
                .await
                .map_err(|source| RotationError::storage(&name, source))?;
            self.inner
                .queue
                .push(QueueItem::new(&name, self.inner.clock.now()));
            info!(role = %name, username = %role.username, "Created static role");
        }

        self.force_rotate(&name, &CancellationToken::new()).await
    }

    /// Change the period, statements or revoke flag of a role
    ///
    /// A changed period reschedules the role at
    /// `last_rotation_time + new_period`.
    pub async fn update_role(&self, name: &str, update: RoleUpdate) -> RotationResult<StaticRole> {
        let _guard = self.inner.locks.lock(name).await;
        let mut role = self
            .load(name)
            .await?
            .ok_or_else(|| RotationError::not_found(name))?;

        let period_changed = update.apply(&mut role, &self.inner.config)?;
        self.inner
            .roles
            .put(&role)
            .await
            .map_err(|source| RotationError::storage(name, source))?;

        if period_changed {
            let due = role.next_rotation_due(self.inner.clock.now());
            self.inner.queue.push(QueueItem::new(name, due));
            info!(
                role = %name,
                period = ?role.rotation_period,
                next_rotation = %due,
                "Rescheduled static role after period change"
            );
        } else {
            info!(role = %name, "Updated static role");
        }
        Ok(role)
    }

    /// Create the role if absent, otherwise update it from `definition`
    ///
    /// Returns the first rotation when the role was created.
    pub async fn create_or_update_role(
        &self,
        definition: RoleDefinition,
    ) -> RotationResult<Option<RotationReport>> {
        match self.load(&definition.name).await? {
            None => match self.create_role(definition.clone()).await {
                Ok(report) => Ok(Some(report)),
                // Lost a race with a concurrent create.
                Err(RotationError::RoleExists { .. }) => self.update_from(definition).await,
                Err(e) => Err(e),
            },
            Some(_) => self.update_from(definition).await,
        }
    }

    async fn update_from(
        &self,
        definition: RoleDefinition,
    ) -> RotationResult<Option<RotationReport>> {
        let name = definition.name.clone();
        self.update_role(&name, RoleUpdate::from(definition)).await?;
        Ok(None)
    }

    /// Stored role, secret included
    pub async fn read_role(&self, name: &str) -> RotationResult<StaticRole> {
        self.load(name)
            .await?
            .ok_or_else(|| RotationError::not_found(name))
    }

    /// Current credentials and time left until the next rotation
    pub async fn read_credential(&self, name: &str) -> RotationResult<StaticCredential> {
        let role = self.read_role(name).await?;
        Ok(role.credential(self.inner.clock.now()))
    }

    /// Delete a role, its queue entry and any pending journal intent
    ///
    /// `revoke` overrides the role's `revoke_on_delete` flag. Revoking is
    /// best effort: a provider failure is logged, the role is gone either
    /// way. Returns `false` when there was no such role.
    pub async fn delete_role(&self, name: &str, revoke: Option<bool>) -> RotationResult<bool> {
        let guard = self.inner.locks.lock(name).await;
        let Some(role) = self.load(name).await? else {
            self.inner.queue.pop_by_key(name);
            drop(guard);
            self.inner.locks.prune(name);
            return Ok(false);
        };

        // The role keeps its queue slot until the record is really gone.
        self.inner
            .roles
            .delete(name)
            .await
            .map_err(|source| RotationError::storage(name, source))?;
        self.inner.queue.pop_by_key(name);
        if let Err(e) = self.inner.wal.delete(name).await {
            // Replay discards it as orphaned.
            warn!(role = %name, error = %e, "Failed to delete rotation intent of deleted role");
        }
        drop(guard);
        self.inner.locks.prune(name);
        info!(role = %name, "Deleted static role");

        if revoke.unwrap_or(role.revoke_on_delete) {
            let timeout = self.inner.config.operation_timeout;
            let revoked =
                match tokio::time::timeout(timeout, self.inner.provider.revoke_user(&role)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout { timeout }),
                };
            match revoked {
                Ok(()) => info!(role = %name, username = %role.username, "Revoked external user"),
                Err(e) => warn!(
                    role = %name,
                    username = %role.username,
                    error = %e,
                    "Failed to revoke external user of deleted role"
                ),
            }
        }
        Ok(true)
    }

    /// Rotate `name` now, outside its schedule
    ///
    /// The role is taken out of the queue, rotated under its lock and always
    /// queued again exactly once: at `last_rotation_time + period` on
    /// success, at its previous slot (or one period from now) on failure.
    ///
    /// `cancel` is honoured until the provider call starts. The rotation
    /// runs on its own task, so dropping the returned future does not
    /// interrupt the bookkeeping after an external change.
    pub async fn force_rotate(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> RotationResult<RotationReport> {
        if self.load(name).await?.is_none() {
            return Err(RotationError::not_found(name));
        }

        let prior_due = self.inner.queue.pop_by_key(name).map(|item| item.due_time);
        let inner = Arc::clone(&self.inner);
        let role = name.to_string();
        let cancel = cancel.clone();
        let task = tokio::spawn(async move {
            inner
                .rotate_role(&role, Reschedule::Forced { prior_due }, Some(&cancel))
                .await
        });

        let outcome = match task.await {
            Ok(outcome) => outcome?,
            Err(e) => {
                let due = prior_due.unwrap_or_else(|| self.inner.clock.now());
                self.inner.queue.push(QueueItem::new(name, due));
                return Err(RotationError::Internal(format!(
                    "forced rotation of role '{name}' aborted: {e}"
                )));
            }
        };

        match outcome {
            RotationOutcome::Rotated(report) => {
                info!(role = %name, next_rotation = %report.next_rotation, "Forced rotation completed");
                Ok(report)
            }
            RotationOutcome::RoleMissing => Err(RotationError::not_found(name)),
        }
    }

    /// Names of every role, sorted
    pub async fn list_roles(&self) -> RotationResult<Vec<String>> {
        self.inner
            .roles
            .list()
            .await
            .map_err(|source| RotationError::Scan {
                namespace: "static roles",
                source,
            })
    }

    /// Number of queued rotations
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// When `name` is next due to rotate, if queued
    pub fn scheduled_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.inner.queue.due_time(name)
    }

    async fn load(&self, name: &str) -> RotationResult<Option<StaticRole>> {
        self.inner
            .roles
            .get(name)
            .await
            .map_err(|source| RotationError::storage(name, source))
    }
}
