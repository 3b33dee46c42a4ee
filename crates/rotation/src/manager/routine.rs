//! The rotation routine shared by the ticker and forced rotation

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Inner;
use crate::error::{ProviderError, RotationError, RotationResult};
use crate::model::{StaticRole, add_period, advance_rotation_time};
use crate::queue::QueueItem;
use crate::wal::RotationIntent;

/// Where a role goes back in the queue when an attempt fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reschedule {
    /// Ticker path: retry one full period later
    Background,
    /// Forced path: restore the slot the role had before, if it had one
    Forced { prior_due: Option<DateTime<Utc>> },
}

/// A completed rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub role: String,
    /// New `last_rotation_time` of the role
    pub rotated_at: DateTime<Utc>,
    /// Due time the role was re-queued with
    pub next_rotation: DateTime<Utc>,
    /// A leftover intent from an earlier attempt was adopted first
    pub recovered_intent: bool,
}

#[derive(Debug)]
pub(crate) enum RotationOutcome {
    Rotated(RotationReport),
    /// The role was deleted before its turn came
    RoleMissing,
}

impl Inner {
    /// Rotate `name` under its lock and re-queue it
    ///
    /// Success re-queues at `last_rotation_time + period`, failure per
    /// `reschedule`, a missing role is left out of the queue.
    pub(crate) async fn rotate_role(
        &self,
        name: &str,
        reschedule: Reschedule,
        cancel: Option<&CancellationToken>,
    ) -> RotationResult<RotationOutcome> {
        let _guard = self.locks.lock(name).await;

        let role = match self.roles.get(name).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                self.queue.pop_by_key(name);
                return Ok(RotationOutcome::RoleMissing);
            }
            Err(source) => {
                // Period unknown without the record; the minimum keeps retries bounded.
                self.reschedule_failed(name, reschedule, self.config.min_rotation_period);
                return Err(RotationError::storage(name, source));
            }
        };

        let period = role.rotation_period;
        match self.attempt(role, cancel).await {
            Ok(report) => {
                self.queue.push(QueueItem::new(name, report.next_rotation));
                Ok(RotationOutcome::Rotated(report))
            }
            Err(err) => {
                self.reschedule_failed(name, reschedule, period);
                Err(err)
            }
        }
    }

    fn reschedule_failed(&self, name: &str, reschedule: Reschedule, period: std::time::Duration) {
        let due = match reschedule {
            Reschedule::Forced {
                prior_due: Some(due),
            } => due,
            Reschedule::Forced { prior_due: None } | Reschedule::Background => {
                add_period(self.clock.now(), period)
            }
        };
        self.queue.push(QueueItem::new(name, due));
        debug!(role = %name, due = %due, "Rescheduled role after failed rotation");
    }

    /// One rotation attempt; the caller holds the role lock
    async fn attempt(
        &self,
        mut role: StaticRole,
        cancel: Option<&CancellationToken>,
    ) -> RotationResult<RotationReport> {
        let name = role.name.clone();

        let mut recovered_intent = false;
        let leftover = self
            .wal
            .get(&name)
            .await
            .map_err(|source| RotationError::storage(&name, source))?;
        if let Some(intent) = leftover {
            let (_, resolved) = self.resolve_intent(intent, Some(role)).await?;
            recovered_intent = true;
            role = resolved.ok_or_else(|| RotationError::not_found(&name))?;
        }

        if is_cancelled(cancel) {
            return Err(RotationError::Cancelled { role: name });
        }

        let new_secret = self.generator.generate(&role);
        let intent = RotationIntent::new(&role, new_secret.clone(), self.clock.now());
        self.wal
            .put(&intent)
            .await
            .map_err(|source| RotationError::storage(&name, source))?;

        if is_cancelled(cancel) {
            self.discard_intent(&name).await;
            return Err(RotationError::Cancelled { role: name });
        }

        // Past this point the external secret may change; no more cancellation.
        let timeout = self.config.operation_timeout;
        let update = self.provider.update_secret(&role, &new_secret);
        let updated = match tokio::time::timeout(timeout, update).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { timeout }),
        };
        if let Err(source) = updated {
            self.discard_intent(&name).await;
            return Err(RotationError::provider(&name, source));
        }

        let rotated_at = advance_rotation_time(role.last_rotation_time, self.clock.now());
        role.current_secret = new_secret;
        role.last_rotation_time = Some(rotated_at);
        if let Err(source) = self.roles.put(&role).await {
            error!(
                role = %name,
                error = %source,
                "External secret changed but role record not updated; intent kept for recovery"
            );
            return Err(RotationError::storage(&name, source));
        }

        if let Err(e) = self.wal.delete(&name).await {
            // The role record is already newer than the intent, so replay
            // will classify it as stale.
            warn!(role = %name, error = %e, "Failed to delete completed rotation intent");
        }

        info!(role = %name, rotated_at = %rotated_at, "Rotated static role credential");
        Ok(RotationReport {
            role: name,
            rotated_at,
            next_rotation: add_period(rotated_at, role.rotation_period),
            recovered_intent,
        })
    }

    /// Drop an intent whose external change never happened
    async fn discard_intent(&self, name: &str) {
        if let Err(e) = self.wal.delete(name).await {
            error!(
                role = %name,
                error = %e,
                "Failed to discard rotation intent that was never applied"
            );
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}
