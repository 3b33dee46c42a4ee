//! Startup recovery: replay the journal, then rebuild the queue

use tracing::{debug, error, info, warn};

use super::Inner;
use crate::error::{RotationError, RotationResult};
use crate::model::{StaticRole, advance_rotation_time};
use crate::queue::QueueItem;
use crate::wal::{ReplayDecision, RotationIntent};

/// What startup recovery found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Intents discarded because their role is gone
    pub orphaned: usize,
    /// Intents discarded because the role rotated after them
    pub stale: usize,
    /// Intents whose secret was adopted
    pub completed: usize,
    /// Intents that could not be resolved and stay in the journal
    pub failed: usize,
    /// Roles placed in the queue
    pub queued: usize,
}

impl RecoveryReport {
    fn record(&mut self, decision: ReplayDecision) {
        match decision {
            ReplayDecision::Orphaned => self.orphaned += 1,
            ReplayDecision::Stale => self.stale += 1,
            ReplayDecision::Complete => self.completed += 1,
        }
    }

    /// Intents examined
    pub fn replayed(&self) -> usize {
        self.orphaned + self.stale + self.completed + self.failed
    }
}

impl Inner {
    /// Apply the replay decision for `intent`
    ///
    /// The caller holds the role lock. Returns the decision and the role as
    /// stored afterwards (`None` when it does not exist).
    pub(crate) async fn resolve_intent(
        &self,
        intent: RotationIntent,
        role: Option<StaticRole>,
    ) -> RotationResult<(ReplayDecision, Option<StaticRole>)> {
        let name = intent.role_name.clone();
        let storage = |source| RotationError::storage(&name, source);

        match (ReplayDecision::decide(&intent, role.as_ref()), role) {
            (ReplayDecision::Complete, Some(mut role)) => {
                role.current_secret = intent.new_secret;
                role.last_rotation_time =
                    Some(advance_rotation_time(role.last_rotation_time, self.clock.now()));
                self.roles.put(&role).await.map_err(storage)?;
                self.wal.delete(&name).await.map_err(storage)?;
                info!(
                    role = %name,
                    intent_created_at = %intent.created_at,
                    "Adopted secret from unfinished rotation"
                );
                Ok((ReplayDecision::Complete, Some(role)))
            }
            (decision, role) => {
                self.wal.delete(&name).await.map_err(storage)?;
                if decision == ReplayDecision::Orphaned {
                    info!(role = %name, "Discarded rotation intent of deleted role");
                } else {
                    debug!(role = %name, "Discarded stale rotation intent");
                }
                Ok((decision, role))
            }
        }
    }

    /// Replay every leftover intent, then queue every stored role
    pub(crate) async fn recover(&self) -> RotationResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let pending = self.wal.list().await.map_err(|source| RotationError::Scan {
            namespace: "rotation journal",
            source,
        })?;
        for name in pending {
            match self.replay_one(&name).await {
                Ok(Some(decision)) => report.record(decision),
                // Removed by a concurrent request between listing and locking.
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    error!(role = %name, error = %e, "Failed to replay rotation intent");
                }
            }
        }

        let names = self.roles.list().await.map_err(|source| RotationError::Scan {
            namespace: "static roles",
            source,
        })?;
        for name in names {
            let now = self.clock.now();
            let due = match self.roles.get(&name).await {
                Ok(Some(role)) => role.next_rotation_due(now),
                Ok(None) => continue,
                Err(e) => {
                    // The rotation routine reloads the record and reports
                    // properly if it is still unreadable.
                    warn!(role = %name, error = %e, "Could not load role during recovery; queued as due");
                    now
                }
            };
            self.queue.push(QueueItem::new(name, due));
            report.queued += 1;
        }

        info!(
            orphaned = report.orphaned,
            stale = report.stale,
            completed = report.completed,
            failed = report.failed,
            queued = report.queued,
            "Rotation recovery finished"
        );
        Ok(report)
    }

    async fn replay_one(&self, name: &str) -> RotationResult<Option<ReplayDecision>> {
        let _guard = self.locks.lock(name).await;
        let storage = |source| RotationError::storage(name, source);

        let Some(intent) = self.wal.get(name).await.map_err(storage)? else {
            return Ok(None);
        };
        let role = self.roles.get(name).await.map_err(storage)?;
        let (decision, _) = self.resolve_intent(intent, role).await?;
        Ok(Some(decision))
    }
}
