//! Background ticker draining due rotations

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::Inner;
use super::routine::{Reschedule, RotationOutcome};

/// Result of draining the queue once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub rotated: usize,
    pub failed: usize,
    /// Items whose role had been deleted
    pub skipped: usize,
}

impl Inner {
    /// Rotate every role that is due, one after another
    ///
    /// Cancellation is checked between roles, never inside one.
    pub(crate) async fn run_tick(&self, cancel: &CancellationToken) -> TickSummary {
        let mut summary = TickSummary::default();

        while !cancel.is_cancelled() {
            let Some(item) = self.queue.pop_next_due(self.clock.now()) else {
                break;
            };
            match self
                .rotate_role(&item.role_name, Reschedule::Background, None)
                .await
            {
                Ok(RotationOutcome::Rotated(_)) => summary.rotated += 1,
                Ok(RotationOutcome::RoleMissing) => {
                    summary.skipped += 1;
                    debug!(role = %item.role_name, "Dropped queue entry of deleted role");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        role = %item.role_name,
                        error = %e,
                        "Background rotation failed; retrying on schedule"
                    );
                }
            }
        }

        if summary != TickSummary::default() {
            debug!(
                rotated = summary.rotated,
                failed = summary.failed,
                skipped = summary.skipped,
                "Rotation tick finished"
            );
        }
        summary
    }
}

pub(crate) fn spawn_ticker(inner: Arc<Inner>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(inner.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    inner.run_tick(&cancel).await;
                }
            }
        }
        info!("Rotation ticker stopped");
    })
}
