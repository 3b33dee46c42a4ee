//! Rotation manager
//!
//! [`RotationManager`] owns the queue, the lock table and the ticker task.
//! Background and forced rotations run the same routine under the same
//! per-role lock, so at most one rotation of a role is ever in flight.
//!
//! ```text
//! start() ── replay journal ── queue every role ── spawn ticker
//!                                                     │ every tick_interval
//!                                                     ▼
//!            pop due ── lock ── journal intent ── provider ── role record ── drop intent ── re-queue
//! ```

mod api;
mod builder;
mod recovery;
mod routine;
mod ticker;

pub use builder::{Missing, RotationManagerBuilder};
pub use recovery::RecoveryReport;
pub use routine::RotationReport;
pub use ticker::TickSummary;

use std::sync::Arc;

use latchkey_storage::Store;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::RotationConfig;
use crate::error::{RotationError, RotationResult};
use crate::lock::LockTable;
use crate::provider::CredentialProvider;
use crate::queue::RotationQueue;
use crate::roles::RoleStore;
use crate::secret::SecretGenerator;
use crate::wal::WalJournal;

/// State shared between the manager handle, the ticker and forced rotations
pub(crate) struct Inner {
    pub(crate) roles: RoleStore,
    pub(crate) wal: WalJournal,
    pub(crate) queue: RotationQueue,
    pub(crate) locks: LockTable,
    pub(crate) provider: Arc<dyn CredentialProvider>,
    pub(crate) generator: Arc<dyn SecretGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: RotationConfig,
}

enum Lifecycle {
    Idle,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Schedules, executes and recovers rotations of static roles
///
/// Build with [`RotationManager::builder`], then call
/// [`start`](Self::start) once. Request operations work before `start` too;
/// nothing rotates in the background until the ticker runs.
pub struct RotationManager {
    inner: Arc<Inner>,
    lifecycle: Mutex<Lifecycle>,
}

impl RotationManager {
    pub fn builder() -> RotationManagerBuilder {
        RotationManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn Store>,
        provider: Arc<dyn CredentialProvider>,
        generator: Arc<dyn SecretGenerator>,
        clock: Arc<dyn Clock>,
        config: RotationConfig,
    ) -> Self {
        let inner = Inner {
            roles: RoleStore::new(Arc::clone(&store), config.operation_timeout),
            wal: WalJournal::new(store, config.operation_timeout),
            queue: RotationQueue::new(),
            locks: LockTable::new(),
            provider,
            generator,
            clock,
            config,
        };
        Self {
            inner: Arc::new(inner),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Recover from the journal, queue every role and start the ticker
    ///
    /// Fails with [`RotationError::AlreadyStarted`] on a second call, also
    /// after [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> RotationResult<RecoveryReport> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(RotationError::AlreadyStarted);
        }

        let report = self.inner.recover().await?;

        let cancel = CancellationToken::new();
        let handle = ticker::spawn_ticker(Arc::clone(&self.inner), cancel.clone());
        *lifecycle = Lifecycle::Running { cancel, handle };

        info!(
            tick_interval = ?self.inner.config.tick_interval,
            queued = report.queued,
            "Rotation manager started"
        );
        Ok(report)
    }

    /// Stop the ticker and wait for it to exit
    ///
    /// A rotation already in progress finishes first. Idempotent.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        if let Lifecycle::Running { cancel, handle } = previous {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Rotation ticker ended abnormally");
            }
            info!("Rotation manager stopped");
        }
    }

    /// True while the ticker runs
    pub fn is_running(&self) -> bool {
        self.lifecycle
            .try_lock()
            .is_ok_and(|lifecycle| matches!(*lifecycle, Lifecycle::Running { .. }))
    }

    /// Drain due rotations now, without waiting for the ticker
    pub async fn tick_now(&self) -> TickSummary {
        self.inner.run_tick(&CancellationToken::new()).await
    }

    pub fn config(&self) -> &RotationConfig {
        &self.inner.config
    }
}

impl Drop for RotationManager {
    fn drop(&mut self) {
        if let Ok(lifecycle) = self.lifecycle.try_lock()
            && let Lifecycle::Running { cancel, .. } = &*lifecycle
        {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RotationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationManager")
            .field("config", &self.inner.config)
            .field("queued", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}
