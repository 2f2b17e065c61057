//! # Offline Queue Manager
//!
//! Owns every terminal write that has to reach the remote store: applies it
//! directly when online, queues it durably otherwise, and drains the queue
//! when connectivity returns.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  submit(kind, payload)                                                  │
//! │       │                                                                 │
//! │       ├── online? ──► remote.apply() ──ok──► SubmitOutcome::Applied     │
//! │       │                    │                                            │
//! │       │                    └──err──┐                                    │
//! │       │                            ▼                                    │
//! │       └── offline ───────────► enqueue() ──► SubmitOutcome::Queued      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Drain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  synchronize()                                                          │
//! │   1. offline or already syncing ──► SyncReport::skipped()              │
//! │   2. lock, snapshot = store.load(), unlock                              │
//! │   3. apply each entry oldest-first (lock NOT held; enqueue still works) │
//! │   4. lock, current = store.load()                                       │
//! │        keep  = failed entries still in `current`                        │
//! │              + entries in `current` that were not in `snapshot`         │
//! │        store.save(keep), unlock                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure never stops the drain; the entry stays queued with its
//! `attempts` counter bumped. With a dead-letter threshold configured,
//! entries that reach it are moved out of the live queue, and so are
//! entries the remote rejected as unfixable (a 4xx other than 408/429),
//! since resending the same payload cannot succeed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::connectivity::Connectivity;
use crate::error::SyncResult;
use crate::notify::SyncNotifier;
use crate::remote::RemoteApplyClient;
use crate::store::QueueStore;
use duka_core::{OperationKind, QueuedOperation};

// =============================================================================
// Outcomes
// =============================================================================

/// Result of [`OfflineQueue::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Applied to the remote store immediately.
    Applied,
    /// Persisted locally for a later sync.
    Queued(QueuedOperation),
}

impl SubmitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SubmitOutcome::Applied)
    }
}

/// Counts from one [`OfflineQueue::synchronize`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// True if the call did nothing (offline or another sync in flight).
    pub skipped: bool,
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed and still queued.
    pub failed: usize,
    /// Failed and moved to the dead-letter store.
    pub dead_lettered: usize,
    /// Left queued after the drain, including entries enqueued meanwhile.
    pub remaining: usize,
    /// Set if the final queue write-back failed.
    pub persist_error: Option<String>,
}

impl SyncReport {
    pub fn skipped() -> Self {
        SyncReport {
            skipped: true,
            ..Default::default()
        }
    }
}

struct DeadLetterPolicy {
    store: Arc<dyn QueueStore>,
    max_attempts: u32,
}

/// An entry that failed during a drain.
struct FailedEntry {
    operation: QueuedOperation,
    /// The remote refused the payload itself; retrying cannot help.
    permanent: bool,
}

/// Clears the in-flight flag when the drain ends, including on panic.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Offline Queue
// =============================================================================

/// Terminal-side queue of writes awaiting the remote store.
pub struct OfflineQueue {
    store: Arc<dyn QueueStore>,
    /// Serializes every load/save pair on `store`.
    store_lock: Mutex<()>,
    remote: Arc<dyn RemoteApplyClient>,
    notifier: Arc<dyn SyncNotifier>,
    connectivity: watch::Receiver<Connectivity>,
    syncing: AtomicBool,
    dead_letter: Option<DeadLetterPolicy>,
}

impl OfflineQueue {
    /// Creates a queue reading connectivity from the monitor's channel.
    pub fn new(
        store: Arc<dyn QueueStore>,
        remote: Arc<dyn RemoteApplyClient>,
        notifier: Arc<dyn SyncNotifier>,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self {
        OfflineQueue {
            store,
            store_lock: Mutex::new(()),
            remote,
            notifier,
            connectivity,
            syncing: AtomicBool::new(false),
            dead_letter: None,
        }
    }

    /// Moves entries that failed `max_attempts` times, or that the remote
    /// rejected permanently, into `store`. `0` leaves retries unbounded and
    /// keeps every failure queued.
    pub fn with_dead_letter(mut self, store: Arc<dyn QueueStore>, max_attempts: u32) -> Self {
        self.dead_letter = (max_attempts > 0).then(|| DeadLetterPolicy { store, max_attempts });
        self
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow() == Connectivity::Online
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Queues a write without touching the network.
    pub async fn enqueue(&self, kind: OperationKind, payload: serde_json::Value) -> SyncResult<QueuedOperation> {
        self.enqueue_operation(QueuedOperation::new(kind, payload)).await
    }

    /// Applies a write now if possible, otherwise queues it.
    ///
    /// Fails only when the write had to be queued and the local store
    /// could not be written.
    pub async fn submit(&self, kind: OperationKind, payload: serde_json::Value) -> SyncResult<SubmitOutcome> {
        let operation = QueuedOperation::new(kind, payload);

        if self.is_online() {
            match self.remote.apply(&operation).await {
                Ok(()) => {
                    debug!(id = %operation.id, kind = %operation.kind, "Applied online");
                    return Ok(SubmitOutcome::Applied);
                }
                Err(e) => {
                    warn!(id = %operation.id, kind = %operation.kind, error = %e, "Online apply failed, queuing");
                }
            }
        }

        let queued = self.enqueue_operation(operation).await?;
        Ok(SubmitOutcome::Queued(queued))
    }

    async fn enqueue_operation(&self, operation: QueuedOperation) -> SyncResult<QueuedOperation> {
        {
            let _lock = self.store_lock.lock().await;
            let mut operations = self.store.load();
            operations.push(operation.clone());
            self.store.save(&operations)?;
        }

        info!(id = %operation.id, kind = %operation.kind, "Operation queued for later sync");
        self.notifier.operation_queued(&operation);
        Ok(operation)
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replays the queue against the remote store.
    ///
    /// No-op while offline or while another call is draining.
    pub async fn synchronize(&self) -> SyncReport {
        if !self.is_online() {
            debug!("Offline, skipping synchronize");
            return SyncReport::skipped();
        }

        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Synchronize already in flight");
            return SyncReport::skipped();
        }
        let _guard = SyncingGuard(&self.syncing);

        let snapshot = {
            let _lock = self.store_lock.lock().await;
            self.store.load()
        };

        if snapshot.is_empty() {
            return SyncReport::default();
        }

        info!(count = snapshot.len(), "Synchronizing offline queue");

        let mut report = SyncReport {
            attempted: snapshot.len(),
            ..Default::default()
        };
        let mut failed = Vec::new();

        for operation in &snapshot {
            match self.remote.apply(operation).await {
                Ok(()) => {
                    debug!(id = %operation.id, kind = %operation.kind, "Queued operation applied");
                    report.succeeded += 1;
                }
                Err(e) => {
                    let permanent = !e.is_retryable();
                    warn!(
                        id = %operation.id,
                        kind = %operation.kind,
                        error = %e,
                        permanent,
                        "Queued operation failed"
                    );
                    let mut operation = operation.clone();
                    operation.record_failure(e.to_string());
                    failed.push(FailedEntry { operation, permanent });
                }
            }
        }

        self.write_back(&snapshot, failed, &mut report).await;

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            remaining = report.remaining,
            "Offline queue synchronized"
        );
        self.notifier.sync_completed(&report);
        report
    }

    async fn write_back(&self, snapshot: &[QueuedOperation], failed: Vec<FailedEntry>, report: &mut SyncReport) {
        let drained: HashSet<&str> = snapshot.iter().map(|op| op.id.as_str()).collect();

        let _lock = self.store_lock.lock().await;
        let current = self.store.load();
        let present: HashSet<&str> = current.iter().map(|op| op.id.as_str()).collect();

        // Entries removed while draining (clear()) stay removed
        let failed: Vec<FailedEntry> = failed
            .into_iter()
            .filter(|entry| present.contains(entry.operation.id.as_str()))
            .collect();

        let (mut keep, dead) = self.partition_dead(failed);
        report.failed = keep.len();

        if !dead.is_empty() {
            match self.move_to_dead_letter(&dead) {
                Ok(()) => report.dead_lettered = dead.len(),
                Err(e) => {
                    error!(error = %e, count = dead.len(), "Dead-letter write failed, keeping entries queued");
                    report.failed += dead.len();
                    keep.extend(dead);
                }
            }
        }

        keep.extend(current.iter().filter(|op| !drained.contains(op.id.as_str())).cloned());
        report.remaining = keep.len();

        if let Err(e) = self.store.save(&keep) {
            error!(error = %e, "Failed to persist offline queue after sync");
            report.persist_error = Some(e.to_string());
        }
    }

    fn partition_dead(&self, failed: Vec<FailedEntry>) -> (Vec<QueuedOperation>, Vec<QueuedOperation>) {
        let Some(policy) = &self.dead_letter else {
            return (failed.into_iter().map(|entry| entry.operation).collect(), Vec::new());
        };

        let (dead, keep): (Vec<_>, Vec<_>) = failed
            .into_iter()
            .partition(|entry| entry.permanent || entry.operation.attempts >= policy.max_attempts);

        (
            keep.into_iter().map(|entry| entry.operation).collect(),
            dead.into_iter().map(|entry| entry.operation).collect(),
        )
    }

    fn move_to_dead_letter(&self, dead: &[QueuedOperation]) -> SyncResult<()> {
        let Some(policy) = &self.dead_letter else {
            return Ok(());
        };

        let mut letters = policy.store.load();
        letters.extend_from_slice(dead);
        policy.store.save(&letters)?;

        for op in dead {
            warn!(id = %op.id, kind = %op.kind, attempts = op.attempts, "Operation dead-lettered");
        }
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Snapshot of the pending queue, oldest first.
    pub async fn pending(&self) -> Vec<QueuedOperation> {
        let _lock = self.store_lock.lock().await;
        self.store.load()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending().await.len()
    }

    /// Discards every pending entry.
    pub async fn clear(&self) -> SyncResult<usize> {
        let _lock = self.store_lock.lock().await;
        let discarded = self.store.load().len();
        self.store.save(&[])?;
        warn!(count = discarded, "Offline queue cleared");
        Ok(discarded)
    }

    /// Entries moved out of the live queue after too many failures.
    pub async fn dead_letters(&self) -> Vec<QueuedOperation> {
        match &self.dead_letter {
            Some(policy) => {
                let _lock = self.store_lock.lock().await;
                policy.store.load()
            }
            None => Vec::new(),
        }
    }

    /// Moves every dead letter back to the end of the live queue with its
    /// attempt counter reset.
    pub async fn requeue_dead_letters(&self) -> SyncResult<usize> {
        let Some(policy) = &self.dead_letter else {
            return Ok(0);
        };

        let _lock = self.store_lock.lock().await;
        let letters = policy.store.load();
        if letters.is_empty() {
            return Ok(0);
        }

        let count = letters.len();
        let mut operations = self.store.load();
        operations.extend(letters.into_iter().map(|mut op| {
            op.attempts = 0;
            op.last_error = None;
            op
        }));

        self.store.save(&operations)?;
        policy.store.save(&[])?;

        info!(count, "Dead letters requeued");
        Ok(count)
    }
}
