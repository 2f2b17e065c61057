//! # User Notifications
//!
//! The queue and the connectivity monitor report user-visible events through
//! [`SyncNotifier`]. The terminal UI implements it with toasts and a status
//! banner; tests use [`NoOpNotifier`] or a recording fake.
//!
//! ```text
//! enqueue()            ──► operation_queued      "Saved offline, will sync later"
//! synchronize()        ──► sync_completed        "3 synced, 1 failed"
//! Online → Offline     ──► connectivity_changed  persistent offline banner
//! Offline → Online     ──► connectivity_changed  transient "back online" toast
//! ```

use crate::connectivity::Connectivity;
use crate::queue::SyncReport;
use duka_core::QueuedOperation;

/// Sink for user-facing sync events. Calls must not block.
pub trait SyncNotifier: Send + Sync {
    fn operation_queued(&self, operation: &QueuedOperation);

    fn sync_completed(&self, report: &SyncReport);

    fn connectivity_changed(&self, state: Connectivity);
}

/// Notifier that drops every event.
pub struct NoOpNotifier;

impl SyncNotifier for NoOpNotifier {
    fn operation_queued(&self, _operation: &QueuedOperation) {}
    fn sync_completed(&self, _report: &SyncReport) {}
    fn connectivity_changed(&self, _state: Connectivity) {}
}
