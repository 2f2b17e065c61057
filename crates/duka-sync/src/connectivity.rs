//! # Connectivity Monitor
//!
//! Owns the terminal's Online/Offline state. The platform layer feeds it
//! "became reachable" / "became unreachable" signals; it never polls.
//!
//! ## Transitions
//! ```text
//!              signal(Offline)
//!   ┌────────┐ ─────────────────► ┌─────────┐
//!   │ Online │                    │ Offline │  notifier: persistent banner
//!   └────────┘ ◄───────────────── └─────────┘
//!              signal(Online)
//!              notifier: "back online" toast
//!              then queue.synchronize()
//!
//!   signal(state) where state == current  ──► ignored
//! ```
//!
//! Subscribers (including the [`OfflineQueue`]) read the state through a
//! `watch` channel, so there is exactly one owner of the value.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::notify::SyncNotifier;
use crate::queue::{OfflineQueue, SyncReport};

/// Network reachability as seen by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Tracks connectivity and triggers a queue drain on reconnection.
pub struct ConnectivityMonitor {
    state_tx: watch::Sender<Connectivity>,
    notifier: Arc<dyn SyncNotifier>,
    queue: Option<Arc<OfflineQueue>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity, notifier: Arc<dyn SyncNotifier>) -> Self {
        let (state_tx, _) = watch::channel(initial);
        ConnectivityMonitor {
            state_tx,
            notifier,
            queue: None,
        }
    }

    /// Attaches the queue to drain on every Offline → Online transition.
    ///
    /// ```rust,ignore
    /// let monitor = ConnectivityMonitor::new(Connectivity::Offline, notifier.clone());
    /// let queue = Arc::new(OfflineQueue::new(store, remote, notifier, monitor.subscribe()));
    /// let monitor = monitor.with_queue(queue.clone());
    /// ```
    pub fn with_queue(mut self, queue: Arc<OfflineQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn state(&self) -> Connectivity {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state_tx.subscribe()
    }

    /// Applies a reachability signal.
    ///
    /// Returns the drain report when this signal brought the terminal back
    /// online and a queue is attached; `None` otherwise.
    pub async fn signal(&self, next: Connectivity) -> Option<SyncReport> {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if !changed {
            debug!(state = %next, "Connectivity unchanged, ignoring signal");
            return None;
        }

        info!(state = %next, "Connectivity changed");
        self.notifier.connectivity_changed(next);

        match (next, &self.queue) {
            (Connectivity::Online, Some(queue)) => Some(queue.synchronize().await),
            _ => None,
        }
    }

    /// Consumes signals until every sender is dropped.
    pub async fn run(&self, mut signals: mpsc::Receiver<Connectivity>) {
        info!(state = %self.state(), "Connectivity monitor started");
        while let Some(next) = signals.recv().await {
            self.signal(next).await;
        }
        info!("Connectivity signal stream closed");
    }
}
