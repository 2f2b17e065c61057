//! # duka-sync: Offline Queue for Duka POS Terminals
//!
//! Lets the till keep selling when the network drops. Writes that cannot
//! reach the remote store are persisted locally and replayed, oldest first,
//! when connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Terminal Sync Layer                             │
//! │                                                                         │
//! │   platform reachability events                                          │
//! │            │ mpsc<Connectivity>                                         │
//! │            ▼                                                            │
//! │  ┌────────────────────┐  Offline→Online   ┌──────────────────────────┐ │
//! │  │ ConnectivityMonitor│ ────────────────► │      OfflineQueue        │ │
//! │  │ owns state (watch) │ ◄──── subscribe ─ │ enqueue / submit /       │ │
//! │  └─────────┬──────────┘                   │ synchronize              │ │
//! │            │                              └──────┬──────────┬────────┘ │
//! │            ▼                                     │          │          │
//! │  ┌────────────────────┐          ┌───────────────▼───┐  ┌───▼────────┐ │
//! │  │   SyncNotifier     │◄─────────│   QueueStore      │  │ RemoteApply│ │
//! │  │ (toasts, banner)   │          │ offline_queue.json│  │ Client     │ │
//! │  └────────────────────┘          └───────────────────┘  │ (REST)     │ │
//! │                                                         └────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duka_sync::{connect, Connectivity, NoOpNotifier, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let (queue, monitor) = connect(&config, Arc::new(NoOpNotifier), Connectivity::Online)?;
//!
//! queue.submit(OperationKind::Sale, sale_json).await?;
//! tokio::spawn(async move { monitor.run(signal_rx).await });
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod notify;
pub mod queue;
pub mod remote;
pub mod store;

pub use config::{DeviceConfig, QueueSettings, RemoteSettings, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{RemoteError, SyncError, SyncResult};
pub use notify::{NoOpNotifier, SyncNotifier};
pub use queue::{OfflineQueue, SubmitOutcome, SyncReport};
pub use remote::{RemoteApplyClient, RestApplyClient};
pub use store::{FileQueueStore, MemoryQueueStore, QueueStore};

use std::sync::Arc;
use tracing::info;

/// Wires a file-backed queue, REST client and connectivity monitor from
/// configuration.
pub fn connect(
    config: &SyncConfig,
    notifier: Arc<dyn SyncNotifier>,
    initial: Connectivity,
) -> SyncResult<(Arc<OfflineQueue>, ConnectivityMonitor)> {
    config.validate()?;

    let store = Arc::new(FileQueueStore::new(config.queue_path()));
    let remote = Arc::new(RestApplyClient::from_config(config)?);
    let monitor = ConnectivityMonitor::new(initial, notifier.clone());

    let mut queue = OfflineQueue::new(store, remote, notifier, monitor.subscribe());
    if let Some(max_attempts) = config.max_attempts() {
        let dead = Arc::new(FileQueueStore::new(config.dead_letter_path()));
        queue = queue.with_dead_letter(dead, max_attempts);
    }

    info!(
        device_id = %config.device_id(),
        queue = %config.queue_path().display(),
        "Offline queue ready"
    );

    let queue = Arc::new(queue);
    let monitor = monitor.with_queue(queue.clone());
    Ok((queue, monitor))
}
