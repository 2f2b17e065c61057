//! # Sync Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Error Categories                            │
//! │                                                                         │
//! │  CONFIGURATION               STORE                  REMOTE              │
//! │  ├── InvalidConfig           ├── StoreReadFailed    └── Remote(..)      │
//! │  ├── MissingDeviceId         ├── StoreWriteFailed       ├── Rejected    │
//! │  ├── InvalidUrl              └── Serialization          ├── Transport   │
//! │  ├── ConfigLoadFailed                                   └── Timeout     │
//! │  └── ConfigSaveFailed                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these is fatal to the terminal. A failed store write surfaces to
//! the caller of `enqueue`; a failed remote apply just keeps the entry queued.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering queue, store, config and remote failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The queue file exists but could not be read.
    #[error("Failed to read offline queue: {0}")]
    StoreReadFailed(String),

    /// The queue snapshot could not be persisted.
    ///
    /// ## When This Occurs
    /// - Disk full
    /// - Data directory not writable
    #[error("Failed to write offline queue: {0}")]
    StoreWriteFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure applying one operation to the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote answered with a non-success status.
    #[error("Remote rejected the write ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network-level failure (DNS, connection refused, reset).
    #[error("Remote unreachable: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("Remote timed out after {0} seconds")]
    Timeout(u64),
}

impl RemoteError {
    /// Whether the same request could succeed later without changes.
    ///
    /// 4xx responses other than 408/429 mean the payload itself is bad.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout(_) => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}
