//! # Sync Configuration
//!
//! Terminal-side configuration for the offline queue and the remote store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DUKA_DEVICE_ID, DUKA_REMOTE_URL, DUKA_REMOTE_API_KEY,              │
//! │     DUKA_QUEUE_PATH, DUKA_MAX_ATTEMPTS                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/duka-pos/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.duka.pos/sync.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, queue in the platform data dir           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Till 1"
//!
//! [remote]
//! base_url = "https://example.supabase.co/rest/v1"
//! api_key = "..."
//! request_timeout_secs = 10
//!
//! [queue]
//! # path = "/var/lib/duka/offline_queue.json"
//! max_attempts = 0   # 0 = retry forever
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::store::{DEAD_LETTER_FILE, QUEUE_FILE};

// =============================================================================
// Device
// =============================================================================

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4, generated on first run).
    pub id: String,

    /// Human-readable name shown in the back office.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote
// =============================================================================

/// Where queued writes are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote store's REST endpoint. `None` keeps the
    /// terminal permanently offline-queued.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Sent as both `apikey` and bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upper bound for one apply call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Offline queue persistence and retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Queue file. Defaults to `<data_dir>/offline_queue.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Failed attempts after which an entry moves to the dead-letter file.
    /// `0` retries forever.
    #[serde(default)]
    pub max_attempts: u32,

    /// Dead-letter file. Defaults to `<data_dir>/offline_queue.dead.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_path: Option<PathBuf>,
}

// =============================================================================
// Main Config
// =============================================================================

/// Complete terminal sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub queue: QueueSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file (or defaults), then applies environment
    /// overrides and validates.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Like [`SyncConfig::load`], but falls back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(ref raw) = self.remote.base_url {
            let url = url::Url::parse(raw)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("DUKA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(url) = std::env::var("DUKA_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = Some(url);
        }

        if let Ok(key) = std::env::var("DUKA_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Ok(path) = std::env::var("DUKA_QUEUE_PATH") {
            debug!(path = %path, "Overriding queue path from environment");
            self.queue.path = Some(PathBuf::from(path));
        }

        if let Ok(raw) = std::env::var("DUKA_MAX_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(n) => self.queue.max_attempts = n,
                Err(_) => warn!(value = %raw, "Ignoring non-numeric DUKA_MAX_ATTEMPTS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "duka", "pos")
    }

    fn data_file(name: &str) -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    // =========================================================================
    // Convenience Accessors
    // =========================================================================

    /// Resolved queue file path.
    pub fn queue_path(&self) -> PathBuf {
        self.queue
            .path
            .clone()
            .unwrap_or_else(|| Self::data_file(QUEUE_FILE))
    }

    /// Resolved dead-letter file path.
    pub fn dead_letter_path(&self) -> PathBuf {
        self.queue
            .dead_letter_path
            .clone()
            .unwrap_or_else(|| Self::data_file(DEAD_LETTER_FILE))
    }

    /// `Some(n)` when dead-lettering is enabled.
    pub fn max_attempts(&self) -> Option<u32> {
        (self.queue.max_attempts > 0).then_some(self.queue.max_attempts)
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}
