//! # Duka Callback API
//!
//! Receives M-Pesa STK push results, records each one exactly once and
//! settles the sale it pays for.
//!
//! ## Module Organization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  routes    - axum router, CORS, always-200 acknowledgment               │
//! │  callback  - CallbackHandler: lookup, duplicate gate, latch             │
//! │  ledger    - LedgerReconciler: versioned merge into the sale            │
//! │  config    - ApiConfig from environment variables                       │
//! │  error     - CallbackError (internal only)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod ledger;
pub mod routes;

pub use callback::{CallbackHandler, CallbackOutcome};
pub use config::{ApiConfig, ConfigError};
pub use error::{CallbackError, CallbackResult};
pub use ledger::LedgerReconciler;
pub use routes::router;

use duka_db::Database;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub handler: CallbackHandler,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Self {
        let handler = CallbackHandler::new(&db, config.ledger_max_retries);
        AppState { db, handler, config }
    }
}
