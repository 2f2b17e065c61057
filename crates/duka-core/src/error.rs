//! # Error Types
//!
//! ```text
//! duka-core      CoreError, ValidationError   amounts, callback bodies
//! duka-db        DbError                      SQLite
//! duka-sync      SyncError, RemoteError       queue store, remote apply
//! callback-api   CallbackError                logged, never sent upstream
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Amount text or JSON that is not an exact KES value: not a number,
    /// sub-cent precision, exponent notation, or out of range.
    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    /// Settlement arithmetic left the representable range.
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Callback body that is not the STK envelope at all.
    #[error("Malformed payment callback: {0}")]
    MalformedCallback(String),

    /// Envelope parsed but a field the handler relies on is unusable.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub(crate) fn invalid_amount(value: impl ToString, reason: impl Into<String>) -> Self {
        CoreError::InvalidAmount {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
