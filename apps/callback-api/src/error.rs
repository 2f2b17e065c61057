//! Callback server error types.
//!
//! These never reach the provider: the HTTP layer acknowledges every
//! callback, and the handler logs whatever went wrong.

use duka_core::CoreError;
use duka_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),
}

pub type CallbackResult<T> = Result<T, CallbackError>;
