//! # Database Error Types
//!
//! ```text
//! sqlx::Error ──► DbError ──► CallbackError (callback-api, logged only)
//! ```
//!
//! Constraint failures are classified through sqlx's portable
//! [`sqlx::error::ErrorKind`] rather than by matching SQLite message text.

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE constraint rejected the write, e.g. a second payment request
    /// for the same CheckoutRequestID.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A payment request pointed at a sale that does not exist.
    #[error("Foreign key violated: {0}")]
    ForeignKeyViolation(String),

    /// A versioned write kept losing to concurrent writers.
    #[error("{entity} {id} still contended after {attempts} attempts")]
    ConcurrentModification {
        entity: String,
        id: String,
        attempts: u32,
    },

    /// Another connection held the write lock past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// True for failures that a later attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::PoolExhausted
                | DbError::Busy(_)
                | DbError::ConcurrentModification { .. }
                | DbError::ConnectionFailed(_)
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                if is_lock_contention(db_err.code().as_deref()) {
                    return DbError::Busy(message);
                }
                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::UniqueViolation(message),
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation(message),
                    _ => DbError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| matches!(c & 0xff, 5 | 6))
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map() {
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::PoolExhausted));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_transient() {
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::ConcurrentModification {
            entity: "Sale".into(),
            id: "sale-1".into(),
            attempts: 5,
        }
        .is_transient());
        assert!(DbError::Busy("database is locked".into()).is_transient());
        assert!(!DbError::UniqueViolation("payment_requests.checkout_request_id".into()).is_transient());
    }

    #[test]
    fn test_lock_contention_codes() {
        assert!(is_lock_contention(Some("5")));
        assert!(is_lock_contention(Some("517"))); // SQLITE_BUSY_SNAPSHOT
        assert!(is_lock_contention(Some("6")));
        assert!(!is_lock_contention(Some("2067"))); // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_lock_contention(None));
    }
}
