//! # Payment Request Repository
//!
//! Storage for STK push requests and the callback latch.
//!
//! ## Callback Latch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two deliveries of the same callback race:                              │
//! │                                                                         │
//! │   delivery A                         delivery B                         │
//! │   UPDATE ... WHERE checkout = ?      UPDATE ... WHERE checkout = ?      │
//! │          AND callback_received = 0          AND callback_received = 0   │
//! │   rows_affected = 1  ──► winner      rows_affected = 0  ──► duplicate   │
//! │                                                                         │
//! │  SQLite serializes writers, so exactly one UPDATE sees the 0.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use duka_core::{PaymentRequest, PaymentStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id,
        checkout_request_id,
        merchant_request_id,
        sale_id,
        phone_number,
        amount_cents,
        confirmed_amount_cents,
        status,
        callback_received,
        receipt_number,
        result_code,
        result_description,
        created_at,
        updated_at
    FROM payment_requests
"#;

/// Fields written when a callback wins the latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackLatch {
    pub status: PaymentStatus,
    pub merchant_request_id: Option<String>,
    pub receipt_number: Option<String>,
    pub confirmed_amount_cents: Option<i64>,
    pub phone_number: Option<String>,
    pub result_code: i64,
    pub result_description: String,
}

/// Repository for payment request database operations.
#[derive(Debug, Clone)]
pub struct PaymentRequestRepository {
    pool: SqlitePool,
}

impl PaymentRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRequestRepository { pool }
    }

    /// Inserts a new payment request.
    ///
    /// Fails with `DbError::UniqueViolation` if the checkout id is taken.
    pub async fn insert(&self, request: &PaymentRequest) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_requests (
                id, checkout_request_id, merchant_request_id, sale_id,
                phone_number, amount_cents, confirmed_amount_cents, status,
                callback_received, receipt_number, result_code,
                result_description, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&request.id)
        .bind(&request.checkout_request_id)
        .bind(&request.merchant_request_id)
        .bind(&request.sale_id)
        .bind(&request.phone_number)
        .bind(request.amount_cents)
        .bind(request.confirmed_amount_cents)
        .bind(request.status)
        .bind(request.callback_received)
        .bind(&request.receipt_number)
        .bind(request.result_code)
        .bind(&request.result_description)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(checkout_id = %request.checkout_request_id, "Payment request inserted");
        Ok(())
    }

    /// Looks up a request by its provider correlation key.
    pub async fn get_by_checkout_id(&self, checkout_request_id: &str) -> DbResult<Option<PaymentRequest>> {
        let sql = format!("{SELECT_COLUMNS} WHERE checkout_request_id = ?1");
        let request = sqlx::query_as::<_, PaymentRequest>(&sql)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(request)
    }

    /// Records a callback result, but only if no callback was recorded yet.
    ///
    /// ## Returns
    /// * `Ok(true)` - this call flipped `callback_received`
    /// * `Ok(false)` - already latched (or no such checkout id)
    pub async fn latch_callback(&self, checkout_request_id: &str, latch: &CallbackLatch) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_requests SET
                callback_received = 1,
                status = ?2,
                merchant_request_id = COALESCE(?3, merchant_request_id),
                receipt_number = ?4,
                confirmed_amount_cents = ?5,
                phone_number = COALESCE(?6, phone_number),
                result_code = ?7,
                result_description = ?8,
                updated_at = ?9
            WHERE checkout_request_id = ?1
              AND callback_received = 0
            "#,
        )
        .bind(checkout_request_id)
        .bind(latch.status)
        .bind(&latch.merchant_request_id)
        .bind(&latch.receipt_number)
        .bind(latch.confirmed_amount_cents)
        .bind(&latch.phone_number)
        .bind(latch.result_code)
        .bind(&latch.result_description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let won = result.rows_affected() == 1;
        debug!(checkout_id = %checkout_request_id, won, "Callback latch attempted");
        Ok(won)
    }

    /// Completed requests settling the given sale, oldest first.
    pub async fn completed_for_sale(&self, sale_id: &str) -> DbResult<Vec<PaymentRequest>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE sale_id = ?1 AND status = 'completed' AND callback_received = 1 ORDER BY created_at"
        );
        let requests = sqlx::query_as::<_, PaymentRequest>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }
}
