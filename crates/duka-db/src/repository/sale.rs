//! # Sale Repository
//!
//! Database operations for a sale's payment state.
//!
//! ## Versioned Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read  ──► Sale { version: 7, mpesa: 0 }                               │
//! │  math  ──► Settlement { mpesa: 500, status: paid }                     │
//! │  write ──► UPDATE sales SET ..., version = 8                           │
//! │            WHERE id = ? AND version = 7                                │
//! │                                                                         │
//! │  rows_affected = 0  ──► someone else wrote first: re-read and retry    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`SaleRepository::settle_with`] runs the same read/math/write inside one
//! transaction that holds the write lock, so the version check only trips on
//! writers outside SQLite's locking (there are none today).

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::{Sale, Settlement};

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, total_cents, cash_cents, mpesa_cents, payment_status,
                change_cents, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(sale.total_cents)
        .bind(sale.cash_cents)
        .bind(sale.mpesa_cents)
        .bind(sale.payment_status)
        .bind(sale.change_cents)
        .bind(sale.version)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(sale_id = %sale.id, "Sale inserted");
        Ok(())
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(SELECT_SALE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Writes a settlement if the row is still at `expected_version`.
    ///
    /// ## Returns
    /// * `Ok(true)` - written, version bumped
    /// * `Ok(false)` - version moved on (or the sale vanished); caller re-reads
    pub async fn update_payment_state(
        &self,
        id: &str,
        expected_version: i64,
        settlement: &Settlement,
    ) -> DbResult<bool> {
        let written = write_settlement(&self.pool, id, expected_version, settlement, Utc::now()).await?;
        debug!(sale_id = %id, expected_version, written, "Sale payment state CAS");
        Ok(written)
    }

    /// Read-modify-write of one sale's payment state inside a transaction.
    ///
    /// The transaction opens with a no-op UPDATE so it holds SQLite's write
    /// lock before it reads. Concurrent callers wait on `busy_timeout`
    /// instead of racing the version check.
    ///
    /// ## Returns
    /// * `Ok(None)` - no such sale
    /// * `Ok(Some(sale))` - the sale as stored after the call
    /// * `Err(e)` - `settle` refused, or the database failed; nothing written
    pub async fn settle_with<F, E>(&self, id: &str, settle: F) -> Result<Option<Sale>, E>
    where
        F: FnOnce(&Sale) -> Result<Settlement, E>,
        E: From<DbError>,
    {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let claimed = sqlx::query("UPDATE sales SET version = version WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?
            .rows_affected();
        if claimed == 0 {
            tx.rollback().await.map_err(DbError::from)?;
            return Ok(None);
        }

        let mut sale = sqlx::query_as::<_, Sale>(SELECT_SALE)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::from)?;

        let settlement = match settle(&sale) {
            Ok(settlement) => settlement,
            Err(e) => {
                tx.rollback().await.map_err(DbError::from)?;
                return Err(e);
            }
        };
        if settlement.matches(&sale) {
            tx.commit().await.map_err(DbError::from)?;
            return Ok(Some(sale));
        }

        let now = Utc::now();
        if !write_settlement(&mut *tx, id, sale.version, &settlement, now).await? {
            return Err(DbError::ConcurrentModification {
                entity: "Sale".to_string(),
                id: id.to_string(),
                attempts: 1,
            }
            .into());
        }
        tx.commit().await.map_err(DbError::from)?;

        sale.mpesa_cents = settlement.mpesa.cents();
        sale.payment_status = settlement.payment_status;
        sale.change_cents = settlement.change.cents();
        sale.version += 1;
        sale.updated_at = now;

        debug!(sale_id = %id, version = sale.version, "Sale payment state settled");
        Ok(Some(sale))
    }
}

const SELECT_SALE: &str = r#"
    SELECT
        id,
        total_cents,
        cash_cents,
        mpesa_cents,
        payment_status,
        change_cents,
        version,
        created_at,
        updated_at
    FROM sales
    WHERE id = ?1
"#;

async fn write_settlement<'e, X>(
    executor: X,
    id: &str,
    expected_version: i64,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> DbResult<bool>
where
    X: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE sales SET
            mpesa_cents = ?3,
            payment_status = ?4,
            change_cents = ?5,
            version = version + 1,
            updated_at = ?6
        WHERE id = ?1
          AND version = ?2
        "#,
    )
    .bind(id)
    .bind(expected_version)
    .bind(settlement.mpesa.cents())
    .bind(settlement.payment_status)
    .bind(settlement.change.cents())
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use duka_core::{Money, SalePaymentStatus};

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        let sale = Sale::new("sale-1", Money::from_major(1200), Money::from_major(700));
        repo.insert(&sale).await.unwrap();

        let loaded = repo.get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(loaded.total(), Money::from_major(1200));
        assert_eq!(loaded.cash(), Money::from_major(700));
        assert_eq!(loaded.payment_status, SalePaymentStatus::PartiallyPaid);
        assert_eq!(loaded.version, 0);

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        let sale = Sale::new("sale-1", Money::from_major(1200), Money::from_major(700));
        repo.insert(&sale).await.unwrap();

        let settlement = Settlement::after_mpesa_payment(&sale, Money::from_major(500)).unwrap();
        assert!(repo.update_payment_state("sale-1", 0, &settlement).await.unwrap());
        // Same expected version again: stale
        assert!(!repo.update_payment_state("sale-1", 0, &settlement).await.unwrap());

        let loaded = repo.get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.mpesa(), Money::from_major(500));
        assert_eq!(loaded.payment_status, SalePaymentStatus::Paid);
        assert_eq!(loaded.change(), Money::zero());
    }

    #[tokio::test]
    async fn test_settle_with_writes_and_skips_noops() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        repo.insert(&Sale::new("sale-1", Money::from_major(1200), Money::from_major(700)))
            .await
            .unwrap();

        let settled = repo
            .settle_with("sale-1", |sale| {
                Settlement::after_mpesa_payment(sale, Money::from_major(500))
                    .map_err(|e| DbError::Internal(e.to_string()))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.version, 1);
        assert_eq!(settled.payment_status, SalePaymentStatus::Paid);

        let unchanged = repo
            .settle_with("sale-1", |sale| {
                Ok::<_, DbError>(Settlement::recomputed(sale, Money::zero()).unwrap())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.version, 1);

        let loaded = repo.get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(loaded.mpesa(), settled.mpesa());
        assert_eq!(loaded.version, 1);

        let missing = repo
            .settle_with("missing", |_| -> DbResult<Settlement> { unreachable!() })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_settle_with_refusal_writes_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        repo.insert(&Sale::new("sale-1", Money::from_major(1200), Money::zero()))
            .await
            .unwrap();

        let err = repo
            .settle_with("sale-1", |_| -> DbResult<Settlement> { Err(DbError::Internal("refused".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));

        let loaded = repo.get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.mpesa(), Money::zero());
        // Connection is usable again, no transaction left open
        let settlement = Settlement::recomputed(&loaded, Money::from_major(1)).unwrap();
        assert!(repo.update_payment_state("sale-1", 0, &settlement).await.unwrap());
    }
}
