//! # Transaction Ledger Reconciler
//!
//! Merges confirmed M-Pesa amounts into a sale's payment state.
//!
//! ## Merge
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for attempt in 1..=max_retries:                                        │
//! │      BEGIN; take the write lock on the sale row                         │
//! │      sale       = SELECT ... (fresh read under the lock)                │
//! │      settlement = Settlement::after_mpesa_payment(sale, confirmed)?     │
//! │      UPDATE ... WHERE version = sale.version; COMMIT                    │
//! │      busy / pool timeout ──► go again                                   │
//! │  Err(last transient error)                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payments for the same sale queue on SQLite's write lock instead of
//! failing a version check, so contention alone never uses up the retries.
//! Settlement errors (overflow, non-positive amounts) are not retried.

use tracing::{info, warn};

use crate::error::{CallbackError, CallbackResult};
use duka_core::{CoreError, Money, Sale, Settlement};
use duka_db::{Database, PaymentRequestRepository, SaleRepository};

#[derive(Debug, Clone)]
pub struct LedgerReconciler {
    sales: SaleRepository,
    payments: PaymentRequestRepository,
    max_retries: u32,
}

impl LedgerReconciler {
    pub fn new(db: &Database, max_retries: u32) -> Self {
        LedgerReconciler {
            sales: db.sales(),
            payments: db.payment_requests(),
            max_retries: max_retries.max(1),
        }
    }

    /// Adds a confirmed amount to the sale and rewrites its derived fields.
    pub async fn apply(&self, sale_id: &str, confirmed: Money) -> CallbackResult<Sale> {
        let sale = self
            .write_with_retry(sale_id, |sale| Ok(Settlement::after_mpesa_payment(sale, confirmed)?))
            .await?;

        info!(
            sale_id = %sale_id,
            confirmed = %confirmed,
            mpesa = %sale.mpesa(),
            status = sale.payment_status.as_str(),
            "M-Pesa payment merged into sale"
        );
        Ok(sale)
    }

    /// Rebuilds the sale's M-Pesa total from its completed payment requests.
    ///
    /// Safe to run any number of times; never lowers the stored amount.
    pub async fn recompute(&self, sale_id: &str) -> CallbackResult<Sale> {
        let confirmed = self
            .payments
            .completed_for_sale(sale_id)
            .await?
            .iter()
            .map(|request| request.confirmed_amount().unwrap_or_else(|| request.amount()))
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
            .ok_or_else(|| CoreError::AmountOverflow(format!("summing payments for sale {sale_id}")))?;

        let sale = self
            .write_with_retry(sale_id, |sale| Ok(Settlement::recomputed(sale, confirmed)?))
            .await?;

        info!(sale_id = %sale_id, mpesa = %sale.mpesa(), "Sale payment state recomputed");
        Ok(sale)
    }

    async fn write_with_retry<F>(&self, sale_id: &str, settle: F) -> CallbackResult<Sale>
    where
        F: Fn(&Sale) -> CallbackResult<Settlement>,
    {
        let mut attempt = 1;
        loop {
            match self.sales.settle_with(sale_id, &settle).await {
                Ok(Some(sale)) => return Ok(sale),
                Ok(None) => return Err(CallbackError::SaleNotFound(sale_id.to_string())),
                Err(CallbackError::Database(e)) if e.is_transient() && attempt < self.max_retries => {
                    warn!(sale_id = %sale_id, attempt, error = %e, "Sale write failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_core::SalePaymentStatus;
    use duka_db::DbConfig;

    async fn setup(total: i64, cash: i64) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sales()
            .insert(&Sale::new("sale-1", Money::from_major(total), Money::from_major(cash)))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_apply_settles_sale() {
        let db = setup(1200, 700).await;
        let ledger = LedgerReconciler::new(&db, 5);

        let sale = ledger.apply("sale-1", Money::from_major(500)).await.unwrap();
        assert_eq!(sale.payment_status, SalePaymentStatus::Paid);
        assert_eq!(sale.version, 1);

        let stored = db.sales().get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(stored.mpesa(), sale.mpesa());
        assert_eq!(stored.payment_status, sale.payment_status);
        assert_eq!(stored.version, sale.version);
    }

    #[tokio::test]
    async fn test_apply_unknown_sale() {
        let db = setup(1200, 700).await;
        let ledger = LedgerReconciler::new(&db, 5);

        let err = ledger.apply("nope", Money::from_major(1)).await.unwrap_err();
        assert!(matches!(err, CallbackError::SaleNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_for_same_sale_both_count() {
        let db = setup(1200, 0).await;
        let ledger = LedgerReconciler::new(&db, 10);

        let amounts = [300, 200, 400, 300];
        let tasks: Vec<_> = amounts
            .iter()
            .map(|&major| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.apply("sale-1", Money::from_major(major)).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = db.sales().get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(stored.mpesa(), Money::from_major(1200));
        assert_eq!(stored.payment_status, SalePaymentStatus::Paid);
        assert_eq!(stored.version, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contention_does_not_exhaust_retries() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("duka.db")).pool_size(4))
            .await
            .unwrap();
        db.sales()
            .insert(&Sale::new("sale-1", Money::from_major(2000), Money::zero()))
            .await
            .unwrap();
        // One attempt each: a lost version race would surface as an error
        let ledger = LedgerReconciler::new(&db, 1);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.apply("sale-1", Money::from_major(100)).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = db.sales().get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(stored.mpesa(), Money::from_major(1600));
        assert_eq!(stored.payment_status, SalePaymentStatus::PartiallyPaid);
        assert_eq!(stored.version, 16);
    }

    #[tokio::test]
    async fn test_overflowing_payment_leaves_sale_untouched() {
        let db = setup(1200, 700).await;
        let ledger = LedgerReconciler::new(&db, 5);

        let err = ledger
            .apply("sale-1", Money::from_cents(i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Core(CoreError::AmountOverflow(_))));

        let stored = db.sales().get_by_id("sale-1").await.unwrap().unwrap();
        assert_eq!(stored.mpesa(), Money::zero());
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let db = setup(1200, 700).await;
        let ledger = LedgerReconciler::new(&db, 5);

        // Nothing confirmed yet: unchanged
        let sale = ledger.recompute("sale-1").await.unwrap();
        assert_eq!(sale.version, 0);
        assert_eq!(sale.mpesa(), Money::zero());

        ledger.apply("sale-1", Money::from_major(500)).await.unwrap();
        let again = ledger.recompute("sale-1").await.unwrap();
        assert_eq!(again.mpesa(), Money::from_major(500));
        assert_eq!(again.version, 1);
    }
}
