//! # Settlement Math
//!
//! Pure functions that derive a sale's payment state from its amounts.
//! The reconciler in the callback server reads a row under the write lock,
//! runs these, and writes the result back with a version check.
//!
//! ```text
//! total_paid = cash + mpesa
//! status     = Paid           if total_paid >= total
//!              PartiallyPaid  otherwise (once any M-Pesa money landed)
//! change     = max(0, total_paid - total)
//! status'    = max(status_current, status)      never regresses
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Sale, SalePaymentStatus};

/// The payment fields of a sale after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub mpesa: Money,
    pub payment_status: SalePaymentStatus,
    pub change: Money,
}

impl Settlement {
    /// Settlement after adding a confirmed M-Pesa amount to the sale.
    ///
    /// `confirmed` must be positive. Sums that leave the i64 range are
    /// reported as [`CoreError::AmountOverflow`].
    ///
    /// ```rust
    /// use duka_core::{Money, Sale, SalePaymentStatus, Settlement};
    ///
    /// let sale = Sale::new("s1", Money::from_major(1200), Money::from_major(700));
    /// let s = Settlement::after_mpesa_payment(&sale, Money::from_major(500)).unwrap();
    /// assert_eq!(s.payment_status, SalePaymentStatus::Paid);
    /// assert_eq!(s.change, Money::zero());
    /// ```
    pub fn after_mpesa_payment(sale: &Sale, confirmed: Money) -> CoreResult<Self> {
        if !confirmed.is_positive() {
            return Err(CoreError::invalid_amount(confirmed, "must be positive"));
        }

        let mpesa = add(sale.mpesa(), confirmed, &sale.id)?;
        Self::settle(sale, mpesa)
    }

    /// Settlement rebuilt from the sum of confirmed M-Pesa payments.
    ///
    /// The stored amount is kept when it is already higher, so a partial
    /// history never lowers a sale.
    pub fn recomputed(sale: &Sale, confirmed_total: Money) -> CoreResult<Self> {
        Self::settle(sale, confirmed_total.max(sale.mpesa()))
    }

    fn settle(sale: &Sale, mpesa: Money) -> CoreResult<Self> {
        let total_paid = add(sale.cash(), mpesa, &sale.id)?;
        let change = total_paid
            .checked_sub(sale.total())
            .ok_or_else(|| overflow(&sale.id))?
            .clamp_non_negative();

        Ok(Settlement {
            mpesa,
            payment_status: status_for(sale.total(), total_paid).max(sale.payment_status),
            change,
        })
    }

    /// True if writing this settlement would not change the sale.
    pub fn matches(&self, sale: &Sale) -> bool {
        self.mpesa == sale.mpesa()
            && self.payment_status == sale.payment_status
            && self.change == sale.change()
    }
}

fn add(a: Money, b: Money, sale_id: &str) -> CoreResult<Money> {
    a.checked_add(b).ok_or_else(|| overflow(sale_id))
}

fn overflow(sale_id: &str) -> CoreError {
    CoreError::AmountOverflow(format!("settling sale {sale_id}"))
}

/// Status implied by the amounts alone.
pub fn derive_status(total: Money, cash: Money, mpesa: Money) -> SalePaymentStatus {
    status_for(total, cash.saturating_add(mpesa))
}

fn status_for(total: Money, paid: Money) -> SalePaymentStatus {
    if paid >= total {
        SalePaymentStatus::Paid
    } else if paid.is_positive() {
        SalePaymentStatus::PartiallyPaid
    } else {
        SalePaymentStatus::Unpaid
    }
}
