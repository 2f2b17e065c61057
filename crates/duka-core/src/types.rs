//! # Domain Types
//!
//! Core domain types shared by the terminal (offline queue) and the
//! callback server (reconciliation).
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  TERMINAL SIDE                     SERVER SIDE                          │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │ QueuedOperation │   │   PaymentRequest     │   │      Sale       │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  id (UUID)      │   │  checkout_request_id │──►│  id             │  │
//! │  │  kind           │   │  sale_id ────────────┼──►│  total_cents    │  │
//! │  │  payload (JSON) │   │  amount_cents        │   │  cash_cents     │  │
//! │  │  enqueued_at    │   │  status              │   │  mpesa_cents    │  │
//! │  │  attempts       │   │  callback_received   │   │  payment_status │  │
//! │  └─────────────────┘   └──────────────────────┘   │  change_cents   │  │
//! │                                                   │  version        │  │
//! │                                                   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::ledger::derive_status;
use crate::money::Money;

// =============================================================================
// Operation Kind
// =============================================================================

/// The kind of write a terminal can queue while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A completed sale record.
    Sale,
    /// Create-or-update of a product.
    #[serde(rename = "product")]
    ProductUpsert,
    /// Create-or-update of a customer.
    #[serde(rename = "customer")]
    CustomerUpsert,
}

impl OperationKind {
    /// Remote table the operation is inserted into.
    pub const fn table(&self) -> &'static str {
        match self {
            OperationKind::Sale => "sales",
            OperationKind::ProductUpsert => "products",
            OperationKind::CustomerUpsert => "customers",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Sale => write!(f, "sale"),
            OperationKind::ProductUpsert => write!(f, "product"),
            OperationKind::CustomerUpsert => write!(f, "customer"),
        }
    }
}

// =============================================================================
// Queued Operation
// =============================================================================

/// A domain write that could not be applied remotely yet.
///
/// ## Lifecycle
/// ```text
/// enqueue() ──► [queued] ──sync ok──► removed
///                  │
///                  └──sync fails──► attempts += 1, stays queued
///                                   (dead-lettered past the threshold)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueuedOperation {
    /// Unique identifier (UUID v4), stable once assigned.
    pub id: String,

    /// What kind of record the payload is.
    pub kind: OperationKind,

    /// The domain record, shaped per `kind`.
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,

    /// When the operation was queued.
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,

    /// Failed synchronization attempts so far.
    #[serde(default)]
    pub attempts: u32,

    /// Error from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Creates a new operation with a fresh id and the current timestamp.
    pub fn new(kind: OperationKind, payload: serde_json::Value) -> Self {
        QueuedOperation {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Records a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
    }
}

// =============================================================================
// Payment Request
// =============================================================================

/// Status of an M-Pesa payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// STK push sent, waiting for the provider callback.
    Pending,
    /// Provider confirmed the payment.
    Completed,
    /// Provider reported a failure (cancelled, timeout, insufficient funds).
    Failed,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

/// A mobile-money payment request created when the STK push was initiated.
///
/// `callback_received` is the idempotency latch: it flips false → true
/// exactly once and the row is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentRequest {
    pub id: String,
    /// Provider correlation key (`CheckoutRequestID`), unique.
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    /// Owning sale, if the request was made at the till.
    pub sale_id: Option<String>,
    pub phone_number: Option<String>,
    /// Requested amount in cents.
    pub amount_cents: i64,
    /// Amount the provider confirmed, in cents.
    pub confirmed_amount_cents: Option<i64>,
    pub status: PaymentStatus,
    pub callback_received: bool,
    pub receipt_number: Option<String>,
    pub result_code: Option<i64>,
    pub result_description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PaymentRequest {
    /// Creates a pending request for a freshly initiated STK push.
    pub fn pending(checkout_request_id: impl Into<String>, sale_id: Option<String>, amount: Money) -> Self {
        let now = Utc::now();
        PaymentRequest {
            id: Uuid::new_v4().to_string(),
            checkout_request_id: checkout_request_id.into(),
            merchant_request_id: None,
            sale_id,
            phone_number: None,
            amount_cents: amount.cents(),
            confirmed_amount_cents: None,
            status: PaymentStatus::Pending,
            callback_received: false,
            receipt_number: None,
            result_code: None,
            result_description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the requested amount.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Returns the confirmed amount, if any.
    #[inline]
    pub fn confirmed_amount(&self) -> Option<Money> {
        self.confirmed_amount_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Settlement state of a sale.
///
/// Declaration order is the progression order; the derived `Ord` is used to
/// keep status monotonic (`Unpaid < PartiallyPaid < Paid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SalePaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl Default for SalePaymentStatus {
    fn default() -> Self {
        SalePaymentStatus::Unpaid
    }
}

impl SalePaymentStatus {
    /// Wire/database representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SalePaymentStatus::Unpaid => "unpaid",
            SalePaymentStatus::PartiallyPaid => "partially_paid",
            SalePaymentStatus::Paid => "paid",
        }
    }
}

/// A sale's payment state as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub total_cents: i64,
    pub cash_cents: i64,
    /// Cumulative confirmed mobile-money amount.
    pub mpesa_cents: i64,
    pub payment_status: SalePaymentStatus,
    pub change_cents: i64,
    /// Optimistic concurrency token, bumped on every payment-state write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Creates a sale with a cash portion already tendered and no M-Pesa
    /// money yet.
    pub fn new(id: impl Into<String>, total: Money, cash: Money) -> Self {
        let now = Utc::now();
        Sale {
            id: id.into(),
            total_cents: total.cents(),
            cash_cents: cash.cents(),
            mpesa_cents: 0,
            payment_status: derive_status(total, cash, Money::zero()),
            change_cents: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn cash(&self) -> Money {
        Money::from_cents(self.cash_cents)
    }

    #[inline]
    pub fn mpesa(&self) -> Money {
        Money::from_cents(self.mpesa_cents)
    }

    #[inline]
    pub fn change(&self) -> Money {
        Money::from_cents(self.change_cents)
    }

    /// Cash plus confirmed mobile money.
    #[inline]
    pub fn total_paid(&self) -> Money {
        self.cash().saturating_add(self.mpesa())
    }
}
