//! # duka-core: Pure Business Logic for Duka POS
//!
//! Types and pure functions shared by the terminal-side offline queue and the
//! server-side payment callback handler. Nothing in here performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Duka POS Architecture                            │
//! │                                                                         │
//! │   TERMINAL                                  SERVER                      │
//! │  ┌──────────────────────┐            ┌──────────────────────────────┐  │
//! │  │ duka-sync            │            │ apps/callback-api            │  │
//! │  │ OfflineQueue         │            │ CallbackHandler              │  │
//! │  │ ConnectivityMonitor  │            │ LedgerReconciler             │  │
//! │  └──────────┬───────────┘            └───────┬──────────────┬───────┘  │
//! │             │                                │              │          │
//! │             │                                │      ┌───────▼───────┐  │
//! │             │                                │      │   duka-db     │  │
//! │             │                                │      │   SQLite      │  │
//! │             │                                │      └───────┬───────┘  │
//! │  ┌──────────▼────────────────────────────────▼──────────────▼───────┐  │
//! │  │               ★ duka-core (THIS CRATE) ★                         │  │
//! │  │                                                                  │  │
//! │  │   ┌──────────┐  ┌──────────────┐  ┌────────────┐  ┌──────────┐  │  │
//! │  │   │  money   │  │    types     │  │  callback  │  │  ledger  │  │  │
//! │  │   │  Money   │  │ QueuedOp     │  │ StkCallback│  │Settlement│  │  │
//! │  │   │          │  │ Sale, PayReq │  │ CallbackAck│  │          │  │  │
//! │  │   └──────────┘  └──────────────┘  └────────────┘  └──────────┘  │  │
//! │  │                                                                  │  │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (QueuedOperation, PaymentRequest, Sale)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`callback`] - M-Pesa STK callback wire types and field extraction
//! - [`ledger`] - Settlement math for merging confirmed payments into a sale
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use duka_core::{Money, Sale, SalePaymentStatus, Settlement};
//!
//! let sale = Sale::new("sale-1", Money::from_major(1200), Money::from_major(400));
//! let mpesa = Money::parse_decimal("500.0").unwrap();
//!
//! let settled = Settlement::after_mpesa_payment(&sale, mpesa).unwrap();
//! assert_eq!(settled.payment_status, SalePaymentStatus::PartiallyPaid);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod callback;
pub mod error;
pub mod ledger;
pub mod money;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use callback::{CallbackAck, ConfirmedPayment, PaymentResult, StkCallback, StkCallbackEnvelope};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{derive_status, Settlement};
pub use money::Money;
pub use types::*;
