//! # Repository Module
//!
//! One repository per table. Each holds a cloned `SqlitePool`, so handing
//! them out from `Database` is cheap.
//!
//! ```text
//! Database::payment_requests() ──► PaymentRequestRepository (payment_requests)
//! Database::sales()            ──► SaleRepository           (sales)
//! ```
//!
//! Both tables are only ever written through conditional statements:
//! the callback latch on `payment_requests.callback_received` and the
//! version check on `sales.version`.

pub mod payment_request;
pub mod sale;
