//! # duka-db: Database Layer for Duka POS
//!
//! SQLite storage for the payment callback server, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Callback Data Flow                               │
//! │                                                                         │
//! │  POST /mpesa/callback ──► CallbackHandler ──► LedgerReconciler         │
//! │       │                        │                     │                  │
//! │       ▼                        ▼                     ▼                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     duka-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌──────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │  │    Repositories      │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄─│ PaymentRequestRepo   │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │  │   latch_callback()   │  │ 001_init   │  │   │
//! │  │   │               │  │ SaleRepo             │  │            │  │   │
//! │  │   │               │  │   update_payment_    │  │            │  │   │
//! │  │   │               │  │   state() (CAS)      │  │            │  │   │
//! │  │   └───────────────┘  └──────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duka_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("duka.db")).await?;
//! let request = db.payment_requests().get_by_checkout_id("ws_CO_123").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};

pub use repository::payment_request::{CallbackLatch, PaymentRequestRepository};
pub use repository::sale::SaleRepository;
