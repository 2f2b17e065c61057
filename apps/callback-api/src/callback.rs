//! # Payment Callback Handler
//!
//! Turns one provider delivery into at most one ledger merge.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  body ──► parse ──► lookup by CheckoutRequestID                         │
//! │                         │                                               │
//! │              none ──────┼──────► UnknownCheckout                        │
//! │      already latched ───┼──────► Duplicate                              │
//! │                         ▼                                               │
//! │                  classify result ──► latch (conditional UPDATE)         │
//! │                                          │                              │
//! │                       lost the race ─────┼──────► Duplicate             │
//! │                       declined ──────────┼──────► Failed                │
//! │                                          ▼                              │
//! │                          LedgerReconciler::apply(sale_id, amount)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here decides the HTTP response. Every outcome is acknowledged the
//! same way by the router.

use tracing::{error, info, warn};

use crate::error::CallbackResult;
use crate::ledger::LedgerReconciler;
use duka_core::{
    Money, PaymentRequest, PaymentResult, PaymentStatus, Sale, StkCallback, StkCallbackEnvelope,
};
use duka_db::{CallbackLatch, Database, PaymentRequestRepository};

/// What happened to a single delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Body could not be parsed, or carried an unusable amount.
    Malformed(String),

    /// No payment request carries this checkout id.
    UnknownCheckout(String),

    /// A callback for this checkout was already recorded.
    Duplicate,

    /// Provider reported a failed or cancelled payment.
    Failed { result_code: i64 },

    /// Payment latched as completed. `sale` is the merged sale when the
    /// request belongs to one.
    Completed { amount: Money, sale: Option<Sale> },

    /// Something broke after parsing; logged and swallowed.
    Absorbed(String),
}

impl CallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::Malformed(_) => "malformed",
            CallbackOutcome::UnknownCheckout(_) => "unknown_checkout",
            CallbackOutcome::Duplicate => "duplicate",
            CallbackOutcome::Failed { .. } => "failed",
            CallbackOutcome::Completed { .. } => "completed",
            CallbackOutcome::Absorbed(_) => "absorbed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackHandler {
    payments: PaymentRequestRepository,
    ledger: LedgerReconciler,
}

impl CallbackHandler {
    pub fn new(db: &Database, ledger_max_retries: u32) -> Self {
        CallbackHandler {
            payments: db.payment_requests(),
            ledger: LedgerReconciler::new(db, ledger_max_retries),
        }
    }

    pub fn ledger(&self) -> &LedgerReconciler {
        &self.ledger
    }

    /// Processes a raw callback body. Never fails.
    pub async fn handle(&self, body: &[u8]) -> CallbackOutcome {
        let envelope = match StkCallbackEnvelope::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Malformed M-Pesa callback acknowledged");
                return CallbackOutcome::Malformed(e.to_string());
            }
        };

        let callback = envelope.callback();
        let outcome = match self.process(callback).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    checkout_id = %callback.checkout_request_id,
                    error = %e,
                    "M-Pesa callback processing failed"
                );
                CallbackOutcome::Absorbed(e.to_string())
            }
        };

        info!(
            checkout_id = %callback.checkout_request_id,
            result_code = callback.result_code,
            outcome = outcome.label(),
            "M-Pesa callback handled"
        );
        outcome
    }

    async fn process(&self, callback: &StkCallback) -> CallbackResult<CallbackOutcome> {
        let checkout_id = callback.checkout_request_id.as_str();

        let Some(request) = self.payments.get_by_checkout_id(checkout_id).await? else {
            warn!(checkout_id = %checkout_id, "Callback for unknown checkout request");
            return Ok(CallbackOutcome::UnknownCheckout(checkout_id.to_string()));
        };

        if request.callback_received {
            info!(checkout_id = %checkout_id, "Callback already processed");
            return Ok(CallbackOutcome::Duplicate);
        }

        let result = match callback.result() {
            Ok(result) => result,
            Err(e) => {
                warn!(checkout_id = %checkout_id, error = %e, "Callback amount unusable, not latched");
                return Ok(CallbackOutcome::Malformed(e.to_string()));
            }
        };

        let latch = build_latch(callback, &request, &result);
        if !self.payments.latch_callback(checkout_id, &latch).await? {
            info!(checkout_id = %checkout_id, "Concurrent delivery latched first");
            return Ok(CallbackOutcome::Duplicate);
        }

        let amount = match result {
            PaymentResult::Declined { result_code, description } => {
                info!(
                    checkout_id = %checkout_id,
                    result_code,
                    description = %description,
                    "M-Pesa payment failed"
                );
                return Ok(CallbackOutcome::Failed { result_code });
            }
            PaymentResult::Confirmed(_) => latch
                .confirmed_amount_cents
                .map(Money::from_cents)
                .unwrap_or_else(|| request.amount()),
        };

        let Some(sale_id) = request.sale_id.as_deref() else {
            return Ok(CallbackOutcome::Completed { amount, sale: None });
        };

        // The latch stays set even if the merge fails.
        let sale = self.ledger.apply(sale_id, amount).await?;
        Ok(CallbackOutcome::Completed {
            amount,
            sale: Some(sale),
        })
    }
}

fn build_latch(callback: &StkCallback, request: &PaymentRequest, result: &PaymentResult) -> CallbackLatch {
    match result {
        PaymentResult::Confirmed(payment) => {
            if payment.amount.is_none() {
                // Unverified: the provider is expected to always send Amount.
                warn!(
                    checkout_id = %request.checkout_request_id,
                    requested = %request.amount(),
                    "Callback without Amount, using requested amount"
                );
            }

            CallbackLatch {
                status: PaymentStatus::Completed,
                merchant_request_id: callback.merchant_request_id.clone(),
                receipt_number: payment.receipt_number.clone(),
                confirmed_amount_cents: Some(payment.amount_or(request.amount()).cents()),
                phone_number: payment.phone_number.clone(),
                result_code: callback.result_code,
                result_description: callback.result_desc.clone(),
            }
        }
        PaymentResult::Declined { result_code, description } => CallbackLatch {
            status: PaymentStatus::Failed,
            merchant_request_id: callback.merchant_request_id.clone(),
            receipt_number: None,
            confirmed_amount_cents: None,
            phone_number: None,
            result_code: *result_code,
            result_description: description.clone(),
        },
    }
}
