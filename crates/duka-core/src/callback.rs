//! # STK Callback Wire Types
//!
//! Deserialization and field extraction for the M-Pesa STK push result
//! callback. Pure data handling: the server crate decides what to do with
//! the extracted result.
//!
//! ## Callback Body Shape
//! ```text
//! {
//!   "Body": {
//!     "stkCallback": {
//!       "MerchantRequestID": "29115-34620561-1",
//!       "CheckoutRequestID": "ws_CO_191220191020363925",
//!       "ResultCode": 0,
//!       "ResultDesc": "The service request is processed successfully.",
//!       "CallbackMetadata": {            ◄── only present on success
//!         "Item": [
//!           { "Name": "Amount",             "Value": 500.00 },
//!           { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
//!           { "Name": "TransactionDate",    "Value": 20191219102115 },
//!           { "Name": "PhoneNumber",        "Value": 254708374149 }
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Result Classification
//! ```text
//! ResultCode == 0  ──► PaymentResult::Confirmed { receipt, amount?, phone?, date? }
//! ResultCode != 0  ──► PaymentResult::Declined  { result_code, description }
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

/// Result code the provider uses for a successful payment.
pub const RESULT_CODE_SUCCESS: i64 = 0;

/// Largest amount accepted from a callback. Well above the provider's
/// per-transaction limit, far below anything that can overflow a sale.
pub const MAX_CALLBACK_AMOUNT: Money = Money::from_major(1_000_000);

// Metadata item names
const ITEM_AMOUNT: &str = "Amount";
const ITEM_RECEIPT: &str = "MpesaReceiptNumber";
const ITEM_PHONE: &str = "PhoneNumber";
const ITEM_DATE: &str = "TransactionDate";

// =============================================================================
// Wire Types
// =============================================================================

/// Top-level callback envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// The result of one STK push, as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode", deserialize_with = "deserialize_result_code")]
    pub result_code: i64,

    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,

    #[serde(rename = "CallbackMetadata", default, skip_serializing_if = "Option::is_none")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

/// One `{Name, Value}` pair. `Value` may be absent (the provider omits it
/// for some optional fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Accepts `0` as well as `"0"`. Some sandbox relays stringify the code.
fn deserialize_result_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("ResultCode out of range: {n}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("ResultCode is not an integer: {s}"))),
        other => Err(D::Error::custom(format!("unexpected ResultCode: {other}"))),
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Payment details extracted from a successful callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    pub receipt_number: Option<String>,
    /// `None` when the provider omitted `Amount`.
    pub amount: Option<Money>,
    pub phone_number: Option<String>,
    pub transaction_date: Option<String>,
}

impl ConfirmedPayment {
    /// Confirmed amount, falling back to the amount originally requested
    /// when the provider did not report one.
    pub fn amount_or(&self, requested: Money) -> Money {
        self.amount.unwrap_or(requested)
    }
}

/// Classified callback outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    Confirmed(ConfirmedPayment),
    Declined { result_code: i64, description: String },
}

impl StkCallbackEnvelope {
    /// Parses a raw request body.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        let envelope: StkCallbackEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::MalformedCallback(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Checks the fields the handler cannot work without.
    pub fn validate(&self) -> CoreResult<()> {
        if self.body.stk_callback.checkout_request_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "CheckoutRequestID".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Shortcut to the inner callback.
    pub fn callback(&self) -> &StkCallback {
        &self.body.stk_callback
    }
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_CODE_SUCCESS
    }

    /// Looks up a metadata value by item name.
    pub fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// Classifies the callback and extracts payment fields.
    ///
    /// Fails only if `Amount` is present but not a usable payment: not a
    /// valid decimal, not positive, or above [`MAX_CALLBACK_AMOUNT`].
    pub fn result(&self) -> CoreResult<PaymentResult> {
        if !self.is_success() {
            return Ok(PaymentResult::Declined {
                result_code: self.result_code,
                description: self.result_desc.clone(),
            });
        }

        let amount = match self.metadata_value(ITEM_AMOUNT) {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(checked_amount(Money::from_json(value)?)?),
        };

        Ok(PaymentResult::Confirmed(ConfirmedPayment {
            receipt_number: self.metadata_value(ITEM_RECEIPT).and_then(value_text),
            amount,
            phone_number: self.metadata_value(ITEM_PHONE).and_then(value_text),
            transaction_date: self.metadata_value(ITEM_DATE).and_then(value_text),
        }))
    }
}

fn checked_amount(amount: Money) -> CoreResult<Money> {
    if !amount.is_positive() {
        return Err(CoreError::invalid_amount(amount, "must be positive"));
    }
    if amount > MAX_CALLBACK_AMOUNT {
        return Err(CoreError::invalid_amount(
            amount,
            format!("above the {MAX_CALLBACK_AMOUNT} callback limit"),
        ));
    }
    Ok(amount)
}

/// Renders scalar metadata as text. Phone numbers and dates arrive as JSON
/// numbers and must keep every digit.
fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// Acknowledgment
// =============================================================================

/// The canonical response returned to the provider for every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success_body(amount: serde_json::Value) -> serde_json::Value {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ABC123",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": amount },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "Balance" },
                            { "Name": "TransactionDate", "Value": 20191219102115u64 },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        })
    }

    fn parse(value: serde_json::Value) -> StkCallbackEnvelope {
        StkCallbackEnvelope::from_slice(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_success_extraction() {
        let envelope = parse(success_body(json!(500.0)));
        let result = envelope.callback().result().unwrap();

        assert_eq!(
            result,
            PaymentResult::Confirmed(ConfirmedPayment {
                receipt_number: Some("NLJ7RT61SV".to_string()),
                amount: Some(Money::from_major(500)),
                phone_number: Some("254708374149".to_string()),
                transaction_date: Some("20191219102115".to_string()),
            })
        );
    }

    #[test]
    fn test_missing_amount_falls_back_to_requested() {
        let envelope = parse(json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ABC123",
                "ResultCode": 0,
                "ResultDesc": "ok",
                "CallbackMetadata": { "Item": [
                    { "Name": "MpesaReceiptNumber", "Value": "R1" }
                ]}
            }}
        }));

        match envelope.callback().result().unwrap() {
            PaymentResult::Confirmed(payment) => {
                assert_eq!(payment.amount, None);
                assert_eq!(payment.amount_or(Money::from_major(250)), Money::from_major(250));
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_is_declined() {
        let envelope = parse(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "m-1",
                "CheckoutRequestID": "ABC123",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        }));

        assert_eq!(
            envelope.callback().result().unwrap(),
            PaymentResult::Declined {
                result_code: 1032,
                description: "Request cancelled by user".to_string(),
            }
        );
    }

    #[test]
    fn test_string_result_code() {
        let envelope = parse(json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ABC123",
                "ResultCode": "1",
                "ResultDesc": "Insufficient funds"
            }}
        }));
        assert_eq!(envelope.callback().result_code, 1);
        assert!(!envelope.callback().is_success());
    }

    #[test]
    fn test_malformed_bodies_rejected() {
        assert!(matches!(
            StkCallbackEnvelope::from_slice(b"not json"),
            Err(CoreError::MalformedCallback(_))
        ));
        assert!(StkCallbackEnvelope::from_slice(br#"{"Body":{}}"#).is_err());

        let blank_id = json!({
            "Body": { "stkCallback": { "CheckoutRequestID": "  ", "ResultCode": 0 } }
        });
        assert!(matches!(
            StkCallbackEnvelope::from_slice(blank_id.to_string().as_bytes()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_unparseable_amount_is_an_error() {
        let envelope = parse(success_body(json!("five hundred")));
        assert!(matches!(
            envelope.callback().result(),
            Err(CoreError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_non_positive_amounts_are_errors() {
        for amount in [json!(-100), json!("-100"), json!(0), json!("0.00")] {
            let envelope = parse(success_body(amount.clone()));
            assert!(
                matches!(envelope.callback().result(), Err(CoreError::InvalidAmount { .. })),
                "{amount} accepted"
            );
        }
    }

    #[test]
    fn test_amount_above_limit_is_an_error() {
        for amount in [json!("92233720368547758.07"), json!(1_000_000.01)] {
            let envelope = parse(success_body(amount.clone()));
            assert!(
                matches!(envelope.callback().result(), Err(CoreError::InvalidAmount { .. })),
                "{amount} accepted"
            );
        }

        let at_limit = parse(success_body(json!(1_000_000)));
        let PaymentResult::Confirmed(payment) = at_limit.callback().result().unwrap() else {
            panic!("expected a confirmed payment");
        };
        assert_eq!(payment.amount, Some(MAX_CALLBACK_AMOUNT));
    }

    #[test]
    fn test_ack_shape() {
        let json = serde_json::to_value(CallbackAck::accepted()).unwrap();
        assert_eq!(json, json!({"ResultCode": 0, "ResultDesc": "Accepted"}));
    }
}
