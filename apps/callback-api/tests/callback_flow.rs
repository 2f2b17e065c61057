//! Payment callback flows against an in-memory database, first through the
//! handler and then over real HTTP.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use duka_callback_api::{router, ApiConfig, AppState, CallbackHandler, CallbackOutcome};
use duka_core::{Money, PaymentRequest, PaymentStatus, Sale, SalePaymentStatus};
use duka_db::{Database, DbConfig};

// =============================================================================
// Helpers
// =============================================================================

async fn setup(total: i64, cash: i64) -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.sales()
        .insert(&Sale::new("sale-1", Money::from_major(total), Money::from_major(cash)))
        .await
        .unwrap();
    db.payment_requests()
        .insert(&PaymentRequest::pending(
            "ABC123",
            Some("sale-1".to_string()),
            Money::from_major(500),
        ))
        .await
        .unwrap();
    db
}

fn success_body(checkout_id: &str, amount: i64) -> Vec<u8> {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": amount },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "TransactionDate", "Value": 20191219102115u64 },
                        { "Name": "PhoneNumber", "Value": 254708374149u64 }
                    ]
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn failure_body(checkout_id: &str) -> Vec<u8> {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_id,
                "ResultCode": 1,
                "ResultDesc": "The balance is insufficient for the transaction."
            }
        }
    })
    .to_string()
    .into_bytes()
}

async fn sale(db: &Database) -> Sale {
    db.sales().get_by_id("sale-1").await.unwrap().unwrap()
}

async fn spawn_server(db: Database, config: ApiConfig) -> String {
    let state = Arc::new(AppState::new(db, config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Handler
// =============================================================================

#[tokio::test]
async fn confirmed_payment_settles_sale() {
    let db = setup(1200, 700).await;
    let handler = CallbackHandler::new(&db, 5);

    let outcome = handler.handle(&success_body("ABC123", 500)).await;
    assert!(matches!(outcome, CallbackOutcome::Completed { .. }));

    let sale = sale(&db).await;
    assert_eq!(sale.mpesa(), Money::from_major(500));
    assert_eq!(sale.payment_status, SalePaymentStatus::Paid);
    assert_eq!(sale.change(), Money::zero());

    let request = db.payment_requests().get_by_checkout_id("ABC123").await.unwrap().unwrap();
    assert!(request.callback_received);
    assert_eq!(request.status, PaymentStatus::Completed);
    assert_eq!(request.receipt_number.as_deref(), Some("NLJ7RT61SV"));
    assert_eq!(request.phone_number.as_deref(), Some("254708374149"));
}

#[tokio::test]
async fn short_payment_leaves_sale_partially_paid() {
    let db = setup(1200, 400).await;
    let handler = CallbackHandler::new(&db, 5);

    handler.handle(&success_body("ABC123", 500)).await;

    let sale = sale(&db).await;
    assert_eq!(sale.mpesa(), Money::from_major(500));
    assert_eq!(sale.payment_status, SalePaymentStatus::PartiallyPaid);
    assert_eq!(sale.change(), Money::zero());
}

#[tokio::test]
async fn negative_amount_cannot_lower_a_paid_sale() {
    let db = setup(1200, 700).await;
    db.payment_requests()
        .insert(&PaymentRequest::pending(
            "DEF456",
            Some("sale-1".to_string()),
            Money::from_major(100),
        ))
        .await
        .unwrap();
    let handler = CallbackHandler::new(&db, 5);

    handler.handle(&success_body("ABC123", 500)).await;
    let outcome = handler.handle(&success_body("DEF456", -100)).await;
    assert!(matches!(outcome, CallbackOutcome::Malformed(_)));

    let sale = sale(&db).await;
    assert_eq!(sale.mpesa(), Money::from_major(500));
    assert_eq!(sale.payment_status, SalePaymentStatus::Paid);
    assert_eq!(sale.version, 1);

    let request = db.payment_requests().get_by_checkout_id("DEF456").await.unwrap().unwrap();
    assert!(!request.callback_received);
    assert_eq!(request.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_payment_does_not_touch_sale() {
    let db = setup(1200, 700).await;
    let handler = CallbackHandler::new(&db, 5);
    let before = sale(&db).await;

    let outcome = handler.handle(&failure_body("ABC123")).await;
    assert_eq!(outcome, CallbackOutcome::Failed { result_code: 1 });

    let request = db.payment_requests().get_by_checkout_id("ABC123").await.unwrap().unwrap();
    assert!(request.callback_received);
    assert_eq!(request.status, PaymentStatus::Failed);
    assert_eq!(request.result_code, Some(1));
    assert!(request.confirmed_amount().is_none());

    let after = sale(&db).await;
    assert_eq!(after.version, before.version);
    assert_eq!(after.mpesa(), Money::zero());
}

#[tokio::test]
async fn redelivery_is_acknowledged_without_changes() {
    let db = setup(1200, 700).await;
    let handler = CallbackHandler::new(&db, 5);

    handler.handle(&success_body("ABC123", 500)).await;
    let first = sale(&db).await;

    assert_eq!(handler.handle(&success_body("ABC123", 500)).await, CallbackOutcome::Duplicate);
    // A late failure for the same checkout is a duplicate too
    assert_eq!(handler.handle(&failure_body("ABC123")).await, CallbackOutcome::Duplicate);

    let second = sale(&db).await;
    assert_eq!(second.version, first.version);
    assert_eq!(second.mpesa(), Money::from_major(500));

    let request = db.payment_requests().get_by_checkout_id("ABC123").await.unwrap().unwrap();
    assert_eq!(request.status, PaymentStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_merge_once() {
    let db = setup(1200, 700).await;
    let handler = Arc::new(CallbackHandler::new(&db, 5));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle(&success_body("ABC123", 500)).await })
        })
        .collect();

    let mut completed = 0;
    for task in tasks {
        match task.await.unwrap() {
            CallbackOutcome::Completed { .. } => completed += 1,
            CallbackOutcome::Duplicate => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(completed, 1);
    let sale = sale(&db).await;
    assert_eq!(sale.version, 1);
    assert_eq!(sale.mpesa(), Money::from_major(500));
}

#[tokio::test]
async fn unknown_checkout_is_ignored() {
    let db = setup(1200, 700).await;
    let handler = CallbackHandler::new(&db, 5);

    let outcome = handler.handle(&success_body("NOPE", 500)).await;
    assert_eq!(outcome, CallbackOutcome::UnknownCheckout("NOPE".to_string()));
    assert_eq!(sale(&db).await.version, 0);
}

#[tokio::test]
async fn recompute_after_callback_is_stable() {
    let db = setup(1200, 700).await;
    let handler = CallbackHandler::new(&db, 5);
    handler.handle(&success_body("ABC123", 500)).await;

    let recomputed = handler.ledger().recompute("sale-1").await.unwrap();
    assert_eq!(recomputed.mpesa(), Money::from_major(500));
    assert_eq!(recomputed.version, 1);
}

// =============================================================================
// HTTP
// =============================================================================

#[tokio::test]
async fn preflight_returns_cors_headers() {
    let base = spawn_server(setup(1200, 700).await, ApiConfig::default()).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/mpesa/callback"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["access-control-allow-headers"],
        "authorization, x-client-info, apikey, content-type"
    );
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn callback_is_acknowledged_and_applied() {
    let db = setup(1200, 700).await;
    let base = spawn_server(db.clone(), ApiConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/mpesa/callback"))
        .header("content-type", "application/json")
        .body(success_body("ABC123", 500))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack, json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));

    assert_eq!(sale(&db).await.payment_status, SalePaymentStatus::Paid);
}

#[tokio::test]
async fn bad_bodies_are_still_acknowledged() {
    let config = ApiConfig {
        max_body_bytes: 256,
        ..ApiConfig::default()
    };
    let base = spawn_server(setup(1200, 700).await, config).await;
    let client = reqwest::Client::new();

    for body in [b"{not json".to_vec(), vec![b'x'; 4096]] {
        let response = client
            .post(format!("{base}/mpesa/callback"))
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let ack: Value = response.json().await.unwrap();
        assert_eq!(ack["ResultCode"], 0);
    }
}

#[tokio::test]
async fn oversized_amount_is_acknowledged_but_not_applied() {
    let db = setup(1200, 700).await;
    let base = spawn_server(db.clone(), ApiConfig::default()).await;

    let body = String::from_utf8(success_body("ABC123", 500))
        .unwrap()
        .replace(r#""Value":500"#, r#""Value":"92233720368547758.07""#);
    let response = reqwest::Client::new()
        .post(format!("{base}/mpesa/callback"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack, json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));

    let request = db.payment_requests().get_by_checkout_id("ABC123").await.unwrap().unwrap();
    assert!(!request.callback_received);
    let stored = sale(&db).await;
    assert_eq!(stored.mpesa(), Money::zero());
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn health_check() {
    let base = spawn_server(setup(1200, 700).await, ApiConfig::default()).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn health_check_reports_closed_database() {
    let db = setup(1200, 700).await;
    let base = spawn_server(db.clone(), ApiConfig::default()).await;
    db.close().await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "UNAVAILABLE");
}
