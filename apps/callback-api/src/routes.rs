//! HTTP surface for the payment provider.
//!
//! The provider retries anything that is not a 200, so every callback gets
//! the same acknowledgment regardless of what the handler made of it.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use crate::AppState;
use duka_core::CallbackAck;

pub const CALLBACK_PATH: &str = "/mpesa/callback";

const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const ALLOW_METHODS: &str = "POST, OPTIONS";

/// Builds the router with all routes and the body size limit.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route(CALLBACK_PATH, post(callback_handler).options(preflight_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn cors_headers() -> [(HeaderName, &'static str); 3] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
    ]
}

/// CORS preflight.
async fn preflight_handler() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

async fn callback_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    match body {
        Ok(bytes) => {
            state.handler.handle(&bytes).await;
        }
        Err(rejection) => {
            warn!(error = %rejection, "Callback body rejected, acknowledging anyway");
        }
    }

    (StatusCode::OK, cors_headers(), Json(CallbackAck::accepted()))
}

/// Health check endpoint. 503 when the database stops answering.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, "OK")
    } else {
        warn!("Health check failed: database unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}
