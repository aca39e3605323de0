//! Payment middleware for axum.
//!
//! Intercepts requests to priced routes before they reach their handlers and
//! maps gate decisions onto HTTP: pass-through on Allow, a structured 402
//! challenge when payment is missing or unusable, and a reasoned 402/503 on
//! rejection.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use labops_gate::{GateDecision, PaymentGate};

/// Header carrying the base64 payment envelope (x402 convention).
pub const X_PAYMENT_HEADER: &str = "x-payment";

/// Payment middleware state.
#[derive(Clone)]
pub struct PaymentLayer {
    gate: Arc<PaymentGate>,
}

impl PaymentLayer {
    /// Create a layer around a configured gate.
    pub fn new(gate: Arc<PaymentGate>) -> Self {
        Self { gate }
    }
}

/// Map a request path to its pricing-table route key.
///
/// Only the retro export is priced today; unpriced paths return None and skip
/// the gate entirely.
fn route_key(path: &str) -> Option<&'static str> {
    if path.starts_with("/api/labs/") && path.ends_with("/export") {
        Some("export")
    } else {
        None
    }
}

/// Payment middleware function
pub async fn payment_middleware(
    axum::Extension(layer): axum::Extension<PaymentLayer>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = route_key(request.uri().path()) else {
        return next.run(request).await;
    };

    let payment = request
        .headers()
        .get(X_PAYMENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match layer.gate.guard(key, payment.as_deref()).await {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Challenge(challenge) => {
            debug!(route = key, "issuing payment challenge");
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "x402Version": challenge.x402_version,
                    "error": "payment required",
                    "accepts": [challenge],
                })),
            )
                .into_response()
        }
        GateDecision::Reject(reason) => {
            debug!(route = key, reason = reason.as_str(), "payment rejected");
            let status = if reason.is_client_correctable() {
                StatusCode::PAYMENT_REQUIRED
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(json!({ "error": reason.as_str() }))).into_response()
        }
    }
}
