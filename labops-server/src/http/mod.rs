//! HTTP server module

pub mod api;
pub mod export;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use labops_gate::PaymentGate;

use crate::middleware::{payment_middleware, PaymentLayer};
use crate::AppState;

pub use api::HealthResponse;
pub use export::{ExportLab, RetroExport};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>, gate: Arc<PaymentGate>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/labs/:slug/feedback", post(api::submit_feedback))
        .route("/api/labs/:slug/views", post(api::record_view))
        .route("/api/labs/:slug/telemetry", get(api::get_telemetry))
        .route("/api/labs/:slug/export", get(export::retro_export))
        .route("/api/feedback/:id", patch(api::update_feedback))
        .layer(middleware::from_fn(payment_middleware))
        .layer(Extension(PaymentLayer::new(gate)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
