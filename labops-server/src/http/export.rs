//! Retro export - the premium resource behind the payment gate.
//!
//! The export itself is a plain serializer over data the rest of the system
//! already computes. Access control happens entirely in the payment
//! middleware; by the time this handler runs, the request has either paid or
//! hit an unpriced configuration.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labops_core::{FeedbackItem, SubmissionError};
use labops_telemetry::TelemetrySnapshot;

use super::api::ApiError;
use crate::AppState;

/// Lab header carried in the export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLab {
    pub slug: String,
    pub name: String,
    pub objective: String,
    pub status: String,
}

/// The retro export document: lab header, full telemetry snapshot, and every
/// feedback item with its trust score and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetroExport {
    pub lab: ExportLab,
    pub generated_at: DateTime<Utc>,
    pub snapshot: TelemetrySnapshot,
    pub items: Vec<FeedbackItem>,
}

/// Serialize the retro export for a lab.
pub async fn retro_export(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<RetroExport>, ApiError> {
    let lab = state
        .store
        .get_lab(&slug)
        .await
        .map_err(SubmissionError::from)?;
    let snapshot = state.aggregator.aggregate(&slug).await?;
    let items = state
        .store
        .list_feedback(lab.id)
        .await
        .map_err(SubmissionError::from)?;

    Ok(Json(RetroExport {
        lab: ExportLab {
            slug: lab.slug,
            name: lab.name,
            objective: lab.objective,
            status: lab.status.as_str().to_string(),
        },
        generated_at: Utc::now(),
        snapshot,
        items,
    }))
}
