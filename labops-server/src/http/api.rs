//! REST API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use labops_core::{FeedbackId, FeedbackItem, SubmissionError, SubmitRequest, UpdateRequest, VerificationLevel};
use labops_telemetry::{TelemetryError, TelemetrySnapshot};

use crate::AppState;

/// Header carrying the opaque session token from the identity provider.
pub const SESSION_HEADER: &str = "x-lab-session";

/// Header carrying the stable actor id, when the participant is known.
pub const ACTOR_HEADER: &str = "x-lab-actor";

/// Header carrying the reported verification tier.
pub const VERIFICATION_HEADER: &str = "x-lab-verification";

/// API-level error, mapped onto HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    Submission(SubmissionError),
    Telemetry(TelemetryError),
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        Self::Submission(err)
    }
}

impl From<TelemetryError> for ApiError {
    fn from(err: TelemetryError) -> Self {
        Self::Telemetry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Submission(SubmissionError::Invalid(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            Self::Submission(SubmissionError::LabNotFound(slug)) => (
                StatusCode::NOT_FOUND,
                format!("lab not found: {}", slug),
            ),
            Self::Submission(SubmissionError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                format!("feedback not found: {}", id),
            ),
            Self::Submission(SubmissionError::Store(err)) => {
                error!(error = %err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            Self::Telemetry(TelemetryError::LabNotFound(slug)) => (
                StatusCode::NOT_FOUND,
                format!("lab not found: {}", slug),
            ),
            Self::Telemetry(TelemetryError::Store(err)) => {
                error!(error = %err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The participant identity carried on a request.
struct RequestIdentity {
    session_id: String,
    actor_id: Option<String>,
    verification: VerificationLevel,
}

/// Read the identity-provider headers. The session token is validated by the
/// service; unknown verification strings fall back to anonymous rather than
/// failing the request.
fn request_identity(headers: &HeaderMap) -> RequestIdentity {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    RequestIdentity {
        session_id: header_str(SESSION_HEADER).unwrap_or_default(),
        actor_id: header_str(ACTOR_HEADER),
        verification: header_str(VERIFICATION_HEADER)
            .as_deref()
            .and_then(VerificationLevel::parse)
            .unwrap_or_default(),
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Body of a feedback submission.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub surface: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Submit feedback into a lab.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<FeedbackItem>), ApiError> {
    let identity = request_identity(&headers);
    let item = state
        .service
        .submit(SubmitRequest {
            lab_slug: slug,
            surface: body.surface,
            body: body.body,
            tags: body.tags,
            session_id: identity.session_id,
            actor_id: identity.actor_id,
            verification: identity.verification,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Body of a feedback update. Status and priority are free strings here and
/// validated against the closed enumerations by the service.
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Update a feedback item's triage fields.
pub async fn update_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<FeedbackItem>, ApiError> {
    let item = state
        .service
        .update(
            FeedbackId(id),
            UpdateRequest {
                status: body.status,
                priority: body.priority,
                tags: body.tags,
            },
        )
        .await?;
    Ok(Json(item))
}

/// Body of a surface-view event.
#[derive(Debug, Deserialize)]
pub struct ViewBody {
    pub surface: String,
}

/// Record that the requesting session reached a surface (funnel data).
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ViewBody>,
) -> Result<StatusCode, ApiError> {
    let identity = request_identity(&headers);
    state
        .service
        .record_view(&slug, &identity.session_id, &body.surface)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compute a telemetry snapshot for a lab.
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<TelemetrySnapshot>, ApiError> {
    let snapshot = state.aggregator.aggregate(&slug).await?;
    Ok(Json(snapshot))
}
