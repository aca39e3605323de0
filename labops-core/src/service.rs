//! Feedback submission and triage operations.
//!
//! [`FeedbackService`] is the produced interface of the core: it validates
//! input, runs the trust engine, and persists through the signal store. All
//! free-form input is sanitized against the closed enumerations here, before
//! anything touches a row.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::SubmissionError;
use crate::feedback::{
    sanitize_tags, FeedbackItem, FeedbackPatch, FeedbackStatus, Priority,
};
use crate::session::VerificationLevel;
use crate::store::SignalStore;
use crate::trust::{SessionHistory, SubmissionCandidate, TrustEngine};
use crate::types::FeedbackId;

/// A feedback submission as received from the outer surface.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub lab_slug: String,
    pub surface: String,
    pub body: String,
    pub tags: Vec<String>,
    /// Opaque session token from the identity provider
    pub session_id: String,
    /// Stable actor id when the participant is known
    pub actor_id: Option<String>,
    /// Verification tier reported for this request
    pub verification: VerificationLevel,
}

/// A feedback update as received from the outer surface. Status and priority
/// arrive as raw strings and are validated against the closed enumerations.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Coordinates trust scoring and persistence for feedback operations.
pub struct FeedbackService {
    store: Arc<dyn SignalStore>,
    engine: TrustEngine,
}

impl FeedbackService {
    /// Create a new service over a store and a configured trust engine.
    pub fn new(store: Arc<dyn SignalStore>, engine: TrustEngine) -> Self {
        Self { store, engine }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    /// Submit feedback into a lab.
    ///
    /// Validates required fields and lab status, lazily creates the session,
    /// scores the submission against the session's history, and persists the
    /// item. The trust score is set exactly once here; there is no re-scoring.
    #[instrument(skip(self, req), fields(lab = %req.lab_slug), level = "debug")]
    pub async fn submit(&self, req: SubmitRequest) -> Result<FeedbackItem, SubmissionError> {
        let lab_slug = req.lab_slug.trim();
        let surface = req.surface.trim();
        let body = req.body.trim();

        if lab_slug.is_empty() {
            return Err(SubmissionError::Invalid("lab reference is required".to_string()));
        }
        if surface.is_empty() {
            return Err(SubmissionError::Invalid("surface is required".to_string()));
        }
        if body.is_empty() {
            return Err(SubmissionError::Invalid("body is required".to_string()));
        }
        if req.session_id.trim().is_empty() {
            return Err(SubmissionError::Invalid("session token is required".to_string()));
        }

        let lab = self.store.get_lab(lab_slug).await?;
        if !lab.is_active() {
            return Err(SubmissionError::Invalid(format!(
                "lab {} is not accepting feedback (status: {})",
                lab.slug,
                lab.status.as_str()
            )));
        }

        let session = self
            .store
            .get_or_create_session(
                lab.id,
                req.session_id.trim(),
                req.actor_id.as_deref(),
                req.verification,
            )
            .await?;
        self.store
            .record_surface_view(lab.id, &session.session_id, surface)
            .await?;

        let prior: Vec<FeedbackItem> = self
            .store
            .list_feedback(lab.id)
            .await?
            .into_iter()
            .filter(|item| item.session_id == session.session_id)
            .collect();
        let history = SessionHistory {
            submitted_at: prior.iter().map(|item| item.created_at).collect(),
            prior_bodies: prior.into_iter().map(|item| item.body).collect(),
            verification: session.verification,
        };

        let tags = sanitize_tags(&req.tags);
        let assessment = self.engine.score(
            &SubmissionCandidate { body, tags: &tags },
            &history,
        );
        debug!(
            score = assessment.score,
            flags = assessment.flags.len(),
            "scored submission"
        );

        let now = Utc::now();
        let item = FeedbackItem {
            id: FeedbackId::new(),
            lab_id: lab.id,
            session_id: session.session_id,
            surface: surface.to_string(),
            body: body.to_string(),
            tags,
            status: FeedbackStatus::New,
            priority: Priority::Medium,
            trust_score: assessment.score,
            flags: assessment.flags,
            created_at: now,
            updated_at: now,
            first_triaged_at: None,
            resolved_at: None,
        };
        Ok(self.store.insert_feedback(item).await?)
    }

    /// Update a feedback item's status, priority, or tags.
    ///
    /// Unknown status/priority values are rejected before any store write, so
    /// a bad request leaves the stored row untouched.
    #[instrument(skip(self, req), level = "debug")]
    pub async fn update(
        &self,
        id: FeedbackId,
        req: UpdateRequest,
    ) -> Result<FeedbackItem, SubmissionError> {
        let status = req
            .status
            .as_deref()
            .map(|s| {
                FeedbackStatus::parse(s).ok_or_else(|| {
                    SubmissionError::Invalid(format!("unknown status: {}", s))
                })
            })
            .transpose()?;
        let priority = req
            .priority
            .as_deref()
            .map(|p| {
                Priority::parse(p)
                    .ok_or_else(|| SubmissionError::Invalid(format!("unknown priority: {}", p)))
            })
            .transpose()?;
        let tags = req.tags.as_deref().map(sanitize_tags);

        let patch = FeedbackPatch {
            status,
            priority,
            tags,
        };
        if patch.is_empty() {
            return Err(SubmissionError::Invalid(
                "update must change at least one field".to_string(),
            ));
        }
        Ok(self.store.update_feedback(id, patch).await?)
    }

    /// Record that a session reached a surface in a lab (funnel data).
    #[instrument(skip(self), level = "debug")]
    pub async fn record_view(
        &self,
        lab_slug: &str,
        session_id: &str,
        surface: &str,
    ) -> Result<(), SubmissionError> {
        let surface = surface.trim();
        if surface.is_empty() {
            return Err(SubmissionError::Invalid("surface is required".to_string()));
        }
        if session_id.trim().is_empty() {
            return Err(SubmissionError::Invalid("session token is required".to_string()));
        }
        let lab = self.store.get_lab(lab_slug.trim()).await?;
        self.store
            .record_surface_view(lab.id, session_id.trim(), surface)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::TrustFlag;
    use crate::lab::{EventLab, LabStatus};
    use crate::store::MemorySignalStore;
    use crate::trust::TrustConfig;

    async fn service_with_active_lab() -> FeedbackService {
        let store = Arc::new(MemorySignalStore::new());
        store
            .insert_lab(
                EventLab::new("demo-event", "Demo Event")
                    .with_surfaces(vec!["checkout".to_string(), "search".to_string()])
                    .with_status(LabStatus::Active),
            )
            .await
            .unwrap();
        FeedbackService::new(
            store,
            TrustEngine::new(TrustConfig {
                window_secs: 10,
                max_per_window: 2,
                ..Default::default()
            }),
        )
    }

    fn submit_req(body: &str) -> SubmitRequest {
        SubmitRequest {
            lab_slug: "demo-event".to_string(),
            surface: "checkout".to_string(),
            body: body.to_string(),
            tags: vec!["bug".to_string()],
            session_id: "s1".to_string(),
            actor_id: None,
            verification: VerificationLevel::Anonymous,
        }
    }

    #[tokio::test]
    async fn submit_scores_and_persists() {
        let service = service_with_active_lab().await;

        let item = service
            .submit(submit_req("the coupon field rejects valid codes"))
            .await
            .unwrap();

        assert!((0.0..=100.0).contains(&item.trust_score));
        assert_eq!(item.status, FeedbackStatus::New);
        assert_eq!(item.session_id, "s1");

        let stored = service.store().get_feedback(item.id).await.unwrap();
        assert_eq!(stored.body, item.body);
    }

    #[tokio::test]
    async fn submit_requires_body() {
        let service = service_with_active_lab().await;
        let err = service.submit(submit_req("   ")).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));
    }

    #[tokio::test]
    async fn submit_rejects_inactive_lab() {
        let store = Arc::new(MemorySignalStore::new());
        store
            .insert_lab(EventLab::new("demo-event", "Demo Event"))
            .await
            .unwrap();
        let service = FeedbackService::new(store, TrustEngine::default());

        let err = service
            .submit(submit_req("perfectly good feedback body"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));
    }

    #[tokio::test]
    async fn submit_unknown_lab_is_not_found() {
        let service = service_with_active_lab().await;
        let mut req = submit_req("perfectly good feedback body");
        req.lab_slug = "missing".to_string();

        let err = service.submit(req).await.unwrap_err();
        assert!(matches!(err, SubmissionError::LabNotFound(_)));
    }

    #[tokio::test]
    async fn third_rapid_submission_is_flagged_high_velocity() {
        let service = service_with_active_lab().await;

        service
            .submit(submit_req("first distinct piece of feedback here"))
            .await
            .unwrap();
        service
            .submit(submit_req("second distinct piece of feedback here"))
            .await
            .unwrap();
        let third = service
            .submit(submit_req("third distinct piece of feedback here"))
            .await
            .unwrap();

        assert!(third.flags.contains(&TrustFlag::HighVelocity));
    }

    #[tokio::test]
    async fn update_with_status_outside_enumeration_is_rejected_and_row_unchanged() {
        let service = service_with_active_lab().await;
        let item = service
            .submit(submit_req("the coupon field rejects valid codes"))
            .await
            .unwrap();

        let err = service
            .update(
                item.id,
                UpdateRequest {
                    status: Some("archived".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));

        let stored = service.store().get_feedback(item.id).await.unwrap();
        assert_eq!(stored.status, FeedbackStatus::New);
        assert_eq!(stored.updated_at, item.updated_at);
    }

    #[tokio::test]
    async fn update_applies_sanitized_fields() {
        let service = service_with_active_lab().await;
        let item = service
            .submit(submit_req("the coupon field rejects valid codes"))
            .await
            .unwrap();

        let updated = service
            .update(
                item.id,
                UpdateRequest {
                    status: Some("triaged".to_string()),
                    priority: Some("high".to_string()),
                    tags: Some(vec!["ui".to_string(), "ui".to_string(), " perf ".to_string()]),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, FeedbackStatus::Triaged);
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.tags, vec!["ui", "perf"]);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let service = service_with_active_lab().await;
        let err = service
            .update(
                FeedbackId::new(),
                UpdateRequest {
                    status: Some("triaged".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_update_is_invalid() {
        let service = service_with_active_lab().await;
        let item = service
            .submit(submit_req("the coupon field rejects valid codes"))
            .await
            .unwrap();

        let err = service
            .update(item.id, UpdateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));
    }

    #[tokio::test]
    async fn record_view_tracks_surface_for_funnels() {
        let service = service_with_active_lab().await;
        service
            .record_view("demo-event", "s9", "search")
            .await
            .unwrap();

        let lab = service.store().get_lab("demo-event").await.unwrap();
        let sessions = service.store().list_sessions(lab.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].surfaces_seen, vec!["search"]);
    }

    #[tokio::test]
    async fn trust_score_is_immutable_after_creation() {
        let service = service_with_active_lab().await;
        let item = service
            .submit(submit_req("the coupon field rejects valid codes"))
            .await
            .unwrap();

        let updated = service
            .update(
                item.id,
                UpdateRequest {
                    status: Some("resolved".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.trust_score, item.trust_score);
    }
}
