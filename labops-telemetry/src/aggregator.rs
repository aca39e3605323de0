//! Concurrent snapshot aggregation.
//!
//! The four facets run concurrently against the store with a per-facet
//! timeout. A facet that fails or times out is replaced by its zero-valued
//! default and logged; only a missing lab fails the aggregation itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{instrument, warn};

use labops_core::{SignalStore, StoreResult};

use crate::error::TelemetryError;
use crate::facets;
use crate::snapshot::TelemetrySnapshot;

/// Aggregator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Budget for each facet's queries, in milliseconds
    #[serde(default = "default_facet_timeout_ms")]
    pub facet_timeout_ms: u64,

    /// Trust scores below this land in the quality facet's review bucket
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
}

fn default_facet_timeout_ms() -> u64 {
    2_000
}

fn default_review_threshold() -> f64 {
    40.0
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            facet_timeout_ms: default_facet_timeout_ms(),
            review_threshold: default_review_threshold(),
        }
    }
}

impl TelemetryConfig {
    /// The per-facet timeout as a std duration.
    #[must_use]
    pub fn facet_timeout(&self) -> Duration {
        Duration::from_millis(self.facet_timeout_ms)
    }
}

/// Computes [`TelemetrySnapshot`]s on demand. Stateless between requests; no
/// caching or incremental maintenance.
pub struct TelemetryAggregator {
    store: Arc<dyn SignalStore>,
    config: TelemetryConfig,
}

impl TelemetryAggregator {
    /// Create an aggregator over a store.
    pub fn new(store: Arc<dyn SignalStore>, config: TelemetryConfig) -> Self {
        Self { store, config }
    }

    /// Compute a full four-facet snapshot for a lab.
    ///
    /// Fails only when the lab cannot be located; every per-facet error is
    /// absorbed into that facet's defaults.
    #[instrument(skip(self), level = "debug")]
    pub async fn aggregate(&self, lab_slug: &str) -> Result<TelemetrySnapshot, TelemetryError> {
        let lab = self.store.get_lab(lab_slug).await?;
        let lab_id = lab.id;
        let store = self.store.as_ref();

        let (participation, quality, funnels, ops) = tokio::join!(
            self.run_facet("participation", facets::participation(store, lab_id)),
            self.run_facet(
                "quality",
                facets::quality(store, lab_id, self.config.review_threshold)
            ),
            self.run_facet("funnels", facets::funnels(store, lab_id)),
            self.run_facet("ops", facets::ops(store, lab_id)),
        );

        Ok(TelemetrySnapshot {
            participation,
            quality,
            funnels,
            ops,
        })
    }

    async fn run_facet<T, F>(&self, name: &'static str, fut: F) -> T
    where
        T: Default,
        F: Future<Output = StoreResult<T>>,
    {
        match timeout(self.config.facet_timeout(), fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!(facet = name, error = %err, "facet query failed; returning defaults");
                T::default()
            }
            Err(_) => {
                warn!(facet = name, "facet timed out; returning defaults");
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FunnelFacet, OpsFacet, ParticipationFacet, QualityFacet};
    use async_trait::async_trait;
    use chrono::Utc;
    use labops_core::{
        EventLab, FeedbackId, FeedbackItem, FeedbackPatch, FeedbackStatus, LabId, LabSession,
        LabStatus, MemorySignalStore, Priority, StoreError, VerificationLevel,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store wrapper with per-method failure and delay injection.
    struct FaultyStore {
        inner: Arc<MemorySignalStore>,
        fail_get_lab_by_id: AtomicBool,
        delay_list_feedback: AtomicBool,
    }

    impl FaultyStore {
        fn new(inner: Arc<MemorySignalStore>) -> Self {
            Self {
                inner,
                fail_get_lab_by_id: AtomicBool::new(false),
                delay_list_feedback: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SignalStore for FaultyStore {
        async fn get_lab(&self, slug: &str) -> StoreResult<EventLab> {
            self.inner.get_lab(slug).await
        }

        async fn get_lab_by_id(&self, id: LabId) -> StoreResult<EventLab> {
            if self.fail_get_lab_by_id.load(Ordering::SeqCst) {
                return Err(StoreError::InvalidData("injected failure".to_string()));
            }
            self.inner.get_lab_by_id(id).await
        }

        async fn insert_lab(&self, lab: EventLab) -> StoreResult<EventLab> {
            self.inner.insert_lab(lab).await
        }

        async fn insert_feedback(&self, item: FeedbackItem) -> StoreResult<FeedbackItem> {
            self.inner.insert_feedback(item).await
        }

        async fn get_feedback(&self, id: FeedbackId) -> StoreResult<FeedbackItem> {
            self.inner.get_feedback(id).await
        }

        async fn update_feedback(
            &self,
            id: FeedbackId,
            patch: FeedbackPatch,
        ) -> StoreResult<FeedbackItem> {
            self.inner.update_feedback(id, patch).await
        }

        async fn list_feedback(&self, lab_id: LabId) -> StoreResult<Vec<FeedbackItem>> {
            if self.delay_list_feedback.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.list_feedback(lab_id).await
        }

        async fn list_sessions(&self, lab_id: LabId) -> StoreResult<Vec<LabSession>> {
            self.inner.list_sessions(lab_id).await
        }

        async fn get_or_create_session(
            &self,
            lab_id: LabId,
            session_id: &str,
            actor_id: Option<&str>,
            verification: VerificationLevel,
        ) -> StoreResult<LabSession> {
            self.inner
                .get_or_create_session(lab_id, session_id, actor_id, verification)
                .await
        }

        async fn record_surface_view(
            &self,
            lab_id: LabId,
            session_id: &str,
            surface: &str,
        ) -> StoreResult<()> {
            self.inner
                .record_surface_view(lab_id, session_id, surface)
                .await
        }
    }

    fn item(lab_id: LabId, session_id: &str, surface: &str, score: f64) -> FeedbackItem {
        let now = Utc::now();
        FeedbackItem {
            id: FeedbackId::new(),
            lab_id,
            session_id: session_id.to_string(),
            surface: surface.to_string(),
            body: format!("feedback from {}", session_id),
            tags: vec![],
            status: FeedbackStatus::New,
            priority: Priority::Medium,
            trust_score: score,
            flags: vec![],
            created_at: now,
            updated_at: now,
            first_triaged_at: None,
            resolved_at: None,
        }
    }

    async fn seed(store: &MemorySignalStore) -> LabId {
        let lab = store
            .insert_lab(
                EventLab::new("demo-event", "Demo Event")
                    .with_surfaces(vec!["checkout".to_string()])
                    .with_status(LabStatus::Active),
            )
            .await
            .unwrap();
        store
            .record_surface_view(lab.id, "s1", "checkout")
            .await
            .unwrap();
        store
            .insert_feedback(item(lab.id, "s1", "checkout", 80.0))
            .await
            .unwrap();
        store
            .insert_feedback(item(lab.id, "s1", "checkout", 70.0))
            .await
            .unwrap();
        lab.id
    }

    #[tokio::test]
    async fn aggregate_returns_full_snapshot() {
        let memory = Arc::new(MemorySignalStore::new());
        seed(&memory).await;
        let aggregator = TelemetryAggregator::new(memory, TelemetryConfig::default());

        let snapshot = aggregator.aggregate("demo-event").await.unwrap();

        assert_eq!(snapshot.participation.unique_sessions, 1);
        assert_eq!(snapshot.participation.returning_session_ratio, 1.0);
        assert_eq!(snapshot.quality.trust_mean, 75.0);
        assert_eq!(snapshot.funnels.surfaces.len(), 1);
    }

    #[tokio::test]
    async fn missing_lab_fails_top_level() {
        let aggregator = TelemetryAggregator::new(
            Arc::new(MemorySignalStore::new()),
            TelemetryConfig::default(),
        );

        let err = aggregator.aggregate("missing").await.unwrap_err();
        assert!(matches!(err, TelemetryError::LabNotFound(_)));
    }

    #[tokio::test]
    async fn failing_facet_defaults_without_touching_the_others() {
        let memory = Arc::new(MemorySignalStore::new());
        seed(&memory).await;
        let faulty = FaultyStore::new(memory);
        faulty.fail_get_lab_by_id.store(true, Ordering::SeqCst);
        let aggregator = TelemetryAggregator::new(Arc::new(faulty), TelemetryConfig::default());

        let snapshot = aggregator.aggregate("demo-event").await.unwrap();

        // Only the funnels facet re-reads the lab row, so only it defaults.
        assert_eq!(snapshot.funnels, FunnelFacet::default());
        assert_eq!(snapshot.participation.unique_sessions, 1);
        assert_eq!(snapshot.quality.trust_mean, 75.0);
        assert_eq!(snapshot.ops, OpsFacet::default());
    }

    #[tokio::test]
    async fn timed_out_facets_default_instead_of_blocking() {
        let memory = Arc::new(MemorySignalStore::new());
        seed(&memory).await;
        let faulty = FaultyStore::new(memory);
        faulty.delay_list_feedback.store(true, Ordering::SeqCst);
        let aggregator = TelemetryAggregator::new(
            Arc::new(faulty),
            TelemetryConfig {
                facet_timeout_ms: 20,
                ..Default::default()
            },
        );

        let snapshot = aggregator.aggregate("demo-event").await.unwrap();

        // Every facet reads feedback rows, so the injected delay defaults all
        // four - but aggregation itself still completes and succeeds.
        assert_eq!(snapshot.participation, ParticipationFacet::default());
        assert_eq!(snapshot.quality, QualityFacet::default());
        assert_eq!(snapshot.funnels, FunnelFacet::default());
        assert_eq!(snapshot.ops, OpsFacet::default());
    }

    #[tokio::test]
    async fn snapshot_is_recomputed_per_request() {
        let memory = Arc::new(MemorySignalStore::new());
        let lab_id = seed(&memory).await;
        let aggregator = TelemetryAggregator::new(memory.clone(), TelemetryConfig::default());

        let before = aggregator.aggregate("demo-event").await.unwrap();
        memory
            .insert_feedback(item(lab_id, "s2", "checkout", 90.0))
            .await
            .unwrap();
        let after = aggregator.aggregate("demo-event").await.unwrap();

        assert_eq!(before.participation.unique_sessions, 1);
        assert_eq!(after.participation.unique_sessions, 2);
    }
}
