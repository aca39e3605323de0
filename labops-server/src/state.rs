//! Shared application state for the labops server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use labops_core::{
    FeedbackService, MemorySignalStore, SignalStore, TrustConfig, TrustEngine,
};
use labops_telemetry::{TelemetryAggregator, TelemetryConfig};

/// Shared application state accessible by all handlers
pub struct AppState {
    /// Feedback submission and triage operations
    pub service: FeedbackService,
    /// On-demand telemetry snapshots
    pub aggregator: TelemetryAggregator,
    /// The shared signal store
    pub store: Arc<dyn SignalStore>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state over a store with the given engine configurations.
    pub fn new(
        store: Arc<dyn SignalStore>,
        trust: TrustConfig,
        telemetry: TelemetryConfig,
    ) -> Self {
        Self {
            service: FeedbackService::new(store.clone(), TrustEngine::new(trust)),
            aggregator: TelemetryAggregator::new(store.clone(), telemetry),
            store,
            started_at: Utc::now(),
        }
    }

    /// Create state over a fresh in-memory store with default configs.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySignalStore::new()),
            TrustConfig::default(),
            TelemetryConfig::default(),
        )
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
