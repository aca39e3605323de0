//! Error types for telemetry aggregation.

use thiserror::Error;

use labops_core::StoreError;

/// Errors surfaced by the aggregator.
///
/// Per-facet failures are never here: they are absorbed, logged, and replaced
/// with zero-valued defaults so a partial dashboard always beats no dashboard.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The lab itself could not be located.
    #[error("lab not found: {0}")]
    LabNotFound(String),

    /// The lab lookup itself failed in the store.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TelemetryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LabNotFound(slug) => Self::LabNotFound(slug),
            other => Self::Store(other),
        }
    }
}
