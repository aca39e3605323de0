//! labops-telemetry - Dashboard telemetry aggregation
//!
//! Rolls raw feedback and session rows into a four-facet snapshot:
//! participation, quality, funnels, and ops. Snapshots are recomputed per
//! request from concurrent, independently fault-tolerant facet reads.

mod aggregator;
mod error;
pub mod facets;
mod snapshot;
pub mod stats;

pub use aggregator::{TelemetryAggregator, TelemetryConfig};
pub use error::TelemetryError;
pub use snapshot::{
    DistributionSummary, FunnelFacet, LatencySummary, OpsFacet, ParticipationFacet, QualityFacet,
    StatusCounts, SurfaceFunnel, TelemetrySnapshot,
};
