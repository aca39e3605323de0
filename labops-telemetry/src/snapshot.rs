//! Telemetry snapshot types.
//!
//! A snapshot is derived, never persisted, and recomputed on every request.
//! Every facet type implements `Default` with documented zero values; the
//! aggregator substitutes those defaults when a facet's queries fail.

use serde::{Deserialize, Serialize};

/// Dashboard-ready metrics for one lab, across four independent facets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub participation: ParticipationFacet,
    pub quality: QualityFacet,
    pub funnels: FunnelFacet,
    pub ops: OpsFacet,
}

/// Min/median/max summary of a distribution. All zeros when empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

/// Median/p95 latency summary in seconds, with the sample count that backs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub median_secs: f64,
    pub p95_secs: f64,
    pub samples: u64,
}

/// Who showed up and how often they came back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipationFacet {
    /// Distinct sessions seen for the lab
    pub unique_sessions: u64,
    /// Sessions with at least two submissions / total sessions
    pub returning_session_ratio: f64,
    /// Submissions-per-session distribution
    pub submissions_per_session: DistributionSummary,
}

/// Feedback quality as the trust engine and triage see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFacet {
    /// Mean trust score across all items
    pub trust_mean: f64,
    /// Items whose trust score sits below the review threshold
    pub below_review_threshold: u64,
    /// Items carrying at least one trust flag / total items
    pub flagged_ratio: f64,
    /// Triage status distribution
    pub status_counts: StatusCounts,
}

/// Item counts per triage status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u64,
    pub triaged: u64,
    pub resolved: u64,
    pub dismissed: u64,
}

/// Two-stage conversion funnels, one per declared surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelFacet {
    pub surfaces: Vec<SurfaceFunnel>,
}

/// Sessions that reached a surface vs. sessions that went on to submit
/// feedback from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceFunnel {
    pub surface: String,
    pub sessions_reached: u64,
    pub sessions_submitted: u64,
    /// `sessions_submitted / sessions_reached`, 0.0 when nothing reached
    pub conversion_rate: f64,
}

/// Operational triage latencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpsFacet {
    /// created_at -> first status change away from `new`
    pub time_to_first_triage: LatencySummary,
    /// created_at -> `resolved`/`dismissed`
    pub time_to_resolution: LatencySummary,
}
