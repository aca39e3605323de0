//! Facet computations.
//!
//! Each facet is an independent, read-only computation that performs its own
//! store queries. Facets are deliberately self-contained: one failing query
//! defaults one facet, and the snapshot may reflect slightly different
//! cut-off instants across facets under concurrent writes.

use std::collections::{HashMap, HashSet};

use labops_core::{FeedbackStatus, LabId, SignalStore, StoreResult};

use crate::snapshot::{
    DistributionSummary, FunnelFacet, LatencySummary, OpsFacet, ParticipationFacet, QualityFacet,
    StatusCounts, SurfaceFunnel,
};
use crate::stats;

/// Unique sessions, returning-session ratio, submissions-per-session.
pub async fn participation(
    store: &dyn SignalStore,
    lab_id: LabId,
) -> StoreResult<ParticipationFacet> {
    let sessions = store.list_sessions(lab_id).await?;
    let items = store.list_feedback(lab_id).await?;

    let mut per_session: HashMap<&str, u64> = HashMap::new();
    for session in &sessions {
        per_session.insert(session.session_id.as_str(), 0);
    }
    for item in &items {
        *per_session.entry(item.session_id.as_str()).or_insert(0) += 1;
    }

    let total = per_session.len() as u64;
    let returning = per_session.values().filter(|&&count| count >= 2).count() as u64;
    let counts: Vec<f64> = per_session.values().map(|&count| count as f64).collect();

    let submissions_per_session = if counts.is_empty() {
        DistributionSummary::default()
    } else {
        DistributionSummary {
            min: counts.iter().cloned().fold(f64::INFINITY, f64::min),
            median: stats::median(&counts),
            max: counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    };

    Ok(ParticipationFacet {
        unique_sessions: total,
        returning_session_ratio: if total > 0 {
            returning as f64 / total as f64
        } else {
            0.0
        },
        submissions_per_session,
    })
}

/// Trust-score distribution, flagged ratio, status distribution.
pub async fn quality(
    store: &dyn SignalStore,
    lab_id: LabId,
    review_threshold: f64,
) -> StoreResult<QualityFacet> {
    let items = store.list_feedback(lab_id).await?;
    if items.is_empty() {
        return Ok(QualityFacet::default());
    }

    let scores: Vec<f64> = items.iter().map(|item| item.trust_score).collect();
    let below = items
        .iter()
        .filter(|item| item.trust_score < review_threshold)
        .count() as u64;
    let flagged = items.iter().filter(|item| !item.flags.is_empty()).count() as u64;

    let mut status_counts = StatusCounts::default();
    for item in &items {
        match item.status {
            FeedbackStatus::New => status_counts.new += 1,
            FeedbackStatus::Triaged => status_counts.triaged += 1,
            FeedbackStatus::Resolved => status_counts.resolved += 1,
            FeedbackStatus::Dismissed => status_counts.dismissed += 1,
        }
    }

    Ok(QualityFacet {
        trust_mean: stats::mean(&scores),
        below_review_threshold: below,
        flagged_ratio: flagged as f64 / items.len() as f64,
        status_counts,
    })
}

/// Per-surface two-stage conversion funnels over the lab's declared surfaces.
///
/// Re-reads the lab row so the surface list reflects the store at facet time.
pub async fn funnels(store: &dyn SignalStore, lab_id: LabId) -> StoreResult<FunnelFacet> {
    let lab = store.get_lab_by_id(lab_id).await?;
    let sessions = store.list_sessions(lab_id).await?;
    let items = store.list_feedback(lab_id).await?;

    let mut submitted_by_surface: HashMap<&str, HashSet<&str>> = HashMap::new();
    for item in &items {
        submitted_by_surface
            .entry(item.surface.as_str())
            .or_default()
            .insert(item.session_id.as_str());
    }

    let surfaces = lab
        .surfaces_to_observe
        .iter()
        .map(|surface| {
            let reached = sessions
                .iter()
                .filter(|session| session.surfaces_seen.iter().any(|s| s == surface))
                .count() as u64;
            let submitted = submitted_by_surface
                .get(surface.as_str())
                .map_or(0, |sessions| sessions.len()) as u64;
            SurfaceFunnel {
                surface: surface.clone(),
                sessions_reached: reached,
                sessions_submitted: submitted,
                conversion_rate: if reached > 0 {
                    submitted as f64 / reached as f64
                } else {
                    0.0
                },
            }
        })
        .collect();

    Ok(FunnelFacet { surfaces })
}

/// Time-to-first-triage and time-to-resolution distributions.
pub async fn ops(store: &dyn SignalStore, lab_id: LabId) -> StoreResult<OpsFacet> {
    let items = store.list_feedback(lab_id).await?;

    let triage_secs: Vec<f64> = items
        .iter()
        .filter_map(|item| {
            item.first_triaged_at
                .map(|t| (t - item.created_at).num_milliseconds() as f64 / 1000.0)
        })
        .collect();
    let resolve_secs: Vec<f64> = items
        .iter()
        .filter_map(|item| {
            item.resolved_at
                .map(|t| (t - item.created_at).num_milliseconds() as f64 / 1000.0)
        })
        .collect();

    Ok(OpsFacet {
        time_to_first_triage: latency_summary(&triage_secs),
        time_to_resolution: latency_summary(&resolve_secs),
    })
}

fn latency_summary(secs: &[f64]) -> LatencySummary {
    LatencySummary {
        median_secs: stats::median(secs),
        p95_secs: stats::percentile(secs, 95.0),
        samples: secs.len() as u64,
    }
}
