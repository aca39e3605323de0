//! Feedback item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FeedbackId, LabId};

/// Triage status of a feedback item. Closed enumeration - updates with any
/// other value are rejected before anything touches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Just submitted, not yet looked at
    New,
    /// A host has looked at it
    Triaged,
    /// Addressed
    Resolved,
    /// Closed without action
    Dismissed,
}

impl FeedbackStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Triaged => "triaged",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "triaged" => Some(Self::Triaged),
            "resolved" => Some(Self::Resolved),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    /// Whether this status closes the item.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

/// Triage priority. Closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Non-blocking markers emitted by the trust engine when a sub-score falls
/// below its threshold. Flags surface in triage UIs; they never auto-reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustFlag {
    /// Session submitted faster than the configured burst threshold
    HighVelocity,
    /// Body looks degenerate (empty, too short, repeated characters)
    LowContent,
    /// Near-identical to an earlier submission from the same session
    DuplicateSuspected,
}

impl TrustFlag {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighVelocity => "high_velocity",
            Self::LowContent => "low_content",
            Self::DuplicateSuspected => "duplicate_suspected",
        }
    }
}

/// A single feedback submission.
///
/// `trust_score` is assigned once at creation and never re-scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Unique identifier
    pub id: FeedbackId,

    /// Lab the feedback belongs to
    pub lab_id: LabId,

    /// Session that submitted it
    pub session_id: String,

    /// Surface the feedback is about
    pub surface: String,

    /// Free-form feedback text
    pub body: String,

    /// Ordered, deduplicated tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Triage status
    pub status: FeedbackStatus,

    /// Triage priority
    pub priority: Priority,

    /// Confidence that this is genuine signal, in [0, 100]
    pub trust_score: f64,

    /// Trust flags emitted at scoring time
    #[serde(default)]
    pub flags: Vec<TrustFlag>,

    /// When the item was submitted
    pub created_at: DateTime<Utc>,

    /// When the item was last mutated
    pub updated_at: DateTime<Utc>,

    /// First transition away from `new`, for time-to-first-triage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_triaged_at: Option<DateTime<Utc>>,

    /// Transition into `resolved`/`dismissed`, for time-to-resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Sanitized partial update for a feedback item.
///
/// Fields are already validated against the closed enumerations; free-form
/// strings never reach this type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPatch {
    pub status: Option<FeedbackStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

impl FeedbackPatch {
    /// Whether the patch changes anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.tags.is_none()
    }
}

impl FeedbackItem {
    /// Apply a sanitized patch, stamping triage/resolution timestamps on the
    /// relevant status transitions.
    pub fn apply_patch(&mut self, patch: &FeedbackPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            if self.status == FeedbackStatus::New
                && status != FeedbackStatus::New
                && self.first_triaged_at.is_none()
            {
                self.first_triaged_at = Some(now);
            }
            if status.is_terminal() && self.resolved_at.is_none() {
                self.resolved_at = Some(now);
            }
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(ref tags) = patch.tags {
            self.tags = sanitize_tags(tags);
        }
        self.updated_at = now;
    }
}

/// Normalize a tag list: trim, drop empties, deduplicate preserving order.
#[must_use]
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.iter().any(|t| t == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}
