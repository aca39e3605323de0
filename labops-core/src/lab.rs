//! Event lab types.
//!
//! A lab is a scoped feedback-collection campaign tied to one or more
//! monitored surfaces. Its status gates whether submissions are accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LabId;

/// Lifecycle status of an event lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    /// Created but not yet accepting feedback
    Draft,
    /// Accepting feedback submissions
    Active,
    /// Finished (terminal state)
    Closed,
}

impl LabStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A scoped feedback-collection campaign.
///
/// The slug is URL-safe, unique, and immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLab {
    /// Unique identifier
    pub id: LabId,

    /// URL-safe unique slug (immutable)
    pub slug: String,

    /// Human-readable name
    pub name: String,

    /// What the host wants to learn from this lab
    #[serde(default)]
    pub objective: String,

    /// Application surfaces participants are asked to observe
    #[serde(default)]
    pub surfaces_to_observe: Vec<String>,

    /// Current lifecycle status
    pub status: LabStatus,

    /// When the campaign starts
    pub start_date: DateTime<Utc>,
}

impl EventLab {
    /// Create a new draft lab.
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: LabId::new(),
            slug: slug.into(),
            name: name.into(),
            objective: String::new(),
            surfaces_to_observe: Vec::new(),
            status: LabStatus::Draft,
            start_date: Utc::now(),
        }
    }

    /// Set the lab objective.
    #[must_use]
    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    /// Set the surfaces participants observe.
    #[must_use]
    pub fn with_surfaces(mut self, surfaces: Vec<String>) -> Self {
        self.surfaces_to_observe = surfaces;
        self
    }

    /// Set the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: LabStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the lab currently accepts feedback.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LabStatus::Active
    }
}
