//! Lab session types.
//!
//! A session identifies a participant within a single lab without requiring
//! authentication. Sessions are created lazily on first submission per
//! browsing context and serve as the rate-limiting key for trust scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LabId;

/// How strongly a participant's identity has been verified.
///
/// A costlier identity is costlier to spoof at scale, so the trust engine
/// rewards higher tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    /// No identity claim at all
    Anonymous,
    /// Participant filled in a name/email without proof
    SelfAttested,
    /// Participant signed in with a connected wallet
    WalletVerified,
}

impl VerificationLevel {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::SelfAttested => "self_attested",
            Self::WalletVerified => "wallet_verified",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anonymous" => Some(Self::Anonymous),
            "self_attested" => Some(Self::SelfAttested),
            "wallet_verified" => Some(Self::WalletVerified),
            _ => None,
        }
    }
}

impl Default for VerificationLevel {
    fn default() -> Self {
        Self::Anonymous
    }
}

/// A participant's browsing context within one lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSession {
    /// Opaque session token supplied by the identity provider
    pub session_id: String,

    /// The lab this session belongs to (exactly one)
    pub lab_id: LabId,

    /// Stable actor id when the participant is known, None for anonymous
    #[serde(default)]
    pub actor_id: Option<String>,

    /// Highest verification tier observed for this session
    #[serde(default)]
    pub verification: VerificationLevel,

    /// Surfaces this session has reached, in first-seen order
    #[serde(default)]
    pub surfaces_seen: Vec<String>,

    /// When the session was first seen
    pub created_at: DateTime<Utc>,

    /// When the session was last seen
    pub last_seen_at: DateTime<Utc>,
}

impl LabSession {
    /// Create a new session for a lab.
    pub fn new(session_id: impl Into<String>, lab_id: LabId) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            lab_id,
            actor_id: None,
            verification: VerificationLevel::Anonymous,
            surfaces_seen: Vec::new(),
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Record that this session reached a surface (idempotent).
    pub fn record_surface(&mut self, surface: &str) {
        if !self.surfaces_seen.iter().any(|s| s == surface) {
            self.surfaces_seen.push(surface.to_string());
        }
    }

    /// Raise the verification tier if the reported one is higher.
    ///
    /// Verification never downgrades: once a wallet is linked, the session
    /// keeps that tier even when a later request omits the proof.
    pub fn upgrade_verification(&mut self, reported: VerificationLevel) {
        if reported > self.verification {
            self.verification = reported;
        }
    }
}
