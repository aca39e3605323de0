//! Trust engine.
//!
//! Assigns a confidence score in [0, 100] to every inbound submission from a
//! weighted composite of four normalized sub-scores: velocity, content,
//! identity, and duplicate. The engine never rejects; flags are emitted for
//! downstream triage when a sub-score falls below its threshold, and the
//! accept/reject policy stays with the caller. False positives in anti-spam
//! are costly in a small feedback pool.

pub mod signals;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::feedback::TrustFlag;
use crate::session::VerificationLevel;

/// Relative weight of each sub-score. Combined weights are normalized at
/// scoring time, so a hand-edited config that does not sum to 1.0 still
/// produces a score in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    pub velocity: f64,
    pub content: f64,
    pub identity: f64,
    pub duplicate: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            velocity: 0.3,
            content: 0.3,
            identity: 0.2,
            duplicate: 0.2,
        }
    }
}

impl TrustWeights {
    fn sum(&self) -> f64 {
        self.velocity + self.content + self.identity + self.duplicate
    }
}

/// Trust engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Sub-score weights
    #[serde(default)]
    pub weights: TrustWeights,

    /// Sliding window for burst detection, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,

    /// Submissions allowed per session within the window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,

    /// Bodies shorter than this are penalized
    #[serde(default = "default_min_body_len")]
    pub min_body_len: usize,

    /// Tag lists longer than this are penalized
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,

    /// Repeated-character runs longer than this are penalized
    #[serde(default = "default_max_char_run")]
    pub max_char_run: usize,

    /// `HighVelocity` is flagged below this velocity sub-score
    #[serde(default = "default_flag_threshold")]
    pub velocity_flag_below: f64,

    /// `LowContent` is flagged below this content sub-score
    #[serde(default = "default_flag_threshold")]
    pub content_flag_below: f64,

    /// `DuplicateSuspected` is flagged below this duplicate sub-score
    #[serde(default = "default_flag_threshold")]
    pub duplicate_flag_below: f64,
}

fn default_window_secs() -> i64 {
    60
}

fn default_max_per_window() -> usize {
    5
}

fn default_min_body_len() -> usize {
    12
}

fn default_max_tags() -> usize {
    8
}

fn default_max_char_run() -> usize {
    6
}

fn default_flag_threshold() -> f64 {
    0.5
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            weights: TrustWeights::default(),
            window_secs: default_window_secs(),
            max_per_window: default_max_per_window(),
            min_body_len: default_min_body_len(),
            max_tags: default_max_tags(),
            max_char_run: default_max_char_run(),
            velocity_flag_below: default_flag_threshold(),
            content_flag_below: default_flag_threshold(),
            duplicate_flag_below: default_flag_threshold(),
        }
    }
}

impl TrustConfig {
    /// The burst-detection window as a chrono duration.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.max(0))
    }
}

/// The candidate fields the engine scores.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionCandidate<'a> {
    pub body: &'a str,
    pub tags: &'a [String],
}

/// The requesting session's recent activity, as seen by the engine.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    /// Timestamps of the session's earlier submissions in this lab
    pub submitted_at: Vec<DateTime<Utc>>,
    /// Bodies of the session's earlier submissions in this lab
    pub prior_bodies: Vec<String>,
    /// Verification tier reported for the session
    pub verification: VerificationLevel,
}

impl SessionHistory {
    /// History for a session with no prior submissions.
    #[must_use]
    pub fn empty(verification: VerificationLevel) -> Self {
        Self {
            verification,
            ..Default::default()
        }
    }
}

/// The four normalized sub-scores, kept for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSignals {
    pub velocity: f64,
    pub content: f64,
    pub identity: f64,
    pub duplicate: f64,
}

/// Result of scoring one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Composite score in [0, 100]
    pub score: f64,
    /// Non-blocking flags for triage
    pub flags: Vec<TrustFlag>,
    /// The underlying sub-scores
    pub signals: TrustSignals,
}

/// Scores submissions against session history. Stateless and side-effect
/// free; persistence of the scored item is the caller's responsibility.
#[derive(Debug, Clone, Default)]
pub struct TrustEngine {
    config: TrustConfig,
}

impl TrustEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Score a submission against the session's history, using the current
    /// time as the window anchor.
    #[must_use]
    pub fn score(&self, candidate: &SubmissionCandidate<'_>, history: &SessionHistory) -> TrustAssessment {
        self.score_at(candidate, history, Utc::now())
    }

    /// Score with an explicit `now`, the anchor for the sliding window.
    #[must_use]
    pub fn score_at(
        &self,
        candidate: &SubmissionCandidate<'_>,
        history: &SessionHistory,
        now: DateTime<Utc>,
    ) -> TrustAssessment {
        let cfg = &self.config;
        let window = cfg.window();

        let recent = history
            .submitted_at
            .iter()
            .filter(|&&t| t <= now && now - t <= window)
            .count();

        let signals = TrustSignals {
            velocity: signals::velocity_score(recent, cfg.max_per_window),
            content: signals::content_score(
                candidate.body,
                candidate.tags.len(),
                cfg.min_body_len,
                cfg.max_char_run,
                cfg.max_tags,
            ),
            identity: signals::identity_score(history.verification),
            duplicate: signals::duplicate_score(candidate.body, &history.prior_bodies),
        };

        let mut flags = Vec::new();
        if signals.velocity < cfg.velocity_flag_below {
            flags.push(TrustFlag::HighVelocity);
        }
        if signals.content < cfg.content_flag_below {
            flags.push(TrustFlag::LowContent);
        }
        if signals.duplicate < cfg.duplicate_flag_below {
            flags.push(TrustFlag::DuplicateSuspected);
        }

        let weights = cfg.weights;
        let weight_sum = weights.sum();
        let composite = if weight_sum > 0.0 {
            (weights.velocity * signals.velocity
                + weights.content * signals.content
                + weights.identity * signals.identity
                + weights.duplicate * signals.duplicate)
                / weight_sum
        } else {
            0.0
        };

        let mut score = composite * 100.0;
        if !score.is_finite() {
            score = 0.0;
        }
        score = score.clamp(0.0, 100.0);

        TrustAssessment {
            score,
            flags,
            signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TrustEngine {
        TrustEngine::new(TrustConfig {
            window_secs: 10,
            max_per_window: 2,
            ..Default::default()
        })
    }

    fn candidate<'a>(body: &'a str, tags: &'a [String]) -> SubmissionCandidate<'a> {
        SubmissionCandidate { body, tags }
    }

    const BODY: &str = "the coupon field rejects valid codes at checkout";

    #[test]
    fn burst_past_threshold_zeroes_velocity_and_flags() {
        let engine = engine();
        let now = Utc::now();
        // Third submission in 10 seconds against a cap of 2 per 10s.
        let history = SessionHistory {
            submitted_at: vec![now - Duration::seconds(8), now - Duration::seconds(3)],
            prior_bodies: vec![],
            verification: VerificationLevel::Anonymous,
        };

        let assessment = engine.score_at(&candidate(BODY, &[]), &history, now);

        assert_eq!(assessment.signals.velocity, 0.0);
        assert!(assessment.flags.contains(&TrustFlag::HighVelocity));
    }

    #[test]
    fn under_threshold_session_scores_strictly_higher() {
        let engine = engine();
        let now = Utc::now();
        let under = SessionHistory {
            submitted_at: vec![now - Duration::seconds(8)],
            ..SessionHistory::empty(VerificationLevel::Anonymous)
        };
        let over = SessionHistory {
            submitted_at: vec![
                now - Duration::seconds(8),
                now - Duration::seconds(5),
                now - Duration::seconds(2),
            ],
            ..SessionHistory::empty(VerificationLevel::Anonymous)
        };

        let under_score = engine.score_at(&candidate(BODY, &[]), &under, now);
        let over_score = engine.score_at(&candidate(BODY, &[]), &over, now);

        assert!(over_score.signals.velocity < under_score.signals.velocity);
        assert!(over_score.score < under_score.score);
        assert!(!under_score.flags.contains(&TrustFlag::HighVelocity));
    }

    #[test]
    fn submissions_outside_window_do_not_count() {
        let engine = engine();
        let now = Utc::now();
        let history = SessionHistory {
            submitted_at: vec![now - Duration::seconds(300), now - Duration::seconds(200)],
            ..SessionHistory::empty(VerificationLevel::Anonymous)
        };

        let assessment = engine.score_at(&candidate(BODY, &[]), &history, now);
        assert_eq!(assessment.signals.velocity, 1.0);
    }

    #[test]
    fn score_stays_in_range_for_adversarial_inputs() {
        let engine = engine();
        let now = Utc::now();
        let many_tags: Vec<String> = (0..200).map(|i| format!("tag{}", i)).collect();
        let flood: Vec<DateTime<Utc>> = (0..500).map(|i| now - Duration::seconds(i)).collect();
        let history = SessionHistory {
            submitted_at: flood,
            prior_bodies: vec!["a".repeat(10_000)],
            verification: VerificationLevel::Anonymous,
        };

        let wall_of_z = "z".repeat(50_000);
        for body in ["", "   ", "!!!!", wall_of_z.as_str()] {
            let assessment = engine.score_at(&candidate(body, &many_tags), &history, now);
            assert!(assessment.score.is_finite());
            assert!(
                (0.0..=100.0).contains(&assessment.score),
                "score out of range for body of len {}",
                body.len()
            );
        }
    }

    #[test]
    fn empty_body_flags_low_content_without_panicking() {
        let engine = engine();
        let assessment = engine.score(
            &candidate("", &[]),
            &SessionHistory::empty(VerificationLevel::Anonymous),
        );
        assert!(assessment.flags.contains(&TrustFlag::LowContent));
    }

    #[test]
    fn wallet_verified_outscores_anonymous() {
        let engine = engine();
        let now = Utc::now();
        let anon = engine.score_at(
            &candidate(BODY, &[]),
            &SessionHistory::empty(VerificationLevel::Anonymous),
            now,
        );
        let wallet = engine.score_at(
            &candidate(BODY, &[]),
            &SessionHistory::empty(VerificationLevel::WalletVerified),
            now,
        );
        assert!(wallet.score > anon.score);
    }

    #[test]
    fn duplicate_body_is_flagged() {
        let engine = engine();
        let history = SessionHistory {
            prior_bodies: vec![BODY.to_string()],
            ..SessionHistory::empty(VerificationLevel::SelfAttested)
        };

        let assessment = engine.score(&candidate(BODY, &[]), &history);
        assert_eq!(assessment.signals.duplicate, 0.0);
        assert!(assessment.flags.contains(&TrustFlag::DuplicateSuspected));
    }

    #[test]
    fn clean_submission_carries_no_flags() {
        let engine = engine();
        let assessment = engine.score(
            &candidate(BODY, &[]),
            &SessionHistory::empty(VerificationLevel::WalletVerified),
        );
        assert!(assessment.flags.is_empty());
        assert!(assessment.score > 80.0);
    }

    #[test]
    fn zero_weight_config_still_yields_in_range_score() {
        let engine = TrustEngine::new(TrustConfig {
            weights: TrustWeights {
                velocity: 0.0,
                content: 0.0,
                identity: 0.0,
                duplicate: 0.0,
            },
            ..Default::default()
        });
        let assessment = engine.score(
            &candidate(BODY, &[]),
            &SessionHistory::empty(VerificationLevel::Anonymous),
        );
        assert_eq!(assessment.score, 0.0);
    }

    #[test]
    fn config_deserializes_from_partial_toml() {
        let cfg: TrustConfig = toml::from_str(
            r#"
            window_secs = 10
            max_per_window = 2
        "#,
        )
        .unwrap();
        assert_eq!(cfg.window_secs, 10);
        assert_eq!(cfg.max_per_window, 2);
        assert_eq!(cfg.min_body_len, 12);
    }
}
