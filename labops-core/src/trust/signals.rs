//! Sub-score computations for the trust engine.
//!
//! Each function returns a value normalized to [0, 1]. The engine combines
//! them by weight; nothing here rejects a submission.

use crate::session::VerificationLevel;

/// Burst detection: 1.0 while the session stays under the per-window
/// submission cap, 0.0 from the first submission at or past it.
#[must_use]
pub fn velocity_score(recent_count: usize, max_per_window: usize) -> f64 {
    if max_per_window == 0 || recent_count >= max_per_window {
        0.0
    } else {
        1.0
    }
}

/// Content quality: penalizes empty/short bodies, long repeated-character
/// runs, and tag lists past the allowed count.
#[must_use]
pub fn content_score(
    body: &str,
    tag_count: usize,
    min_body_len: usize,
    max_char_run: usize,
    max_tags: usize,
) -> f64 {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 1.0;
    if trimmed.chars().count() < min_body_len {
        score *= 0.3;
    }
    if longest_char_run(trimmed) > max_char_run {
        score *= 0.3;
    }
    if tag_count > max_tags {
        score *= 0.5;
    }
    score.clamp(0.0, 1.0)
}

/// Identity tier reward: a costlier identity is costlier to spoof at scale.
#[must_use]
pub fn identity_score(level: VerificationLevel) -> f64 {
    match level {
        VerificationLevel::Anonymous => 0.2,
        VerificationLevel::SelfAttested => 0.6,
        VerificationLevel::WalletVerified => 1.0,
    }
}

/// Near-duplicate detection against the session's earlier bodies in the lab.
///
/// Normalized equality plus containment for bodies long enough that
/// containment is meaningful. Not a similarity search.
#[must_use]
pub fn duplicate_score(body: &str, prior_bodies: &[String]) -> f64 {
    const CONTAINMENT_MIN_LEN: usize = 20;

    let normalized = normalize_body(body);
    if normalized.is_empty() {
        return 1.0;
    }

    for prior in prior_bodies {
        let prior_normalized = normalize_body(prior);
        if prior_normalized.is_empty() {
            continue;
        }
        if prior_normalized == normalized {
            return 0.0;
        }
        if normalized.len() >= CONTAINMENT_MIN_LEN
            && prior_normalized.len() >= CONTAINMENT_MIN_LEN
            && (prior_normalized.contains(&normalized) || normalized.contains(&prior_normalized))
        {
            return 0.0;
        }
    }
    1.0
}

/// Lowercase, strip everything but alphanumerics, collapse whitespace.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    body.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Length of the longest run of a single repeated character.
#[must_use]
pub fn longest_char_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut last: Option<char> = None;
    for c in s.chars() {
        if Some(c) == last {
            current += 1;
        } else {
            current = 1;
            last = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}
