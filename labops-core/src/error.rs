//! Error types for labops-core

use thiserror::Error;

/// Errors from the signal store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lab absent for the given slug or id.
    #[error("lab not found: {0}")]
    LabNotFound(String),

    /// Session absent for the given token.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Feedback item absent for the given id.
    #[error("feedback not found: {0}")]
    FeedbackNotFound(String),

    /// Database error from libSQL.
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    /// JSON serialization/deserialization error for stored columns.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row contained data the domain types cannot represent.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Errors surfaced by the feedback service to its callers.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Malformed or out-of-policy input. Always recoverable by the caller
    /// correcting the input.
    #[error("invalid submission: {0}")]
    Invalid(String),

    /// The referenced lab does not exist.
    #[error("lab not found: {0}")]
    LabNotFound(String),

    /// The referenced feedback item does not exist.
    #[error("feedback not found: {0}")]
    NotFound(String),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SubmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LabNotFound(slug) => Self::LabNotFound(slug),
            StoreError::FeedbackNotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_lab_not_found_maps_to_submission_lab_not_found() {
        let err: SubmissionError = StoreError::LabNotFound("demo-event".to_string()).into();
        assert!(matches!(err, SubmissionError::LabNotFound(_)));
    }

    #[test]
    fn store_feedback_not_found_maps_to_submission_not_found() {
        let err: SubmissionError = StoreError::FeedbackNotFound("abc".to_string()).into();
        assert!(matches!(err, SubmissionError::NotFound(_)));
    }

    #[test]
    fn other_store_errors_stay_wrapped() {
        let err: SubmissionError = StoreError::InvalidData("bad row".to_string()).into();
        assert!(matches!(err, SubmissionError::Store(_)));
    }

    #[test]
    fn invalid_submission_displays_reason() {
        let err = SubmissionError::Invalid("body is required".to_string());
        assert!(err.to_string().contains("body is required"));
    }
}
