//! labops-core - Event lab feedback ops core
//!
//! Domain types, the signal store adapter, the trust engine, and the feedback
//! service. Telemetry aggregation and the payment gate build on this crate
//! but are otherwise independent of each other.

pub mod error;
pub mod feedback;
pub mod lab;
pub mod service;
pub mod session;
pub mod store;
pub mod trust;
pub mod types;

pub use error::{StoreError, SubmissionError};
pub use feedback::{
    sanitize_tags, FeedbackItem, FeedbackPatch, FeedbackStatus, Priority, TrustFlag,
};
pub use lab::{EventLab, LabStatus};
pub use service::{FeedbackService, SubmitRequest, UpdateRequest};
pub use session::{LabSession, VerificationLevel};
pub use store::{LibsqlSignalStore, MemorySignalStore, SignalStore, StoreResult};
pub use trust::{
    SessionHistory, SubmissionCandidate, TrustAssessment, TrustConfig, TrustEngine, TrustSignals,
    TrustWeights,
};
pub use types::{FeedbackId, LabId};
