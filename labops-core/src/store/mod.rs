//! Signal store adapter.
//!
//! [`SignalStore`] is the thin seam between the core and whatever durable
//! backing store runs in production. The trust engine, feedback service, and
//! telemetry facets only ever talk to this trait, so every consumer can be
//! tested against the in-memory implementation.

mod libsql_store;
mod memory;

pub use libsql_store::LibsqlSignalStore;
pub use memory::MemorySignalStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::feedback::{FeedbackItem, FeedbackPatch};
use crate::lab::EventLab;
use crate::session::{LabSession, VerificationLevel};
use crate::types::{FeedbackId, LabId};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Thin interface over the durable store for lab, session, and feedback rows.
///
/// All operations are single-row with optimistic semantics; the adapter does
/// not expose transactions. Implementations provide their own connection-level
/// concurrency safety.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Look up a lab by slug.
    async fn get_lab(&self, slug: &str) -> StoreResult<EventLab>;

    /// Look up a lab by id.
    async fn get_lab_by_id(&self, id: LabId) -> StoreResult<EventLab>;

    /// Insert a lab row. Used by seeding and tests; host-facing lab CRUD
    /// lives outside this core.
    async fn insert_lab(&self, lab: EventLab) -> StoreResult<EventLab>;

    /// Insert a feedback row.
    async fn insert_feedback(&self, item: FeedbackItem) -> StoreResult<FeedbackItem>;

    /// Look up a feedback item by id.
    async fn get_feedback(&self, id: FeedbackId) -> StoreResult<FeedbackItem>;

    /// Apply a sanitized patch to a single feedback row.
    async fn update_feedback(
        &self,
        id: FeedbackId,
        patch: FeedbackPatch,
    ) -> StoreResult<FeedbackItem>;

    /// All feedback for a lab, ordered by creation time.
    async fn list_feedback(&self, lab_id: LabId) -> StoreResult<Vec<FeedbackItem>>;

    /// All sessions for a lab.
    async fn list_sessions(&self, lab_id: LabId) -> StoreResult<Vec<LabSession>>;

    /// Fetch the session for `(lab, token)`, creating it lazily on first
    /// contact. Bumps `last_seen_at`, records the actor id if newly known,
    /// and upgrades (never downgrades) the verification tier.
    async fn get_or_create_session(
        &self,
        lab_id: LabId,
        session_id: &str,
        actor_id: Option<&str>,
        verification: VerificationLevel,
    ) -> StoreResult<LabSession>;

    /// Record that a session reached a surface, creating the session if it
    /// does not exist yet.
    async fn record_surface_view(
        &self,
        lab_id: LabId,
        session_id: &str,
        surface: &str,
    ) -> StoreResult<()>;
}
