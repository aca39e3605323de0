//! In-memory signal store.
//!
//! Backs tests and single-process dev servers. All maps live behind
//! `tokio::sync::RwLock`; no lock is held across an await into other code.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{SignalStore, StoreResult};
use crate::error::StoreError;
use crate::feedback::{FeedbackItem, FeedbackPatch};
use crate::lab::EventLab;
use crate::session::{LabSession, VerificationLevel};
use crate::types::{FeedbackId, LabId};

/// In-memory implementation of [`SignalStore`].
#[derive(Default)]
pub struct MemorySignalStore {
    labs: RwLock<HashMap<LabId, EventLab>>,
    sessions: RwLock<HashMap<(LabId, String), LabSession>>,
    feedback: RwLock<HashMap<FeedbackId, FeedbackItem>>,
}

impl MemorySignalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn get_lab(&self, slug: &str) -> StoreResult<EventLab> {
        let labs = self.labs.read().await;
        labs.values()
            .find(|lab| lab.slug == slug)
            .cloned()
            .ok_or_else(|| StoreError::LabNotFound(slug.to_string()))
    }

    async fn get_lab_by_id(&self, id: LabId) -> StoreResult<EventLab> {
        let labs = self.labs.read().await;
        labs.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::LabNotFound(id.to_string()))
    }

    async fn insert_lab(&self, lab: EventLab) -> StoreResult<EventLab> {
        let mut labs = self.labs.write().await;
        if labs.values().any(|l| l.slug == lab.slug && l.id != lab.id) {
            return Err(StoreError::InvalidData(format!(
                "slug already taken: {}",
                lab.slug
            )));
        }
        labs.insert(lab.id, lab.clone());
        Ok(lab)
    }

    async fn insert_feedback(&self, item: FeedbackItem) -> StoreResult<FeedbackItem> {
        let mut feedback = self.feedback.write().await;
        feedback.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_feedback(&self, id: FeedbackId) -> StoreResult<FeedbackItem> {
        let feedback = self.feedback.read().await;
        feedback
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::FeedbackNotFound(id.to_string()))
    }

    async fn update_feedback(
        &self,
        id: FeedbackId,
        patch: FeedbackPatch,
    ) -> StoreResult<FeedbackItem> {
        let mut feedback = self.feedback.write().await;
        let item = feedback
            .get_mut(&id)
            .ok_or_else(|| StoreError::FeedbackNotFound(id.to_string()))?;
        item.apply_patch(&patch, Utc::now());
        Ok(item.clone())
    }

    async fn list_feedback(&self, lab_id: LabId) -> StoreResult<Vec<FeedbackItem>> {
        let feedback = self.feedback.read().await;
        let mut items: Vec<FeedbackItem> = feedback
            .values()
            .filter(|item| item.lab_id == lab_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn list_sessions(&self, lab_id: LabId) -> StoreResult<Vec<LabSession>> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<LabSession> = sessions
            .values()
            .filter(|session| session.lab_id == lab_id)
            .cloned()
            .collect();
        rows.sort_by_key(|session| session.created_at);
        Ok(rows)
    }

    async fn get_or_create_session(
        &self,
        lab_id: LabId,
        session_id: &str,
        actor_id: Option<&str>,
        verification: VerificationLevel,
    ) -> StoreResult<LabSession> {
        let mut sessions = self.sessions.write().await;
        let key = (lab_id, session_id.to_string());
        let session = sessions.entry(key).or_insert_with(|| {
            let mut created = LabSession::new(session_id, lab_id);
            created.actor_id = actor_id.map(str::to_string);
            created
        });
        session.last_seen_at = Utc::now();
        if session.actor_id.is_none() {
            session.actor_id = actor_id.map(str::to_string);
        }
        session.upgrade_verification(verification);
        Ok(session.clone())
    }

    async fn record_surface_view(
        &self,
        lab_id: LabId,
        session_id: &str,
        surface: &str,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let key = (lab_id, session_id.to_string());
        let session = sessions
            .entry(key)
            .or_insert_with(|| LabSession::new(session_id, lab_id));
        session.last_seen_at = Utc::now();
        session.record_surface(surface);
        Ok(())
    }
}
