//! libSQL implementation of the signal store.
//!
//! Can connect to a remote Turso database, a local embedded SQLite file, or
//! an in-memory database for tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};
use tracing::instrument;

use super::{SignalStore, StoreResult};
use crate::error::StoreError;
use crate::feedback::{FeedbackItem, FeedbackPatch, FeedbackStatus, Priority, TrustFlag};
use crate::lab::{EventLab, LabStatus};
use crate::session::{LabSession, VerificationLevel};
use crate::types::{FeedbackId, LabId};

/// SQL schema for the labs table.
const SCHEMA_LABS: &str = r#"
CREATE TABLE IF NOT EXISTS labs (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    objective TEXT NOT NULL,
    surfaces TEXT NOT NULL,
    status TEXT NOT NULL,
    start_date TEXT NOT NULL
)
"#;

/// SQL schema for the sessions table.
const SCHEMA_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    lab_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    actor_id TEXT,
    verification TEXT NOT NULL,
    surfaces_seen TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    PRIMARY KEY (lab_id, session_id)
)
"#;

/// SQL schema for the feedback table.
const SCHEMA_FEEDBACK: &str = r#"
CREATE TABLE IF NOT EXISTS feedback (
    id TEXT PRIMARY KEY,
    lab_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    surface TEXT NOT NULL,
    body TEXT NOT NULL,
    tags TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    trust_score REAL NOT NULL,
    flags TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    first_triaged_at TEXT,
    resolved_at TEXT
)
"#;

/// SQL index for efficient per-lab feedback queries.
const INDEX_FEEDBACK: &str = r#"
CREATE INDEX IF NOT EXISTS idx_feedback_lab_time
ON feedback(lab_id, created_at)
"#;

const SELECT_FEEDBACK: &str = "SELECT id, lab_id, session_id, surface, body, tags, status, priority, trust_score, flags, created_at, updated_at, first_triaged_at, resolved_at FROM feedback";

const SELECT_SESSIONS: &str = "SELECT lab_id, session_id, actor_id, verification, surfaces_seen, created_at, last_seen_at FROM sessions";

const SELECT_LABS: &str = "SELECT id, slug, name, objective, surfaces, status, start_date FROM labs";

/// libSQL-backed implementation of [`SignalStore`].
#[derive(Clone)]
pub struct LibsqlSignalStore {
    db: Arc<Database>,
}

impl LibsqlSignalStore {
    /// Create a store backed by a local embedded database file.
    pub async fn new_local(path: &Path) -> StoreResult<Self> {
        let db = Builder::new_local(path).build().await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a store connected to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> StoreResult<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn new_memory() -> StoreResult<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn conn(&self) -> StoreResult<Connection> {
        Ok(self.db.connect()?)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.conn().await?;
        conn.execute(SCHEMA_LABS, ()).await?;
        conn.execute(SCHEMA_SESSIONS, ()).await?;
        conn.execute(SCHEMA_FEEDBACK, ()).await?;
        conn.execute(INDEX_FEEDBACK, ()).await?;
        Ok(())
    }

    fn parse_lab(row: &libsql::Row) -> StoreResult<EventLab> {
        let id_str: String = row.get(0)?;
        let slug: String = row.get(1)?;
        let name: String = row.get(2)?;
        let objective: String = row.get(3)?;
        let surfaces_json: String = row.get(4)?;
        let status_str: String = row.get(5)?;
        let start_date_str: String = row.get(6)?;

        let id = LabId(
            id_str
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("invalid lab id: {}", id_str)))?,
        );
        let status = LabStatus::parse(&status_str)
            .ok_or_else(|| StoreError::InvalidData(format!("invalid lab status: {}", status_str)))?;
        let surfaces_to_observe: Vec<String> = serde_json::from_str(&surfaces_json)?;
        let start_date = parse_datetime(&start_date_str)?;

        Ok(EventLab {
            id,
            slug,
            name,
            objective,
            surfaces_to_observe,
            status,
            start_date,
        })
    }

    fn parse_session(row: &libsql::Row) -> StoreResult<LabSession> {
        let lab_id_str: String = row.get(0)?;
        let session_id: String = row.get(1)?;
        let actor_id: Option<String> = row.get(2)?;
        let verification_str: String = row.get(3)?;
        let surfaces_json: String = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let last_seen_at_str: String = row.get(6)?;

        let lab_id = LabId(lab_id_str.parse().map_err(|_| {
            StoreError::InvalidData(format!("invalid lab id: {}", lab_id_str))
        })?);
        let verification = VerificationLevel::parse(&verification_str).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid verification: {}", verification_str))
        })?;
        let surfaces_seen: Vec<String> = serde_json::from_str(&surfaces_json)?;

        Ok(LabSession {
            session_id,
            lab_id,
            actor_id,
            verification,
            surfaces_seen,
            created_at: parse_datetime(&created_at_str)?,
            last_seen_at: parse_datetime(&last_seen_at_str)?,
        })
    }

    fn parse_feedback(row: &libsql::Row) -> StoreResult<FeedbackItem> {
        let id_str: String = row.get(0)?;
        let lab_id_str: String = row.get(1)?;
        let session_id: String = row.get(2)?;
        let surface: String = row.get(3)?;
        let body: String = row.get(4)?;
        let tags_json: String = row.get(5)?;
        let status_str: String = row.get(6)?;
        let priority_str: String = row.get(7)?;
        let trust_score: f64 = row.get(8)?;
        let flags_json: String = row.get(9)?;
        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;
        let first_triaged_at_str: Option<String> = row.get(12)?;
        let resolved_at_str: Option<String> = row.get(13)?;

        let id = FeedbackId(id_str.parse().map_err(|_| {
            StoreError::InvalidData(format!("invalid feedback id: {}", id_str))
        })?);
        let lab_id = LabId(lab_id_str.parse().map_err(|_| {
            StoreError::InvalidData(format!("invalid lab id: {}", lab_id_str))
        })?);
        let status = FeedbackStatus::parse(&status_str).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid feedback status: {}", status_str))
        })?;
        let priority = Priority::parse(&priority_str).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid priority: {}", priority_str))
        })?;
        let tags: Vec<String> = serde_json::from_str(&tags_json)?;
        let flags: Vec<TrustFlag> = serde_json::from_str(&flags_json)?;
        let first_triaged_at = first_triaged_at_str
            .as_deref()
            .map(parse_datetime)
            .transpose()?;
        let resolved_at = resolved_at_str.as_deref().map(parse_datetime).transpose()?;

        Ok(FeedbackItem {
            id,
            lab_id,
            session_id,
            surface,
            body,
            tags,
            status,
            priority,
            trust_score,
            flags,
            created_at: parse_datetime(&created_at_str)?,
            updated_at: parse_datetime(&updated_at_str)?,
            first_triaged_at,
            resolved_at,
        })
    }

    async fn write_session(&self, session: &LabSession) -> StoreResult<()> {
        let conn = self.conn().await?;
        let surfaces_json = serde_json::to_string(&session.surfaces_seen)?;
        conn.execute(
            "INSERT INTO sessions (lab_id, session_id, actor_id, verification, surfaces_seen, created_at, last_seen_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (lab_id, session_id) DO UPDATE SET actor_id = excluded.actor_id, verification = excluded.verification, surfaces_seen = excluded.surfaces_seen, last_seen_at = excluded.last_seen_at",
            libsql::params![
                session.lab_id.to_string(),
                session.session_id.clone(),
                session.actor_id.clone(),
                session.verification.as_str(),
                surfaces_json,
                format_datetime(session.created_at),
                format_datetime(session.last_seen_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn find_session(
        &self,
        lab_id: LabId,
        session_id: &str,
    ) -> StoreResult<Option<LabSession>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!("{} WHERE lab_id = ? AND session_id = ?", SELECT_SESSIONS),
                libsql::params![lab_id.to_string(), session_id],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_session(&row)?))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl SignalStore for LibsqlSignalStore {
    #[instrument(skip(self), level = "debug")]
    async fn get_lab(&self, slug: &str) -> StoreResult<EventLab> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("{} WHERE slug = ?", SELECT_LABS), [slug])
            .await?;
        if let Some(row) = rows.next().await? {
            Self::parse_lab(&row)
        } else {
            Err(StoreError::LabNotFound(slug.to_string()))
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_lab_by_id(&self, id: LabId) -> StoreResult<EventLab> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("{} WHERE id = ?", SELECT_LABS), [id.to_string()])
            .await?;
        if let Some(row) = rows.next().await? {
            Self::parse_lab(&row)
        } else {
            Err(StoreError::LabNotFound(id.to_string()))
        }
    }

    #[instrument(skip(self, lab), level = "debug")]
    async fn insert_lab(&self, lab: EventLab) -> StoreResult<EventLab> {
        let conn = self.conn().await?;
        let surfaces_json = serde_json::to_string(&lab.surfaces_to_observe)?;
        conn.execute(
            "INSERT INTO labs (id, slug, name, objective, surfaces, status, start_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                lab.id.to_string(),
                lab.slug.clone(),
                lab.name.clone(),
                lab.objective.clone(),
                surfaces_json,
                lab.status.as_str(),
                format_datetime(lab.start_date)
            ],
        )
        .await?;
        Ok(lab)
    }

    #[instrument(skip(self, item), level = "debug")]
    async fn insert_feedback(&self, item: FeedbackItem) -> StoreResult<FeedbackItem> {
        let conn = self.conn().await?;
        let tags_json = serde_json::to_string(&item.tags)?;
        let flags_json = serde_json::to_string(&item.flags)?;
        conn.execute(
            "INSERT INTO feedback (id, lab_id, session_id, surface, body, tags, status, priority, trust_score, flags, created_at, updated_at, first_triaged_at, resolved_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                item.id.to_string(),
                item.lab_id.to_string(),
                item.session_id.clone(),
                item.surface.clone(),
                item.body.clone(),
                tags_json,
                item.status.as_str(),
                item.priority.as_str(),
                item.trust_score,
                flags_json,
                format_datetime(item.created_at),
                format_datetime(item.updated_at),
                item.first_triaged_at.map(format_datetime),
                item.resolved_at.map(format_datetime)
            ],
        )
        .await?;
        Ok(item)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_feedback(&self, id: FeedbackId) -> StoreResult<FeedbackItem> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!("{} WHERE id = ?", SELECT_FEEDBACK),
                [id.to_string()],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Self::parse_feedback(&row)
        } else {
            Err(StoreError::FeedbackNotFound(id.to_string()))
        }
    }

    #[instrument(skip(self, patch), level = "debug")]
    async fn update_feedback(
        &self,
        id: FeedbackId,
        patch: FeedbackPatch,
    ) -> StoreResult<FeedbackItem> {
        let mut item = self.get_feedback(id).await?;
        item.apply_patch(&patch, Utc::now());

        let conn = self.conn().await?;
        let tags_json = serde_json::to_string(&item.tags)?;
        conn.execute(
            "UPDATE feedback SET status = ?, priority = ?, tags = ?, updated_at = ?, first_triaged_at = ?, resolved_at = ? WHERE id = ?",
            libsql::params![
                item.status.as_str(),
                item.priority.as_str(),
                tags_json,
                format_datetime(item.updated_at),
                item.first_triaged_at.map(format_datetime),
                item.resolved_at.map(format_datetime),
                item.id.to_string()
            ],
        )
        .await?;
        Ok(item)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_feedback(&self, lab_id: LabId) -> StoreResult<Vec<FeedbackItem>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "{} WHERE lab_id = ? ORDER BY created_at ASC",
                    SELECT_FEEDBACK
                ),
                [lab_id.to_string()],
            )
            .await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_feedback(&row)?);
        }
        Ok(items)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_sessions(&self, lab_id: LabId) -> StoreResult<Vec<LabSession>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "{} WHERE lab_id = ? ORDER BY created_at ASC",
                    SELECT_SESSIONS
                ),
                [lab_id.to_string()],
            )
            .await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::parse_session(&row)?);
        }
        Ok(sessions)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_or_create_session(
        &self,
        lab_id: LabId,
        session_id: &str,
        actor_id: Option<&str>,
        verification: VerificationLevel,
    ) -> StoreResult<LabSession> {
        let mut session = self
            .find_session(lab_id, session_id)
            .await?
            .unwrap_or_else(|| LabSession::new(session_id, lab_id));
        session.last_seen_at = Utc::now();
        if session.actor_id.is_none() {
            session.actor_id = actor_id.map(str::to_string);
        }
        session.upgrade_verification(verification);
        self.write_session(&session).await?;
        Ok(session)
    }

    #[instrument(skip(self), level = "debug")]
    async fn record_surface_view(
        &self,
        lab_id: LabId,
        session_id: &str,
        surface: &str,
    ) -> StoreResult<()> {
        let mut session = self
            .find_session(lab_id, session_id)
            .await?
            .unwrap_or_else(|| LabSession::new(session_id, lab_id));
        session.last_seen_at = Utc::now();
        session.record_surface(surface);
        self.write_session(&session).await?;
        Ok(())
    }
}

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a datetime from storage.
fn parse_datetime(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidData(format!("invalid datetime: {}", s)))
}
