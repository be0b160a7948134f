//! Ledger of handled events, one row per event id
//!
//! Every consumed event leaves exactly one entry here, success or failure.
//! The unique event id is what absorbs at-least-once redelivery: a later
//! delivery finds the entry and is skipped, and two consumers racing on the
//! same id serialize on the unique constraint, not on an in-process lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_contracts::DomainEvent;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("handled-event ledger lock poisoned")]
    LockPoisoned,
}

/// Terminal per-event decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandleStatus {
    Success,
    Failed,
}

impl EventHandleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventHandleStatus::Success => "SUCCESS",
            EventHandleStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(EventHandleStatus::Success),
            "FAILED" => Some(EventHandleStatus::Failed),
            _ => None,
        }
    }
}

/// One ledger entry, written once and never updated
#[derive(Debug, Clone)]
pub struct EventHandled {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub status: EventHandleStatus,
    pub handled_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl EventHandled {
    /// Entry for an event that was applied or deliberately skipped
    pub fn success(event: &dyn DomainEvent) -> Self {
        Self::entry(event, EventHandleStatus::Success, None)
    }

    /// Entry for an event whose apply failed; carries the error for operators
    pub fn failure(event: &dyn DomainEvent, error: impl Into<String>) -> Self {
        Self::entry(event, EventHandleStatus::Failed, Some(error.into()))
    }

    fn entry(
        event: &dyn DomainEvent,
        status: EventHandleStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            event_id: event.event_id(),
            event_type: event.event_type().to_string(),
            aggregate_type: event.aggregate_type().to_string(),
            aggregate_id: event.aggregate_id(),
            status,
            handled_at: Utc::now(),
            error_message,
        }
    }
}

/// Consumer-facing view of the handled-event ledger
#[async_trait]
pub trait HandledEventStore: Send + Sync {
    /// Whether an entry for this event id already exists
    async fn exists(&self, event_id: Uuid) -> Result<bool, LedgerError>;

    /// Insert an entry; `false` means a concurrent consumer won the race
    async fn record(&self, entry: &EventHandled) -> Result<bool, LedgerError>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(Clone)]
pub struct PgHandledEventStore {
    pool: PgPool,
}

impl PgHandledEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HandledEventStore for PgHandledEventStore {
    async fn exists(&self, event_id: Uuid) -> Result<bool, LedgerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM event_handled WHERE event_id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn record(&self, entry: &EventHandled) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_handled
                (event_id, event_type, aggregate_type, aggregate_id, status, handled_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(entry.event_id)
        .bind(&entry.event_type)
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(entry.status.as_str())
        .bind(entry.handled_at)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory implementation (tests, local development)
// ============================================================================

/// In-memory ledger; clones share state
#[derive(Clone, Default)]
pub struct InMemoryHandledEventStore {
    inner: Arc<Mutex<HashMap<Uuid, EventHandled>>>,
}

impl InMemoryHandledEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot one entry by event id
    pub fn get(&self, event_id: Uuid) -> Result<Option<EventHandled>, LedgerError> {
        Ok(self.lock()?.get(&event_id).cloned())
    }

    /// Number of entries written so far
    pub fn count(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.len())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, EventHandled>>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

#[async_trait]
impl HandledEventStore for InMemoryHandledEventStore {
    async fn exists(&self, event_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self.lock()?.contains_key(&event_id))
    }

    async fn record(&self, entry: &EventHandled) -> Result<bool, LedgerError> {
        let mut inner = self.lock()?;
        if inner.contains_key(&entry.event_id) {
            return Ok(false);
        }
        inner.insert(entry.event_id, entry.clone());
        Ok(true)
    }
}
