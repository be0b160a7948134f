//! Outbox persistence behind a trait so the relay can run against Postgres
//! in production and an in-memory store in tests and local development
//!
//! The two mutating operations are per-row compare-and-set: multiple relay
//! instances may race on the same row, and the storage layer is what
//! serializes the outcome (not an in-process lock).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::{Arc, Mutex};

use super::outbox::{OutboxEvent, OutboxStatus};

#[derive(Debug, thiserror::Error)]
pub enum OutboxStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("outbox row {id} has unrecognized status {value:?}")]
    CorruptStatus { id: i64, value: String },

    #[error("outbox store lock poisoned")]
    LockPoisoned,
}

/// Relay-facing view of the outbox table
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` PENDING rows, oldest first
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, OutboxStoreError>;

    /// Up to `limit` FAILED rows still under the retry ceiling, oldest first
    async fn fetch_retryable_failed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxEvent>, OutboxStoreError>;

    /// CAS transition to PUBLISHED; `false` means the row was already there
    async fn mark_published(&self, id: i64) -> Result<bool, OutboxStoreError>;

    /// CAS transition after a failed send: retry count up, PENDING below the
    /// ceiling, FAILED with the error at it; a PUBLISHED row is untouched
    async fn record_send_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: i32,
    ) -> Result<(), OutboxStoreError>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: i64,
    event_type: String,
    aggregate_type: String,
    aggregate_id: String,
    payload: serde_json::Value,
    topic: String,
    status: String,
    retry_count: i32,
    published_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = OutboxStoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let status = OutboxStatus::parse(&row.status).ok_or(OutboxStoreError::CorruptStatus {
            id: row.id,
            value: row.status.clone(),
        })?;

        Ok(OutboxEvent {
            id: row.id,
            event_type: row.event_type,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            payload: row.payload,
            topic: row.topic,
            status,
            retry_count: row.retry_count,
            published_at: row.published_at,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload, topic,
                   status, retry_count, published_at, error_message, created_at
            FROM outbox_event
            WHERE status = 'PENDING'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEvent::try_from).collect()
    }

    async fn fetch_retryable_failed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, event_type, aggregate_type, aggregate_id, payload, topic,
                   status, retry_count, published_at, error_message, created_at
            FROM outbox_event
            WHERE status = 'FAILED' AND retry_count < $2
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEvent::try_from).collect()
    }

    async fn mark_published(&self, id: i64) -> Result<bool, OutboxStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_event
            SET status = 'PUBLISHED', published_at = NOW()
            WHERE id = $1 AND status <> 'PUBLISHED'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_send_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: i32,
    ) -> Result<(), OutboxStoreError> {
        // Single guarded statement so racing relays serialize on the row.
        // SET expressions read the pre-update retry_count.
        sqlx::query(
            r#"
            UPDATE outbox_event
            SET retry_count = retry_count + 1,
                status = CASE WHEN retry_count + 1 < $2 THEN 'PENDING' ELSE 'FAILED' END,
                error_message = CASE WHEN retry_count + 1 < $2 THEN error_message ELSE $3 END
            WHERE id = $1 AND status <> 'PUBLISHED'
            "#,
        )
        .bind(id)
        .bind(max_retries)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests, local development)
// ============================================================================

/// In-memory outbox store
///
/// Drives the same state machine as the Postgres store, through
/// [`OutboxEvent`]'s transition methods. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<OutboxEvent>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a new PENDING row, returning its assigned id
    pub fn enqueue(
        &self,
        event_type: &str,
        aggregate_type: &str,
        aggregate_id: &str,
        payload: serde_json::Value,
        topic: &str,
    ) -> Result<i64, OutboxStoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(OutboxEvent::new(
            id,
            event_type,
            aggregate_type,
            aggregate_id,
            payload,
            topic,
            Utc::now(),
        ));
        Ok(id)
    }

    /// Snapshot one row by id
    pub fn get(&self, id: i64) -> Result<Option<OutboxEvent>, OutboxStoreError> {
        let inner = self.lock()?;
        Ok(inner.rows.iter().find(|row| row.id == id).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, OutboxStoreError> {
        self.inner.lock().map_err(|_| OutboxStoreError::LockPoisoned)
    }

    fn fetch_where(
        &self,
        limit: i64,
        predicate: impl Fn(&OutboxEvent) -> bool,
    ) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<OutboxEvent> = inner
            .rows
            .iter()
            .filter(|row| predicate(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        self.fetch_where(limit, |row| row.status == OutboxStatus::Pending)
    }

    async fn fetch_retryable_failed(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        self.fetch_where(limit, |row| {
            row.status == OutboxStatus::Failed && row.can_retry(max_retries)
        })
    }

    async fn mark_published(&self, id: i64) -> Result<bool, OutboxStoreError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        Ok(inner
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .map(|row| row.mark_published(now))
            .unwrap_or(false))
    }

    async fn record_send_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: i32,
    ) -> Result<(), OutboxStoreError> {
        let mut inner = self.lock()?;
        if let Some(row) = inner.rows.iter_mut().find(|row| row.id == id) {
            row.record_send_failure(error, max_retries);
        }
        Ok(())
    }
}
