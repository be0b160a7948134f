//! Outbox row type and its delivery state machine
//!
//! A row wraps one serialized domain event plus delivery state. It is created
//! PENDING in the same transaction as the domain mutation it describes, then
//! mutated only by the relay: PUBLISHED on broker acknowledgment (one-way,
//! idempotent) or, after a failed send, back to PENDING until the retry
//! ceiling is hit, at which point it parks FAILED with the error recorded for
//! an operator.

use chrono::{DateTime, Utc};

/// Delivery state of an outbox row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    /// Waiting for the relay to send it
    Pending,
    /// Acknowledged by the broker; terminal
    Published,
    /// Send failed with no retries left; terminal until an operator steps in
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OutboxStatus::Pending),
            "PUBLISHED" => Some(OutboxStatus::Published),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// One event waiting in (or finished with) the outbox
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub topic: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// A freshly enqueued row: PENDING, no retries, nothing recorded yet
    pub fn new(
        id: i64,
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
        topic: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            topic: topic.into(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            published_at: None,
            error_message: None,
            created_at,
        }
    }

    /// Record broker acknowledgment
    ///
    /// Returns `true` if this call performed the transition. A row that is
    /// already PUBLISHED stays untouched, so two relays racing on the same
    /// row agree on the outcome.
    pub fn mark_published(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == OutboxStatus::Published {
            return false;
        }
        self.status = OutboxStatus::Published;
        self.published_at = Some(at);
        true
    }

    /// Record a failed send attempt
    ///
    /// Below the retry ceiling the row goes back to PENDING for the next
    /// fast relay cycle; at the ceiling it parks FAILED with the error
    /// message. A PUBLISHED row is left alone.
    pub fn record_send_failure(&mut self, error: &str, max_retries: i32) {
        if self.status == OutboxStatus::Published {
            return;
        }
        self.retry_count += 1;
        if self.retry_count < max_retries {
            self.status = OutboxStatus::Pending;
        } else {
            self.status = OutboxStatus::Failed;
            self.error_message = Some(error.to_string());
        }
    }

    /// Whether a FAILED row is still within the retry budget
    pub fn can_retry(&self, max_retries: i32) -> bool {
        self.retry_count < max_retries
    }
}
