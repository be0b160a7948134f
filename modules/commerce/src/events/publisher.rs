//! Application-facing outbox publisher
//!
//! Domain code calls [`publish`] from inside the transaction that performs
//! the mutation the event describes. The event row commits or rolls back
//! with that mutation; nothing else provides the pipeline's reliability.

use event_contracts::DomainEvent;
use serde::Serialize;
use sqlx::{Postgres, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A malformed event must never be persisted as pending-forever, so
    /// serialization failure aborts the caller's transaction.
    #[error("failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist outbox event: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append a domain event to the outbox inside the caller's transaction
///
/// Taking `&mut Transaction` is deliberate: there is no way to call this
/// without an open transaction, which is the atomicity the outbox pattern
/// rests on. The row is created PENDING and picked up by the relay after
/// commit.
pub async fn publish<E>(tx: &mut Transaction<'_, Postgres>, event: &E) -> Result<(), PublishError>
where
    E: DomainEvent + Serialize,
{
    let payload = serde_json::to_value(event)?;

    sqlx::query(
        r#"
        INSERT INTO outbox_event
            (event_type, aggregate_type, aggregate_id, payload, topic, status)
        VALUES ($1, $2, $3, $4, $5, 'PENDING')
        "#,
    )
    .bind(event.event_type())
    .bind(event.aggregate_type())
    .bind(event.aggregate_id())
    .bind(payload)
    .bind(event.topic())
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        event_id = %event.event_id(),
        event_type = event.event_type(),
        aggregate_id = %event.aggregate_id(),
        topic = event.topic(),
        "event enqueued to outbox"
    );

    Ok(())
}
