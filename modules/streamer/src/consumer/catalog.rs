//! Consumer for per-product interaction events

use async_trait::async_trait;
use event_bus::BusMessage;
use event_contracts::{CatalogEvent, CatalogEventKind, DomainEvent, CATALOG_TOPIC};

use crate::ledger::{EventHandled, HandledEventStore, LedgerError};
use crate::metrics::{ApplyOutcome, ProductMetricsService, ProductMetricsStore};

use super::BatchHandler;

/// Applies like and view events to product metrics, once per event id
pub struct CatalogEventConsumer<L, M> {
    ledger: L,
    metrics: ProductMetricsService<M>,
}

impl<L, M> CatalogEventConsumer<L, M>
where
    L: HandledEventStore,
    M: ProductMetricsStore,
{
    pub fn new(ledger: L, metrics: ProductMetricsService<M>) -> Self {
        Self { ledger, metrics }
    }

    async fn handle_message(&self, msg: &BusMessage) {
        let event: CatalogEvent = match serde_json::from_slice(&msg.payload) {
            Ok(event) => event,
            Err(e) => {
                // No trustworthy event id to ledger; drop and move on.
                tracing::error!(
                    topic = %msg.topic,
                    key = %msg.key,
                    error = %e,
                    "dropping undecodable catalog event"
                );
                return;
            }
        };

        if let Err(e) = self.process(&event).await {
            tracing::error!(
                event_id = %event.event_id,
                error = %e,
                "catalog event left no ledger entry"
            );
        }
    }

    /// Decide duplicate, stale, applied, or failed; write one ledger entry
    async fn process(&self, event: &CatalogEvent) -> Result<(), LedgerError> {
        if self.ledger.exists(event.event_id).await? {
            tracing::debug!(event_id = %event.event_id, "duplicate catalog event skipped");
            return Ok(());
        }

        let outcome = match event.kind {
            CatalogEventKind::ProductLikeAdded { .. } => {
                self.metrics
                    .apply_like_added(event.product_id, event.occurred_at)
                    .await
            }
            CatalogEventKind::ProductLikeRemoved { .. } => {
                self.metrics
                    .apply_like_removed(event.product_id, event.occurred_at)
                    .await
            }
            CatalogEventKind::ProductViewed { .. } => {
                self.metrics
                    .apply_view(event.product_id, event.occurred_at)
                    .await
            }
        };

        let entry = match outcome {
            Ok(ApplyOutcome::Applied) => {
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = event.event_type(),
                    product_id = event.product_id,
                    "catalog event applied"
                );
                EventHandled::success(event)
            }
            Ok(ApplyOutcome::Stale) => {
                tracing::info!(
                    event_id = %event.event_id,
                    product_id = event.product_id,
                    "stale catalog event absorbed"
                );
                EventHandled::success(event)
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    product_id = event.product_id,
                    error = %e,
                    "catalog event apply failed"
                );
                EventHandled::failure(event, e.to_string())
            }
        };

        if !self.ledger.record(&entry).await? {
            tracing::debug!(
                event_id = %event.event_id,
                "catalog event recorded by a concurrent consumer"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<L, M> BatchHandler for CatalogEventConsumer<L, M>
where
    L: HandledEventStore,
    M: ProductMetricsStore,
{
    fn topic(&self) -> &'static str {
        CATALOG_TOPIC
    }

    async fn handle_batch(&self, batch: &[BusMessage]) {
        tracing::debug!(len = batch.len(), "processing catalog batch");
        for msg in batch {
            self.handle_message(msg).await;
        }
    }
}
