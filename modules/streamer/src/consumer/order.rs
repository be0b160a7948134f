//! Consumer for completed-order events

use async_trait::async_trait;
use event_bus::BusMessage;
use event_contracts::{OrderEvent, OrderEventKind, ORDER_TOPIC};
use std::sync::Arc;

use crate::cache::ProductDetailCache;
use crate::ledger::{EventHandled, HandledEventStore, LedgerError};
use crate::metrics::{ApplyOutcome, MetricsError, ProductMetricsService, ProductMetricsStore};

use super::BatchHandler;

/// Bumps per-product sales counters from completed orders and evicts the
/// cached detail views those sales invalidate
pub struct OrderEventConsumer<L, M> {
    ledger: L,
    metrics: ProductMetricsService<M>,
    cache: Arc<dyn ProductDetailCache>,
}

impl<L, M> OrderEventConsumer<L, M>
where
    L: HandledEventStore,
    M: ProductMetricsStore,
{
    pub fn new(
        ledger: L,
        metrics: ProductMetricsService<M>,
        cache: Arc<dyn ProductDetailCache>,
    ) -> Self {
        Self {
            ledger,
            metrics,
            cache,
        }
    }

    async fn handle_message(&self, msg: &BusMessage) {
        let event: OrderEvent = match serde_json::from_slice(&msg.payload) {
            Ok(event) => event,
            Err(e) => {
                // No trustworthy event id to ledger; drop and move on.
                tracing::error!(
                    topic = %msg.topic,
                    key = %msg.key,
                    error = %e,
                    "dropping undecodable order event"
                );
                return;
            }
        };

        if let Err(e) = self.process(&event).await {
            tracing::error!(
                event_id = %event.event_id,
                error = %e,
                "order event left no ledger entry"
            );
        }
    }

    /// Decide duplicate, applied, or failed; write one ledger entry for the
    /// whole order regardless of how many line items it carries
    async fn process(&self, event: &OrderEvent) -> Result<(), LedgerError> {
        if self.ledger.exists(event.event_id).await? {
            tracing::debug!(event_id = %event.event_id, "duplicate order event skipped");
            return Ok(());
        }

        let entry = match event.kind {
            OrderEventKind::OrderCompleted => match self.apply_completed(event).await {
                Ok(applied) => {
                    self.evict_applied(&applied).await;
                    tracing::info!(
                        event_id = %event.event_id,
                        order_id = event.order_id,
                        applied = applied.len(),
                        items = event.order_items.len(),
                        "completed order applied to product metrics"
                    );
                    EventHandled::success(event)
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.event_id,
                        order_id = event.order_id,
                        error = %e,
                        "order event apply failed"
                    );
                    EventHandled::failure(event, e.to_string())
                }
            },
        };

        if !self.ledger.record(&entry).await? {
            tracing::debug!(
                event_id = %event.event_id,
                "order event recorded by a concurrent consumer"
            );
        }
        Ok(())
    }

    /// Bump sales per line item, skipping products whose metrics already
    /// reflect a newer event. Returns the product ids actually mutated.
    async fn apply_completed(&self, event: &OrderEvent) -> Result<Vec<i64>, MetricsError> {
        let mut applied = Vec::new();
        for item in &event.order_items {
            match self
                .metrics
                .apply_sale(item.product_id, item.quantity, event.occurred_at)
                .await?
            {
                ApplyOutcome::Applied => applied.push(item.product_id),
                ApplyOutcome::Stale => {
                    tracing::info!(
                        order_id = event.order_id,
                        product_id = item.product_id,
                        "stale sales update skipped"
                    );
                }
            }
        }
        Ok(applied)
    }

    /// Best-effort: a cache failure is logged, never escalated
    async fn evict_applied(&self, product_ids: &[i64]) {
        for &product_id in product_ids {
            if let Err(e) = self.cache.evict_product_detail(product_id).await {
                tracing::warn!(
                    product_id,
                    error = %e,
                    "product detail cache eviction failed"
                );
            }
        }
    }
}

#[async_trait]
impl<L, M> BatchHandler for OrderEventConsumer<L, M>
where
    L: HandledEventStore,
    M: ProductMetricsStore,
{
    fn topic(&self) -> &'static str {
        ORDER_TOPIC
    }

    async fn handle_batch(&self, batch: &[BusMessage]) {
        tracing::debug!(len = batch.len(), "processing order batch");
        for msg in batch {
            self.handle_message(msg).await;
        }
    }
}
