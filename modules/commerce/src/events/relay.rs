//! Background relay from the outbox table to the broker
//!
//! Two schedules share one send path: a fast cycle drains PENDING rows and a
//! slow cycle re-drives FAILED rows that still have retry budget (normally
//! empty under the current state machine, but it is the recovery path for
//! rows an operator resets). Each tick is a plain async function so tests
//! drive the relay directly, without timers or a broker.

use event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::outbox::OutboxEvent;
use super::store::{OutboxStore, OutboxStoreError};

/// Relay tuning, injected instead of hard-coded so tests can shrink it
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Rows fetched per tick
    pub batch_size: i64,
    /// Send attempts before a row parks FAILED
    pub max_retries: i32,
    /// Fast cycle draining PENDING rows
    pub pending_interval: Duration,
    /// Slow cycle re-driving retryable FAILED rows
    pub failed_retry_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 5,
            pending_interval: Duration::from_secs(5),
            failed_retry_interval: Duration::from_secs(60),
        }
    }
}

/// Polls the outbox store and pushes rows to the broker keyed by aggregate id
pub struct OutboxRelay<S> {
    store: S,
    bus: Arc<dyn EventBus>,
    config: RelayConfig,
}

impl<S: OutboxStore> OutboxRelay<S> {
    pub fn new(store: S, bus: Arc<dyn EventBus>, config: RelayConfig) -> Self {
        Self { store, bus, config }
    }

    /// One fast-cycle tick: drain a batch of PENDING rows
    ///
    /// Returns how many rows this call transitioned to PUBLISHED.
    pub async fn relay_pending_once(&self) -> Result<usize, OutboxStoreError> {
        let batch = self.store.fetch_pending(self.config.batch_size).await?;
        Ok(self.send_batch(batch).await)
    }

    /// One slow-cycle tick: re-drive FAILED rows with retry budget left
    pub async fn retry_failed_once(&self) -> Result<usize, OutboxStoreError> {
        let batch = self
            .store
            .fetch_retryable_failed(self.config.batch_size, self.config.max_retries)
            .await?;
        if !batch.is_empty() {
            tracing::info!(count = batch.len(), "re-driving failed outbox events");
        }
        Ok(self.send_batch(batch).await)
    }

    async fn send_batch(&self, batch: Vec<OutboxEvent>) -> usize {
        let mut published = 0;
        for row in batch {
            match self.send_one(&row).await {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(e) => {
                    // Store trouble: leave the row as-is for the next tick.
                    tracing::error!(id = row.id, error = %e, "outbox state update failed");
                }
            }
        }
        published
    }

    async fn send_one(&self, row: &OutboxEvent) -> Result<bool, OutboxStoreError> {
        let payload = match serde_json::to_vec(&row.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.store
                    .record_send_failure(row.id, &e.to_string(), self.config.max_retries)
                    .await?;
                return Ok(false);
            }
        };

        match self.bus.publish(&row.topic, &row.aggregate_id, payload).await {
            Ok(()) => {
                let transitioned = self.store.mark_published(row.id).await?;
                if transitioned {
                    tracing::debug!(
                        id = row.id,
                        event_type = %row.event_type,
                        topic = %row.topic,
                        key = %row.aggregate_id,
                        "outbox event published"
                    );
                } else {
                    tracing::debug!(id = row.id, "row already published by a concurrent relay");
                }
                Ok(transitioned)
            }
            Err(e) => {
                tracing::warn!(
                    id = row.id,
                    event_type = %row.event_type,
                    retry_count = row.retry_count,
                    error = %e,
                    "outbox publish failed"
                );
                self.store
                    .record_send_failure(row.id, &e.to_string(), self.config.max_retries)
                    .await?;
                Ok(false)
            }
        }
    }

    /// Timer loop for the fast cycle; exits between ticks on shutdown
    pub async fn run_pending_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.pending_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.relay_pending_once().await {
                        Ok(count) if count > 0 => {
                            tracing::debug!(count, "relayed pending outbox events");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "pending relay tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("pending relay loop stopping");
                    break;
                }
            }
        }
    }

    /// Timer loop for the slow cycle; exits between ticks on shutdown
    pub async fn run_failed_retry_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.failed_retry_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.retry_failed_once().await {
                        Ok(count) if count > 0 => {
                            tracing::info!(count, "re-published failed outbox events");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "failed-retry tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("failed-retry relay loop stopping");
                    break;
                }
            }
        }
    }
}
