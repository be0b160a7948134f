//! Batch consumers for the catalog and order topics
//!
//! Messages are pulled in small batches. Every message in a batch reaches a
//! terminal decision (applied, duplicate, stale, or recorded failure) before
//! the loop moves on, so the ledger write for a message always lands before
//! its batch is considered done.

pub mod catalog;
pub mod order;

pub use catalog::CatalogEventConsumer;
pub use order::OrderEventConsumer;

use async_trait::async_trait;
use event_bus::{BusMessage, EventBus};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Queue group shared by all instances of this service
pub const CONSUMER_GROUP: &str = "streamer";

/// Batch tuning, injected instead of hard-coded so tests can shrink it
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Messages per batch
    pub batch_size: usize,
    /// How long to wait for more messages after the first of a batch
    pub linger: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            linger: Duration::from_millis(250),
        }
    }
}

/// Per-topic batch processor plugged into [`run_consumer`]
#[async_trait]
pub trait BatchHandler: Send + Sync {
    fn topic(&self) -> &'static str;

    /// Bring every message to a terminal decision; one message's failure
    /// must not abort its siblings
    async fn handle_batch(&self, batch: &[BusMessage]);
}

/// Subscribe to the handler's topic and feed it batches until shutdown
/// or the stream ends; a batch in flight always completes
pub async fn run_consumer(
    handler: Arc<dyn BatchHandler>,
    bus: Arc<dyn EventBus>,
    config: ConsumerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let topic = handler.topic();
    let mut stream = match bus.subscribe(topic, CONSUMER_GROUP).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(topic, error = %e, "failed to subscribe");
            return;
        }
    };
    tracing::info!(topic, group = CONSUMER_GROUP, "consumer started");

    loop {
        tokio::select! {
            maybe = collect_batch(&mut stream, &config) => {
                match maybe {
                    Some(batch) => handler.handle_batch(&batch).await,
                    None => {
                        tracing::warn!(topic, "event stream closed, consumer stopping");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::info!(topic, "consumer stopping");
                break;
            }
        }
    }
}

/// Block for one message, then drain until the batch fills or the linger
/// window closes. `None` means the stream ended.
async fn collect_batch(
    stream: &mut BoxStream<'static, BusMessage>,
    config: &ConsumerConfig,
) -> Option<Vec<BusMessage>> {
    let first = stream.next().await?;
    let mut batch = Vec::with_capacity(config.batch_size);
    batch.push(first);

    let deadline = Instant::now() + config.linger;
    while batch.len() < config.batch_size {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(msg)) => batch.push(msg),
            // Stream ended; hand back what we have.
            Ok(None) => break,
            // Linger window closed.
            Err(_) => break,
        }
    }

    Some(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn message(n: usize) -> BusMessage {
        BusMessage::new(
            "catalog-events".to_string(),
            "1".to_string(),
            n.to_string().into_bytes(),
        )
    }

    #[tokio::test]
    async fn test_batch_size_cap() {
        let config = ConsumerConfig {
            batch_size: 2,
            linger: Duration::from_millis(50),
        };
        let mut stream = stream::iter(vec![message(1), message(2), message(3)]).boxed();

        let batch = collect_batch(&mut stream, &config).await.unwrap();
        assert_eq!(batch.len(), 2);

        let rest = collect_batch(&mut stream, &config).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linger_closes_partial_batch() {
        let config = ConsumerConfig {
            batch_size: 10,
            linger: Duration::from_millis(50),
        };
        let mut stream = stream::iter(vec![message(1), message(2)])
            .chain(stream::pending())
            .boxed();

        let batch = collect_batch(&mut stream, &config).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"1");
    }

    #[tokio::test]
    async fn test_ended_stream_no_batch() {
        let config = ConsumerConfig::default();
        let mut stream = stream::empty().boxed();

        assert!(collect_batch(&mut stream, &config).await.is_none());
    }
}
