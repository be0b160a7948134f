//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// EventBus implementation using in-memory channels
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Integration tests that need fast, isolated message buses
///
/// Messages are broadcast via a Tokio broadcast channel and filtered per
/// subscription by topic. Consumer groups are not load-balanced here: every
/// subscriber sees every message on its topic, which is the useful behavior
/// for single-process dev and tests.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("catalog-events", "streamer").await?;
///
/// bus.publish("catalog-events", "42", b"hello".to_vec()).await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.topic, "catalog-events");
/// assert_eq!(msg.key, "42");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    // Single broadcast channel for all topics; subscriptions filter.
    // The buffer is generous so tests never drop messages.
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus
    ///
    /// The bus buffers up to 1000 undelivered messages per subscriber; when
    /// exceeded, the oldest are dropped and the subscriber logs the gap.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a new in-memory event bus with a custom buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(topic.to_string(), key.to_string(), payload);

        // Ignore the error when there are no receivers; publishing into the
        // void is fine for an at-least-once pipeline under test.
        let _ = self.sender.send(msg);

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _group: &str,
    ) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let topic = topic.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if msg.topic == topic {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, topic = %topic, "in-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();

        let mut stream = bus.subscribe("catalog-events", "g1").await.unwrap();

        let payload = b"test message".to_vec();
        bus.publish("catalog-events", "42", payload.clone())
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg.topic, "catalog-events");
        assert_eq!(msg.key, "42");
        assert_eq!(msg.payload, payload);
    }

    #[tokio::test]
    async fn test_multiple_messages_in_order() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("order-events", "g1").await.unwrap();

        for i in 0..5 {
            let payload = format!("message {}", i).into_bytes();
            bus.publish("order-events", &i.to_string(), payload)
                .await
                .unwrap();
        }

        for i in 0..5 {
            let msg = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("timeout")
                .expect("stream ended");

            assert_eq!(msg.key, i.to_string());
            assert_eq!(msg.payload, format!("message {}", i).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_topic_filtering() {
        let bus = InMemoryBus::new();

        let mut stream = bus.subscribe("catalog-events", "g1").await.unwrap();

        bus.publish("order-events", "7", b"other topic".to_vec())
            .await
            .unwrap();
        bus.publish("catalog-events", "1", b"mine".to_vec())
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg.key, "1");
        assert_eq!(msg.payload, b"mine".to_vec());

        let no_more = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(no_more.is_err(), "should timeout, no more messages");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryBus::new();

        let mut stream1 = bus.subscribe("catalog-events", "g1").await.unwrap();
        let mut stream2 = bus.subscribe("catalog-events", "g2").await.unwrap();

        let payload = b"broadcast".to_vec();
        bus.publish("catalog-events", "9", payload.clone())
            .await
            .unwrap();

        let msg1 = tokio::time::timeout(Duration::from_secs(1), stream1.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let msg2 = tokio::time::timeout(Duration::from_secs(1), stream2.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg1.payload, payload);
        assert_eq!(msg2.payload, payload);
    }
}
