//! NATS-based implementation of the EventBus trait

use crate::{BusError, BusMessage, BusResult, EventBus};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

/// EventBus implementation backed by a NATS server
///
/// Topics map to NATS subjects with the partition key appended as the final
/// subject token (`{topic}.{key}`), so `catalog-events` keyed by product id
/// 42 travels on `catalog-events.42`. Subscriptions queue-subscribe on
/// `{topic}.>`, which load-balances the topic across a consumer group.
///
/// Keys and topics must therefore be subject-safe: non-empty, no dots, no
/// wildcards, no whitespace. Aggregate ids (numeric strings) always are.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = NatsBus::connect("nats://localhost:4222").await?;
/// bus.publish("catalog-events", "42", b"hello".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server and wrap the client
    pub async fn connect(url: &str) -> BusResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn check_token(value: &str, what: &str) -> BusResult<()> {
        let bad = value.is_empty()
            || value.contains(|c: char| c == '*' || c == '>' || c.is_whitespace());
        if bad {
            return Err(BusError::InvalidSubject(format!("{}: {:?}", what, value)));
        }
        Ok(())
    }

    fn subject_for(topic: &str, key: &str) -> BusResult<String> {
        Self::check_token(topic, "topic")?;
        Self::check_token(key, "key")?;
        if key.contains('.') {
            return Err(BusError::InvalidSubject(format!("key: {:?}", key)));
        }
        Ok(format!("{}.{}", topic, key))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        let subject = Self::subject_for(topic, key)?;

        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, BusMessage>> {
        Self::check_token(topic, "topic")?;

        let subscriber = self
            .client
            .queue_subscribe(format!("{}.>", topic), group.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let topic = topic.to_string();
        let prefix = format!("{}.", topic);

        let stream = subscriber.map(move |nats_msg| {
            let subject = nats_msg.subject.to_string();
            let key = subject
                .strip_prefix(&prefix)
                .unwrap_or_default()
                .to_string();
            BusMessage::new(topic.clone(), key, nats_msg.payload.to_vec())
        });

        Ok(stream.boxed())
    }
}
