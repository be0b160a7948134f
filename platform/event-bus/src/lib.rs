//! # EventBus Abstraction
//!
//! A narrow publish/subscribe seam between the outbox relay and the broker.
//!
//! Every message travels on a **topic** (a broker stream such as
//! `catalog-events`) with a **key** (the aggregate id). The key is the
//! partitioning hint: a partition-aware broker delivers all messages sharing
//! a key to the same consumer-side ordering stream. Keeping the interface to
//! `publish(topic, key, payload)` plus a subscription stream means the relay
//! and the consumers can be exercised in tests with a fake bus and no broker.
//!
//! ## Implementations
//!
//! - **NatsBus**: production implementation over a NATS client; the key is
//!   encoded as the final subject token.
//! - **InMemoryBus**: dev/test implementation using in-memory channels.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::connect("nats://localhost:4222").await?);
//!
//! // Dev/Test: in-memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! bus.publish("catalog-events", "42", br#"{"eventType":"ProductViewed"}"#.to_vec())
//!     .await?;
//!
//! let mut stream = bus.subscribe("catalog-events", "streamer").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("key {}: {} bytes", msg.key, msg.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod nats_bus;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The topic this message was published to
    pub topic: String,
    /// The partition key it was published under (the aggregate id)
    pub key: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(topic: String, key: String, payload: Vec<u8>) -> Self {
        Self {
            topic,
            key,
            payload,
        }
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to topic: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("invalid topic or key: {0}")]
    InvalidSubject(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core event bus abstraction for keyed publish-subscribe messaging
///
/// `publish` resolves once the broker has acknowledged the message; an `Err`
/// means the caller may safely retry (delivery is at-least-once, dedup is the
/// consumer's job). `subscribe` joins a named consumer group on a topic and
/// yields messages as a stream.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload to a topic under a partition key
    ///
    /// # Arguments
    /// * `topic` - The destination topic (e.g., "catalog-events")
    /// * `key` - The partition key; all messages for one key share an
    ///   ordering stream
    /// * `payload` - The message payload as raw bytes
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a topic as a member of a consumer group
    ///
    /// Instances sharing a `group` split the topic's messages between them;
    /// distinct groups each see every message.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
