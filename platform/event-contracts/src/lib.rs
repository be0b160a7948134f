//! # Event Contracts
//!
//! The closed set of domain events this pipeline carries, and the wire shape
//! they travel in.
//!
//! Every event is flat camelCase JSON, internally tagged by `eventType`:
//!
//! ```json
//! {
//!   "eventId": "0d4f…",
//!   "eventType": "ProductLikeAdded",
//!   "productId": 1,
//!   "userId": 10,
//!   "occurredAt": "2025-01-01T12:00:00Z"
//! }
//! ```
//!
//! Consumers dispatch by exhaustive match on the event kind, so an
//! unsupported `eventType` is rejected at deserialization instead of falling
//! through a runtime default branch.

pub mod catalog;
pub mod order;

pub use catalog::{CatalogEvent, CatalogEventKind};
pub use order::{OrderEvent, OrderEventKind, OrderItem};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Topic carrying per-product interaction events, keyed by product id
pub const CATALOG_TOPIC: &str = "catalog-events";

/// Topic carrying completed-order events, keyed by order id
pub const ORDER_TOPIC: &str = "order-events";

/// Envelope accessors every published event provides
///
/// The outbox publisher reads these to fill the outbox row: identity for
/// consumer-side dedup, aggregate reference for partitioning, occurrence
/// time for the recency check, and the destination topic.
pub trait DomainEvent {
    /// Globally unique id, the consumer's deduplication key
    fn event_id(&self) -> Uuid;

    /// Tag identifying the semantic effect, e.g. "ProductLikeAdded"
    fn event_type(&self) -> &'static str;

    /// Kind of entity the event is about, e.g. "Product"
    fn aggregate_type(&self) -> &'static str;

    /// Entity identity; doubles as the broker partition key
    fn aggregate_id(&self) -> String;

    /// Domain-side occurrence time (not enqueue time)
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Destination topic
    fn topic(&self) -> &'static str;
}
