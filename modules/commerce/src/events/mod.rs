//! Transactional outbox: row model, stores, publisher, and relay

pub mod outbox;
pub mod publisher;
pub mod relay;
pub mod store;

pub use outbox::{OutboxEvent, OutboxStatus};
pub use publisher::{publish, PublishError};
pub use relay::{OutboxRelay, RelayConfig};
pub use store::{InMemoryOutboxStore, OutboxStore, OutboxStoreError, PgOutboxStore};
