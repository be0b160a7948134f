pub mod cache;
pub mod config;
pub mod consumer;
pub mod db;
pub mod ledger;
pub mod metrics;

pub use consumer::{CatalogEventConsumer, ConsumerConfig, OrderEventConsumer};
pub use metrics::ProductMetricsService;
