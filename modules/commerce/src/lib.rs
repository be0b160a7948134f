pub mod config;
pub mod db;
pub mod events;

pub use events::{OutboxRelay, RelayConfig};
