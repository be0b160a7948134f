//! Detail-cache eviction for products whose counters changed
//!
//! Completed orders invalidate cached product detail views. Eviction is
//! best-effort: the consumer logs a failure and moves on, it never fails a
//! batch over the cache.

use async_trait::async_trait;
use redis::AsyncCommands;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Downstream read-view cache, keyed per product
#[async_trait]
pub trait ProductDetailCache: Send + Sync {
    /// Drop every cached detail view for one product
    async fn evict_product_detail(&self, product_id: i64) -> Result<(), CacheError>;
}

fn detail_pattern(product_id: i64) -> String {
    format!("product:detail:{}:*", product_id)
}

/// Redis-backed cache; detail views live under `product:detail:{id}:*`
#[derive(Clone)]
pub struct RedisProductDetailCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisProductDetailCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProductDetailCache for RedisProductDetailCache {
    async fn evict_product_detail(&self, product_id: i64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(detail_pattern(product_id)).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Ok(());
        }

        let deleted: i64 = conn.del(&keys).await?;
        tracing::debug!(product_id, deleted, "evicted product detail cache entries");
        Ok(())
    }
}

/// Cache stand-in for local development without Redis
#[derive(Clone, Default)]
pub struct NoopProductDetailCache;

impl NoopProductDetailCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProductDetailCache for NoopProductDetailCache {
    async fn evict_product_detail(&self, _product_id: i64) -> Result<(), CacheError> {
        Ok(())
    }
}
