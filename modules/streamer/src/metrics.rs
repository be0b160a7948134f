//! Per-product interaction counters with an order-aware, optimistic apply
//!
//! Counter mutations are pure functions on [`ProductMetrics`]; delivery
//! mechanics live in [`ProductMetricsService`], which gates every apply on
//! the recency check and retries version conflicts against the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("product {0} metrics were modified concurrently")]
    Conflict(i64),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("product metrics lock poisoned")]
    LockPoisoned,
}

/// Interaction counters for one product
///
/// `last_updated_at` is the occurrence time of the newest applied event, not
/// a wall-clock write time; the staleness check compares against it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProductMetrics {
    pub product_id: i64,
    pub like_count: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub last_updated_at: DateTime<Utc>,
    pub version: i64,
}

impl ProductMetrics {
    /// Fresh counters for a product with no applied events yet
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            like_count: 0,
            sales_count: 0,
            view_count: 0,
            // Predates any real occurrence time, so the first event applies.
            last_updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
        }
    }

    /// An event at or before the last applied occurrence time is stale
    pub fn is_stale(&self, occurred_at: DateTime<Utc>) -> bool {
        occurred_at <= self.last_updated_at
    }

    pub fn increment_like_count(&mut self) {
        self.like_count += 1;
    }

    /// Likes arriving out of order can remove before they add; the count
    /// floors at zero instead of going negative
    pub fn decrement_like_count(&mut self) {
        if self.like_count > 0 {
            self.like_count -= 1;
        }
    }

    pub fn increment_view_count(&mut self) {
        self.view_count += 1;
    }

    pub fn increase_sales_count(&mut self, quantity: i64) -> Result<(), MetricsError> {
        if quantity <= 0 {
            return Err(MetricsError::InvalidQuantity(quantity));
        }
        self.sales_count += quantity;
        Ok(())
    }

    /// Advance the recency watermark to an applied event's occurrence time
    pub fn touch(&mut self, occurred_at: DateTime<Utc>) {
        self.last_updated_at = occurred_at;
    }
}

/// Consumer-facing view of the product metrics table
#[async_trait]
pub trait ProductMetricsStore: Send + Sync {
    async fn find(&self, product_id: i64) -> Result<Option<ProductMetrics>, MetricsError>;

    /// Version-checked write; [`MetricsError::Conflict`] means another writer
    /// got there first and the caller should reload and reapply
    async fn save(&self, metrics: &ProductMetrics) -> Result<(), MetricsError>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(Clone)]
pub struct PgProductMetricsStore {
    pool: PgPool,
}

impl PgProductMetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductMetricsStore for PgProductMetricsStore {
    async fn find(&self, product_id: i64) -> Result<Option<ProductMetrics>, MetricsError> {
        let row = sqlx::query_as::<_, ProductMetrics>(
            r#"
            SELECT product_id, like_count, sales_count, view_count, last_updated_at, version
            FROM product_metrics
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn save(&self, metrics: &ProductMetrics) -> Result<(), MetricsError> {
        // Version 0 marks a row that has never been persisted. Both arms are
        // compare-and-set: zero rows affected means another writer won.
        let result = if metrics.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO product_metrics
                    (product_id, like_count, sales_count, view_count, last_updated_at, version)
                VALUES ($1, $2, $3, $4, $5, 1)
                ON CONFLICT (product_id) DO NOTHING
                "#,
            )
            .bind(metrics.product_id)
            .bind(metrics.like_count)
            .bind(metrics.sales_count)
            .bind(metrics.view_count)
            .bind(metrics.last_updated_at)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE product_metrics
                SET like_count = $2, sales_count = $3, view_count = $4,
                    last_updated_at = $5, version = version + 1
                WHERE product_id = $1 AND version = $6
                "#,
            )
            .bind(metrics.product_id)
            .bind(metrics.like_count)
            .bind(metrics.sales_count)
            .bind(metrics.view_count)
            .bind(metrics.last_updated_at)
            .bind(metrics.version)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(MetricsError::Conflict(metrics.product_id));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests, local development)
// ============================================================================

/// In-memory metrics store with the same version discipline as Postgres;
/// clones share state
#[derive(Clone, Default)]
pub struct InMemoryProductMetricsStore {
    inner: Arc<Mutex<HashMap<i64, ProductMetrics>>>,
}

impl InMemoryProductMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot one product's counters
    pub fn get(&self, product_id: i64) -> Result<Option<ProductMetrics>, MetricsError> {
        Ok(self.lock()?.get(&product_id).cloned())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<i64, ProductMetrics>>, MetricsError> {
        self.inner.lock().map_err(|_| MetricsError::LockPoisoned)
    }
}

#[async_trait]
impl ProductMetricsStore for InMemoryProductMetricsStore {
    async fn find(&self, product_id: i64) -> Result<Option<ProductMetrics>, MetricsError> {
        self.get(product_id)
    }

    async fn save(&self, metrics: &ProductMetrics) -> Result<(), MetricsError> {
        let mut inner = self.lock()?;
        let mut stored = metrics.clone();
        match inner.get(&metrics.product_id) {
            None if metrics.version == 0 => {
                stored.version = 1;
                inner.insert(metrics.product_id, stored);
                Ok(())
            }
            Some(current) if current.version == metrics.version => {
                stored.version = metrics.version + 1;
                inner.insert(metrics.product_id, stored);
                Ok(())
            }
            _ => Err(MetricsError::Conflict(metrics.product_id)),
        }
    }
}

// ============================================================================
// Apply service
// ============================================================================

/// Outcome of offering one event to the metrics store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Counters changed and the recency watermark advanced
    Applied,
    /// The event occurred at or before the watermark; nothing changed
    Stale,
}

/// Version conflicts tolerated per apply before giving up
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// Applies counter mutations behind the recency gate, retrying version
/// conflicts with a fresh load each attempt
pub struct ProductMetricsService<M> {
    store: M,
}

impl<M: ProductMetricsStore> ProductMetricsService<M> {
    pub fn new(store: M) -> Self {
        Self { store }
    }

    pub async fn apply_like_added(
        &self,
        product_id: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, MetricsError> {
        self.apply(product_id, occurred_at, |metrics| {
            metrics.increment_like_count();
            Ok(())
        })
        .await
    }

    pub async fn apply_like_removed(
        &self,
        product_id: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, MetricsError> {
        self.apply(product_id, occurred_at, |metrics| {
            metrics.decrement_like_count();
            Ok(())
        })
        .await
    }

    pub async fn apply_view(
        &self,
        product_id: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, MetricsError> {
        self.apply(product_id, occurred_at, |metrics| {
            metrics.increment_view_count();
            Ok(())
        })
        .await
    }

    pub async fn apply_sale(
        &self,
        product_id: i64,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, MetricsError> {
        self.apply(product_id, occurred_at, |metrics| {
            metrics.increase_sales_count(quantity)
        })
        .await
    }

    async fn apply<F>(
        &self,
        product_id: i64,
        occurred_at: DateTime<Utc>,
        mutate: F,
    ) -> Result<ApplyOutcome, MetricsError>
    where
        F: Fn(&mut ProductMetrics) -> Result<(), MetricsError>,
    {
        let mut attempts = 0;
        loop {
            // The staleness check sits inside the loop: a conflicting writer
            // may have advanced the watermark past this event.
            let mut metrics = match self.store.find(product_id).await? {
                Some(current) => {
                    if current.is_stale(occurred_at) {
                        return Ok(ApplyOutcome::Stale);
                    }
                    current
                }
                None => ProductMetrics::new(product_id),
            };

            mutate(&mut metrics)?;
            metrics.touch(occurred_at);

            match self.store.save(&metrics).await {
                Ok(()) => return Ok(ApplyOutcome::Applied),
                Err(MetricsError::Conflict(id)) => {
                    attempts += 1;
                    if attempts >= MAX_SAVE_ATTEMPTS {
                        return Err(MetricsError::Conflict(id));
                    }
                    tracing::debug!(
                        product_id,
                        attempts,
                        "version conflict on product metrics, reloading"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let mut metrics = ProductMetrics::new(1);
        metrics.decrement_like_count();
        assert_eq!(metrics.like_count, 0);

        metrics.increment_like_count();
        metrics.decrement_like_count();
        metrics.decrement_like_count();
        assert_eq!(metrics.like_count, 0);
    }

    #[test]
    fn test_sales_rejects_non_positive_quantity() {
        let mut metrics = ProductMetrics::new(1);

        assert!(matches!(
            metrics.increase_sales_count(0),
            Err(MetricsError::InvalidQuantity(0))
        ));
        assert!(matches!(
            metrics.increase_sales_count(-3),
            Err(MetricsError::InvalidQuantity(-3))
        ));
        assert_eq!(metrics.sales_count, 0);

        metrics.increase_sales_count(5).unwrap();
        assert_eq!(metrics.sales_count, 5);
    }

    #[test]
    fn test_staleness_at_watermark() {
        let mut metrics = ProductMetrics::new(1);
        metrics.touch(at(10));

        assert!(metrics.is_stale(at(9)));
        assert!(metrics.is_stale(at(10)));
        assert!(!metrics.is_stale(at(11)));
    }

    #[tokio::test]
    async fn test_apply_creates_row_lazily() {
        let store = InMemoryProductMetricsStore::new();
        let service = ProductMetricsService::new(store.clone());

        let outcome = service.apply_like_added(1, at(10)).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let metrics = store.get(1).unwrap().unwrap();
        assert_eq!(metrics.like_count, 1);
        assert_eq!(metrics.last_updated_at, at(10));
        assert_eq!(metrics.version, 1);
    }

    #[tokio::test]
    async fn test_stale_apply_noop() {
        let store = InMemoryProductMetricsStore::new();
        let service = ProductMetricsService::new(store.clone());

        service.apply_like_added(1, at(20)).await.unwrap();

        let outcome = service.apply_like_added(1, at(20)).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Stale);
        let outcome = service.apply_like_added(1, at(5)).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Stale);

        let metrics = store.get(1).unwrap().unwrap();
        assert_eq!(metrics.like_count, 1);
        assert_eq!(metrics.last_updated_at, at(20));
    }

    #[tokio::test]
    async fn test_invalid_quantity_no_row() {
        let store = InMemoryProductMetricsStore::new();
        let service = ProductMetricsService::new(store.clone());

        let err = service.apply_sale(1, 0, at(10)).await.unwrap_err();
        assert!(matches!(err, MetricsError::InvalidQuantity(0)));
        assert!(store.get(1).unwrap().is_none());
    }

    /// Store that reports a version conflict a fixed number of times before
    /// delegating to the shared in-memory store.
    struct ContendedStore {
        inner: InMemoryProductMetricsStore,
        conflicts_left: AtomicU32,
    }

    impl ContendedStore {
        fn new(inner: InMemoryProductMetricsStore, conflicts: u32) -> Self {
            Self {
                inner,
                conflicts_left: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl ProductMetricsStore for ContendedStore {
        async fn find(&self, product_id: i64) -> Result<Option<ProductMetrics>, MetricsError> {
            self.inner.find(product_id).await
        }

        async fn save(&self, metrics: &ProductMetrics) -> Result<(), MetricsError> {
            if self.conflicts_left.load(Ordering::SeqCst) > 0 {
                self.conflicts_left.fetch_sub(1, Ordering::SeqCst);
                return Err(MetricsError::Conflict(metrics.product_id));
            }
            self.inner.save(metrics).await
        }
    }

    #[tokio::test]
    async fn test_version_conflict_retry() {
        let shared = InMemoryProductMetricsStore::new();
        let service = ProductMetricsService::new(ContendedStore::new(shared.clone(), 2));

        let outcome = service.apply_like_added(1, at(10)).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        // Two conflicted attempts left nothing behind; the third wrote once.
        let metrics = shared.get(1).unwrap().unwrap();
        assert_eq!(metrics.like_count, 1);
    }

    #[tokio::test]
    async fn test_conflict_retries_bounded() {
        let shared = InMemoryProductMetricsStore::new();
        let service = ProductMetricsService::new(ContendedStore::new(shared.clone(), u32::MAX));

        let err = service.apply_like_added(1, at(10)).await.unwrap_err();
        assert!(matches!(err, MetricsError::Conflict(1)));
        assert!(shared.get(1).unwrap().is_none());
    }
}
