//! Order consumer behavior against in-memory stores and a scripted cache

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use event_bus::BusMessage;
use event_contracts::{DomainEvent, OrderEvent, OrderItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use streamer_rs::cache::{CacheError, ProductDetailCache};
use streamer_rs::consumer::BatchHandler;
use streamer_rs::ledger::{EventHandleStatus, InMemoryHandledEventStore};
use streamer_rs::metrics::InMemoryProductMetricsStore;
use streamer_rs::{OrderEventConsumer, ProductMetricsService};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn item(product_id: i64, quantity: i64) -> OrderItem {
    OrderItem {
        product_id,
        product_name: format!("Product {}", product_id),
        quantity,
        unit_price_minor: 10_000,
    }
}

fn completed_at(order_id: i64, items: Vec<OrderItem>, occurred_at: DateTime<Utc>) -> OrderEvent {
    let total: i64 = items.iter().map(|i| i.quantity * i.unit_price_minor).sum();
    let mut event = OrderEvent::completed(order_id, 7, items, total, total);
    event.occurred_at = occurred_at;
    event
}

fn delivered(event: &OrderEvent) -> BusMessage {
    BusMessage::new(
        event.topic().to_string(),
        event.aggregate_id(),
        serde_json::to_vec(event).unwrap(),
    )
}

/// Records evictions; flips between succeeding and failing
#[derive(Default)]
struct RecordingCache {
    evicted: Mutex<Vec<i64>>,
    failing: AtomicBool,
}

impl RecordingCache {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn evicted(&self) -> Vec<i64> {
        self.evicted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductDetailCache for RecordingCache {
    async fn evict_product_detail(&self, product_id: i64) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "cache down",
            ))));
        }
        self.evicted.lock().unwrap().push(product_id);
        Ok(())
    }
}

fn consumer_with(
    ledger: InMemoryHandledEventStore,
    store: InMemoryProductMetricsStore,
    cache: Arc<RecordingCache>,
) -> OrderEventConsumer<InMemoryHandledEventStore, InMemoryProductMetricsStore> {
    OrderEventConsumer::new(
        ledger,
        ProductMetricsService::new(store),
        cache as Arc<dyn ProductDetailCache>,
    )
}

#[tokio::test]
async fn test_completed_order_sales_and_eviction() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    let order = completed_at(100, vec![item(1, 2), item(2, 1)], at(1));
    consumer.handle_batch(&[delivered(&order)]).await;

    let first = store.get(1).unwrap().unwrap();
    assert_eq!(first.sales_count, 2);
    assert_eq!(first.last_updated_at, at(1));
    let second = store.get(2).unwrap().unwrap();
    assert_eq!(second.sales_count, 1);

    assert_eq!(cache.evicted(), vec![1, 2]);

    assert_eq!(ledger.count().unwrap(), 1);
    let entry = ledger.get(order.event_id).unwrap().unwrap();
    assert_eq!(entry.status, EventHandleStatus::Success);
    assert_eq!(entry.event_type, "OrderCompleted");
    assert_eq!(entry.aggregate_id, "100");
}

#[tokio::test]
async fn test_redelivered_order_applies_once() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    let order = completed_at(100, vec![item(1, 2), item(2, 1)], at(1));
    consumer.handle_batch(&[delivered(&order)]).await;
    consumer.handle_batch(&[delivered(&order)]).await;

    assert_eq!(store.get(1).unwrap().unwrap().sales_count, 2);
    assert_eq!(store.get(2).unwrap().unwrap().sales_count, 1);
    assert_eq!(cache.evicted(), vec![1, 2]);
    assert_eq!(ledger.count().unwrap(), 1);
}

#[tokio::test]
async fn test_stale_order_recorded_not_applied() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    let recent = completed_at(100, vec![item(1, 1)], at(5));
    consumer.handle_batch(&[delivered(&recent)]).await;
    assert_eq!(cache.evicted(), vec![1]);

    // An older order for the same product arrives late.
    let older = completed_at(99, vec![item(1, 4)], at(3));
    consumer.handle_batch(&[delivered(&older)]).await;

    let metrics = store.get(1).unwrap().unwrap();
    assert_eq!(metrics.sales_count, 1);
    assert_eq!(metrics.last_updated_at, at(5));

    // No fresh eviction, but the stale order is still ledgered.
    assert_eq!(cache.evicted(), vec![1]);
    assert_eq!(ledger.count().unwrap(), 2);
    assert_eq!(
        ledger.get(older.event_id).unwrap().unwrap().status,
        EventHandleStatus::Success
    );
}

#[tokio::test]
async fn test_mixed_staleness_partial_eviction() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    consumer
        .handle_batch(&[delivered(&completed_at(100, vec![item(1, 1)], at(5)))])
        .await;

    // Product 1 is already past this order's time; product 2 is fresh.
    let mixed = completed_at(101, vec![item(1, 4), item(2, 3)], at(4));
    consumer.handle_batch(&[delivered(&mixed)]).await;

    assert_eq!(store.get(1).unwrap().unwrap().sales_count, 1);
    assert_eq!(store.get(2).unwrap().unwrap().sales_count, 3);
    assert_eq!(cache.evicted(), vec![1, 2]);
    assert_eq!(
        ledger.get(mixed.event_id).unwrap().unwrap().status,
        EventHandleStatus::Success
    );
}

#[tokio::test]
async fn test_cache_failure_tolerated() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    cache.set_failing(true);
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    let order = completed_at(100, vec![item(1, 2)], at(1));
    consumer.handle_batch(&[delivered(&order)]).await;

    assert_eq!(store.get(1).unwrap().unwrap().sales_count, 2);
    assert!(cache.evicted().is_empty());
    assert_eq!(
        ledger.get(order.event_id).unwrap().unwrap().status,
        EventHandleStatus::Success
    );
}

#[tokio::test]
async fn test_invalid_quantity_marks_failed() {
    let ledger = InMemoryHandledEventStore::new();
    let store = InMemoryProductMetricsStore::new();
    let cache = RecordingCache::new();
    let consumer = consumer_with(ledger.clone(), store.clone(), cache.clone());

    // The first line applies before the second one is rejected; the order
    // as a whole is parked FAILED and nothing is evicted.
    let broken = completed_at(100, vec![item(1, 2), item(2, 0)], at(1));
    let healthy = completed_at(101, vec![item(3, 1)], at(1));
    consumer
        .handle_batch(&[delivered(&broken), delivered(&healthy)])
        .await;

    assert_eq!(store.get(1).unwrap().unwrap().sales_count, 2);
    assert!(store.get(2).unwrap().is_none());
    assert_eq!(store.get(3).unwrap().unwrap().sales_count, 1);
    assert_eq!(cache.evicted(), vec![3]);

    assert_eq!(ledger.count().unwrap(), 2);
    let failed = ledger.get(broken.event_id).unwrap().unwrap();
    assert_eq!(failed.status, EventHandleStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("positive"));

    // FAILED entries are terminal: redelivery is deduplicated, not retried.
    consumer.handle_batch(&[delivered(&broken)]).await;
    assert_eq!(store.get(1).unwrap().unwrap().sales_count, 2);
    assert_eq!(ledger.count().unwrap(), 2);
}
