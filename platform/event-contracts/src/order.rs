//! Completed-order events carried on the order topic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainEvent, ORDER_TOPIC};

/// One line of a completed order
///
/// Amounts are integer minor units (e.g. cents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_minor: i64,
}

/// An event about one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: i64,
    pub user_id: i64,
    pub order_items: Vec<OrderItem>,
    pub total_amount_minor: i64,
    pub final_amount_minor: i64,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: OrderEventKind,
}

/// The closed set of order event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum OrderEventKind {
    OrderCompleted,
}

impl OrderEvent {
    /// An order finished payment and was confirmed
    pub fn completed(
        order_id: i64,
        user_id: i64,
        order_items: Vec<OrderItem>,
        total_amount_minor: i64,
        final_amount_minor: i64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            user_id,
            order_items,
            total_amount_minor,
            final_amount_minor,
            occurred_at: Utc::now(),
            kind: OrderEventKind::OrderCompleted,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn event_type(&self) -> &'static str {
        match self.kind {
            OrderEventKind::OrderCompleted => "OrderCompleted",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Order"
    }

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn topic(&self) -> &'static str {
        ORDER_TOPIC
    }
}
