//! Per-product interaction events carried on the catalog topic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainEvent, CATALOG_TOPIC};

/// An interaction event about one product
///
/// Common envelope fields live on the struct; the event-specific part is the
/// flattened, internally tagged [`CatalogEventKind`], which keeps the wire
/// shape flat while the Rust side stays a closed union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEvent {
    pub event_id: Uuid,
    pub product_id: i64,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: CatalogEventKind,
}

/// The closed set of catalog event kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum CatalogEventKind {
    #[serde(rename_all = "camelCase")]
    ProductLikeAdded { user_id: i64 },
    #[serde(rename_all = "camelCase")]
    ProductLikeRemoved { user_id: i64 },
    #[serde(rename_all = "camelCase")]
    ProductViewed {
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<i64>,
    },
}

impl CatalogEvent {
    /// A member liked the product
    pub fn like_added(product_id: i64, user_id: i64) -> Self {
        Self::new(product_id, CatalogEventKind::ProductLikeAdded { user_id })
    }

    /// A member withdrew a like
    pub fn like_removed(product_id: i64, user_id: i64) -> Self {
        Self::new(product_id, CatalogEventKind::ProductLikeRemoved { user_id })
    }

    /// The product detail page was viewed (anonymous views carry no user)
    pub fn viewed(product_id: i64, user_id: Option<i64>) -> Self {
        Self::new(product_id, CatalogEventKind::ProductViewed { user_id })
    }

    fn new(product_id: i64, kind: CatalogEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            product_id,
            occurred_at: Utc::now(),
            kind,
        }
    }
}

impl DomainEvent for CatalogEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn event_type(&self) -> &'static str {
        match self.kind {
            CatalogEventKind::ProductLikeAdded { .. } => "ProductLikeAdded",
            CatalogEventKind::ProductLikeRemoved { .. } => "ProductLikeRemoved",
            CatalogEventKind::ProductViewed { .. } => "ProductViewed",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Product"
    }

    fn aggregate_id(&self) -> String {
        self.product_id.to_string()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn topic(&self) -> &'static str {
        CATALOG_TOPIC
    }
}
