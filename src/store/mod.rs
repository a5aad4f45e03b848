use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DropEvent, PendingDrop, PriceObservation, TrackedProduct};
use crate::utils::error::Result;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Aggregates over the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreStatistics {
    pub active_products: i64,
    /// Distinct products with at least one delivered drop.
    pub products_with_drops: i64,
    pub notifications_sent: i64,
    pub pending_notifications: i64,
    /// Mean percentage drop across delivered events, 2 decimals.
    pub average_drop_percent: f64,
}

/// Persistence used by the monitoring orchestrator. Each method is one
/// atomic unit of work.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert a freshly acquired product and its first observation together.
    async fn create_product(&self, product: &TrackedProduct) -> Result<()>;
    async fn get_product(&self, id: &str) -> Result<Option<TrackedProduct>>;
    async fn find_by_url(&self, url: &str) -> Result<Option<TrackedProduct>>;
    /// Ordered by last check, oldest (and never checked) first.
    async fn list_products(&self, active_only: bool) -> Result<Vec<TrackedProduct>>;
    async fn update_product(&self, product: &TrackedProduct) -> Result<()>;
    async fn deactivate_product(&self, id: &str) -> Result<bool>;

    /// Append an observation, move the product's current price and
    /// last-checked time to it, and insert `drop` when given. All of it
    /// commits or none of it does.
    async fn record_price(
        &self,
        product_id: &str,
        price: f64,
        drop: Option<&DropEvent>,
    ) -> Result<PriceObservation>;
    /// Observations in stored order, restricted to the last `days` when given.
    async fn price_history(&self, product_id: &str, days: Option<u32>) -> Result<Vec<PriceObservation>>;

    /// Undelivered drops, oldest first.
    async fn pending_drops(&self) -> Result<Vec<PendingDrop>>;
    async fn mark_delivered(&self, event_ids: &[String]) -> Result<u64>;

    async fn statistics(&self) -> Result<StoreStatistics>;
}

pub(crate) fn history_cutoff(days: Option<u32>) -> Option<DateTime<Utc>> {
    days.map(|d| Utc::now() - chrono::Duration::days(i64::from(d)))
}
