use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{generate_id, DropEvent, ProductSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TrackedProduct {
    pub id: String,
    pub name: String,
    pub url: String,
    pub site_id: String,
    pub threshold_price: f64,
    /// `None` until the first successful fetch.
    pub current_price: Option<f64>,
    pub is_active: bool,
    /// Seconds between checks.
    pub check_interval: i64,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddProductRequest {
    #[validate(url)]
    pub url: String,
    #[validate(range(min = 0.01))]
    pub threshold_price: f64,
    #[validate(length(min = 1, max = 500))]
    pub name: Option<String>,
    #[validate(range(min = 60))]
    pub check_interval: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 500))]
    pub name: Option<String>,
    #[validate(range(min = 0.01))]
    pub threshold_price: Option<f64>,
    #[validate(range(min = 60))]
    pub check_interval: Option<i64>,
}

impl TrackedProduct {
    /// Build the record for a product whose first fetch returned `snapshot`.
    /// The display name falls back to the fetched title.
    pub fn new(request: AddProductRequest, snapshot: &ProductSnapshot, default_interval: i64) -> Self {
        let now = Utc::now();
        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| snapshot.title.clone());

        Self {
            id: generate_id(),
            name,
            url: request.url.trim().to_string(),
            site_id: snapshot.site_id.clone(),
            threshold_price: request.threshold_price,
            current_price: Some(snapshot.price),
            is_active: true,
            check_interval: request.check_interval.unwrap_or(default_interval),
            last_checked: Some(now),
            created_at: now,
        }
    }

    pub fn apply(&mut self, update: ProductUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(threshold_price) = update.threshold_price {
            self.threshold_price = threshold_price;
        }
        if let Some(check_interval) = update.check_interval {
            self.check_interval = check_interval;
        }
    }

    /// A drop fires only when the new price is at or under the threshold and
    /// strictly below the previously stored price. No stored price, no drop.
    pub fn detect_drop(&self, new_price: f64) -> Option<DropEvent> {
        let old_price = self.current_price?;
        if new_price <= self.threshold_price && new_price < old_price {
            DropEvent::new(&self.id, old_price, new_price, self.threshold_price)
        } else {
            None
        }
    }
}
