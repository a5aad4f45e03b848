use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::generate_id;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct DropEvent {
    pub id: String,
    pub product_id: String,
    pub old_price: f64,
    pub new_price: f64,
    /// Threshold in force when the drop was detected.
    pub threshold_price: f64,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// An undelivered drop together with what a notification needs to show.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PendingDrop {
    #[sqlx(flatten)]
    pub event: DropEvent,
    pub product_name: String,
    pub url: String,
}

impl DropEvent {
    /// `None` unless `new_price < old_price`.
    pub fn new(product_id: &str, old_price: f64, new_price: f64, threshold_price: f64) -> Option<Self> {
        if new_price >= old_price {
            return None;
        }

        Some(Self {
            id: generate_id(),
            product_id: product_id.to_string(),
            old_price,
            new_price,
            threshold_price,
            delivered: false,
            created_at: Utc::now(),
        })
    }

    pub fn drop_amount(&self) -> f64 {
        self.old_price - self.new_price
    }

    pub fn drop_percent(&self) -> f64 {
        if self.old_price <= 0.0 {
            return 0.0;
        }
        self.drop_amount() / self.old_price * 100.0
    }
}
