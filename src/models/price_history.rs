use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::generate_id;

/// One entry of a product's append-only price log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PriceObservation {
    pub id: String,
    pub product_id: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    /// `previous` is the latest existing observation time for the product;
    /// the new timestamp never goes behind it.
    pub fn new(product_id: &str, price: f64, previous: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        let observed_at = match previous {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        Self {
            id: generate_id(),
            product_id: product_id.to_string(),
            price,
            observed_at,
        }
    }
}
