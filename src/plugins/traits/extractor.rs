use async_trait::async_trait;

use crate::models::{ExtractorKind, ProductSnapshot};
use crate::price_parser::parse_price;
use crate::utils::error::Result;

/// One way of turning a product page into a title and a price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    /// Fails with `UnsupportedSite` before any network access for unknown
    /// hosts, and with `ElementNotFound` when no selector yields a usable
    /// title or price.
    async fn extract(&self, url: &str) -> Result<ProductSnapshot>;

    /// Drop any long-lived session the extractor holds.
    async fn release(&self) {}
}

/// First selector, in order, whose element has non-empty text.
pub fn first_title<F>(selectors: &[String], mut query: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    selectors
        .iter()
        .filter_map(|selector| query(selector))
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

/// First selector, in order, whose element text parses to a positive price.
pub fn first_price<F>(selectors: &[String], mut query: F) -> Option<f64>
where
    F: FnMut(&str) -> Option<String>,
{
    selectors
        .iter()
        .filter_map(|selector| query(selector))
        .find_map(|text| parse_price(&text))
}
