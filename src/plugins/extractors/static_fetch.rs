use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::config::ScraperConfig;
use crate::models::{ExtractorKind, ProductSnapshot};
use crate::plugins::extractors::request_headers;
use crate::plugins::traits::{first_price, first_title, PageExtractor};
use crate::site_profile::{SiteCatalog, SiteProfile};
use crate::utils::error::{AppError, Result};

/// Plain HTTP GET followed by static HTML parsing.
pub struct StaticExtractor {
    client: reqwest::Client,
    catalog: Arc<SiteCatalog>,
}

impl StaticExtractor {
    pub fn new(config: &ScraperConfig, catalog: Arc<SiteCatalog>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in request_headers(config) {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| AppError::Validation(format!("Invalid {} header: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, catalog })
    }
}

#[async_trait]
impl PageExtractor for StaticExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Static
    }

    async fn extract(&self, url: &str) -> Result<ProductSnapshot> {
        let profile = self.catalog.resolve(url)?;

        tracing::info!("Fetching {} with static extractor", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        extract_from_html(&body, profile, url)
    }
}

/// Walk the profile's selector lists over a parsed document. Selectors that
/// fail to parse are skipped like selectors that match nothing.
pub fn extract_from_html(html: &str, profile: &SiteProfile, url: &str) -> Result<ProductSnapshot> {
    let document = Html::parse_document(html);

    let query = |selector: &str| -> Option<String> {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Skipping invalid selector '{}': {:?}", selector, e);
                return None;
            }
        };
        document
            .select(&parsed)
            .next()
            .map(|element| element.text().collect::<String>())
    };

    let title = first_title(&profile.title_selectors, &query);
    let Some(title) = title else {
        tracing::warn!("Could not extract product title from {}", url);
        return Err(AppError::element_not_found("title", url));
    };

    let price = first_price(&profile.price_selectors, &query);
    let Some(price) = price else {
        tracing::warn!("Could not extract price from {}", url);
        return Err(AppError::element_not_found("price", url));
    };

    Ok(ProductSnapshot {
        title,
        price,
        site_id: profile.id.clone(),
    })
}
