//! Known storefronts and the selectors used to read them.
//!
//! Selector order is significant: each list is walked front to back and the
//! first usable match wins. When a storefront changes its markup, add the new
//! selector in front rather than replacing the old one.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::error::{AppError, Result};

pub const AMAZON: &str = "amazon";
pub const FLIPKART: &str = "flipkart";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteProfile {
    pub id: String,
    /// Matched case-insensitively as substrings of the URL host.
    pub domain_tokens: Vec<String>,
    pub title_selectors: Vec<String>,
    pub price_selectors: Vec<String>,
}

impl SiteProfile {
    pub fn amazon() -> Self {
        Self {
            id: AMAZON.to_string(),
            domain_tokens: strings(&["amazon", "amzn"]),
            title_selectors: strings(&["span#productTitle", "h1#title", "#productTitle"]),
            price_selectors: strings(&[
                "span.a-price-whole",
                "span.a-offscreen",
                "span.a-price span.a-offscreen",
                ".a-price .a-offscreen",
            ]),
        }
    }

    pub fn flipkart() -> Self {
        Self {
            id: FLIPKART.to_string(),
            domain_tokens: strings(&["flipkart"]),
            title_selectors: strings(&["span.B_NuCI", "h1._10Ermw", "h1[class*=\"title\"]"]),
            price_selectors: strings(&["div._30jeq3._16Jk6d", "div._1_WHN1", "span._16Jk6d"]),
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        self.domain_tokens
            .iter()
            .any(|token| host.contains(&token.to_lowercase()))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Ordered set of site profiles. Earlier profiles win when several match.
#[derive(Debug, Clone)]
pub struct SiteCatalog {
    profiles: Vec<SiteProfile>,
}

impl Default for SiteCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteCatalog {
    pub fn builtin() -> Self {
        Self {
            profiles: vec![SiteProfile::amazon(), SiteProfile::flipkart()],
        }
    }

    /// Built-in profiles followed by `extra`.
    pub fn with_extra(extra: impl IntoIterator<Item = SiteProfile>) -> Self {
        let mut catalog = Self::builtin();
        catalog.profiles.extend(extra);
        catalog
    }

    pub fn profiles(&self) -> &[SiteProfile] {
        &self.profiles
    }

    /// Map a product URL to its site profile. Pure: no network access.
    pub fn resolve(&self, url: &str) -> Result<&SiteProfile> {
        let host = product_host(url)?;
        self.profiles
            .iter()
            .find(|profile| profile.matches_host(&host))
            .ok_or(AppError::UnsupportedSite { host })
    }

    pub fn resolve_id(&self, url: &str) -> Result<String> {
        self.resolve(url).map(|profile| profile.id.clone())
    }
}

/// Lowercased host of an http(s) URL.
fn product_host(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim()).map_err(|_| AppError::UnsupportedSite {
        host: url.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::UnsupportedSite {
            host: format!("{} (only http and https URLs are supported)", url),
        });
    }

    parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| AppError::UnsupportedSite {
            host: url.to_string(),
        })
}
