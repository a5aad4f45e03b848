// Page extractor implementations
pub mod rendered;
pub mod static_fetch;

pub use rendered::RenderedExtractor;
pub use static_fetch::StaticExtractor;

use reqwest::header::{self, HeaderName};

use crate::config::ScraperConfig;

pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Descriptive browser-like header set sent by both extractors.
pub fn request_headers(config: &ScraperConfig) -> Vec<(HeaderName, String)> {
    vec![
        (header::USER_AGENT, config.user_agent.clone()),
        (header::ACCEPT, ACCEPT_HTML.to_string()),
        (header::ACCEPT_LANGUAGE, config.accept_language.clone()),
        (header::CONNECTION, "keep-alive".to_string()),
        (header::UPGRADE_INSECURE_REQUESTS, "1".to_string()),
    ]
}
