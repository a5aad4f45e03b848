//! Retry and fallback around the two page extractors.
//!
//! One attempt runs the preferred extractor and, if that fails, the other one.
//! Attempts repeat with a fixed pause until the budget is spent. Callers only
//! ever see a snapshot or `None`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use crate::config::ScraperConfig;
use crate::models::{ExtractorKind, ProductSnapshot};
use crate::plugins::traits::PageExtractor;
use crate::site_profile::SiteCatalog;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPolicy {
    /// Total attempts, each of which may try both extractors.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub preferred: ExtractorKind,
}

impl FetchPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            preferred: if config.prefer_rendered {
                ExtractorKind::Rendered
            } else {
                ExtractorKind::Static
            },
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            preferred: ExtractorKind::Static,
        }
    }
}

/// Result of running one extractor during a test fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub kind: ExtractorKind,
    pub success: bool,
    pub snapshot: Option<ProductSnapshot>,
    pub error: Option<String>,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFetchReport {
    pub url: String,
    pub site_id: String,
    pub static_fetch: VariantOutcome,
    pub rendered: VariantOutcome,
    /// Static when it works, rendered otherwise, `None` if neither did.
    pub recommended: Option<ExtractorKind>,
}

pub struct FetchOrchestrator {
    static_extractor: Arc<dyn PageExtractor>,
    rendered_extractor: Arc<dyn PageExtractor>,
    catalog: Arc<SiteCatalog>,
    policy: FetchPolicy,
}

impl FetchOrchestrator {
    pub fn new(
        static_extractor: Arc<dyn PageExtractor>,
        rendered_extractor: Arc<dyn PageExtractor>,
        catalog: Arc<SiteCatalog>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            static_extractor,
            rendered_extractor,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn catalog(&self) -> &SiteCatalog {
        &self.catalog
    }

    fn extractor(&self, kind: ExtractorKind) -> &dyn PageExtractor {
        match kind {
            ExtractorKind::Static => self.static_extractor.as_ref(),
            ExtractorKind::Rendered => self.rendered_extractor.as_ref(),
        }
    }

    /// Acquire a snapshot using the configured preferred extractor.
    pub async fn fetch(&self, url: &str) -> Option<ProductSnapshot> {
        self.fetch_with_retry(url, self.policy.preferred).await
    }

    /// Never fails: exhaustion and unsupported sites both come back as `None`.
    pub async fn fetch_with_retry(&self, url: &str, preferred: ExtractorKind) -> Option<ProductSnapshot> {
        if let Err(e) = self.catalog.resolve(url) {
            tracing::warn!("Not fetching {}: {}", url, e);
            return None;
        }

        let retries = self.policy.max_retries.max(1) as usize - 1;
        let strategy = FixedInterval::new(self.policy.retry_delay).take(retries);
        let mut attempt = 0u32;

        let result = RetryIf::start(
            strategy,
            || {
                attempt += 1;
                let current = attempt;
                async move {
                    tracing::debug!("Fetch attempt {}/{} for {}", current, self.policy.max_retries, url);
                    self.attempt(url, preferred).await
                }
            },
            |e: &AppError| e.is_retryable(),
        )
        .await;

        match result {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                metrics::counter!("dropwatch_fetch_failures_total").increment(1);
                tracing::error!("Giving up on {} after {} attempts: {}", url, attempt, e);
                None
            }
        }
    }

    /// Preferred extractor, then the other one.
    async fn attempt(&self, url: &str, preferred: ExtractorKind) -> Result<ProductSnapshot> {
        match self.run(preferred, url).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if !e.is_retryable() => Err(e),
            Err(e) => {
                tracing::warn!(
                    "{} extractor failed for {}: {}; falling back to {}",
                    preferred,
                    url,
                    e,
                    preferred.other()
                );
                self.run(preferred.other(), url).await
            }
        }
    }

    async fn run(&self, kind: ExtractorKind, url: &str) -> Result<ProductSnapshot> {
        metrics::counter!("dropwatch_fetch_attempts_total", "extractor" => kind.as_str()).increment(1);
        let snapshot = self.extractor(kind).extract(url).await?;
        tracing::info!(
            "{} extractor read '{}' at {} from {}",
            kind,
            snapshot.title,
            snapshot.price,
            url
        );
        Ok(snapshot)
    }

    /// Run both extractors once each, without retries.
    pub async fn test_fetch(&self, url: &str) -> Result<TestFetchReport> {
        let site_id = self.catalog.resolve_id(url)?;

        let static_fetch = self.try_once(ExtractorKind::Static, url).await;
        let rendered = self.try_once(ExtractorKind::Rendered, url).await;

        let recommended = if static_fetch.success {
            Some(ExtractorKind::Static)
        } else if rendered.success {
            Some(ExtractorKind::Rendered)
        } else {
            None
        };

        Ok(TestFetchReport {
            url: url.to_string(),
            site_id,
            static_fetch,
            rendered,
            recommended,
        })
    }

    async fn try_once(&self, kind: ExtractorKind, url: &str) -> VariantOutcome {
        let start_time = Instant::now();
        let result = self.extractor(kind).extract(url).await;
        let response_time_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(snapshot) => VariantOutcome {
                kind,
                success: true,
                snapshot: Some(snapshot),
                error: None,
                response_time_ms,
            },
            Err(e) => VariantOutcome {
                kind,
                success: false,
                snapshot: None,
                error: Some(e.to_string()),
                response_time_ms,
            },
        }
    }

    /// Tear down extractor sessions (the headless browser).
    pub async fn release(&self) {
        self.static_extractor.release().await;
        self.rendered_extractor.release().await;
    }
}
