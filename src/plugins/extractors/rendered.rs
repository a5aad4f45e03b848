use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};

use crate::config::ScraperConfig;
use crate::models::{ExtractorKind, ProductSnapshot};
use crate::plugins::extractors::request_headers;
use crate::plugins::traits::{first_price, first_title, PageExtractor};
use crate::site_profile::SiteCatalog;
use crate::utils::error::{AppError, Result};

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Loads pages in headless Chrome so script-rendered prices are visible.
///
/// The browser is launched on first use and kept for later extractions until
/// `release` is called, which terminates the Chrome process.
pub struct RenderedExtractor {
    inner: Arc<BrowserSession>,
}

struct BrowserSession {
    config: ScraperConfig,
    catalog: Arc<SiteCatalog>,
    browser: Mutex<Option<Browser>>,
}

/// Closes the tab on every exit path.
struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            tracing::debug!("Failed to close tab: {}", e);
        }
    }
}

fn browser_error(context: &str) -> impl Fn(anyhow::Error) -> AppError + '_ {
    move |e| AppError::Browser(format!("{}: {}", context, e))
}

impl RenderedExtractor {
    pub fn new(config: &ScraperConfig, catalog: Arc<SiteCatalog>) -> Self {
        Self {
            inner: Arc::new(BrowserSession {
                config: config.clone(),
                catalog,
                browser: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .browser
            .lock()
            .map(|browser| browser.is_some())
            .unwrap_or(false)
    }
}

impl BrowserSession {
    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some(WINDOW_SIZE))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }

    fn open_tab(&self) -> Result<Arc<Tab>> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| AppError::Internal("browser session lock poisoned".to_string()))?;

        if guard.is_none() {
            tracing::info!("Launching headless browser");
            let browser = Browser::new(self.launch_options()?).map_err(browser_error("Failed to launch browser"))?;
            *guard = Some(browser);
        }

        let tab = match guard.as_ref() {
            Some(browser) => browser.new_tab(),
            None => return Err(AppError::Internal("browser missing after launch".to_string())),
        };

        match tab {
            Ok(tab) => Ok(tab),
            Err(e) => {
                // A dead browser is relaunched on the next attempt.
                guard.take();
                Err(AppError::Browser(format!("Failed to create tab: {}", e)))
            }
        }
    }

    fn extract_blocking(&self, url: &str) -> Result<ProductSnapshot> {
        let profile = self.catalog.resolve(url)?.clone();

        tracing::info!("Fetching {} with rendered extractor", url);
        let tab = self.open_tab()?;
        let _guard = TabGuard(Arc::clone(&tab));

        tab.set_default_timeout(self.config.navigation_timeout());
        tab.set_user_agent(&self.config.user_agent, Some(&self.config.accept_language), None)
            .map_err(browser_error("Failed to set user agent"))?;

        let headers = request_headers(&self.config);
        let extra: HashMap<&str, &str> = headers
            .iter()
            .filter(|(name, _)| *name != reqwest::header::USER_AGENT && *name != reqwest::header::CONNECTION)
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        tab.set_extra_http_headers(extra)
            .map_err(browser_error("Failed to set request headers"))?;

        tab.navigate_to(url).map_err(browser_error("Navigation failed"))?;
        tab.wait_until_navigated().map_err(browser_error("Page load failed"))?;

        // Deferred scripts keep filling in prices after the load event.
        std::thread::sleep(self.config.render_settle());

        let query = |selector: &str| -> Option<String> {
            tab.find_element(selector)
                .and_then(|element| element.get_inner_text())
                .ok()
        };

        let Some(title) = first_title(&profile.title_selectors, &query) else {
            tracing::warn!("Could not extract product title from {}", url);
            return Err(AppError::element_not_found("title", url));
        };

        let Some(price) = first_price(&profile.price_selectors, &query) else {
            tracing::warn!("Could not extract price from {}", url);
            return Err(AppError::element_not_found("price", url));
        };

        Ok(ProductSnapshot {
            title,
            price,
            site_id: profile.id,
        })
    }

    fn shutdown(&self) -> Option<Browser> {
        match self.browser.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl PageExtractor for RenderedExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Rendered
    }

    async fn extract(&self, url: &str) -> Result<ProductSnapshot> {
        let session = Arc::clone(&self.inner);
        let url = url.to_string();

        tokio::task::spawn_blocking(move || session.extract_blocking(&url))
            .await
            .map_err(|e| AppError::Internal(format!("Rendered extraction task failed: {}", e)))?
    }

    async fn release(&self) {
        if let Some(browser) = self.inner.shutdown() {
            // Dropping the browser kills the Chrome process.
            let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
            tracing::info!("Headless browser released");
        }
    }
}
