// Shared fixtures for the integration suite: scripted extractors, a
// recording transport and a manager wired to an in-memory store.

pub mod fetch_tests;
pub mod notification_tests;
pub mod scheduler_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use dropwatch::batcher::NotificationBatcher;
use dropwatch::config::MonitorConfig;
use dropwatch::fetcher::{FetchOrchestrator, FetchPolicy};
use dropwatch::models::{AddProductRequest, ExtractorKind, PendingDrop, ProductSnapshot};
use dropwatch::plugins::{NotificationTransport, PageExtractor};
use dropwatch::site_profile::SiteCatalog;
use dropwatch::store::SqliteStore;
use dropwatch::{AppConfig, AppError, ProductManager};

pub const HEADPHONES_URL: &str = "https://www.amazon.in/dp/B0CHX1W1XY";

pub fn product_url(n: usize) -> String {
    format!("https://www.amazon.in/dp/B0TEST{:04}", n)
}

/// Extractor that replays queued prices per URL. An empty queue, or a
/// queued `None`, is an extraction failure.
pub struct ScriptedExtractor {
    kind: ExtractorKind,
    script: Mutex<HashMap<String, VecDeque<Option<f64>>>>,
    calls: Mutex<Vec<String>>,
    releases: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl ScriptedExtractor {
    pub fn new(kind: ExtractorKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            gate: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        })
    }

    pub fn push(&self, url: &str, price: Option<f64>) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(price);
    }

    pub fn push_prices(&self, url: &str, prices: &[f64]) {
        for price in prices {
            self.push(url, Some(*price));
        }
    }

    /// Hold every following extraction until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once an extraction is waiting on the gate.
    pub fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    fn kind(&self) -> ExtractorKind {
        self.kind
    }

    async fn extract(&self, url: &str) -> dropwatch::Result<ProductSnapshot> {
        self.calls.lock().unwrap().push(url.to_string());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .flatten();

        match next {
            Some(price) => Ok(ProductSnapshot {
                title: format!("Product at {}", url),
                price,
                site_id: "amazon".to_string(),
            }),
            None => Err(AppError::element_not_found("price", url)),
        }
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport that records what it was asked to send.
pub struct RecordingTransport {
    pub singles: Mutex<Vec<String>>,
    pub summaries: Mutex<Vec<usize>>,
    succeed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            singles: Mutex::new(Vec::new()),
            summaries: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(true),
        })
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn single_count(&self) -> usize {
        self.singles.lock().unwrap().len()
    }

    pub fn summary_sizes(&self) -> Vec<usize> {
        self.summaries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_one(&self, drop: &PendingDrop) -> bool {
        self.singles.lock().unwrap().push(drop.product_name.clone());
        self.succeed.load(Ordering::SeqCst)
    }

    async fn send_summary(&self, drops: &[PendingDrop]) -> bool {
        self.summaries.lock().unwrap().push(drops.len());
        self.succeed.load(Ordering::SeqCst)
    }
}

pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub static_extractor: Arc<ScriptedExtractor>,
    pub rendered_extractor: Arc<ScriptedExtractor>,
    pub transport: Arc<RecordingTransport>,
    pub manager: Arc<ProductManager>,
}

pub fn test_policy(max_retries: u32) -> FetchPolicy {
    FetchPolicy {
        max_retries,
        retry_delay: Duration::from_millis(5),
        preferred: ExtractorKind::Static,
    }
}

pub fn test_monitor_config() -> MonitorConfig {
    MonitorConfig {
        inter_check_delay_ms: 1,
        default_check_interval: 3600,
        batch_size: 5,
        history_days: 30,
    }
}

/// Built-in defaults trimmed down for fast tests.
pub fn get_test_config() -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::defaults()?;
    config.database.url = "sqlite::memory:".to_string();
    config.scraper.max_retries = 1;
    config.scraper.retry_delay_ms = 5;
    config.monitor = test_monitor_config();
    config.scheduler.cycle_interval = 3600;
    config.scheduler.run_on_start = false;
    Ok(config)
}

pub async fn create_harness() -> anyhow::Result<TestHarness> {
    create_harness_with(test_policy(3)).await
}

pub async fn create_harness_with(policy: FetchPolicy) -> anyhow::Result<TestHarness> {
    let store = Arc::new(SqliteStore::in_memory().await?);
    let static_extractor = ScriptedExtractor::new(ExtractorKind::Static);
    let rendered_extractor = ScriptedExtractor::new(ExtractorKind::Rendered);
    let transport = RecordingTransport::new();

    let fetcher = FetchOrchestrator::new(
        static_extractor.clone(),
        rendered_extractor.clone(),
        Arc::new(SiteCatalog::builtin()),
        policy,
    );
    let batcher = NotificationBatcher::new(transport.clone(), test_monitor_config().batch_size);
    let manager = Arc::new(ProductManager::new(
        store.clone(),
        fetcher,
        batcher,
        test_monitor_config(),
    ));

    Ok(TestHarness {
        store,
        static_extractor,
        rendered_extractor,
        transport,
        manager,
    })
}

pub fn add_request(url: &str, threshold_price: f64) -> AddProductRequest {
    AddProductRequest {
        url: url.to_string(),
        threshold_price,
        name: None,
        check_interval: None,
    }
}

impl TestHarness {
    /// Track `url` with the static extractor reporting `initial` on the
    /// first fetch.
    pub async fn track(&self, url: &str, initial: f64, threshold: f64) -> anyhow::Result<String> {
        self.static_extractor.push(url, Some(initial));
        let product = self.manager.add_product(add_request(url, threshold)).await?;
        Ok(product.id)
    }

    pub async fn pending_count(&self) -> anyhow::Result<usize> {
        use dropwatch::store::ProductStore;
        Ok(self.store.pending_drops().await?.len())
    }
}

/// Poll until `condition` holds or the timeout passes.
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}
