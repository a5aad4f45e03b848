use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use validator::Validate;

use crate::batcher::{DispatchReport, NotificationBatcher};
use crate::config::MonitorConfig;
use crate::fetcher::{FetchOrchestrator, TestFetchReport};
use crate::models::{AddProductRequest, ExportFormat, PriceObservation, ProductUpdate, TrackedProduct};
use crate::store::{ProductStore, StoreStatistics};
use crate::utils::error::{AppError, Result};

/// Progress of a single product check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckState {
    Idle,
    Fetching,
    Persisting,
    Failed,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckState::Idle => "idle",
            CheckState::Fetching => "fetching",
            CheckState::Persisting => "persisting",
            CheckState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCheckResult {
    pub product_id: String,
    pub product_name: String,
    pub old_price: Option<f64>,
    pub new_price: f64,
    pub threshold_price: f64,
    pub price_dropped: bool,
    pub drop_event_id: Option<String>,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductError {
    pub product_id: String,
    pub product_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub products_checked: usize,
    pub price_drops: usize,
    pub errors: Vec<ProductError>,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub sweep: SweepReport,
    pub notifications_pending: usize,
    pub dispatch: DispatchReport,
    pub marked_delivered: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatistics {
    #[serde(flatten)]
    pub store: StoreStatistics,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryExport {
    pub filename: String,
    pub format: ExportFormat,
    pub observations: usize,
    pub content: String,
}

/// Sequences fetch, persist, compare and notify for every tracked product.
/// All store mutation goes through here.
pub struct ProductManager {
    store: Arc<dyn ProductStore>,
    fetcher: FetchOrchestrator,
    batcher: NotificationBatcher,
    config: MonitorConfig,
}

impl ProductManager {
    pub fn new(
        store: Arc<dyn ProductStore>,
        fetcher: FetchOrchestrator,
        batcher: NotificationBatcher,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            batcher,
            config,
        }
    }

    pub fn fetcher(&self) -> &FetchOrchestrator {
        &self.fetcher
    }

    /// Fetch the product once and start tracking it at the acquired price.
    pub async fn add_product(&self, request: AddProductRequest) -> Result<TrackedProduct> {
        request.validate()?;
        let url = request.url.trim().to_string();

        self.fetcher.catalog().resolve(&url)?;
        if let Some(existing) = self.store.find_by_url(&url).await? {
            return Err(AppError::Validation(format!(
                "{} is already tracked as product {}",
                url, existing.id
            )));
        }

        tracing::info!("Adding product: {} with threshold: {}", url, request.threshold_price);
        let snapshot = self
            .fetcher
            .fetch(&url)
            .await
            .ok_or_else(|| AppError::AcquisitionFailed { url: url.clone() })?;

        let product = TrackedProduct::new(request, &snapshot, self.config.default_check_interval);
        self.store.create_product(&product).await?;

        tracing::info!(
            "Successfully added product: {} (ID: {}) at {}",
            product.name,
            product.id,
            snapshot.price
        );
        Ok(product)
    }

    /// Fetch the current price, persist it and record a drop when the
    /// threshold was just crossed downwards.
    pub async fn check_product(&self, product_id: &str) -> Result<ProductCheckResult> {
        let start_time = Instant::now();
        let product = self.get_product(product_id).await?;
        self.fetcher.catalog().resolve(&product.url)?;

        tracing::debug!("Product {}: {} -> {}", product.id, CheckState::Idle, CheckState::Fetching);
        metrics::counter!("dropwatch_checks_total").increment(1);

        let Some(snapshot) = self.fetcher.fetch(&product.url).await else {
            tracing::debug!("Product {}: {} -> {}", product.id, CheckState::Fetching, CheckState::Failed);
            return Err(AppError::AcquisitionFailed { url: product.url });
        };

        tracing::debug!("Product {}: {} -> {}", product.id, CheckState::Fetching, CheckState::Persisting);
        let new_price = snapshot.price;
        let drop_event = product.detect_drop(new_price);
        self.store
            .record_price(&product.id, new_price, drop_event.as_ref())
            .await?;

        if let Some(event) = &drop_event {
            metrics::counter!("dropwatch_drops_total").increment(1);
            tracing::info!(
                "Price drop detected for {}: {} -> {} (threshold {})",
                product.name,
                event.old_price,
                event.new_price,
                event.threshold_price
            );
        }

        Ok(ProductCheckResult {
            product_id: product.id,
            product_name: product.name,
            old_price: product.current_price,
            new_price,
            threshold_price: product.threshold_price,
            price_dropped: drop_event.is_some(),
            drop_event_id: drop_event.map(|e| e.id),
            total_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Check every active product, least recently checked first. One
    /// product's failure is recorded and the sweep moves on.
    pub async fn check_all(&self) -> Result<SweepReport> {
        let start_time = Instant::now();
        let products = self.store.list_products(true).await?;
        let mut report = SweepReport::default();

        if products.is_empty() {
            tracing::info!("No active products to check");
            return Ok(report);
        }

        tracing::info!("Checking prices for {} products", products.len());
        for (index, product) in products.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.inter_check_delay()).await;
            }

            match self.check_product(&product.id).await {
                Ok(result) => {
                    report.products_checked += 1;
                    if result.price_dropped {
                        report.price_drops += 1;
                    }
                }
                Err(e) => {
                    tracing::error!("Error checking product {}: {}", product.name, e);
                    report.errors.push(ProductError {
                        product_id: product.id.clone(),
                        product_name: product.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.total_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Price check completed: {} checked, {} drops, {} errors",
            report.products_checked,
            report.price_drops,
            report.errors.len()
        );
        Ok(report)
    }

    /// Hand every undelivered drop to the batcher and mark the confirmed ones.
    pub async fn process_notifications(&self) -> Result<(usize, DispatchReport, u64)> {
        let pending = self.store.pending_drops().await?;
        if pending.is_empty() {
            tracing::info!("No pending notifications to process");
            return Ok((0, DispatchReport::default(), 0));
        }

        tracing::info!("Processing {} pending notifications", pending.len());
        let dispatch = self.batcher.dispatch(&pending).await;
        let marked = self.store.mark_delivered(&dispatch.delivered_ids).await?;
        Ok((pending.len(), dispatch, marked))
    }

    /// Full cycle: sweep, then notify. The browser session is released
    /// whatever the outcome.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        tracing::info!("Starting price check cycle");
        let outcome = self.run_cycle_inner().await;
        self.fetcher.release().await;

        match &outcome {
            Ok(report) => tracing::info!(
                "Price check cycle completed: {} checked, {} drops, {} notifications delivered",
                report.sweep.products_checked,
                report.sweep.price_drops,
                report.marked_delivered
            ),
            Err(e) => tracing::error!("Error in price check cycle: {}", e),
        }
        outcome
    }

    async fn run_cycle_inner(&self) -> Result<CycleReport> {
        let sweep = self.check_all().await?;
        let (notifications_pending, dispatch, marked_delivered) = self.process_notifications().await?;
        Ok(CycleReport {
            sweep,
            notifications_pending,
            dispatch,
            marked_delivered,
        })
    }

    pub async fn get_product(&self, product_id: &str) -> Result<TrackedProduct> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("product {}", product_id),
            })
    }

    pub async fn list_products(&self, include_inactive: bool) -> Result<Vec<TrackedProduct>> {
        self.store.list_products(!include_inactive).await
    }

    pub async fn update_product(&self, product_id: &str, update: ProductUpdate) -> Result<TrackedProduct> {
        update.validate()?;
        let mut product = self.get_product(product_id).await?;
        product.apply(update);
        self.store.update_product(&product).await?;
        tracing::info!("Updated product {}", product.id);
        Ok(product)
    }

    /// Soft delete: history stays, the product leaves the sweep.
    pub async fn deactivate_product(&self, product_id: &str) -> Result<()> {
        if !self.store.deactivate_product(product_id).await? {
            return Err(AppError::NotFound {
                resource: format!("product {}", product_id),
            });
        }
        tracing::info!("Deactivated product {}", product_id);
        Ok(())
    }

    pub async fn price_history(&self, product_id: &str, days: Option<u32>) -> Result<Vec<PriceObservation>> {
        self.get_product(product_id).await?;
        self.store.price_history(product_id, days).await
    }

    pub async fn export_history(
        &self,
        product_id: &str,
        format: ExportFormat,
        days: Option<u32>,
    ) -> Result<HistoryExport> {
        let days = days.or(Some(self.config.history_days));
        let history = self.price_history(product_id, days).await?;

        let content = match format {
            ExportFormat::Csv => history_csv(&history)?,
            ExportFormat::Json => serde_json::to_string_pretty(&history)?,
        };

        Ok(HistoryExport {
            filename: format!("price_history_{}.{}", product_id, format.extension()),
            format,
            observations: history.len(),
            content,
        })
    }

    pub async fn statistics(&self) -> Result<MonitorStatistics> {
        Ok(MonitorStatistics {
            store: self.store.statistics().await?,
            generated_at: Utc::now(),
        })
    }

    pub async fn test_fetch(&self, url: &str) -> Result<TestFetchReport> {
        let report = self.fetcher.test_fetch(url.trim()).await;
        self.fetcher.release().await;
        report
    }

    pub async fn shutdown(&self) {
        self.fetcher.release().await;
    }
}

fn history_csv(history: &[PriceObservation]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Price"])?;
    for observation in history {
        writer.write_record([
            observation.observed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            observation.price.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV export: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export is not UTF-8: {}", e)))
}
