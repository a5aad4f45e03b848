use std::sync::Arc;

use crate::batcher::NotificationBatcher;
use crate::config::AppConfig;
use crate::fetcher::{FetchOrchestrator, FetchPolicy};
use crate::plugins::extractors::{RenderedExtractor, StaticExtractor};
use crate::plugins::notifiers::EmailTransport;
use crate::product_manager::ProductManager;
use crate::scheduler::MonitorScheduler;
use crate::site_profile::SiteCatalog;
use crate::store::SqliteStore;
use crate::utils::error::Result;

/// Fully wired application: store, extractors, transport and manager.
pub struct App {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub email: Arc<EmailTransport>,
    pub manager: Arc<ProductManager>,
}

impl App {
    pub async fn build(config: AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::connect(&config.database.url, config.database.max_connections).await?);
        Self::with_store(config, store)
    }

    /// Wire everything around an already opened store.
    pub fn with_store(config: AppConfig, store: Arc<SqliteStore>) -> Result<Self> {
        let catalog = Arc::new(SiteCatalog::with_extra(config.sites.clone()));
        tracing::debug!("Loaded {} site profiles", catalog.profiles().len());

        let static_extractor = Arc::new(StaticExtractor::new(&config.scraper, Arc::clone(&catalog))?);
        let rendered_extractor = Arc::new(RenderedExtractor::new(&config.scraper, Arc::clone(&catalog)));
        let fetcher = FetchOrchestrator::new(
            static_extractor,
            rendered_extractor,
            catalog,
            FetchPolicy::from_config(&config.scraper),
        );

        let email = Arc::new(EmailTransport::new(config.notifications.smtp.clone()));
        let batcher = NotificationBatcher::new(email.clone(), config.monitor.batch_size);

        let manager = Arc::new(ProductManager::new(
            store.clone(),
            fetcher,
            batcher,
            config.monitor.clone(),
        ));

        Ok(Self {
            config,
            store,
            email,
            manager,
        })
    }

    pub fn scheduler(&self) -> MonitorScheduler {
        MonitorScheduler::new(Arc::clone(&self.manager), self.config.scheduler.clone())
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        self.store.close().await;
    }
}
