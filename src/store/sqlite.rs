use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::models::{DropEvent, PendingDrop, PriceObservation, TrackedProduct};
use crate::store::{history_cutoff, ProductStore, StoreStatistics};
use crate::utils::error::{AppError, Result};

const PRODUCT_COLUMNS: &str = "id, name, url, site_id, threshold_price, current_price, is_active, \
     check_interval, last_checked, created_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database; a single pooled connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn round_percent(value: f64) -> f64 {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(2).normalize().to_string())
        .and_then(|s| f64::from_str(&s).ok())
        .unwrap_or(0.0)
}

#[async_trait]
impl ProductStore for SqliteStore {
    async fn create_product(&self, product: &TrackedProduct) -> Result<()> {
        let first_price = product.current_price.ok_or_else(|| {
            AppError::Validation("a new product needs an acquired price".to_string())
        })?;
        let observation = PriceObservation::new(&product.id, first_price, None);
        let last_checked = product.last_checked.unwrap_or(observation.observed_at);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO products
            (id, name, url, site_id, threshold_price, current_price, is_active, check_interval, last_checked, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.url)
        .bind(&product.site_id)
        .bind(product.threshold_price)
        .bind(first_price)
        .bind(product.is_active)
        .bind(product.check_interval)
        .bind(last_checked)
        .bind(product.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &inserted {
            if db_err.is_unique_violation() {
                return Err(AppError::Validation(format!(
                    "product URL is already tracked: {}",
                    product.url
                )));
            }
        }
        inserted?;

        sqlx::query("INSERT INTO price_observations (id, product_id, price, observed_at) VALUES (?, ?, ?, ?)")
            .bind(&observation.id)
            .bind(&observation.product_id)
            .bind(observation.price)
            .bind(observation.observed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!("Stored product {} ({})", product.id, product.url);
        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<TrackedProduct>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, TrackedProduct>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<TrackedProduct>> {
        let sql = format!("SELECT {} FROM products WHERE url = ?", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, TrackedProduct>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_products(&self, active_only: bool) -> Result<Vec<TrackedProduct>> {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let sql = format!(
            "SELECT {} FROM products {} ORDER BY last_checked ASC, created_at ASC",
            PRODUCT_COLUMNS, filter
        );
        let products = sqlx::query_as::<_, TrackedProduct>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn update_product(&self, product: &TrackedProduct) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET name = ?, threshold_price = ?, check_interval = ?, is_active = ?
            WHERE id = ?
            ",
        )
        .bind(&product.name)
        .bind(product.threshold_price)
        .bind(product.check_interval)
        .bind(product.is_active)
        .bind(&product.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("product {}", product.id),
            });
        }
        Ok(())
    }

    async fn deactivate_product(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_price(
        &self,
        product_id: &str,
        price: f64,
        drop: Option<&DropEvent>,
    ) -> Result<PriceObservation> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<DateTime<Utc>> = sqlx::query_scalar(
            r"
            SELECT observed_at FROM price_observations
            WHERE product_id = ?
            ORDER BY observed_at DESC
            LIMIT 1
            ",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let observation = PriceObservation::new(product_id, price, previous);

        let updated = sqlx::query("UPDATE products SET current_price = ?, last_checked = ? WHERE id = ?")
            .bind(price)
            .bind(observation.observed_at)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("product {}", product_id),
            });
        }

        sqlx::query("INSERT INTO price_observations (id, product_id, price, observed_at) VALUES (?, ?, ?, ?)")
            .bind(&observation.id)
            .bind(&observation.product_id)
            .bind(observation.price)
            .bind(observation.observed_at)
            .execute(&mut *tx)
            .await?;

        if let Some(event) = drop {
            sqlx::query(
                r"
                INSERT INTO drop_events
                (id, product_id, old_price, new_price, threshold_price, delivered, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&event.id)
            .bind(&event.product_id)
            .bind(event.old_price)
            .bind(event.new_price)
            .bind(event.threshold_price)
            .bind(event.delivered)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(observation)
    }

    async fn price_history(&self, product_id: &str, days: Option<u32>) -> Result<Vec<PriceObservation>> {
        let history = match history_cutoff(days) {
            Some(cutoff) => {
                sqlx::query_as::<_, PriceObservation>(
                    r"
                    SELECT id, product_id, price, observed_at FROM price_observations
                    WHERE product_id = ? AND observed_at >= ?
                    ORDER BY observed_at ASC, rowid ASC
                    ",
                )
                .bind(product_id)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PriceObservation>(
                    r"
                    SELECT id, product_id, price, observed_at FROM price_observations
                    WHERE product_id = ?
                    ORDER BY observed_at ASC, rowid ASC
                    ",
                )
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(history)
    }

    async fn pending_drops(&self) -> Result<Vec<PendingDrop>> {
        let pending = sqlx::query_as::<_, PendingDrop>(
            r"
            SELECT e.id, e.product_id, e.old_price, e.new_price, e.threshold_price,
                   e.delivered, e.created_at, p.name AS product_name, p.url
            FROM drop_events e
            JOIN products p ON p.id = e.product_id
            WHERE e.delivered = 0
            ORDER BY e.created_at ASC, e.rowid ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn mark_delivered(&self, event_ids: &[String]) -> Result<u64> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;
        for id in event_ids {
            let result = sqlx::query("UPDATE drop_events SET delivered = 1 WHERE id = ? AND delivered = 0")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            marked += result.rows_affected();
        }
        tx.commit().await?;
        Ok(marked)
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let active_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        let products_with_drops: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT product_id) FROM drop_events WHERE delivered = 1")
                .fetch_one(&self.pool)
                .await?;

        let notifications_sent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drop_events WHERE delivered = 1")
            .fetch_one(&self.pool)
            .await?;

        let pending_notifications: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM drop_events WHERE delivered = 0")
                .fetch_one(&self.pool)
                .await?;

        let average: Option<f64> = sqlx::query_scalar(
            "SELECT AVG((old_price - new_price) / old_price * 100.0) FROM drop_events WHERE delivered = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStatistics {
            active_products,
            products_with_drops,
            notifications_sent,
            pending_notifications,
            average_drop_percent: average.map(round_percent).unwrap_or(0.0),
        })
    }
}
