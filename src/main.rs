use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use dropwatch::models::{AddProductRequest, ExportFormat, ProductUpdate, TrackedProduct};
use dropwatch::utils::logging::{init_metrics, init_tracing};
use dropwatch::{App, AppConfig};

#[derive(Parser)]
#[command(name = "dropwatch")]
#[command(version, about = "Track product prices and get an email when they drop")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a product page
    Add {
        url: String,

        /// Alert when the price falls to or below this value
        #[arg(short, long)]
        threshold: f64,

        /// Display name (defaults to the page title)
        #[arg(short, long)]
        name: Option<String>,

        /// Check interval in seconds
        #[arg(long)]
        interval: Option<i64>,
    },

    /// List tracked products
    List {
        /// Include deactivated products
        #[arg(short, long)]
        all: bool,
    },

    /// Change a product's name, threshold or interval
    Update {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        threshold: Option<f64>,

        #[arg(long)]
        interval: Option<i64>,
    },

    /// Stop tracking a product, keeping its history
    Deactivate { id: String },

    /// Check a single product now
    Check { id: String },

    /// Check every active product without sending notifications
    CheckAll,

    /// Check every active product and deliver pending notifications
    RunCycle,

    /// Run cycles on the configured interval until interrupted
    Start,

    /// Show monitoring statistics
    Stats,

    /// Print or export a product's price history
    History {
        id: String,

        /// Only observations from the last N days
        #[arg(short, long)]
        days: Option<u32>,

        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Try both extraction strategies against a URL
    TestFetch { url: String },

    /// Verify SMTP settings by sending a test email
    TestEmail,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_products(products: &[TrackedProduct]) {
    if products.is_empty() {
        println!("No products tracked");
        return;
    }

    for product in products {
        let price = product
            .current_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        let last_checked = product
            .last_checked
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {:<8} {:>10} / {:<10} {:<16} {}{}",
            product.id,
            product.site_id,
            price,
            format!("{:.2}", product.threshold_price),
            last_checked,
            product.name,
            if product.is_active { "" } else { " (inactive)" }
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    let app = App::build(config).await?;
    let outcome = run(&app, cli.command).await;
    app.shutdown().await;
    outcome
}

async fn run(app: &App, command: Commands) -> Result<()> {
    let manager = &app.manager;

    match command {
        Commands::Add {
            url,
            threshold,
            name,
            interval,
        } => {
            let product = manager
                .add_product(AddProductRequest {
                    url,
                    threshold_price: threshold,
                    name,
                    check_interval: interval,
                })
                .await?;
            print_json(&product)?;
        }
        Commands::List { all } => {
            print_products(&manager.list_products(all).await?);
        }
        Commands::Update {
            id,
            name,
            threshold,
            interval,
        } => {
            let product = manager
                .update_product(
                    &id,
                    ProductUpdate {
                        name,
                        threshold_price: threshold,
                        check_interval: interval,
                    },
                )
                .await?;
            print_json(&product)?;
        }
        Commands::Deactivate { id } => {
            manager.deactivate_product(&id).await?;
            println!("Product {} deactivated", id);
        }
        Commands::Check { id } => {
            print_json(&manager.check_product(&id).await?)?;
        }
        Commands::CheckAll => {
            print_json(&manager.check_all().await?)?;
        }
        Commands::RunCycle => {
            print_json(&manager.run_cycle().await?)?;
        }
        Commands::Start => {
            let scheduler = app.scheduler();
            scheduler.start().await?;
            info!("Dropwatch running, press Ctrl+C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.stop().await?;
            print_json(&scheduler.stats().await)?;
        }
        Commands::Stats => {
            print_json(&manager.statistics().await?)?;
        }
        Commands::History {
            id,
            days,
            format,
            output,
        } => {
            let export = manager.export_history(&id, format, days).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &export.content)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} observations to {}", export.observations, path.display());
                }
                None => print!("{}", export.content),
            }
        }
        Commands::TestFetch { url } => {
            print_json(&manager.test_fetch(&url).await?)?;
        }
        Commands::TestEmail => {
            print_json(&app.email.test_connection().await)?;
        }
    }

    Ok(())
}
