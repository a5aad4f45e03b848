pub mod app;
pub mod batcher;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod plugins;
pub mod price_parser;
pub mod product_manager;
pub mod scheduler;
pub mod site_profile;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use app::App;
pub use config::AppConfig;
pub use product_manager::ProductManager;
pub use scheduler::MonitorScheduler;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
