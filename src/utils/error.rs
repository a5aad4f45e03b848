use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported site: {host}")]
    UnsupportedSite { host: String },

    #[error("Element not found: {field} on {url}")]
    ElementNotFound { field: String, url: String },

    #[error("Could not acquire product information from {url}")]
    AcquisitionFailed { url: String },

    #[error("Notification transport failed: {transport}: {message}")]
    TransportFailed { transport: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether another attempt (or the other extraction strategy) could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::UnsupportedSite { .. } | AppError::Validation(_))
    }

    pub fn element_not_found(field: &str, url: &str) -> Self {
        AppError::ElementNotFound {
            field: field.to_string(),
            url: url.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
