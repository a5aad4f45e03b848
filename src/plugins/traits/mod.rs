pub mod extractor;
pub mod notifier;

pub use extractor::{first_price, first_title, PageExtractor};
pub use notifier::NotificationTransport;
