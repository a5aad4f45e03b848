// Notification transport implementations
pub mod email;

pub use email::{EmailTestReport, EmailTransport};
