use async_trait::async_trait;

use crate::models::PendingDrop;

/// Delivery channel for drop alerts. Failures are reported as `false` and
/// never escape as errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Alert for a single drop; `true` once delivery is confirmed.
    async fn send_one(&self, drop: &PendingDrop) -> bool;

    /// One consolidated alert covering every drop in `drops`.
    async fn send_summary(&self, drops: &[PendingDrop]) -> bool;
}
