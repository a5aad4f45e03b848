use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::PendingDrop;
use crate::plugins::traits::NotificationTransport;

pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchReport {
    pub individual_sent: usize,
    pub summary_sent: usize,
    pub failed: usize,
    /// Events whose delivery the transport confirmed.
    pub delivered_ids: Vec<String>,
}

/// Chooses between one alert per drop and a single summary, by volume only.
pub struct NotificationBatcher {
    transport: Arc<dyn NotificationTransport>,
    batch_size: usize,
}

impl NotificationBatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>, batch_size: usize) -> Self {
        Self {
            transport,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn dispatch(&self, drops: &[PendingDrop]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if drops.is_empty() {
            return report;
        }

        if drops.len() > self.batch_size {
            tracing::info!(
                "Sending one summary for {} price drops via {}",
                drops.len(),
                self.transport.name()
            );
            if self.transport.send_summary(drops).await {
                report.summary_sent = 1;
                report.delivered_ids = drops.iter().map(|d| d.event.id.clone()).collect();
                metrics::counter!("dropwatch_notifications_total", "mode" => "summary").increment(1);
            } else {
                tracing::error!("Summary notification for {} drops was not delivered", drops.len());
                report.failed = 1;
            }
            return report;
        }

        for drop in drops {
            if self.transport.send_one(drop).await {
                report.individual_sent += 1;
                report.delivered_ids.push(drop.event.id.clone());
                metrics::counter!("dropwatch_notifications_total", "mode" => "individual").increment(1);
            } else {
                tracing::error!(
                    "Notification for {} ({}) was not delivered",
                    drop.product_name,
                    drop.event.id
                );
                report.failed += 1;
            }
        }

        report
    }
}
