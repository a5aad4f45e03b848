use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::product_manager::{CycleReport, ProductManager};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub completed_cycles: u64,
    pub failed_cycles: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle_started: Option<DateTime<Utc>>,
    pub last_cycle_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<CycleReport>,
}

/// Periodic driver for `ProductManager::run_cycle`.
///
/// Cycles never overlap. Stopping lets a cycle that is already running
/// finish, skips the next one and releases the browser session.
pub struct MonitorScheduler {
    manager: Arc<ProductManager>,
    config: SchedulerConfig,
    state: Arc<RwLock<SchedulerState>>,
    stats: Arc<RwLock<SchedulerStats>>,
    cycle_lock: Arc<Mutex<()>>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorScheduler {
    pub fn new(manager: Arc<ProductManager>, config: SchedulerConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            manager,
            config,
            state: Arc::new(RwLock::new(SchedulerState::Idle)),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            cycle_lock: Arc::new(Mutex::new(())),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != SchedulerState::Idle {
                return Err(AppError::Validation(format!("Scheduler is {}", *state)));
            }
            *state = SchedulerState::Running;
        }

        self.stop_tx.send_replace(false);
        let stop_rx = self.stop_tx.subscribe();
        self.stats.write().await.started_at = Some(Utc::now());

        let task = tokio::spawn(Self::run_loop(
            Arc::clone(&self.manager),
            self.config.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&self.cycle_lock),
            stop_rx,
        ));
        *self.handle.lock().await = Some(task);

        tracing::info!(
            "Monitor scheduler started (every {}s)",
            self.config.cycle_interval().as_secs()
        );
        Ok(())
    }

    /// Signal the loop and wait for it to wind down.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != SchedulerState::Running {
                return Ok(());
            }
            *state = SchedulerState::Stopping;
        }

        tracing::info!("Stopping monitor scheduler");
        self.stop_tx.send_replace(true);

        let task = self.handle.lock().await.take();
        let joined = match task {
            Some(task) => task.await,
            None => Ok(()),
        };

        *self.state.write().await = SchedulerState::Idle;
        joined.map_err(|e| AppError::Internal(format!("Scheduler task failed: {}", e)))?;

        tracing::info!("Monitor scheduler stopped");
        Ok(())
    }

    /// Run one cycle now, waiting for a scheduled one to finish first.
    pub async fn run_once(&self) -> Result<CycleReport> {
        Self::execute_cycle(&self.manager, &self.stats, &self.cycle_lock).await
    }

    async fn run_loop(
        manager: Arc<ProductManager>,
        config: SchedulerConfig,
        stats: Arc<RwLock<SchedulerStats>>,
        cycle_lock: Arc<Mutex<()>>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let period = config.cycle_interval();

        let stopped = *stop_rx.borrow();
        if config.run_on_start && !stopped {
            let _ = Self::execute_cycle(&manager, &stats, &cycle_lock).await;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let stopped = *stop_rx.borrow();
            if stopped {
                break;
            }

            let _ = Self::execute_cycle(&manager, &stats, &cycle_lock).await;
        }

        manager.shutdown().await;
        tracing::debug!("Scheduler loop exited");
    }

    async fn execute_cycle(
        manager: &ProductManager,
        stats: &RwLock<SchedulerStats>,
        cycle_lock: &Mutex<()>,
    ) -> Result<CycleReport> {
        let _cycle = cycle_lock.lock().await;
        stats.write().await.last_cycle_started = Some(Utc::now());

        let result = manager.run_cycle().await;

        let mut stats = stats.write().await;
        stats.last_cycle_finished = Some(Utc::now());
        match &result {
            Ok(report) => {
                stats.completed_cycles += 1;
                stats.last_error = None;
                stats.last_report = Some(report.clone());
            }
            Err(e) => {
                stats.failed_cycles += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }
}
