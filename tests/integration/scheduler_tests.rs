use super::*;
use dropwatch::config::SchedulerConfig;
use dropwatch::scheduler::{MonitorScheduler, SchedulerState};

fn scheduler_for(harness: &TestHarness, cycle_interval: u64, run_on_start: bool) -> MonitorScheduler {
    MonitorScheduler::new(
        Arc::clone(&harness.manager),
        SchedulerConfig {
            cycle_interval,
            run_on_start,
        },
    )
}

#[tokio::test]
async fn test_start_runs_immediate_cycle_and_stop_releases() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let id = harness.track(HEADPHONES_URL, 1099.0, 999.99).await?;
    harness.static_extractor.push(HEADPHONES_URL, Some(950.0));

    let scheduler = scheduler_for(&harness, 3600, true);
    scheduler.start().await?;
    assert_eq!(scheduler.state().await, SchedulerState::Running);

    let handle = &scheduler;
    let ran = wait_for_condition(|| async move { handle.stats().await.completed_cycles == 1 }, 5000).await;
    assert!(ran, "immediate cycle did not complete");

    let releases_before_stop = harness.rendered_extractor.releases();
    scheduler.stop().await?;
    assert_eq!(scheduler.state().await, SchedulerState::Idle);
    assert!(harness.rendered_extractor.releases() > releases_before_stop);

    let stats = scheduler.stats().await;
    assert!(stats.started_at.is_some());
    assert!(stats.last_error.is_none());
    let report = stats.last_report.expect("cycle report");
    assert_eq!(report.sweep.price_drops, 1);
    assert_eq!(report.marked_delivered, 1);

    assert_eq!(
        harness.manager.get_product(&id).await?.current_price,
        Some(950.0)
    );
    Ok(())
}

#[tokio::test]
async fn test_stop_waits_for_running_cycle_and_skips_the_next() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.track(HEADPHONES_URL, 1099.0, 999.99).await?;
    harness.static_extractor.push(HEADPHONES_URL, Some(950.0));

    let gate = harness.static_extractor.hold();
    let entered = harness.static_extractor.entered();
    let scheduler = scheduler_for(&harness, 1, true);
    scheduler.start().await?;

    tokio::time::timeout(Duration::from_secs(5), entered.notified()).await?;
    assert_eq!(scheduler.stats().await.completed_cycles, 0);

    let (stopped, state_while_blocked) = tokio::join!(scheduler.stop(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = scheduler.state().await;
        gate.notify_one();
        state
    });
    stopped?;

    // Stop waited instead of aborting the cycle in flight
    assert_eq!(state_while_blocked, SchedulerState::Stopping);
    assert_eq!(scheduler.state().await, SchedulerState::Idle);

    let stats = scheduler.stats().await;
    assert_eq!(stats.completed_cycles, 1);
    let report = stats.last_report.expect("cycle report");
    assert_eq!(report.sweep.products_checked, 1);
    assert_eq!(report.sweep.price_drops, 1);

    // Released once by the cycle and once by the loop on exit
    assert_eq!(harness.rendered_extractor.releases(), 2);

    // No further cycle after stop, even with a one second interval
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(scheduler.stats().await.completed_cycles, 1);
    assert_eq!(harness.static_extractor.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cycles_repeat_on_interval() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let scheduler = scheduler_for(&harness, 1, false);

    scheduler.start().await?;
    assert_eq!(scheduler.stats().await.completed_cycles, 0);

    let handle = &scheduler;
    let ran = wait_for_condition(|| async move { handle.stats().await.completed_cycles >= 1 }, 3000).await;
    scheduler.stop().await?;
    assert!(ran, "no cycle ran within the interval");
    Ok(())
}

#[tokio::test]
async fn test_start_twice_is_rejected() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let scheduler = scheduler_for(&harness, 3600, false);

    scheduler.start().await?;
    let err = scheduler.start().await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    scheduler.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle_is_noop_and_restart_works() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let scheduler = scheduler_for(&harness, 3600, false);

    scheduler.stop().await?;
    assert_eq!(scheduler.state().await, SchedulerState::Idle);

    scheduler.start().await?;
    scheduler.stop().await?;
    scheduler.start().await?;
    assert_eq!(scheduler.state().await, SchedulerState::Running);
    scheduler.stop().await?;
    assert_eq!(scheduler.state().await, SchedulerState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_run_once_updates_stats() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.track(&product_url(1), 500.0, 400.0).await?;
    harness.static_extractor.push(&product_url(1), Some(390.0));

    let scheduler = scheduler_for(&harness, 3600, false);
    let report = scheduler.run_once().await?;
    assert_eq!(report.sweep.products_checked, 1);
    assert_eq!(report.sweep.price_drops, 1);

    let stats = scheduler.stats().await;
    assert_eq!(stats.completed_cycles, 1);
    assert_eq!(stats.failed_cycles, 0);
    assert!(stats.last_cycle_finished >= stats.last_cycle_started);
    assert_eq!(scheduler.state().await, SchedulerState::Idle);
    Ok(())
}
