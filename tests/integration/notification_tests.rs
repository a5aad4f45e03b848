use super::*;
use rstest::rstest;

/// Track `count` products and queue a below-threshold price for each.
async fn queue_drops(harness: &TestHarness, count: usize) -> anyhow::Result<()> {
    for n in 0..count {
        let url = product_url(n);
        harness.track(&url, 500.0, 400.0).await?;
        harness.static_extractor.push(&url, Some(350.0));
    }
    Ok(())
}

#[rstest]
#[case::below_batch_size(3, 3, vec![])]
#[case::at_batch_size(5, 5, vec![])]
#[case::above_batch_size(7, 0, vec![7])]
#[tokio::test]
async fn test_cycle_batches_by_pending_count(
    #[case] drops: usize,
    #[case] expected_singles: usize,
    #[case] expected_summaries: Vec<usize>,
) -> anyhow::Result<()> {
    let harness = create_harness().await?;
    queue_drops(&harness, drops).await?;

    let report = harness.manager.run_cycle().await?;
    assert_eq!(report.sweep.price_drops, drops);
    assert_eq!(report.notifications_pending, drops);
    assert_eq!(report.marked_delivered, drops as u64);

    assert_eq!(harness.transport.single_count(), expected_singles);
    assert_eq!(harness.transport.summary_sizes(), expected_summaries);
    assert_eq!(harness.pending_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_is_retried_next_cycle() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    queue_drops(&harness, 2).await?;

    harness.transport.set_succeed(false);
    let report = harness.manager.run_cycle().await?;
    assert_eq!(report.dispatch.failed, 2);
    assert_eq!(report.marked_delivered, 0);
    assert_eq!(harness.pending_count().await?, 2);

    // Nothing new to fetch; the backlog alone is delivered
    harness.transport.set_succeed(true);
    let report = harness.manager.run_cycle().await?;
    assert_eq!(report.sweep.price_drops, 0);
    assert_eq!(report.marked_delivered, 2);
    assert_eq!(harness.pending_count().await?, 0);
    assert_eq!(harness.transport.single_count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_failed_summary_keeps_every_drop_pending() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    queue_drops(&harness, 6).await?;
    harness.transport.set_succeed(false);

    let report = harness.manager.run_cycle().await?;
    assert_eq!(report.dispatch.summary_sent, 0);
    assert_eq!(report.dispatch.failed, 1);
    assert_eq!(report.marked_delivered, 0);
    assert_eq!(harness.pending_count().await?, 6);
    assert_eq!(harness.transport.summary_sizes(), vec![6]);
    Ok(())
}

#[tokio::test]
async fn test_process_notifications_with_nothing_pending() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let (pending, dispatch, marked) = harness.manager.process_notifications().await?;

    assert_eq!(pending, 0);
    assert_eq!(marked, 0);
    assert!(dispatch.delivered_ids.is_empty());
    assert_eq!(harness.transport.single_count(), 0);
    Ok(())
}
