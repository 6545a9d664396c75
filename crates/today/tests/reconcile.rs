use std::time::Duration;

use imkitchen_shared::today::{CompletionStatus, SlotAction};
use imkitchen_today::RemoteError;
use temp_dir::TempDir;

mod helpers;

#[tokio::test]
async fn reconnect_replays_then_refetches() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b", "c"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;
    engine.complete("b", CompletionStatus::Skipped).await?;

    // Drift picked up only by the refetch.
    api.update(|snapshot| snapshot.slots[2].completion_status = Some(CompletionStatus::Social));
    api.set_reachable(true);
    engine.set_online(true);

    let report = engine.sync().await.unwrap();

    assert_eq!(report.replayed.len(), 2);
    assert_eq!(report.replayed[0].slot_id, "a");
    assert_eq!(report.replayed[1].slot_id, "b");
    assert!(report.dropped.is_empty());
    assert!(!report.aborted);
    assert!(report.refreshed);
    assert!(report.notice().is_none());

    assert!(engine.queue().is_empty().await?);
    assert_eq!(api.server_status("a"), Some(CompletionStatus::Followed));
    assert_eq!(api.server_status("b"), Some(CompletionStatus::Skipped));
    assert_eq!(helpers::status(&engine, "c"), Some(CompletionStatus::Social));
    assert!(engine.snapshot().is_day_complete());

    Ok(())
}

#[tokio::test]
async fn replay_follows_queue_order_after_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.child("db.sqlite3");
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));

    {
        let engine = helpers::setup_engine(path.clone(), &api).await?;
        api.set_reachable(false);
        engine.set_online(false);
        engine.complete("b", CompletionStatus::Followed).await?;
        engine.complete("a", CompletionStatus::Adjusted).await?;
    }

    api.set_reachable(true);
    let engine = helpers::setup_engine(path, &api).await?;

    // Queued intents are laid over the fresh server view.
    assert_eq!(helpers::status(&engine, "a"), Some(CompletionStatus::Adjusted));
    assert_eq!(helpers::status(&engine, "b"), Some(CompletionStatus::Followed));

    engine.sync().await;

    let calls = api.calls();
    assert_eq!(
        calls,
        vec![
            ("b".to_owned(), SlotAction::Complete(CompletionStatus::Followed)),
            ("a".to_owned(), SlotAction::Complete(CompletionStatus::Adjusted)),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn network_failure_aborts_drain() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;
    engine.complete("b", CompletionStatus::Followed).await?;

    engine.set_online(true);
    let report = engine.sync().await.unwrap();

    assert!(report.aborted);
    assert_eq!(report.remaining, 2);
    assert!(report.replayed.is_empty());
    assert!(!report.refreshed);
    assert_eq!(engine.queue().len().await?, 2);

    // Optimistic state stands until the next online edge.
    assert_eq!(helpers::status(&engine, "a"), Some(CompletionStatus::Followed));

    Ok(())
}

#[tokio::test]
async fn rejected_replay_is_dropped_and_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;
    engine.complete("b", CompletionStatus::Followed).await?;

    api.reject("a");
    api.set_reachable(true);
    engine.set_online(true);

    let report = engine.sync().await.unwrap();

    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].mutation.slot_id, "a");
    assert!(matches!(
        report.dropped[0].reason,
        RemoteError::Rejected { .. }
    ));
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(report.replayed[0].slot_id, "b");
    assert_eq!(report.notice(), Some("could not sync 1 change".to_owned()));
    assert!(engine.queue().is_empty().await?);

    // The refetch drops the optimistic completion the server never took.
    assert_eq!(helpers::status(&engine, "a"), None);
    assert_eq!(helpers::next_id(&engine), Some("a".to_owned()));

    Ok(())
}

#[tokio::test]
async fn online_edge_triggers_single_reconciliation() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;
    let sync = engine.start_sync();
    let mut reports = engine.sync_reports();

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;

    api.set_reachable(true);
    assert!(engine.set_online(true));

    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await??;
    assert_eq!(report.replayed.len(), 1);
    assert!(engine.queue().is_empty().await?);

    // Already online: no new edge, no new pass.
    assert!(!engine.set_online(true));
    let again = tokio::time::timeout(Duration::from_millis(200), reports.recv()).await;
    assert!(again.is_err());

    assert_eq!(api.calls().len(), 1);

    sync.abort();

    Ok(())
}

#[tokio::test]
async fn empty_queue_still_refetches() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;

    api.update(|snapshot| snapshot.slots[0].completion_status = Some(CompletionStatus::Skipped));

    let report = engine.sync().await.unwrap();

    assert!(report.replayed.is_empty());
    assert!(report.refreshed);
    assert_eq!(helpers::next_id(&engine), Some("b".to_owned()));

    Ok(())
}

#[tokio::test]
async fn queue_failure_aborts_but_still_refetches() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let (engine, pool) = helpers::setup_engine_with_pool(dir.child("db.sqlite3"), &api).await?;

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;

    api.update(|snapshot| snapshot.slots[1].completion_status = Some(CompletionStatus::Social));
    api.set_reachable(true);
    engine.set_online(true);
    helpers::break_queue(&pool).await?;

    let mut reports = engine.sync_reports();
    let report = engine.sync().await.unwrap();

    assert!(report.aborted);
    assert!(report.storage_error.is_some());
    assert!(report.replayed.is_empty());
    assert!(report.refreshed);
    assert!(api.calls().is_empty());
    assert_eq!(helpers::status(&engine, "b"), Some(CompletionStatus::Social));

    let published = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await??;
    assert_eq!(published, report);

    Ok(())
}

#[tokio::test]
async fn trigger_during_pass_runs_follow_up() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let api = helpers::FakeApi::new(helpers::day(&["a", "b"]));
    let engine = helpers::setup_engine(dir.child("db.sqlite3"), &api).await?;
    let mut reports = engine.sync_reports();

    api.set_reachable(false);
    engine.set_online(false);
    engine.complete("a", CompletionStatus::Followed).await?;
    api.set_reachable(true);
    engine.set_online(true);

    // Hold the first pass in its refetch, after a has been replayed.
    api.hold_fetches();
    let syncing = engine.clone();
    let first = tokio::spawn(async move { syncing.sync().await });
    api.fetch_held().await;

    engine
        .queue()
        .enqueue("b", SlotAction::Complete(CompletionStatus::Skipped))
        .await?;
    assert!(engine.sync().await.is_none());

    api.stop_holding_fetches();
    let last = first.await?.unwrap();

    assert_eq!(last.replayed.len(), 1);
    assert_eq!(last.replayed[0].slot_id, "b");

    let one = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await??;
    let two = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await??;
    assert_eq!(one.replayed[0].slot_id, "a");
    assert_eq!(two, last);

    assert!(engine.queue().is_empty().await?);
    assert_eq!(
        api.calls(),
        vec![
            ("a".to_owned(), SlotAction::Complete(CompletionStatus::Followed)),
            ("b".to_owned(), SlotAction::Complete(CompletionStatus::Skipped)),
        ]
    );
    assert_eq!(helpers::status(&engine, "b"), Some(CompletionStatus::Skipped));

    Ok(())
}
