use std::sync::Arc;

use imkitchen_shared::today::{CompletionStatus, Slot, TodaySnapshot};
use imkitchen_today::{
    EngineOptions, HttpTodayApi, MutationOutcome, SyncReport, TodayEngine, TodayApi,
};

use imkitchen::Config;

async fn engine(config: &Config, online: bool) -> anyhow::Result<TodayEngine> {
    let pool = imkitchen::create_pool(&config.storage.url, config.storage.max_connections).await?;
    imkitchen::migrate(&pool).await?;

    let api = HttpTodayApi::new(
        config.api.base_url.to_owned(),
        config.api.timeout(),
        config.api.token.to_owned(),
    )?;

    Ok(TodayEngine::new(
        Arc::new(api),
        pool,
        EngineOptions {
            queue_key: config.sync.queue_key.to_owned(),
            background_refresh: config.sync.background_refresh,
            online,
        },
    ))
}

/// Loads today into the cache. An unreachable server flips the monitor to
/// offline and leaves the cache empty.
async fn load(engine: &TodayEngine) -> anyhow::Result<bool> {
    match engine.refresh().await {
        Ok(_) => Ok(true),
        Err(err) if err.is_network() => {
            tracing::warn!(error = %err, "server unreachable, working offline");
            engine.set_online(false);
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn print_slot(slot: &Slot) {
    let marker = if slot.is_next { ">" } else { " " };
    let status = slot
        .completion_status
        .map(|status| status.to_string())
        .unwrap_or_else(|| "-".to_owned());
    let adhoc = if slot.is_adhoc { " (ad hoc)" } else { "" };

    println!(
        "{marker} {:<12} {:<10} {}{adhoc}",
        slot.id,
        status,
        slot.display_name()
    );
}

fn print_snapshot(snapshot: &TodaySnapshot) {
    let date = snapshot
        .date
        .map(|date| date.to_string())
        .unwrap_or_default();
    let template = snapshot
        .template
        .as_ref()
        .map(|template| template.name.as_str())
        .unwrap_or("no template");

    println!("{} {} - {}", snapshot.weekday, date, template);

    if let Some(reason) = snapshot.override_reason.as_deref().filter(|_| snapshot.is_override) {
        println!("override: {reason}");
    }

    for slot in &snapshot.slots {
        print_slot(slot);
    }

    println!(
        "{}/{} done, streak {} days",
        snapshot.stats.completed, snapshot.stats.total, snapshot.stats.streak_days
    );

    if snapshot.is_day_complete() {
        println!("day complete");
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "replayed {}, dropped {}, remaining {}",
        report.replayed.len(),
        report.dropped.len(),
        report.remaining
    );

    for lost in &report.dropped {
        println!("  {} {}: {}", lost.mutation.slot_id, lost.mutation.action, lost.reason);
    }

    if let Some(err) = &report.storage_error {
        println!("local queue unavailable: {err}");
    }

    if let Some(notice) = report.notice() {
        println!("{notice}");
    }
}

#[tracing::instrument(skip(config))]
pub async fn show(config: Config, online: bool) -> anyhow::Result<()> {
    let engine = engine(&config, online).await?;

    if !load(&engine).await? {
        let pending = engine.queue().len().await?;
        println!("offline, {pending} change(s) waiting to sync");
        return Ok(());
    }

    print_snapshot(&engine.snapshot());

    Ok(())
}

#[tracing::instrument(skip(config))]
pub async fn review(config: Config) -> anyhow::Result<()> {
    let api = HttpTodayApi::new(
        config.api.base_url.to_owned(),
        config.api.timeout(),
        config.api.token.to_owned(),
    )?;
    let yesterday = api.fetch_yesterday().await?;
    let unmarked = yesterday.unmarked_slots().collect::<Vec<_>>();

    if unmarked.is_empty() {
        println!("nothing left unmarked yesterday");
        return Ok(());
    }

    for slot in unmarked {
        print_slot(slot);
    }

    Ok(())
}

async fn settle(
    engine: &TodayEngine,
    result: Result<MutationOutcome, imkitchen_today::MutationError>,
) -> anyhow::Result<()> {
    match result? {
        MutationOutcome::Confirmed => println!("saved"),
        MutationOutcome::Queued => {
            let pending = engine.queue().len().await?;
            println!("saved offline, {pending} change(s) waiting to sync");
        }
    }

    if let Some(next) = engine.snapshot().next_slot() {
        println!("next: {} ({})", next.display_name(), next.id);
    }

    Ok(())
}

#[tracing::instrument(skip(config))]
pub async fn complete(
    config: Config,
    online: bool,
    slot_id: String,
    status: CompletionStatus,
) -> anyhow::Result<()> {
    let engine = engine(&config, online).await?;
    load(&engine).await?;

    let result = engine.complete(&slot_id, status).await;

    settle(&engine, result).await
}

#[tracing::instrument(skip(config))]
pub async fn uncomplete(config: Config, online: bool, slot_id: String) -> anyhow::Result<()> {
    let engine = engine(&config, online).await?;
    load(&engine).await?;

    let result = engine.uncomplete(&slot_id).await;

    settle(&engine, result).await
}

#[tracing::instrument(skip(config))]
pub async fn queue(config: Config) -> anyhow::Result<()> {
    let engine = engine(&config, false).await?;
    let pending = engine.queue().drain().await?;

    if pending.is_empty() {
        println!("nothing to sync");
        return Ok(());
    }

    for mutation in pending {
        println!(
            "{:>4} {:<12} {:<20} {}",
            mutation.seq(),
            mutation.slot_id,
            mutation.action,
            mutation.enqueued_at
        );
    }

    Ok(())
}

#[tracing::instrument(skip(config))]
pub async fn sync(config: Config) -> anyhow::Result<()> {
    let engine = engine(&config, true).await?;

    match engine.sync().await {
        Some(report) => print_report(&report),
        None => println!("sync already running"),
    }

    Ok(())
}

#[tracing::instrument(skip(config))]
pub async fn migrate(config: Config) -> anyhow::Result<()> {
    let pool = imkitchen::create_pool(&config.storage.url, config.storage.max_connections).await?;
    imkitchen::migrate(&pool).await?;

    tracing::info!(url = %config.storage.url, "local store ready");

    Ok(())
}
