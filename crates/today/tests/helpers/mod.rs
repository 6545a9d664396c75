use std::{
    collections::HashSet,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex},
};

use imkitchen_shared::today::{CompletionStatus, Slot, SlotAction, TodaySnapshot};
use imkitchen_today::{EngineOptions, RemoteError, TodayApi, TodayEngine};
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use sqlx_migrator::{Migrate, Plan};
use time::OffsetDateTime;
use tokio::sync::Notify;

pub async fn setup_test_pool(path: PathBuf) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.to_str().unwrap()))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;
    let mut conn = pool.acquire().await?;
    imkitchen_db::migrator::<sqlx::Sqlite>()?
        .run(&mut conn, &Plan::apply_all())
        .await?;

    Ok(pool)
}

#[allow(dead_code)]
pub fn slot(id: &str, position: i32) -> Slot {
    Slot {
        id: id.to_owned(),
        position,
        meal_type: None,
        meal: None,
        actual_meal: None,
        completion_status: None,
        completed_at: None,
        is_next: false,
        is_adhoc: false,
        is_manual_override: false,
    }
}

#[allow(dead_code)]
pub fn day(ids: &[&str]) -> TodaySnapshot {
    let mut snapshot = TodaySnapshot {
        weekday: "Wednesday".to_owned(),
        ..Default::default()
    };

    for (position, id) in ids.iter().enumerate() {
        snapshot.slots.push(slot(id, position as i32));
    }

    snapshot.stats.total = snapshot.slots.len() as u32;

    snapshot
}

#[derive(Default)]
struct FakeState {
    snapshot: TodaySnapshot,
    yesterday: TodaySnapshot,
    reachable: bool,
    rejected: HashSet<String>,
    calls: Vec<(String, SlotAction)>,
    hold_fetches: bool,
}

/// Lets a test pause `fetch_today` after the request has started.
#[derive(Default)]
struct FetchGate {
    entered: Notify,
    release: Notify,
}

/// In-memory server. Completions mutate its snapshot the way the real API
/// does; unreachable mode answers every call with a network error.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeState>>,
    gate: Arc<FetchGate>,
}

#[allow(dead_code)]
impl FakeApi {
    pub fn new(snapshot: TodaySnapshot) -> Self {
        let api = Self::default();
        {
            let mut state = api.state.lock().unwrap();
            state.snapshot = snapshot;
            state.reachable = true;
        }

        api
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn reject(&self, slot_id: &str) {
        self.state.lock().unwrap().rejected.insert(slot_id.to_owned());
    }

    pub fn set_yesterday(&self, snapshot: TodaySnapshot) {
        self.state.lock().unwrap().yesterday = snapshot;
    }

    /// Changes the server view behind the client's back.
    pub fn update(&self, f: impl FnOnce(&mut TodaySnapshot)) {
        f(&mut self.state.lock().unwrap().snapshot);
    }

    pub fn server_status(&self, slot_id: &str) -> Option<CompletionStatus> {
        self.state
            .lock()
            .unwrap()
            .snapshot
            .slot(slot_id)
            .and_then(|slot| slot.completion_status)
    }

    pub fn calls(&self) -> Vec<(String, SlotAction)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every following `fetch_today` waits for [`Self::release_fetch`].
    pub fn hold_fetches(&self) {
        self.state.lock().unwrap().hold_fetches = true;
    }

    /// Resolves once a held fetch is waiting.
    pub async fn fetch_held(&self) {
        self.gate.entered.notified().await;
    }

    /// Lets one held fetch answer. Fetches stay held for later calls.
    pub fn release_fetch(&self) {
        self.gate.release.notify_one();
    }

    pub fn stop_holding_fetches(&self) {
        self.state.lock().unwrap().hold_fetches = false;
        self.gate.release.notify_one();
    }

    fn write(&self, slot_id: &str, action: SlotAction) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();

        if !state.reachable {
            return Err(RemoteError::Network("connection refused".to_owned()));
        }

        state.calls.push((slot_id.to_owned(), action));

        if state.rejected.contains(slot_id) {
            return Err(RemoteError::Rejected {
                status: Some(404),
                message: "Slot not found".to_owned(),
            });
        }

        let Some(slot) = state.snapshot.slots.iter_mut().find(|s| s.id == slot_id) else {
            return Err(RemoteError::Rejected {
                status: Some(404),
                message: "Slot not found".to_owned(),
            });
        };

        match action {
            SlotAction::Complete(status) => {
                slot.completion_status = Some(status);
                slot.completed_at = Some(OffsetDateTime::from_unix_timestamp(1_771_400_000).unwrap());
            }
            SlotAction::Uncomplete => {
                slot.completion_status = None;
                slot.completed_at = None;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl TodayApi for FakeApi {
    async fn fetch_today(&self) -> Result<TodaySnapshot, RemoteError> {
        let held = self.state.lock().unwrap().hold_fetches;
        if held {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }

        let state = self.state.lock().unwrap();
        if !state.reachable {
            return Err(RemoteError::Network("connection refused".to_owned()));
        }

        Ok(state.snapshot.clone())
    }

    async fn fetch_yesterday(&self) -> Result<TodaySnapshot, RemoteError> {
        let state = self.state.lock().unwrap();
        if !state.reachable {
            return Err(RemoteError::Network("connection refused".to_owned()));
        }

        Ok(state.yesterday.clone())
    }

    async fn mark_slot_complete(
        &self,
        slot_id: &str,
        status: CompletionStatus,
    ) -> Result<(), RemoteError> {
        self.write(slot_id, SlotAction::Complete(status))
    }

    async fn clear_slot_completion(&self, slot_id: &str) -> Result<(), RemoteError> {
        self.write(slot_id, SlotAction::Uncomplete)
    }
}

/// Engine over `api` without background refresh, already loaded.
#[allow(dead_code)]
pub async fn setup_engine(path: PathBuf, api: &FakeApi) -> anyhow::Result<TodayEngine> {
    let (engine, _) = setup_engine_with_pool(path, api).await?;

    Ok(engine)
}

/// Same as [`setup_engine`], also handing back the pool behind the queue.
#[allow(dead_code)]
pub async fn setup_engine_with_pool(
    path: PathBuf,
    api: &FakeApi,
) -> anyhow::Result<(TodayEngine, SqlitePool)> {
    let pool = setup_test_pool(path).await?;
    let engine = TodayEngine::new(
        Arc::new(api.clone()),
        pool.clone(),
        EngineOptions {
            background_refresh: false,
            ..Default::default()
        },
    );
    engine.refresh().await?;

    Ok((engine, pool))
}

/// Makes every queue read and write fail from now on.
#[allow(dead_code)]
pub async fn break_queue(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("DROP TABLE today_pending_mutation")
        .execute(pool)
        .await?;

    Ok(())
}

#[allow(dead_code)]
pub fn next_id(engine: &TodayEngine) -> Option<String> {
    engine
        .snapshot()
        .next_slot()
        .map(|slot| slot.id.to_owned())
}

#[allow(dead_code)]
pub fn status(engine: &TodayEngine, slot_id: &str) -> Option<CompletionStatus> {
    engine
        .snapshot()
        .slot(slot_id)
        .and_then(|slot| slot.completion_status)
}
