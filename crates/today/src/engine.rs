use std::sync::Arc;

use imkitchen_shared::today::{CompletionStatus, TodaySnapshot};
use sqlx::SqlitePool;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    Connectivity, DurableQueue, MutationError, MutationExecutor, MutationOutcome, Reconciler,
    Refresher, RemoteError, SnapshotCache, SyncReport, TODAY_QUEUE_KEY, TodayApi,
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub queue_key: String,
    pub background_refresh: bool,
    /// Connectivity assumed until the platform says otherwise.
    pub online: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            queue_key: TODAY_QUEUE_KEY.to_owned(),
            background_refresh: true,
            online: true,
        }
    }
}

/// Wires the cache, queue, connectivity monitor, executor and reconciler
/// around one [`TodayApi`].
#[derive(Clone)]
pub struct TodayEngine {
    api: Arc<dyn TodayApi>,
    cache: SnapshotCache,
    queue: DurableQueue,
    connectivity: Connectivity,
    refresher: Refresher,
    executor: MutationExecutor,
    reconciler: Reconciler,
}

impl TodayEngine {
    pub fn new(api: Arc<dyn TodayApi>, pool: SqlitePool, options: EngineOptions) -> Self {
        let cache = SnapshotCache::new();
        let queue = DurableQueue::new(pool, options.queue_key);
        let connectivity = Connectivity::new(options.online);
        let refresher = Refresher::new(api.clone(), cache.clone(), queue.clone());

        let mut executor = MutationExecutor::new(
            api.clone(),
            cache.clone(),
            queue.clone(),
            connectivity.clone(),
        );

        if options.background_refresh {
            executor = executor.with_background_refresh(refresher.clone());
        }

        let reconciler = Reconciler::new(
            api.clone(),
            queue.clone(),
            connectivity.clone(),
            refresher.clone(),
        );

        Self {
            api,
            cache,
            queue,
            connectivity,
            refresher,
            executor,
            reconciler,
        }
    }

    pub fn snapshot(&self) -> TodaySnapshot {
        self.cache.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<TodaySnapshot> {
        self.cache.subscribe()
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub async fn complete(
        &self,
        slot_id: &str,
        status: CompletionStatus,
    ) -> Result<MutationOutcome, MutationError> {
        self.executor.complete(slot_id, status).await
    }

    pub async fn uncomplete(&self, slot_id: &str) -> Result<MutationOutcome, MutationError> {
        self.executor.uncomplete(slot_id).await
    }

    pub async fn refresh(&self) -> Result<bool, RemoteError> {
        self.refresher.refresh().await
    }

    /// Yesterday's view, straight from the server. Not cached.
    pub async fn yesterday(&self) -> Result<TodaySnapshot, RemoteError> {
        self.api.fetch_yesterday().await
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.connectivity.set_online(online)
    }

    /// Starts reconciling on each offline to online transition.
    pub fn start_sync(&self) -> JoinHandle<()> {
        self.reconciler
            .clone()
            .spawn(self.connectivity.subscribe())
    }

    /// Runs a reconciliation pass now, regardless of transitions.
    pub async fn sync(&self) -> Option<SyncReport> {
        self.reconciler.reconcile().await
    }

    pub fn sync_reports(&self) -> broadcast::Receiver<SyncReport> {
        self.reconciler.subscribe()
    }
}
