use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::task::JoinHandle;

use crate::{DurableQueue, RemoteError, SnapshotCache, TodayApi, cache};

/// Pulls the authoritative snapshot into the cache.
///
/// Requests are numbered; a response is only loaded if no newer request was
/// started meanwhile and the cache was not written to while it was in flight.
/// Intents still waiting in the queue are laid back on top of the server view
/// so a refresh never hides them.
#[derive(Clone)]
pub struct Refresher {
    api: Arc<dyn TodayApi>,
    cache: SnapshotCache,
    queue: DurableQueue,
    generation: Arc<AtomicU64>,
}

impl Refresher {
    pub fn new(api: Arc<dyn TodayApi>, cache: SnapshotCache, queue: DurableQueue) -> Self {
        Self {
            api,
            cache,
            queue,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `false` when the response was superseded by a newer refresh
    /// or by a local write made after the request started.
    pub async fn refresh(&self) -> Result<bool, RemoteError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let revision = self.cache.revision();
        let mut snapshot = self.api.fetch_today().await?;

        let pending = match self.queue.drain().await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read pending mutations during refresh");
                vec![]
            }
        };

        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "refresh superseded");
            return Ok(false);
        }

        for mutation in &pending {
            cache::apply_action(
                &mut snapshot,
                &mutation.slot_id,
                mutation.action,
                mutation.enqueued_at,
            );
        }

        if !self.cache.load_if_unchanged(snapshot, revision) {
            tracing::debug!(ticket, revision, "local write during refresh, response dropped");
            return Ok(false);
        }

        tracing::debug!(ticket, pending = pending.len(), "today refreshed");

        Ok(true)
    }

    /// Fire and forget refresh. Failures are logged only.
    pub fn spawn(&self) -> JoinHandle<()> {
        let refresher = self.clone();

        tokio::spawn(async move {
            if let Err(err) = refresher.refresh().await {
                tracing::warn!(error = %err, "background refresh failed");
            }
        })
    }
}
