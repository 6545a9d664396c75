use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};

use crate::{
    Connectivity, ConnectivityEvents, DurableQueue, PendingMutation, Refresher, RemoteError,
    TodayApi, remote,
};

/// A queued intent the server refused during replay. It is gone from the
/// queue and will not be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostMutation {
    pub mutation: PendingMutation,
    pub reason: RemoteError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub replayed: Vec<PendingMutation>,
    pub dropped: Vec<LostMutation>,
    /// Entries left in the queue because connectivity dropped mid-drain.
    pub remaining: usize,
    pub aborted: bool,
    /// Set when the local queue could not be read or updated.
    pub storage_error: Option<String>,
    pub refreshed: bool,
}

impl SyncReport {
    /// A user-facing line when some changes could not be synced.
    pub fn notice(&self) -> Option<String> {
        match self.dropped.len() {
            0 => None,
            1 => Some("could not sync 1 change".to_owned()),
            n => Some(format!("could not sync {n} changes")),
        }
    }
}

/// Replays queued intents in order, then pulls the server view.
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn TodayApi>,
    queue: DurableQueue,
    connectivity: Connectivity,
    refresher: Refresher,
    running: Arc<Mutex<()>>,
    rerun: Arc<AtomicBool>,
    reports: broadcast::Sender<SyncReport>,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn TodayApi>,
        queue: DurableQueue,
        connectivity: Connectivity,
        refresher: Refresher,
    ) -> Self {
        let (reports, _) = broadcast::channel(16);

        Self {
            api,
            queue,
            connectivity,
            refresher,
            running: Arc::new(Mutex::new(())),
            rerun: Arc::new(AtomicBool::new(false)),
            reports,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.reports.subscribe()
    }

    /// Runs reconciliation and returns the report of the last pass this call
    /// ran. Returns `None` when a pass is already in progress: the trigger is
    /// then recorded and the running caller does one more pass once it is
    /// done, so intents queued meanwhile are not left behind.
    #[tracing::instrument(skip(self), fields(queue = %self.queue.key()))]
    pub async fn reconcile(&self) -> Option<SyncReport> {
        self.rerun.store(true, Ordering::SeqCst);
        let mut last = None;

        while self.rerun.load(Ordering::SeqCst) {
            let Ok(_guard) = self.running.try_lock() else {
                tracing::debug!("reconciliation already running, follow-up pass requested");
                break;
            };

            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }

            last = Some(self.run_pass().await);
        }

        last
    }

    async fn run_pass(&self) -> SyncReport {
        let mut report = SyncReport::default();

        match self.queue.drain().await {
            Ok(pending) => self.replay(pending, &mut report).await,
            Err(err) => {
                tracing::error!(error = %err, "failed to read pending mutations, replay aborted");
                report.aborted = true;
                report.storage_error = Some(err.to_string());
            }
        }

        match self.refresher.refresh().await {
            Ok(refreshed) => report.refreshed = refreshed,
            Err(err) => tracing::warn!(error = %err, "refetch after reconciliation failed"),
        }

        tracing::info!(
            replayed = report.replayed.len(),
            dropped = report.dropped.len(),
            remaining = report.remaining,
            refreshed = report.refreshed,
            "reconciliation finished"
        );

        let _ = self.reports.send(report.clone());

        report
    }

    async fn replay(&self, pending: Vec<PendingMutation>, report: &mut SyncReport) {
        let total = pending.len();

        for (index, mutation) in pending.into_iter().enumerate() {
            let result =
                remote::dispatch(self.api.as_ref(), &mutation.slot_id, mutation.action).await;

            let err = match result {
                Ok(()) => {
                    let acknowledged = self.queue.acknowledge(&mutation).await;
                    tracing::info!(slot_id = mutation.slot_id, action = %mutation.action, "mutation replayed");
                    report.replayed.push(mutation);

                    match acknowledged {
                        Ok(_) => continue,
                        Err(err) => {
                            self.abort_on_storage(report, err, total - index);
                            return;
                        }
                    }
                }
                Err(err) => err,
            };

            if err.is_network() || !self.connectivity.is_online() {
                report.aborted = true;
                report.remaining = total - index;
                tracing::info!(
                    slot_id = mutation.slot_id,
                    remaining = report.remaining,
                    error = %err,
                    "connectivity lost, replay aborted"
                );
                return;
            }

            // Still queued if this fails; it will be tried again next pass.
            if let Err(storage) = self.queue.acknowledge(&mutation).await {
                self.abort_on_storage(report, storage, total - index);
                return;
            }

            tracing::warn!(
                slot_id = mutation.slot_id,
                action = %mutation.action,
                error = %err,
                "server rejected queued mutation, dropped"
            );
            report.dropped.push(LostMutation {
                mutation,
                reason: err,
            });
        }
    }

    fn abort_on_storage(
        &self,
        report: &mut SyncReport,
        err: imkitchen_shared::Error,
        remaining: usize,
    ) {
        tracing::error!(error = %err, remaining, "failed to update pending mutations, replay aborted");
        report.aborted = true;
        report.remaining = remaining;
        report.storage_error = Some(err.to_string());
    }

    /// Reconciles on every offline to online transition until the monitor
    /// goes away.
    pub fn spawn(self, mut events: ConnectivityEvents) -> JoinHandle<()> {
        tokio::spawn(async move {
            while events.became_online().await {
                self.reconcile().await;
            }
        })
    }
}
