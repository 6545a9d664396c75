use std::sync::Arc;

use imkitchen_shared::today::{CompletionStatus, SlotAction};

use crate::{Connectivity, DurableQueue, Refresher, RemoteError, SnapshotCache, TodayApi, remote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server accepted the change.
    Confirmed,
    /// The server could not be reached; the change is kept locally and will
    /// be replayed on the next reconnection.
    Queued,
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The server refused the change while online. The cache was rolled
    /// back and the user may retry.
    #[error("could not {action} slot {slot_id}: {source}")]
    Rejected {
        slot_id: String,
        action: SlotAction,
        #[source]
        source: RemoteError,
    },

    /// Offline and the intent could not be persisted. The cache was rolled
    /// back.
    #[error("could not keep {action} for slot {slot_id} offline: {source}")]
    Storage {
        slot_id: String,
        action: SlotAction,
        #[source]
        source: imkitchen_shared::Error,
    },
}

/// Applies user actions optimistically and settles them against the server.
#[derive(Clone)]
pub struct MutationExecutor {
    api: Arc<dyn TodayApi>,
    cache: SnapshotCache,
    queue: DurableQueue,
    connectivity: Connectivity,
    refresher: Option<Refresher>,
}

impl MutationExecutor {
    pub fn new(
        api: Arc<dyn TodayApi>,
        cache: SnapshotCache,
        queue: DurableQueue,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            api,
            cache,
            queue,
            connectivity,
            refresher: None,
        }
    }

    /// Spawns a background refresh after every confirmed mutation.
    pub fn with_background_refresh(mut self, refresher: Refresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub async fn complete(
        &self,
        slot_id: &str,
        status: CompletionStatus,
    ) -> Result<MutationOutcome, MutationError> {
        self.execute(slot_id, SlotAction::Complete(status)).await
    }

    pub async fn uncomplete(&self, slot_id: &str) -> Result<MutationOutcome, MutationError> {
        self.execute(slot_id, SlotAction::Uncomplete).await
    }

    #[tracing::instrument(skip(self, action), fields(action = %action))]
    pub async fn execute(
        &self,
        slot_id: &str,
        action: SlotAction,
    ) -> Result<MutationOutcome, MutationError> {
        let checkpoint = match action {
            SlotAction::Complete(status) => self.cache.apply_completion(slot_id, status),
            SlotAction::Uncomplete => self.cache.apply_uncompletion(slot_id),
        };

        // Always attempted: the platform signal may lag real reachability.
        let err = match remote::dispatch(self.api.as_ref(), slot_id, action).await {
            Ok(()) => {
                // An older intent for this slot must not be replayed over this one.
                if let Err(err) = self.queue.remove(slot_id).await {
                    tracing::error!(slot_id, error = %err, "failed to clear superseded queued mutation");
                }

                if let Some(refresher) = &self.refresher {
                    refresher.spawn();
                }

                return Ok(MutationOutcome::Confirmed);
            }
            Err(err) => err,
        };

        // Read the signal now, connectivity may have changed while in flight.
        if self.connectivity.is_online() {
            tracing::warn!(slot_id, error = %err, "mutation rejected, rolling back");
            self.cache.rollback(checkpoint, slot_id);

            return Err(MutationError::Rejected {
                slot_id: slot_id.to_owned(),
                action,
                source: err,
            });
        }

        if let Err(source) = self.queue.enqueue(slot_id, action).await {
            tracing::error!(slot_id, error = %source, "failed to queue offline mutation");
            self.cache.rollback(checkpoint, slot_id);

            return Err(MutationError::Storage {
                slot_id: slot_id.to_owned(),
                action,
                source,
            });
        }

        tracing::debug!(slot_id, error = %err, "offline, mutation kept locally");

        Ok(MutationOutcome::Queued)
    }
}
