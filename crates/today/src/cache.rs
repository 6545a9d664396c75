use imkitchen_shared::today::{CompletionStatus, SlotAction, TodaySnapshot};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use time::OffsetDateTime;
use tokio::sync::watch;

/// The state of the cache right after an optimistic mutation, kept by the
/// caller as rollback material.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    snapshot: TodaySnapshot,
    revision: u64,
}

impl Checkpoint {
    /// The snapshot as it was immediately before the mutation.
    pub fn snapshot(&self) -> &TodaySnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> TodaySnapshot {
        self.snapshot
    }
}

/// Single owner of the cached "today" view.
///
/// Every write goes through the watch channel's write lock, so mutations are
/// atomic and subscribers are notified before the call returns. Writes that
/// leave the snapshot unchanged do not notify.
#[derive(Clone)]
pub struct SnapshotCache {
    sender: Arc<watch::Sender<TodaySnapshot>>,
    revision: Arc<AtomicU64>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TodaySnapshot::default());

        Self {
            sender: Arc::new(sender),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> TodaySnapshot {
        self.sender.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&TodaySnapshot) -> R) -> R {
        f(&self.sender.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<TodaySnapshot> {
        self.sender.subscribe()
    }

    /// Number of writes applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Replaces the whole snapshot, recomputing every derived field. Server
    /// supplied `is_next` and counts are ignored.
    pub fn load(&self, snapshot: TodaySnapshot) {
        self.replace(snapshot, None);
    }

    /// Like [`SnapshotCache::load`], but only if the cache is still at
    /// `revision`. Returns `false` when a newer write got in first.
    pub fn load_if_unchanged(&self, snapshot: TodaySnapshot, revision: u64) -> bool {
        self.replace(snapshot, Some(revision))
    }

    pub fn apply_completion(&self, slot_id: &str, status: CompletionStatus) -> Checkpoint {
        self.apply(slot_id, SlotAction::Complete(status))
    }

    pub fn apply_uncompletion(&self, slot_id: &str) -> Checkpoint {
        self.apply(slot_id, SlotAction::Uncomplete)
    }

    /// Puts back a previously captured snapshot.
    pub fn restore(&self, snapshot: TodaySnapshot) {
        self.write(|current| {
            if *current == snapshot {
                return false;
            }

            *current = snapshot;
            true
        });
    }

    /// Undoes the mutation that produced `checkpoint`.
    ///
    /// When nothing else touched the cache since, the checkpoint snapshot is
    /// restored as is. Otherwise only `slot_id` is reverted so concurrent
    /// edits on other slots survive.
    pub fn rollback(&self, checkpoint: Checkpoint, slot_id: &str) {
        let revision = &self.revision;
        let changed = self.sender.send_if_modified(|current| {
            if revision.load(Ordering::SeqCst) == checkpoint.revision {
                if *current == checkpoint.snapshot {
                    return false;
                }

                *current = checkpoint.snapshot;
                revision.fetch_add(1, Ordering::SeqCst);
                return true;
            }

            let Some(previous) = checkpoint.snapshot.slot(slot_id) else {
                return false;
            };

            let Some(slot) = current.slots.iter_mut().find(|slot| slot.id == slot_id) else {
                return false;
            };

            if slot.completion_status == previous.completion_status
                && slot.completed_at == previous.completed_at
            {
                return false;
            }

            slot.completion_status = previous.completion_status;
            slot.completed_at = previous.completed_at;
            derive(current);
            revision.fetch_add(1, Ordering::SeqCst);
            true
        });

        tracing::debug!(slot_id, changed, "cache rolled back");
    }

    fn apply(&self, slot_id: &str, action: SlotAction) -> Checkpoint {
        let mut previous = None;
        let mut applied_revision = 0;
        let revision = &self.revision;
        let at = OffsetDateTime::now_utc();

        self.sender.send_if_modified(|current| {
            previous = Some(current.clone());

            let changed = apply_action(current, slot_id, action, at);
            if changed {
                revision.fetch_add(1, Ordering::SeqCst);
            }

            // Read under the write lock so a concurrent write cannot slip in.
            applied_revision = revision.load(Ordering::SeqCst);
            changed
        });

        let snapshot = previous.unwrap_or_default();
        tracing::debug!(slot_id, %action, "optimistic update applied");

        Checkpoint {
            snapshot,
            revision: applied_revision,
        }
    }

    fn replace(&self, mut snapshot: TodaySnapshot, expected: Option<u64>) -> bool {
        derive(&mut snapshot);

        let now = OffsetDateTime::now_utc();
        let revision = &self.revision;
        let mut accepted = true;

        self.sender.send_if_modified(|current| {
            if expected.is_some_and(|expected| expected != revision.load(Ordering::SeqCst)) {
                accepted = false;
                return false;
            }

            stamp_completions(&mut snapshot, current, now);

            if *current == snapshot {
                return false;
            }

            *current = snapshot;
            revision.fetch_add(1, Ordering::SeqCst);
            true
        });

        accepted
    }

    fn write(&self, f: impl FnOnce(&mut TodaySnapshot) -> bool) {
        let revision = &self.revision;
        self.sender.send_if_modified(|current| {
            if !f(current) {
                return false;
            }

            revision.fetch_add(1, Ordering::SeqCst);
            true
        });
    }
}

/// Applies `action` to one slot and refreshes derived fields. Returns `false`
/// when the slot is missing or already in the requested state.
pub(crate) fn apply_action(
    snapshot: &mut TodaySnapshot,
    slot_id: &str,
    action: SlotAction,
    at: OffsetDateTime,
) -> bool {
    let Some(slot) = snapshot.slots.iter_mut().find(|slot| slot.id == slot_id) else {
        return false;
    };

    match action {
        SlotAction::Complete(status) => {
            if slot.completion_status == Some(status) {
                return false;
            }

            slot.completion_status = Some(status);
            slot.completed_at = Some(at);
        }
        SlotAction::Uncomplete => {
            if slot.completion_status.is_none() && slot.completed_at.is_none() {
                return false;
            }

            slot.completion_status = None;
            slot.completed_at = None;
        }
    }

    derive(snapshot);
    true
}

/// Gives marked slots without `completed_at` a timestamp: the one already
/// cached for the same status, otherwise `now`.
fn stamp_completions(snapshot: &mut TodaySnapshot, current: &TodaySnapshot, now: OffsetDateTime) {
    for slot in snapshot.slots.iter_mut() {
        if slot.completion_status.is_none() || slot.completed_at.is_some() {
            continue;
        }

        let cached = current
            .slot(&slot.id)
            .filter(|cached| cached.completion_status == slot.completion_status)
            .and_then(|cached| cached.completed_at);

        slot.completed_at = Some(cached.unwrap_or(now));
    }
}

/// Orders slots by position, flags the first unmarked one as next and
/// recounts the stats. `streak_days` is server owned and left alone.
pub(crate) fn derive(snapshot: &mut TodaySnapshot) {
    snapshot.slots.sort_by_key(|slot| slot.position);

    let mut next_found = false;
    let mut completed = 0;

    for slot in snapshot.slots.iter_mut() {
        if slot.is_completed() {
            completed += 1;
            slot.is_next = false;
            continue;
        }

        slot.completed_at = None;
        slot.is_next = !next_found;
        next_found = true;
    }

    snapshot.stats.completed = completed;
    snapshot.stats.total = snapshot.slots.len() as u32;
}
