use sea_query::Iden;

/// Offline completion intents waiting to be replayed, one row per slot and
/// queue key.
#[derive(Iden, Clone)]
pub enum TodayPendingMutation {
    Table,
    QueueKey,
    SlotId,
    Action,
    Status,
    EnqueuedAt,
    Seq,
}
