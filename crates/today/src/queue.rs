use imkitchen_db::table::TodayPendingMutation;
use imkitchen_shared::today::{CompletionStatus, SlotAction, SlotActionKind};
use sea_query::{Expr, ExprTrait, Func, OnConflict, Query, SqliteQueryBuilder};
use sea_query_sqlx::SqlxBinder;
use sqlx::{SqlitePool, prelude::FromRow};
use time::OffsetDateTime;

/// Default key of the queue holding today's completion intents.
pub const TODAY_QUEUE_KEY: &str = "today";

/// A completion intent that could not reach the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    pub slot_id: String,
    pub action: SlotAction,
    pub enqueued_at: OffsetDateTime,
    seq: i64,
}

impl PendingMutation {
    pub fn seq(&self) -> i64 {
        self.seq
    }
}

#[derive(FromRow)]
struct PendingMutationRow {
    slot_id: String,
    action: String,
    status: Option<String>,
    enqueued_at: i64,
    seq: i64,
}

impl TryFrom<PendingMutationRow> for PendingMutation {
    type Error = imkitchen_shared::Error;

    fn try_from(row: PendingMutationRow) -> Result<Self, Self::Error> {
        let kind = row.action.parse::<SlotActionKind>()?;
        let status = row
            .status
            .as_deref()
            .map(str::parse::<CompletionStatus>)
            .transpose()?;

        let Some(action) = SlotAction::from_parts(kind, status) else {
            imkitchen_shared::bail!("pending mutation for slot {} has no status", row.slot_id);
        };

        Ok(Self {
            slot_id: row.slot_id,
            action,
            enqueued_at: OffsetDateTime::from_unix_timestamp(row.enqueued_at)?,
            seq: row.seq,
        })
    }
}

/// Ordered, persisted log of completion intents, at most one per slot.
///
/// Every call acquires its own connection and commits before returning, so
/// a reload at any point sees exactly what was acknowledged.
#[derive(Clone)]
pub struct DurableQueue {
    pool: SqlitePool,
    key: String,
}

impl DurableQueue {
    pub fn new(pool: SqlitePool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    pub fn today(pool: SqlitePool) -> Self {
        Self::new(pool, TODAY_QUEUE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Records `action` for `slot_id`. An earlier entry for the same slot is
    /// superseded and the new one goes to the back of the queue.
    pub async fn enqueue(
        &self,
        slot_id: impl Into<String>,
        action: SlotAction,
    ) -> imkitchen_shared::Result<PendingMutation> {
        let slot_id = slot_id.into();
        let enqueued_at = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let statement = Query::select()
            .expr(Func::max(Expr::col(TodayPendingMutation::Seq)))
            .from(TodayPendingMutation::Table)
            .and_where(Expr::col(TodayPendingMutation::QueueKey).eq(&self.key))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let last_seq = sqlx::query_scalar_with::<_, Option<i64>, _>(&sql, values)
            .fetch_one(&mut *tx)
            .await?;
        let seq = last_seq.unwrap_or_default() + 1;

        let statement = Query::insert()
            .into_table(TodayPendingMutation::Table)
            .columns([
                TodayPendingMutation::QueueKey,
                TodayPendingMutation::SlotId,
                TodayPendingMutation::Action,
                TodayPendingMutation::Status,
                TodayPendingMutation::EnqueuedAt,
                TodayPendingMutation::Seq,
            ])
            .values_panic([
                self.key.to_owned().into(),
                slot_id.to_owned().into(),
                action.kind().to_string().into(),
                action.status().map(|s| s.to_string()).into(),
                enqueued_at.unix_timestamp().into(),
                seq.into(),
            ])
            .on_conflict(
                OnConflict::columns([TodayPendingMutation::QueueKey, TodayPendingMutation::SlotId])
                    .update_columns([
                        TodayPendingMutation::Action,
                        TodayPendingMutation::Status,
                        TodayPendingMutation::EnqueuedAt,
                        TodayPendingMutation::Seq,
                    ])
                    .to_owned(),
            )
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!(slot_id, %action, seq, queue = %self.key, "mutation queued");

        Ok(PendingMutation {
            slot_id,
            action,
            enqueued_at: OffsetDateTime::from_unix_timestamp(enqueued_at.unix_timestamp())?,
            seq,
        })
    }

    /// All pending entries, oldest first. Nothing is removed.
    pub async fn drain(&self) -> imkitchen_shared::Result<Vec<PendingMutation>> {
        let statement = Query::select()
            .columns([
                TodayPendingMutation::SlotId,
                TodayPendingMutation::Action,
                TodayPendingMutation::Status,
                TodayPendingMutation::EnqueuedAt,
                TodayPendingMutation::Seq,
            ])
            .from(TodayPendingMutation::Table)
            .and_where(Expr::col(TodayPendingMutation::QueueKey).eq(&self.key))
            .order_by(TodayPendingMutation::Seq, sea_query::Order::Asc)
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as_with::<_, PendingMutationRow, _>(&sql, values)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(PendingMutation::try_from).collect()
    }

    pub async fn remove(&self, slot_id: &str) -> imkitchen_shared::Result<()> {
        let statement = Query::delete()
            .from_table(TodayPendingMutation::Table)
            .and_where(Expr::col(TodayPendingMutation::QueueKey).eq(&self.key))
            .and_where(Expr::col(TodayPendingMutation::SlotId).eq(slot_id))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let mut conn = self.pool.acquire().await?;
        sqlx::query_with(&sql, values).execute(&mut *conn).await?;

        Ok(())
    }

    /// Removes `mutation` only if it has not been superseded in the meantime.
    /// Returns whether a row was deleted.
    pub async fn acknowledge(&self, mutation: &PendingMutation) -> imkitchen_shared::Result<bool> {
        let statement = Query::delete()
            .from_table(TodayPendingMutation::Table)
            .and_where(Expr::col(TodayPendingMutation::QueueKey).eq(&self.key))
            .and_where(Expr::col(TodayPendingMutation::SlotId).eq(&mutation.slot_id))
            .and_where(Expr::col(TodayPendingMutation::Seq).eq(mutation.seq))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn len(&self) -> imkitchen_shared::Result<usize> {
        let statement = Query::select()
            .expr(Func::count(Expr::col(TodayPendingMutation::SlotId)))
            .from(TodayPendingMutation::Table)
            .and_where(Expr::col(TodayPendingMutation::QueueKey).eq(&self.key))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let mut conn = self.pool.acquire().await?;
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, values)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> imkitchen_shared::Result<bool> {
        Ok(self.len().await? == 0)
    }
}
