use sea_query::{
    ColumnDef, Index, IndexCreateStatement, IndexDropStatement, Table, TableCreateStatement,
    TableDropStatement,
};

use crate::table::TodayPendingMutation;

pub struct CreateTable;

fn create_table() -> TableCreateStatement {
    Table::create()
        .table(TodayPendingMutation::Table)
        .col(
            ColumnDef::new(TodayPendingMutation::QueueKey)
                .string()
                .not_null()
                .string_len(64),
        )
        .col(
            ColumnDef::new(TodayPendingMutation::SlotId)
                .string()
                .not_null()
                .string_len(64),
        )
        .col(
            ColumnDef::new(TodayPendingMutation::Action)
                .string()
                .not_null()
                .string_len(15),
        )
        .col(
            ColumnDef::new(TodayPendingMutation::Status)
                .string()
                .null()
                .string_len(15),
        )
        .col(
            ColumnDef::new(TodayPendingMutation::EnqueuedAt)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(TodayPendingMutation::Seq)
                .big_integer()
                .not_null(),
        )
        .primary_key(
            Index::create()
                .col(TodayPendingMutation::QueueKey)
                .col(TodayPendingMutation::SlotId),
        )
        .to_owned()
}

fn drop_table() -> TableDropStatement {
    Table::drop().table(TodayPendingMutation::Table).to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateTable {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_table().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_table().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}

pub struct CreateIdx1;

fn create_idx_1() -> IndexCreateStatement {
    Index::create()
        .name("idx_today_pending_mutation_seq")
        .table(TodayPendingMutation::Table)
        .col(TodayPendingMutation::QueueKey)
        .col(TodayPendingMutation::Seq)
        .to_owned()
}

fn drop_idx_1() -> IndexDropStatement {
    Index::drop()
        .name("idx_today_pending_mutation_seq")
        .table(TodayPendingMutation::Table)
        .to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateIdx1 {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_idx_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_idx_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}
