mod today_pending_mutation;

use sqlx_migrator::vec_box;

pub struct Migration;

sqlx_migrator::sqlite_migration!(
    Migration,
    "imkitchen",
    "m0001",
    vec_box![],
    vec_box![
        today_pending_mutation::CreateTable,
        today_pending_mutation::CreateIdx1
    ]
);
