use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod dlq_repo;
pub mod entity_repo;
pub mod outbox_repo;
pub mod seed;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(dsn: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(dsn)
        .await
}
