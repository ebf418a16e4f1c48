pub mod kv;
pub mod postgres;
pub mod saved;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use postgres::PgKeyValueStore;
pub use saved::{SavedAnalysisStore, SAVED_ANALYSES_KEY};

use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
