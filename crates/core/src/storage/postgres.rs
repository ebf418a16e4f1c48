use crate::storage::kv::KeyValueStore;
use anyhow::Context;

/// `kv_store` table backend, for deployments that already run Postgres.
#[derive(Debug, Clone)]
pub struct PgKeyValueStore {
    pool: sqlx::PgPool,
}

impl PgKeyValueStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect DATABASE_URL failed")?;
        crate::storage::migrate(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for PgKeyValueStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE key = $1")
                .persistent(false)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("select kv_store failed (key={key})"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert kv_store failed (key={key})"))?;
        Ok(())
    }
}
