use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use poolcalc_core::persistence::{KeyValueStore, StorageError};

use super::{decode, timestamp, RepositoryError};
use crate::DbPool;

/// Durable local key-value store backed by the `kv_store` table.
pub struct SqlKeyValueStore {
    pool: DbPool,
}

impl SqlKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key").fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode(row.try_get::<String, _>("key"))).collect()
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| decode(row.try_get::<String, _>("value"))).transpose()
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        debug!(event_name = "db.kv.written", key, bytes = value.len(), "key written");
        Ok(())
    }

    async fn erase(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.fetch(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Ok(self.write(key, value).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        Ok(self.erase(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use poolcalc_core::persistence::{KeyValueStore, StorageError, SELECTION_KEY};

    use super::SqlKeyValueStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlKeyValueStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlKeyValueStore::new(pool)
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store = setup().await;
        assert_eq!(store.get(SELECTION_KEY).await.expect("get"), None);
    }

    #[tokio::test]
    async fn set_overwrites_and_remove_deletes() {
        let store = setup().await;

        store.set(SELECTION_KEY, "{\"a\":1}").await.expect("first set");
        store.set(SELECTION_KEY, "{\"a\":2}").await.expect("second set");
        assert_eq!(store.get(SELECTION_KEY).await.expect("get").as_deref(), Some("{\"a\":2}"));
        assert_eq!(store.keys().await.expect("keys"), vec![SELECTION_KEY.to_string()]);

        store.remove(SELECTION_KEY).await.expect("remove");
        assert_eq!(store.get(SELECTION_KEY).await.expect("get"), None);
    }

    #[tokio::test]
    async fn missing_schema_surfaces_as_backend_error() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let store = SqlKeyValueStore::new(pool);

        let error = store.get(SELECTION_KEY).await.expect_err("no table yet");
        assert!(matches!(error, StorageError::Backend(_)));
    }
}
