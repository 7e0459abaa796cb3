/// String-valued key/value storage for the persisted run state
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::{OnceCell, RwLock};

use crate::database::connection::execute_with_retry;
use crate::error::StoreError;

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Store backed by a single PostgreSQL table
#[derive(Debug, Clone)]
pub struct PostgresStore {
    database_url: String,
    // Set once the table is known to exist; a failed attempt leaves it empty
    table_ready: Arc<OnceCell<()>>,
}

impl PostgresStore {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            table_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        self.table_ready
            .get_or_try_init(|| async {
                execute_with_retry(&self.database_url, |client| async move {
                    client.batch_execute(CREATE_TABLE).await
                })
                .await?;
                info!("State table ready");
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_table().await?;
        let key = key.to_string();

        execute_with_retry(&self.database_url, move |client| {
            let key = key.clone();
            async move {
                let row = client
                    .query_opt("SELECT value FROM kv_store WHERE key = $1", &[&key])
                    .await?;
                Ok::<_, tokio_postgres::Error>(row.map(|row| row.get::<_, String>(0)))
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.ensure_table().await?;
        let key = key.to_string();

        execute_with_retry(&self.database_url, move |client| {
            let key = key.clone();
            let value = value.clone();
            async move {
                client
                    .execute(
                        "INSERT INTO kv_store(key, value) VALUES ($1, $2)
                         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
                        &[&key, &value],
                    )
                    .await?;
                Ok::<_, tokio_postgres::Error>(())
            }
        })
        .await
    }
}

/// Process-local store, lost on exit
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Pick the backend for a `DATABASE_URL`; `memory` keeps state in-process
pub fn open_store(database_url: &str) -> Arc<dyn StateStore> {
    if database_url.eq_ignore_ascii_case("memory") {
        info!("Using in-memory state store");
        Arc::new(MemoryStore::new())
    } else {
        info!("Using PostgreSQL state store");
        Arc::new(PostgresStore::new(database_url))
    }
}
