pub mod gateway;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

pub use self::gateway::{AutosaveSnapshot, PersistenceGateway, Settings};

pub const SELECTION_KEY: &str = "pool-estimate-selection";
pub const AUTOSAVE_KEY: &str = "pool-estimate-autosave";
pub const ESTIMATES_KEY: &str = "mos-pool-history";
pub const TEMPLATES_KEY: &str = "mos-pool-templates";
pub const CATALOG_KEY: &str = "mos-pool-catalog";
pub const SETTINGS_KEY: &str = "mos-pool-settings";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("storage quota exceeded for key {0}")]
    QuotaExceeded(String),
}

/// Durable string → string store holding UTF-8 JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    writes: RwLock<Vec<String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys in the order they were written, one entry per `set`.
    pub async fn write_log(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        self.writes.write().await.push(key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
