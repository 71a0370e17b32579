use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::model::{OverrideMetadata, PersistedOverride};
use crate::storage::SettingsStore;

/// Reference adapter. Behaves like the SQL stores except that nothing
/// survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, PersistedOverride>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect())
    }

    async fn get_keys(&self) -> Result<HashSet<String>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<PersistedOverride>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value, metadata: OverrideMetadata) -> Result<()> {
        self.records.write().await.insert(
            key.to_owned(),
            PersistedOverride {
                key: key.to_owned(),
                value: value.clone(),
                updated_at: metadata.updated_at,
                updated_by_role: metadata.updated_by_role,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &HashSet<String>) -> Result<()> {
        let mut records = self.records.write().await;
        for key in keys {
            records.remove(key);
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
