pub mod factory;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod sqlite;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::storage::model::{OverrideMetadata, PersistedOverride};

pub use factory::create_settings_store;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Durable key/value layer for setting overrides.
///
/// Operations on the same key are linearizable in call order; nothing is
/// promised across keys.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_all(&self) -> Result<HashMap<String, Value>>;
    async fn get_keys(&self) -> Result<HashSet<String>>;
    async fn get(&self, key: &str) -> Result<Option<PersistedOverride>>;
    /// Upsert.
    async fn set(&self, key: &str, value: &Value, metadata: OverrideMetadata) -> Result<()>;
    /// No-op when absent.
    async fn delete(&self, key: &str) -> Result<()>;
    async fn delete_many(&self, keys: &HashSet<String>) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
}
