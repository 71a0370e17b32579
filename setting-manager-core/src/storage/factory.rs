use std::sync::Arc;

use crate::config::schema::{StorageBackendKind, StorageConfig};
use crate::error::{Error, Result};
use crate::storage::memory::MemoryStore;
use crate::storage::postgres::PostgresStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::SettingsStore;

/// SQL pools are created lazily but still need an ambient Tokio runtime.
pub fn create_settings_store(config: &StorageConfig) -> Result<Arc<dyn SettingsStore>> {
    match config.backend {
        StorageBackendKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackendKind::Sqlite => {
            let url = connection_url(config, "sqlite")?;
            let backend = SqliteStore::new(url, config.pool_size, &config.table_name)?;
            Ok(Arc::new(backend))
        }
        StorageBackendKind::Postgres => {
            let url = connection_url(config, "postgres")?;
            let backend = PostgresStore::new(url, config.pool_size, &config.table_name)?;
            Ok(Arc::new(backend))
        }
    }
}

fn connection_url<'a>(config: &'a StorageConfig, backend: &str) -> Result<&'a str> {
    config
        .connection_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "storage backend '{backend}' requires storage.connection_url"
            ))
        })
}
