use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::config::validation::is_plain_identifier;
use crate::error::{Error, Result};
use crate::storage::model::{decode_value, OverrideMetadata, PersistedOverride};
use crate::storage::SettingsStore;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: sqlx::PgPool,
    table: String,
    initialized: std::sync::Arc<OnceCell<()>>,
}

impl PostgresStore {
    /// Must be called from within a Tokio runtime.
    pub fn new(connection_url: &str, pool_size: usize, table: &str) -> Result<Self> {
        if !is_plain_identifier(table) {
            return Err(Error::Config(format!(
                "invalid settings table name '{table}'"
            )));
        }

        let pool = PgPoolOptions::new()
            .max_connections(pool_size.max(1) as u32)
            .connect_lazy(connection_url)
            .map_err(|err| Error::Config(format!("failed to create Postgres pool: {err}")))?;

        Ok(Self {
            pool,
            table: table.to_owned(),
            initialized: std::sync::Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                let statement = format!(
                    "CREATE TABLE IF NOT EXISTS {} (setting_key TEXT PRIMARY KEY, value_json TEXT NOT NULL, updated_at TEXT NOT NULL, updated_by_role TEXT)",
                    self.table
                );
                sqlx::query(&statement).execute(&self.pool).await?;
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(Error::from)
            .map(|_| ())
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|timestamp| timestamp.with_timezone(&Utc))
            .map_err(|err| {
                Error::StorageUnavailable(format!("failed to parse timestamp '{value}': {err}"))
            })
    }
}

#[async_trait]
impl SettingsStore for PostgresStore {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.ensure_initialized().await?;

        let rows = sqlx::query(&format!(
            "SELECT setting_key, value_json FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = row.get::<String, _>("setting_key");
            let value = decode_value(&key, &row.get::<String, _>("value_json"));
            values.insert(key, value);
        }
        Ok(values)
    }

    async fn get_keys(&self) -> Result<HashSet<String>> {
        self.ensure_initialized().await?;

        let rows = sqlx::query(&format!("SELECT setting_key FROM {}", self.table))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("setting_key"))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<PersistedOverride>> {
        self.ensure_initialized().await?;

        let row = sqlx::query(&format!(
            "SELECT value_json, updated_at, updated_by_role FROM {} WHERE setting_key = $1",
            self.table
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at = row.get::<String, _>("updated_at");
        Ok(Some(PersistedOverride {
            key: key.to_owned(),
            value: decode_value(key, &row.get::<String, _>("value_json")),
            updated_at: Self::parse_timestamp(&updated_at)?,
            updated_by_role: row.get::<Option<String>, _>("updated_by_role"),
        }))
    }

    async fn set(&self, key: &str, value: &Value, metadata: OverrideMetadata) -> Result<()> {
        self.ensure_initialized().await?;

        let payload = serde_json::to_string(value)?;
        sqlx::query(&format!(
            "INSERT INTO {}(setting_key, value_json, updated_at, updated_by_role) VALUES($1, $2, $3, $4) ON CONFLICT (setting_key) DO UPDATE SET value_json = EXCLUDED.value_json, updated_at = EXCLUDED.updated_at, updated_by_role = EXCLUDED.updated_by_role",
            self.table
        ))
        .bind(key)
        .bind(payload)
        .bind(metadata.updated_at.to_rfc3339())
        .bind(metadata.updated_by_role)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_initialized().await?;

        sqlx::query(&format!("DELETE FROM {} WHERE setting_key = $1", self.table))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, keys: &HashSet<String>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.ensure_initialized().await?;

        let keys: Vec<String> = keys.iter().cloned().collect();
        sqlx::query(&format!(
            "DELETE FROM {} WHERE setting_key = ANY($1)",
            self.table
        ))
        .bind(keys)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.ensure_initialized().await?;

        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
