use std::collections::HashMap;
use std::path::Path;

use crate::config::schema::{ManagerConfig, StorageBackendKind};
use crate::config::validate_config;
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "SETTING_MANAGER_";

pub fn load_from_file(path: &Path) -> Result<ManagerConfig> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        Error::Config(format!("failed to read config '{}': {err}", path.display()))
    })?;

    toml::from_str(&content).map_err(|err| {
        Error::Config(format!(
            "failed to parse config '{}': {err}",
            path.display()
        ))
    })
}

/// Loads the file (or defaults when `path` is `None`), overlays
/// `SETTING_MANAGER_*` process variables and validates the result.
pub fn load(path: Option<&Path>) -> Result<ManagerConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => ManagerConfig::default(),
    };
    let vars: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();
    apply_env_overrides(&mut config, &vars)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides(
    config: &mut ManagerConfig,
    vars: &HashMap<String, String>,
) -> Result<()> {
    let get = |name: &str| vars.get(&format!("{ENV_PREFIX}{name}")).map(|v| v.trim());

    if let Some(role) = get("SUPERUSER_ROLE") {
        config.superuser_role = if role.is_empty() {
            None
        } else {
            Some(role.to_owned())
        };
    }
    if let Some(prefix) = get("ENV_PREFIX") {
        config.environment.prefix = prefix.to_owned();
    }
    if let Some(backend) = get("STORAGE_BACKEND") {
        config.storage.backend = match backend.to_ascii_lowercase().as_str() {
            "memory" => StorageBackendKind::Memory,
            "sqlite" => StorageBackendKind::Sqlite,
            "postgres" => StorageBackendKind::Postgres,
            other => {
                return Err(Error::Config(format!(
                    "unknown storage backend '{other}' in {ENV_PREFIX}STORAGE_BACKEND"
                )))
            }
        };
    }
    if let Some(url) = get("DATABASE_URL") {
        config.storage.connection_url = Some(url.to_owned());
    }
    if let Some(table) = get("TABLE_NAME") {
        config.storage.table_name = table.to_owned();
    }
    if let Some(timeout) = get("STORAGE_TIMEOUT_MS") {
        config.storage.operation_timeout_ms = timeout.parse().map_err(|err| {
            Error::Config(format!(
                "invalid {ENV_PREFIX}STORAGE_TIMEOUT_MS '{timeout}': {err}"
            ))
        })?;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.logging.level = level.to_owned();
    }
    Ok(())
}
