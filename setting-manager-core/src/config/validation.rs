use crate::config::schema::{ManagerConfig, StorageBackendKind};
use crate::error::{Error, Result};

pub fn validate_config(config: &ManagerConfig) -> Result<()> {
    if let Some(role) = &config.superuser_role {
        if role.trim().is_empty() {
            return Err(Error::Config(
                "superuser_role cannot be empty; omit it to disable the superuser".to_owned(),
            ));
        }
    }

    if !is_plain_identifier(&config.storage.table_name) {
        return Err(Error::Config(format!(
            "storage.table_name '{}' must be a plain identifier",
            config.storage.table_name
        )));
    }

    if config.storage.pool_size == 0 {
        return Err(Error::Config(
            "storage.pool_size must be greater than zero".to_owned(),
        ));
    }

    if config.storage.operation_timeout_ms == 0 {
        return Err(Error::Config(
            "storage.operation_timeout_ms must be greater than zero".to_owned(),
        ));
    }

    if matches!(
        config.storage.backend,
        StorageBackendKind::Sqlite | StorageBackendKind::Postgres
    ) && config
        .storage
        .connection_url
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        return Err(Error::Config(
            "storage.connection_url is required for SQL backends".to_owned(),
        ));
    }

    if config.reload.interval_secs == Some(0) {
        return Err(Error::Config(
            "reload.interval_secs must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

pub(crate) fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
