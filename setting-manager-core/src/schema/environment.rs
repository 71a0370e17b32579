use std::collections::HashMap;

use serde_json::Value;

use crate::config::EnvironmentConfig;
use crate::error::{Error, Result};
use crate::manager::types::SettingSource;
use crate::schema::FieldDescriptor;

/// A field's value before persisted overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseValue {
    pub value: Value,
    pub source: SettingSource,
}

/// Snapshot of environment variables consulted for field values.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLayer {
    prefix: String,
    case_sensitive: bool,
    vars: HashMap<String, String>,
}

impl EnvironmentLayer {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_process(config: &EnvironmentConfig) -> Self {
        Self::from_pairs(config, std::env::vars())
    }

    pub fn from_pairs<I, K, V>(config: &EnvironmentConfig, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let case_sensitive = config.case_sensitive;
        let vars = pairs
            .into_iter()
            .map(|(key, value)| {
                let key: String = key.into();
                let key = if case_sensitive {
                    key
                } else {
                    key.to_ascii_uppercase()
                };
                (key, value.into())
            })
            .collect();

        Self {
            prefix: config.prefix.clone(),
            case_sensitive,
            vars,
        }
    }

    pub fn variable_name(&self, field: &str) -> String {
        let name = format!("{}{}", self.prefix, field);
        if self.case_sensitive {
            name
        } else {
            name.to_ascii_uppercase()
        }
    }

    pub fn lookup(&self, field: &str) -> Option<&str> {
        self.vars
            .get(&self.variable_name(field))
            .map(String::as_str)
    }

    /// Environment beats the declared default; provenance records which one won.
    pub fn resolve(&self, descriptor: &FieldDescriptor) -> Result<BaseValue> {
        if let Some(raw) = self.lookup(&descriptor.name) {
            let value = descriptor.declared_type.parse_raw(raw).map_err(|reason| {
                Error::Config(format!(
                    "environment variable '{}' for setting '{}' is invalid: {reason}",
                    self.variable_name(&descriptor.name),
                    descriptor.name
                ))
            })?;
            return Ok(BaseValue {
                value,
                source: SettingSource::Environment,
            });
        }

        match &descriptor.default_value {
            Some(value) => Ok(BaseValue {
                value: value.clone(),
                source: SettingSource::Default,
            }),
            None => Err(Error::Config(format!(
                "setting '{}' has no default and '{}' is not set",
                descriptor.name,
                self.variable_name(&descriptor.name)
            ))),
        }
    }
}
