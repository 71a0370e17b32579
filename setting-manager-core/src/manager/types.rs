use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::DeclaredType;

/// Where a field's effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    Database,
    Environment,
    Default,
}

impl SettingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Environment => "environment",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSetting {
    pub name: String,
    pub value: Value,
    pub source: SettingSource,
}

/// One row of the settings listing. Values are never masked here; use
/// `sensitive` to mask at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingInfo {
    pub name: String,
    pub value: Value,
    pub source: SettingSource,
    pub description: String,
    #[serde(rename = "type")]
    pub declared_type: DeclaredType,
    pub section: Option<String>,
    pub sensitive: bool,
}
