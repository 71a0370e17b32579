use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{reflect, FieldDeclaration, FieldDescriptor, SettingsSchema};

/// Schema declared in a TOML, JSON or YAML file:
///
/// ```toml
/// [[fields]]
/// name = "environment"
/// type = "string"
/// default = "production"
/// description = "Deployment environment"
/// metadata = { section = "System", immutable = true }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

impl SchemaDocument {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|err| Error::Schema(format!("failed to parse TOML schema: {err}")))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|err| Error::Schema(format!("failed to parse JSON schema: {err}")))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|err| Error::Schema(format!("failed to parse YAML schema: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::Schema(format!("failed to read schema '{}': {err}", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(Error::Schema(format!(
                "unsupported schema format '{other}' for '{}'",
                path.display()
            ))),
        }
    }
}

impl SettingsSchema for SchemaDocument {
    fn describe_fields(&self) -> Result<Vec<FieldDescriptor>> {
        reflect(&self.fields)
    }
}
