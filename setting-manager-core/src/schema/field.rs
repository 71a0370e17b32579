use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::permissions::AccessRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    #[serde(alias = "str")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    List,
    #[serde(alias = "dict")]
    Object,
    Any,
}

impl DeclaredType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Integers are accepted where a float is declared.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    pub fn check(self, name: &str, value: &Value) -> Result<()> {
        if self.matches(value) {
            return Ok(());
        }
        Err(Error::Validation(format!(
            "setting '{name}' expects {}, got {}",
            self.as_str(),
            json_kind(value)
        )))
    }

    /// Parses a raw environment string into a JSON value of this type.
    pub fn parse_raw(self, raw: &str) -> std::result::Result<Value, String> {
        let trimmed = raw.trim();
        match self {
            Self::String => Ok(Value::String(raw.to_owned())),
            Self::Integer => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|err| format!("expected integer: {err}")),
            Self::Float => trimmed
                .parse::<f64>()
                .map_err(|err| format!("expected float: {err}"))
                .and_then(|number| {
                    serde_json::Number::from_f64(number)
                        .map(Value::Number)
                        .ok_or_else(|| "float must be finite".to_owned())
                }),
            Self::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                other => Err(format!("expected boolean, got '{other}'")),
            },
            Self::List | Self::Object | Self::Any => {
                let value: Value = serde_json::from_str(trimmed)
                    .map_err(|err| format!("expected JSON {}: {err}", self.as_str()))?;
                if self.matches(&value) {
                    Ok(value)
                } else {
                    Err(format!("expected {}, got {}", self.as_str(), json_kind(&value)))
                }
            }
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Either a single role or a set of roles, any of which may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRequirement {
    Single(String),
    AnyOf(BTreeSet<String>),
}

impl RoleRequirement {
    pub fn permits(&self, role: &str) -> bool {
        match self {
            Self::Single(required) => required == role,
            Self::AnyOf(roles) => roles.contains(role),
        }
    }

    pub fn roles(&self) -> Vec<&str> {
        match self {
            Self::Single(role) => vec![role.as_str()],
            Self::AnyOf(roles) => roles.iter().map(String::as_str).collect(),
        }
    }
}

/// Policy flags recognized out of a field's open metadata map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMetadata {
    pub immutable: bool,
    pub sensitive: bool,
    pub allow_change: Option<bool>,
    pub required_role: Option<RoleRequirement>,
    pub section: Option<String>,
}

impl FieldMetadata {
    /// Unrecognized keys are ignored.
    pub fn from_map(field: &str, map: &Map<String, Value>) -> Result<Self> {
        let flag = |keys: &[&str]| -> Result<Option<bool>> {
            let Some((key, value)) = keys
                .iter()
                .find_map(|key| map.get(*key).map(|value| (*key, value)))
            else {
                return Ok(None);
            };
            value.as_bool().map(Some).ok_or_else(|| {
                Error::Schema(format!(
                    "field '{field}': metadata '{key}' must be a boolean"
                ))
            })
        };

        let required_role = match map.get("required_role").or_else(|| map.get("requiredRole")) {
            None | Some(Value::Null) => None,
            Some(Value::String(role)) => Some(RoleRequirement::Single(role.clone())),
            Some(Value::Array(items)) => {
                let mut roles = BTreeSet::new();
                for item in items {
                    let role = item.as_str().ok_or_else(|| {
                        Error::Schema(format!(
                            "field '{field}': required_role entries must be strings"
                        ))
                    })?;
                    roles.insert(role.to_owned());
                }
                Some(RoleRequirement::AnyOf(roles))
            }
            Some(_) => {
                return Err(Error::Schema(format!(
                    "field '{field}': required_role must be a string or a list of strings"
                )))
            }
        };

        let section = match map.get("section") {
            None | Some(Value::Null) => None,
            Some(Value::String(section)) => Some(section.clone()),
            Some(_) => {
                return Err(Error::Schema(format!(
                    "field '{field}': section must be a string"
                )))
            }
        };

        Ok(Self {
            immutable: flag(&["immutable"])?.unwrap_or(false),
            sensitive: flag(&["sensitive"])?.unwrap_or(false),
            allow_change: flag(&["allow_change", "allowChange"])?,
            required_role,
            section,
        })
    }
}

/// A reflected setting. Built once per schema and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: DeclaredType,
    /// `None` marks a required field that must come from the environment.
    pub default_value: Option<Value>,
    pub description: String,
    pub metadata: FieldMetadata,
    #[serde(skip)]
    pub access_rule: AccessRule,
}

impl FieldDescriptor {
    pub fn is_sensitive(&self) -> bool {
        self.metadata.sensitive
    }

    pub fn section(&self) -> Option<&str> {
        self.metadata.section.as_deref()
    }
}
