//! Schema reflection: turns declared settings into an ordered list of
//! [`FieldDescriptor`]s with their access rules resolved up front.

pub mod builder;
pub mod document;
pub mod environment;
pub mod field;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::permissions::AccessRule;

pub use builder::{FieldBuilder, SchemaBuilder, StaticSchema};
pub use document::SchemaDocument;
pub use environment::EnvironmentLayer;
pub use field::{DeclaredType, FieldDescriptor, FieldMetadata, RoleRequirement};

/// Source of setting declarations.
pub trait SettingsSchema: Send + Sync {
    /// Every declared field exactly once, in declaration order.
    fn describe_fields(&self) -> Result<Vec<FieldDescriptor>>;
}

/// A field as declared, before reflection checks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: DeclaredType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub fn reflect(declarations: &[FieldDeclaration]) -> Result<Vec<FieldDescriptor>> {
    let mut seen = HashSet::with_capacity(declarations.len());
    let mut fields = Vec::with_capacity(declarations.len());

    for declaration in declarations {
        let name = declaration.name.trim();
        if name.is_empty() {
            return Err(Error::Schema("field name cannot be empty".to_owned()));
        }
        if !seen.insert(name.to_owned()) {
            return Err(Error::Schema(format!("duplicate field name '{name}'")));
        }

        if let Some(default) = &declaration.default {
            if !declaration.declared_type.matches(default) {
                return Err(Error::Schema(format!(
                    "field '{name}': default value does not match declared type {}",
                    declaration.declared_type
                )));
            }
        }

        let metadata = FieldMetadata::from_map(name, &declaration.metadata)?;
        let access_rule = AccessRule::from_metadata(&metadata);

        fields.push(FieldDescriptor {
            name: name.to_owned(),
            declared_type: declaration.declared_type,
            default_value: declaration.default.clone(),
            description: declaration.description.clone(),
            metadata,
            access_rule,
        });
    }

    Ok(fields)
}
