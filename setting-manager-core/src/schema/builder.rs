use serde_json::Value;

use crate::error::Result;
use crate::schema::field::RoleRequirement;
use crate::schema::{reflect, DeclaredType, FieldDeclaration, FieldDescriptor, SettingsSchema};

/// Fluent declaration of a single field.
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    declaration: FieldDeclaration,
}

impl FieldBuilder {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            declaration: FieldDeclaration {
                name: name.into(),
                declared_type,
                default: None,
                description: String::new(),
                metadata: Default::default(),
            },
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.declaration.default = Some(value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.declaration.description = description.into();
        self
    }

    pub fn section(self, section: impl Into<String>) -> Self {
        self.metadata("section", Value::String(section.into()))
    }

    pub fn immutable(self) -> Self {
        self.metadata("immutable", Value::Bool(true))
    }

    pub fn sensitive(self) -> Self {
        self.metadata("sensitive", Value::Bool(true))
    }

    pub fn allow_change(self, allow: bool) -> Self {
        self.metadata("allow_change", Value::Bool(allow))
    }

    pub fn required_role(self, requirement: RoleRequirement) -> Self {
        let value = match requirement {
            RoleRequirement::Single(role) => Value::String(role),
            RoleRequirement::AnyOf(roles) => {
                Value::Array(roles.into_iter().map(Value::String).collect())
            }
        };
        self.metadata("required_role", value)
    }

    /// Arbitrary metadata; keys the core does not know are carried but ignored.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declaration.metadata.insert(key.into(), value.into());
        self
    }

    pub fn into_declaration(self) -> FieldDeclaration {
        self.declaration
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDeclaration>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field.into_declaration());
        self
    }

    /// Checks are deferred to [`SettingsSchema::describe_fields`].
    pub fn build(self) -> StaticSchema {
        StaticSchema {
            fields: self.fields,
        }
    }
}

/// Schema declared in code.
#[derive(Debug, Clone)]
pub struct StaticSchema {
    fields: Vec<FieldDeclaration>,
}

impl StaticSchema {
    pub fn declarations(&self) -> &[FieldDeclaration] {
        &self.fields
    }
}

impl SettingsSchema for StaticSchema {
    fn describe_fields(&self) -> Result<Vec<FieldDescriptor>> {
        reflect(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::{FieldBuilder, SchemaBuilder};
    use crate::permissions::AccessRule;
    use crate::schema::{DeclaredType, RoleRequirement, SettingsSchema};

    #[test]
    fn builder_metadata_round_trips_through_reflection() {
        let roles: BTreeSet<String> = ["developer", "tester"].map(str::to_owned).into();
        let schema = SchemaBuilder::new()
            .field(
                FieldBuilder::new("feature_flags", DeclaredType::List)
                    .default_value(json!([]))
                    .section("Features")
                    .required_role(RoleRequirement::AnyOf(roles.clone())),
            )
            .field(
                FieldBuilder::new("api_key", DeclaredType::String)
                    .default_value("secret")
                    .sensitive()
                    .metadata("ui_hint", "password"),
            )
            .build();

        let fields = schema.describe_fields().expect("schema should reflect");
        assert_eq!(
            fields[0].access_rule,
            AccessRule::Roles(RoleRequirement::AnyOf(roles))
        );
        assert_eq!(fields[0].section(), Some("Features"));
        assert!(fields[1].is_sensitive());
        assert_eq!(fields[1].access_rule, AccessRule::Private);
    }

    #[test]
    fn malformed_builder_fails_at_reflection_not_at_build() {
        let schema = SchemaBuilder::new()
            .field(FieldBuilder::new("flag", DeclaredType::Boolean).metadata("immutable", 1))
            .build();

        assert!(schema.describe_fields().is_err());
    }
}
