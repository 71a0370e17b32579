use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::manager::types::SettingSource;
use crate::schema::environment::BaseValue;
use crate::schema::FieldDescriptor;

/// One generation of the in-memory view. Replaced wholesale, never edited
/// in place, so readers always see a consistent set of fields.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub values: Vec<Value>,
    pub sources: Vec<SettingSource>,
    /// Applied overrides, keyed by field name.
    pub overrides: HashMap<String, Value>,
    pub generation: u64,
}

impl Snapshot {
    pub fn from_base(base: &[BaseValue], generation: u64) -> Self {
        Self {
            values: base.iter().map(|entry| entry.value.clone()).collect(),
            sources: base.iter().map(|entry| entry.source).collect(),
            overrides: HashMap::new(),
            generation,
        }
    }

    /// Overrides for undeclared keys are ignored. Every declared key found in
    /// storage is applied and reported as `Database`, even when its value
    /// does not fit the declared type.
    pub fn derive(
        fields: &[FieldDescriptor],
        base: &[BaseValue],
        mut stored: HashMap<String, Value>,
        generation: u64,
    ) -> Self {
        let mut snapshot = Self::from_base(base, generation);
        for (index, field) in fields.iter().enumerate() {
            let Some(value) = stored.remove(&field.name) else {
                continue;
            };
            if !field.declared_type.matches(&value) {
                warn!(
                    setting = %field.name,
                    expected = %field.declared_type,
                    "stored override does not match the declared type"
                );
            }
            snapshot.values[index] = value.clone();
            snapshot.sources[index] = SettingSource::Database;
            snapshot.overrides.insert(field.name.clone(), value);
        }
        snapshot
    }

    pub fn changed_fields<'a>(
        &self,
        next: &Self,
        fields: &'a [FieldDescriptor],
    ) -> Vec<(usize, &'a str)> {
        fields
            .iter()
            .enumerate()
            .filter(|(index, _)| self.values[*index] != next.values[*index])
            .map(|(index, field)| (index, field.name.as_str()))
            .collect()
    }
}
