//! Resolution engine: the in-memory effective view of every declared field,
//! kept in step with persisted overrides.
//!
//! Reads are lock-free against an immutable [`Snapshot`](state::Snapshot).
//! Writes to one key are serialized by a per-key mutex that spans the storage
//! call and the snapshot swap. Whole-view operations (`reload`,
//! `reset_all_settings`) take the generation gate exclusively so they never
//! interleave with a single-key write.

mod builder;
mod reload_loop;
mod state;
pub mod types;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{EventBus, SettingsEvent};
use crate::notify::ChangeNotifier;
use crate::permissions::AccessPolicy;
use crate::schema::environment::BaseValue;
use crate::schema::{FieldDescriptor, SettingsSchema};
use crate::storage::model::OverrideMetadata;
use crate::storage::SettingsStore;
use crate::sweeper::sweep;

use state::Snapshot;

pub use builder::SettingsManagerBuilder;
pub use reload_loop::spawn_reload_loop;
pub use types::{EffectiveSetting, SettingInfo, SettingSource};

pub(crate) const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

pub struct SettingsManager {
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    base: Vec<BaseValue>,
    store: Arc<dyn SettingsStore>,
    access_policy: Arc<dyn AccessPolicy>,
    notifier: ChangeNotifier,
    events: EventBus,
    operation_timeout: Duration,
    state: ArcSwap<Snapshot>,
    lifecycle: AtomicU8,
    key_locks: Vec<Mutex<()>>,
    generation_gate: RwLock<()>,
}

impl SettingsManager {
    pub fn builder(
        schema: impl SettingsSchema + 'static,
        store: Arc<dyn SettingsStore>,
    ) -> SettingsManagerBuilder {
        SettingsManagerBuilder::new(schema, store)
    }

    /// Sweeps stale overrides, then loads the rest. Must complete before any
    /// other operation; subscribers are not notified for the initial load.
    pub async fn initialize(&self) -> Result<()> {
        self.lifecycle
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|state| {
                Error::Lifecycle(if state == READY {
                    "settings manager is already initialized".to_owned()
                } else {
                    "settings manager initialization is already in progress".to_owned()
                })
            })?;

        match self.load_initial().await {
            Ok(overrides) => {
                self.lifecycle.store(READY, Ordering::Release);
                info!(fields = self.fields.len(), overrides, "settings manager initialized");
                self.events.publish(SettingsEvent::Initialized {
                    fields: self.fields.len(),
                    overrides,
                });
                Ok(())
            }
            Err(err) => {
                self.lifecycle.store(UNINITIALIZED, Ordering::Release);
                warn!(error = %err, "settings manager initialization failed");
                Err(err)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == READY
    }

    /// Re-reads every override from storage and swaps the view atomically.
    /// Returns the names whose effective value changed; their subscribers are
    /// notified.
    pub async fn reload(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let _gate = self.generation_gate.write().await;

        let stored = self
            .storage_call("load overrides", self.store.get_all())
            .await?;
        let current = self.state.load_full();
        let next = Arc::new(Snapshot::derive(
            &self.fields,
            &self.base,
            stored,
            current.generation + 1,
        ));
        let previous = self.state.swap(next.clone());

        let changed = previous.changed_fields(&next, &self.fields);
        let names: Vec<String> = changed.iter().map(|(_, name)| (*name).to_owned()).collect();
        debug!(generation = next.generation, changed = names.len(), "settings reloaded");
        self.events.publish(SettingsEvent::Reloaded {
            changed: names.clone(),
        });

        self.notify_all(&changed, &previous, &next)?;
        Ok(names)
    }

    pub fn get_setting(&self, name: &str) -> Result<Value> {
        self.ensure_ready()?;
        let index = self.field_index(name)?;
        Ok(self.state.load().values[index].clone())
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get_setting(name)?;
        serde_json::from_value(value).map_err(|err| {
            Error::Validation(format!(
                "setting '{name}' cannot be read as the requested type: {err}"
            ))
        })
    }

    /// Deserializes the whole effective view, taken from one snapshot, into `T`.
    pub fn materialize<T: DeserializeOwned>(&self) -> Result<T> {
        self.ensure_ready()?;
        let snapshot = self.state.load();
        let object: Map<String, Value> = self
            .fields
            .iter()
            .zip(snapshot.values.iter())
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect();
        serde_json::from_value(Value::Object(object)).map_err(|err| {
            Error::Validation(format!("settings cannot be materialized: {err}"))
        })
    }

    pub fn effective(&self, name: &str) -> Result<EffectiveSetting> {
        self.ensure_ready()?;
        let index = self.field_index(name)?;
        let snapshot = self.state.load();
        Ok(EffectiveSetting {
            name: self.fields[index].name.clone(),
            value: snapshot.values[index].clone(),
            source: snapshot.sources[index],
        })
    }

    /// Every declared field, in declaration order, from one consistent view.
    pub fn get_settings_info(&self) -> Result<Vec<SettingInfo>> {
        self.ensure_ready()?;
        let snapshot = self.state.load();
        Ok(self
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| SettingInfo {
                name: field.name.clone(),
                value: snapshot.values[index].clone(),
                source: snapshot.sources[index],
                description: field.description.clone(),
                declared_type: field.declared_type,
                section: field.section().map(str::to_owned),
                sensitive: field.is_sensitive(),
            })
            .collect())
    }

    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn descriptor(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field_index(name).map(|index| &self.fields[index])
    }

    pub fn can_change(&self, name: &str, role: &str) -> Result<bool> {
        let field = self.descriptor(name)?;
        Ok(self.access_policy.check_change(field, role).is_allowed())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Persists `value` as the override for `name`, then updates the view.
    /// Nothing is written when the role is denied or the value has the wrong
    /// type; on storage failure the view is left unchanged.
    pub async fn update_setting(&self, name: &str, value: Value, role: &str) -> Result<()> {
        self.ensure_ready()?;
        let index = self.field_index(name)?;
        let field = &self.fields[index];

        if !self.access_policy.check_change(field, role).is_allowed() {
            warn!(setting = name, role, "setting change denied");
            self.events.publish(SettingsEvent::AccessDenied {
                key: name.to_owned(),
                role: role.to_owned(),
            });
            return Err(Error::AccessDenied {
                name: name.to_owned(),
                role: role.to_owned(),
            });
        }
        field.declared_type.check(name, &value)?;

        let _gate = self.generation_gate.read().await;
        let _key = self.key_locks[index].lock().await;

        self.storage_call(
            "save override",
            self.store
                .set(name, &value, OverrideMetadata::now(Some(role))),
        )
        .await?;

        let previous = self.apply(|snapshot| {
            snapshot.overrides.insert(name.to_owned(), value.clone());
            snapshot.values[index] = value.clone();
            snapshot.sources[index] = SettingSource::Database;
        });
        info!(setting = name, role, "setting updated");
        self.events.publish(SettingsEvent::Updated {
            key: name.to_owned(),
            role: role.to_owned(),
            source: SettingSource::Database,
        });

        let old = &previous.values[index];
        if *old != value {
            self.notifier.notify(name, old, &value)?;
        }
        Ok(())
    }

    /// Drops the override for `name`; the field falls back to its
    /// environment or default value.
    pub async fn reset_setting(&self, name: &str) -> Result<()> {
        self.ensure_ready()?;
        let index = self.field_index(name)?;

        let _gate = self.generation_gate.read().await;
        let _key = self.key_locks[index].lock().await;

        self.storage_call("delete override", self.store.delete(name))
            .await?;

        let base = &self.base[index];
        let previous = self.apply(|snapshot| {
            snapshot.overrides.remove(name);
            snapshot.values[index] = base.value.clone();
            snapshot.sources[index] = base.source;
        });
        info!(setting = name, source = %base.source, "setting reset");
        self.events.publish(SettingsEvent::Reset {
            key: name.to_owned(),
            source: base.source,
        });

        let old = &previous.values[index];
        if *old != base.value {
            self.notifier.notify(name, old, &base.value)?;
        }
        Ok(())
    }

    /// Drops every override and returns the names whose value changed.
    pub async fn reset_all_settings(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let _gate = self.generation_gate.write().await;

        self.storage_call("delete all overrides", self.store.delete_all())
            .await?;

        let current = self.state.load_full();
        let next = Arc::new(Snapshot::from_base(&self.base, current.generation + 1));
        let previous = self.state.swap(next.clone());

        let changed = previous.changed_fields(&next, &self.fields);
        let names: Vec<String> = changed.iter().map(|(_, name)| (*name).to_owned()).collect();
        info!(changed = names.len(), "all settings reset");
        self.events.publish(SettingsEvent::ResetAll {
            changed: names.clone(),
        });

        self.notify_all(&changed, &previous, &next)?;
        Ok(names)
    }

    async fn load_initial(&self) -> Result<usize> {
        let _gate = self.generation_gate.write().await;

        let valid: HashSet<String> = self.index.keys().cloned().collect();
        let removed = self
            .storage_call("sweep stale overrides", sweep(self.store.as_ref(), &valid))
            .await?;
        if !removed.is_empty() {
            self.events.publish(SettingsEvent::Swept { removed });
        }

        let stored = self
            .storage_call("load overrides", self.store.get_all())
            .await?;
        let snapshot = Snapshot::derive(&self.fields, &self.base, stored, 1);
        let overrides = snapshot.overrides.len();
        self.state.store(Arc::new(snapshot));
        Ok(overrides)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle.load(Ordering::Acquire) {
            READY => Ok(()),
            _ => Err(Error::Lifecycle(
                "settings manager is not initialized".to_owned(),
            )),
        }
    }

    fn field_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownKey(name.to_owned()))
    }

    /// Copy-on-write edit of the current snapshot. Returns the snapshot it replaced.
    fn apply<F>(&self, mutate: F) -> Arc<Snapshot>
    where
        F: Fn(&mut Snapshot),
    {
        self.state.rcu(|current| {
            let mut next = Snapshot::clone(current);
            mutate(&mut next);
            next.generation += 1;
            next
        })
    }

    fn notify_all(
        &self,
        changed: &[(usize, &str)],
        previous: &Snapshot,
        next: &Snapshot,
    ) -> Result<()> {
        let mut first_failure = None;
        for (index, name) in changed {
            if let Err(err) =
                self.notifier
                    .notify(name, &previous.values[*index], &next.values[*index])
            {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn storage_call<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(Error::StorageUnavailable(reason))) => Err(Error::StorageUnavailable(
                format!("{operation} failed: {reason}"),
            )),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::StorageUnavailable(format!(
                "{operation} timed out after {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("fields", &self.fields.len())
            .field("initialized", &self.is_initialized())
            .field("generation", &self.state.load().generation)
            .field("notifier", &self.notifier)
            .finish()
    }
}
