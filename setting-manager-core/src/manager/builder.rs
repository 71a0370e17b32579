use std::collections::HashMap;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, RwLock};

use crate::config::{validate_config, ManagerConfig};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::manager::state::Snapshot;
use crate::manager::{SettingsManager, UNINITIALIZED};
use crate::notify::{CallbackResult, ChangeNotifier};
use crate::permissions::{AccessPolicy, RoleAccessPolicy};
use crate::schema::{EnvironmentLayer, SettingsSchema};
use crate::storage::{create_settings_store, SettingsStore};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Setup-time wiring for a [`SettingsManager`]. Change subscriptions can only
/// be registered here, before the manager exists.
pub struct SettingsManagerBuilder {
    schema: Box<dyn SettingsSchema>,
    store: Arc<dyn SettingsStore>,
    superuser_role: Option<String>,
    access_policy: Option<Arc<dyn AccessPolicy>>,
    environment: EnvironmentLayer,
    notifier: ChangeNotifier,
    events: EventBus,
    operation_timeout: Duration,
}

impl SettingsManagerBuilder {
    pub fn new(schema: impl SettingsSchema + 'static, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            schema: Box::new(schema),
            store,
            superuser_role: None,
            access_policy: None,
            environment: EnvironmentLayer::empty(),
            notifier: ChangeNotifier::new(),
            events: EventBus::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Validates `config`, opens the configured store and applies
    /// [`with_config`](Self::with_config). SQL stores need a Tokio runtime.
    pub fn from_config(
        schema: impl SettingsSchema + 'static,
        config: &ManagerConfig,
    ) -> Result<Self> {
        validate_config(config)?;
        let store = create_settings_store(&config.storage)?;
        Ok(Self::new(schema, store).with_config(config))
    }

    /// Superuser role, environment variables and storage timeout from `config`.
    pub fn with_config(self, config: &ManagerConfig) -> Self {
        let builder = self
            .environment(EnvironmentLayer::from_process(&config.environment))
            .operation_timeout(config.storage.operation_timeout());
        match &config.superuser_role {
            Some(role) => builder.superuser_role(role.clone()),
            None => builder,
        }
    }

    pub fn superuser_role(mut self, role: impl Into<String>) -> Self {
        self.superuser_role = Some(role.into());
        self
    }

    /// Replaces the default [`RoleAccessPolicy`]; `superuser_role` is then ignored.
    pub fn access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access_policy = Some(policy);
        self
    }

    pub fn environment(mut self, environment: EnvironmentLayer) -> Self {
        self.environment = environment;
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn on_change<F>(mut self, key: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&serde_json::Value, &serde_json::Value) -> CallbackResult + Send + Sync + 'static,
    {
        self.notifier.subscribe(key, callback);
        self
    }

    pub fn build(self) -> Result<SettingsManager> {
        let fields = self.schema.describe_fields()?;
        let index: HashMap<String, usize> = fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.name.clone(), position))
            .collect();

        if let Some(key) = self.notifier.keys().find(|key| !index.contains_key(*key)) {
            return Err(Error::UnknownKey(key.to_owned()));
        }

        let base = fields
            .iter()
            .map(|field| self.environment.resolve(field))
            .collect::<Result<Vec<_>>>()?;

        if self.operation_timeout.is_zero() {
            return Err(Error::Config(
                "storage operation timeout must be greater than zero".to_owned(),
            ));
        }

        let access_policy: Arc<dyn AccessPolicy> = match self.access_policy {
            Some(policy) => policy,
            None => Arc::new(RoleAccessPolicy::new(self.superuser_role)),
        };
        let key_locks = fields.iter().map(|_| Mutex::new(())).collect();
        let state = ArcSwap::from_pointee(Snapshot::from_base(&base, 0));

        Ok(SettingsManager {
            fields,
            index,
            base,
            store: self.store,
            access_policy,
            notifier: self.notifier,
            events: self.events,
            operation_timeout: self.operation_timeout,
            state,
            lifecycle: AtomicU8::new(UNINITIALIZED),
            key_locks,
            generation_gate: RwLock::new(()),
        })
    }
}
