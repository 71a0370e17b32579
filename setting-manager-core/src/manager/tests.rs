use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{spawn_reload_loop, SettingSource, SettingsManager};
use crate::config::EnvironmentConfig;
use crate::error::{Error, Result};
use crate::events::SettingsEvent;
use crate::schema::{
    DeclaredType, EnvironmentLayer, FieldBuilder, RoleRequirement, SchemaBuilder, StaticSchema,
};
use crate::storage::model::{OverrideMetadata, PersistedOverride};
use crate::storage::{MemoryStore, SettingsStore, SqliteStore};

const SUPERUSER: &str = "superuser";

fn app_schema() -> StaticSchema {
    let testers: BTreeSet<String> = ["developer", "tester"].map(str::to_owned).into();
    SchemaBuilder::new()
        .field(
            FieldBuilder::new("app_name", DeclaredType::String)
                .default_value("My App")
                .description("Application name")
                .section("General"),
        )
        .field(
            FieldBuilder::new("environment", DeclaredType::String)
                .default_value("production")
                .section("System")
                .immutable(),
        )
        .field(
            FieldBuilder::new("admin_email", DeclaredType::String)
                .default_value("admin@example.com")
                .required_role(RoleRequirement::Single("admin".to_owned())),
        )
        .field(
            FieldBuilder::new("feature_flags", DeclaredType::List)
                .default_value(json!([]))
                .section("Features")
                .required_role(RoleRequirement::AnyOf(testers)),
        )
        .field(
            FieldBuilder::new("api_key", DeclaredType::String)
                .default_value("secret")
                .sensitive(),
        )
        .field(
            FieldBuilder::new("service_host", DeclaredType::String)
                .default_value("localhost")
                .allow_change(false),
        )
        .field(
            FieldBuilder::new("log_level", DeclaredType::String)
                .default_value("INFO")
                .allow_change(true),
        )
        .field(
            FieldBuilder::new("max_connections", DeclaredType::Integer)
                .default_value(10)
                .allow_change(true),
        )
        .build()
}

async fn ready(store: Arc<dyn SettingsStore>) -> SettingsManager {
    let manager = SettingsManager::builder(app_schema(), store)
        .superuser_role(SUPERUSER)
        .build()
        .expect("manager should build");
    manager.initialize().await.expect("manager should initialize");
    manager
}

/// Memory store that can be switched to fail or stall.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    stall: Option<Duration>,
}

impl FlakyStore {
    fn stalling(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Self::default()
        }
    }

    async fn gate(&self) -> Result<()> {
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("connection refused".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FlakyStore {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.gate().await?;
        self.inner.get_all().await
    }

    async fn get_keys(&self) -> Result<HashSet<String>> {
        self.gate().await?;
        self.inner.get_keys().await
    }

    async fn get(&self, key: &str) -> Result<Option<PersistedOverride>> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value, metadata: OverrideMetadata) -> Result<()> {
        self.gate().await?;
        self.inner.set(key, value, metadata).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &HashSet<String>) -> Result<()> {
        self.gate().await?;
        self.inner.delete_many(keys).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.gate().await?;
        self.inner.delete_all().await
    }
}

fn recorder() -> (
    Arc<Mutex<Vec<(Value, Value)>>>,
    impl Fn(&Value, &Value) -> std::result::Result<(), String> + Send + Sync + 'static,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let callback = move |old: &Value, new: &Value| -> std::result::Result<(), String> {
        sink.lock().unwrap().push((old.clone(), new.clone()));
        Ok(())
    };
    (calls, callback)
}

#[tokio::test]
async fn operations_before_initialize_fail_fast() {
    let manager = SettingsManager::builder(app_schema(), Arc::new(MemoryStore::new()))
        .build()
        .unwrap();

    assert_eq!(manager.get_setting("app_name").unwrap_err().kind(), "lifecycle");
    assert_eq!(manager.get_settings_info().unwrap_err().kind(), "lifecycle");
    let error = manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .expect_err("update before init should fail");
    assert!(matches!(error, Error::Lifecycle(_)));
    assert!(manager.reload().await.is_err());
}

#[tokio::test]
async fn initialize_twice_is_a_lifecycle_error() {
    let manager = ready(Arc::new(MemoryStore::new())).await;
    let error = manager.initialize().await.expect_err("second init should fail");
    assert!(error.to_string().contains("already initialized"));
    assert!(manager.is_initialized());
}

#[tokio::test]
async fn failed_initialize_can_be_retried() {
    let store = Arc::new(FlakyStore::default());
    store.failing.store(true, Ordering::SeqCst);
    let manager = SettingsManager::builder(app_schema(), store.clone())
        .build()
        .unwrap();

    let error = manager.initialize().await.expect_err("storage is down");
    assert!(error.is_retryable());
    assert!(!manager.is_initialized());

    store.failing.store(false, Ordering::SeqCst);
    manager.initialize().await.expect("retry should succeed");
}

#[tokio::test]
async fn initialize_sweeps_undeclared_keys_and_loads_the_rest() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("app_name", &json!("Persisted"), OverrideMetadata::now(Some(SUPERUSER)))
        .await
        .unwrap();
    store
        .set("removed_field", &json!(1), OverrideMetadata::now(None))
        .await
        .unwrap();

    let manager = ready(store.clone()).await;

    assert_eq!(manager.get_setting("app_name").unwrap(), json!("Persisted"));
    assert_eq!(
        manager.effective("app_name").unwrap().source,
        SettingSource::Database
    );
    assert!(store.get("removed_field").await.unwrap().is_none());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn stored_value_of_wrong_type_still_reports_database() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("max_connections", &json!("lots"), OverrideMetadata::now(None))
        .await
        .unwrap();

    let manager = ready(store.clone()).await;
    let effective = manager.effective("max_connections").unwrap();
    assert_eq!(effective.value, json!("lots"));
    assert_eq!(effective.source, SettingSource::Database);
    assert!(store.get("max_connections").await.unwrap().is_some());
    assert!(manager.get_as::<u32>("max_connections").is_err());

    // resetting is how an operator clears it
    manager.reset_setting("max_connections").await.unwrap();
    let effective = manager.effective("max_connections").unwrap();
    assert_eq!(effective.value, json!(10));
    assert_eq!(effective.source, SettingSource::Default);
}

#[tokio::test]
async fn source_is_database_exactly_when_the_key_is_stored() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("log_level", &json!(5), OverrideMetadata::now(None))
        .await
        .unwrap();
    store
        .set("app_name", &json!("Stored"), OverrideMetadata::now(None))
        .await
        .unwrap();
    let manager = ready(store.clone()).await;

    for info in manager.get_settings_info().unwrap() {
        let stored = store.get(&info.name).await.unwrap().is_some();
        assert_eq!(info.source == SettingSource::Database, stored, "{}", info.name);
    }
}

#[tokio::test]
async fn unknown_keys_are_rejected() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    assert!(matches!(manager.get_setting("nope"), Err(Error::UnknownKey(_))));
    let error = manager
        .update_setting("nope", json!(1), SUPERUSER)
        .await
        .expect_err("unknown key");
    assert_eq!(error.status_code(), 404);
    assert!(manager.reset_setting("nope").await.is_err());
}

#[tokio::test]
async fn immutable_field_denies_every_role() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store.clone()).await;

    for role in [SUPERUSER, "admin", "developer", "user"] {
        let error = manager
            .update_setting("environment", json!("staging"), role)
            .await
            .expect_err("immutable field");
        assert!(matches!(error, Error::AccessDenied { .. }));
    }
    assert_eq!(manager.get_setting("environment").unwrap(), json!("production"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn required_role_admits_listed_roles_and_superuser() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    manager
        .update_setting("admin_email", json!("ops@example.com"), "admin")
        .await
        .expect("admin may change admin_email");
    manager
        .update_setting("admin_email", json!("root@example.com"), SUPERUSER)
        .await
        .expect("superuser may change admin_email");
    assert!(manager
        .update_setting("admin_email", json!("x@example.com"), "developer")
        .await
        .is_err());

    for role in ["developer", "tester", SUPERUSER] {
        manager
            .update_setting("feature_flags", json!([role]), role)
            .await
            .expect("role in set");
    }
    assert!(manager
        .update_setting("feature_flags", json!([]), "admin")
        .await
        .is_err());
}

#[tokio::test]
async fn allow_change_false_is_superuser_only() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    for role in ["admin", "developer", "user"] {
        assert!(manager
            .update_setting("service_host", json!("db.internal"), role)
            .await
            .is_err());
    }
    manager
        .update_setting("service_host", json!("db.internal"), SUPERUSER)
        .await
        .expect("superuser may change service_host");
}

#[tokio::test]
async fn fields_without_policy_are_superuser_only() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    assert!(manager
        .update_setting("app_name", json!("Other"), "admin")
        .await
        .is_err());
    manager
        .update_setting("app_name", json!("Other"), SUPERUSER)
        .await
        .expect("superuser may change app_name");
}

#[tokio::test]
async fn without_superuser_unmarked_fields_are_locked() {
    let manager = SettingsManager::builder(app_schema(), Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    manager.initialize().await.unwrap();

    assert!(manager
        .update_setting("app_name", json!("Other"), SUPERUSER)
        .await
        .is_err());
    manager
        .update_setting("log_level", json!("DEBUG"), "anyone")
        .await
        .expect("open field");
}

#[tokio::test]
async fn denied_update_publishes_event() {
    let manager = ready(Arc::new(MemoryStore::new())).await;
    let mut events = manager.events().subscribe();

    let _ = manager
        .update_setting("environment", json!("staging"), SUPERUSER)
        .await;

    match events.next().await.expect("event") {
        SettingsEvent::AccessDenied { key, role } => {
            assert_eq!(key, "environment");
            assert_eq!(role, SUPERUSER);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn wrong_value_type_is_rejected_before_storage() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store.clone()).await;

    let error = manager
        .update_setting("max_connections", json!("many"), SUPERUSER)
        .await
        .expect_err("type mismatch");
    assert_eq!(error.status_code(), 422);
    assert!(store.is_empty().await);
    assert_eq!(manager.get_setting("max_connections").unwrap(), json!(10));
}

#[tokio::test]
async fn denied_check_runs_before_type_check() {
    let manager = ready(Arc::new(MemoryStore::new())).await;
    let error = manager
        .update_setting("environment", json!(42), "user")
        .await
        .expect_err("denied");
    assert!(matches!(error, Error::AccessDenied { .. }));
}

#[tokio::test]
async fn update_persists_with_role_and_timestamp() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store.clone()).await;

    manager
        .update_setting("log_level", json!("DEBUG"), "operator")
        .await
        .unwrap();

    let record = store.get("log_level").await.unwrap().expect("row written");
    assert_eq!(record.value, json!("DEBUG"));
    assert_eq!(record.updated_by_role.as_deref(), Some("operator"));
}

#[tokio::test]
async fn update_then_reload_round_trips() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store).await;

    manager
        .update_setting("max_connections", json!(64), SUPERUSER)
        .await
        .unwrap();
    manager.reload().await.unwrap();

    let effective = manager.effective("max_connections").unwrap();
    assert_eq!(effective.value, json!(64));
    assert_eq!(effective.source, SettingSource::Database);
}

#[tokio::test]
async fn reset_restores_default_and_removes_row() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store.clone()).await;

    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    manager.reset_setting("log_level").await.unwrap();

    let effective = manager.effective("log_level").unwrap();
    assert_eq!(effective.value, json!("INFO"));
    assert_ne!(effective.source, SettingSource::Database);
    assert!(store.get("log_level").await.unwrap().is_none());
}

#[tokio::test]
async fn reset_falls_back_to_environment_value() {
    let config = EnvironmentConfig::default();
    let manager = SettingsManager::builder(app_schema(), Arc::new(MemoryStore::new()))
        .superuser_role(SUPERUSER)
        .environment(EnvironmentLayer::from_pairs(&config, [("LOG_LEVEL", "WARNING")]))
        .build()
        .unwrap();
    manager.initialize().await.unwrap();

    assert_eq!(
        manager.effective("log_level").unwrap().source,
        SettingSource::Environment
    );
    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    manager.reset_setting("log_level").await.unwrap();

    let effective = manager.effective("log_level").unwrap();
    assert_eq!(effective.value, json!("WARNING"));
    assert_eq!(effective.source, SettingSource::Environment);
}

#[tokio::test]
async fn reset_all_clears_storage_and_reports_changed_fields() {
    let store = Arc::new(MemoryStore::new());
    let manager = ready(store.clone()).await;

    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    // same as the default, so resetting it changes nothing
    manager
        .update_setting("app_name", json!("My App"), SUPERUSER)
        .await
        .unwrap();

    let changed = manager.reset_all_settings().await.unwrap();
    assert_eq!(changed, vec!["log_level".to_owned()]);
    assert!(store.is_empty().await);
    for info in manager.get_settings_info().unwrap() {
        assert_ne!(info.source, SettingSource::Database, "{}", info.name);
    }
}

#[tokio::test]
async fn settings_info_lists_every_field_in_order() {
    let manager = ready(Arc::new(MemoryStore::new())).await;
    let info = manager.get_settings_info().unwrap();

    let names: Vec<_> = info.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "app_name",
            "environment",
            "admin_email",
            "feature_flags",
            "api_key",
            "service_host",
            "log_level",
            "max_connections",
        ]
    );
    assert_eq!(info[0].section.as_deref(), Some("General"));
    assert_eq!(info[0].description, "Application name");
    assert_eq!(info[3].value, json!([]));
    assert_eq!(info[3].source, SettingSource::Default);
    // raw value; masking is a boundary concern
    assert!(info[4].sensitive);
    assert_eq!(info[4].value, json!("secret"));
}

#[tokio::test]
async fn immutable_environment_scenario() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    let error = manager
        .update_setting("environment", json!("staging"), "superuser")
        .await
        .expect_err("environment is immutable");
    assert!(matches!(error, Error::AccessDenied { .. }));
    assert_eq!(manager.get_setting("environment").unwrap(), json!("production"));
}

#[tokio::test]
async fn feature_flags_scenario() {
    let manager = ready(Arc::new(MemoryStore::new())).await;

    manager
        .update_setting("feature_flags", json!(["x"]), "developer")
        .await
        .expect("developer may change feature_flags");
    assert_eq!(manager.get_setting("feature_flags").unwrap(), json!(["x"]));

    let error = manager
        .update_setting("feature_flags", json!(["y"]), "admin")
        .await
        .expect_err("admin is not in the role set");
    assert!(matches!(error, Error::AccessDenied { .. }));
    assert_eq!(manager.get_setting("feature_flags").unwrap(), json!(["x"]));
}

#[tokio::test]
async fn storage_failure_leaves_view_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let manager = ready(store.clone()).await;
    store.failing.store(true, Ordering::SeqCst);

    let error = manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .expect_err("storage is down");
    assert!(matches!(error, Error::StorageUnavailable(_)));
    assert!(error.to_string().contains("save override"));
    assert_eq!(manager.get_setting("log_level").unwrap(), json!("INFO"));

    assert!(manager.reset_all_settings().await.is_err());
    assert!(manager.reload().await.is_err());
    assert_eq!(manager.get_setting("log_level").unwrap(), json!("INFO"));
}

#[tokio::test]
async fn failed_resets_leave_overrides_in_place() {
    let store = Arc::new(FlakyStore::default());
    let manager = ready(store.clone()).await;
    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    store.failing.store(true, Ordering::SeqCst);

    let error = manager
        .reset_setting("log_level")
        .await
        .expect_err("storage is down");
    assert!(error.to_string().contains("delete override"));
    let effective = manager.effective("log_level").unwrap();
    assert_eq!(effective.value, json!("DEBUG"));
    assert_eq!(effective.source, SettingSource::Database);

    assert!(manager.reset_all_settings().await.is_err());
    assert!(manager.reload().await.is_err());
    let effective = manager.effective("log_level").unwrap();
    assert_eq!(effective.value, json!("DEBUG"));
    assert_eq!(effective.source, SettingSource::Database);

    store.failing.store(false, Ordering::SeqCst);
    assert!(store.get("log_level").await.unwrap().is_some());
}

#[tokio::test]
async fn slow_storage_times_out() {
    let store = Arc::new(FlakyStore::stalling(Duration::from_millis(200)));
    let manager = SettingsManager::builder(app_schema(), store)
        .superuser_role(SUPERUSER)
        .operation_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let error = manager.initialize().await.expect_err("storage stalls");
    assert!(error.is_retryable());
    assert!(error.to_string().contains("timed out"));
}

#[tokio::test]
async fn subscribers_see_old_and_new_values() {
    let (calls, callback) = recorder();
    let manager = SettingsManager::builder(app_schema(), Arc::new(MemoryStore::new()))
        .superuser_role(SUPERUSER)
        .on_change("log_level", callback)
        .build()
        .unwrap();
    manager.initialize().await.unwrap();

    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    // unchanged value, no notification
    manager
        .update_setting("log_level", json!("DEBUG"), SUPERUSER)
        .await
        .unwrap();
    manager.reset_setting("log_level").await.unwrap();
    manager.reset_setting("log_level").await.unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            (json!("INFO"), json!("DEBUG")),
            (json!("DEBUG"), json!("INFO")),
        ]
    );
}

#[tokio::test]
async fn failing_subscriber_surfaces_after_commit() {
    let store = Arc::new(MemoryStore::new());
    let manager = SettingsManager::builder(app_schema(), store.clone())
        .superuser_role(SUPERUSER)
        .on_change("log_level", |_, new| {
            if new == "TRACE" {
                Err("unsupported level".to_owned())
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap();
    manager.initialize().await.unwrap();

    let error = manager
        .update_setting("log_level", json!("TRACE"), SUPERUSER)
        .await
        .expect_err("subscriber fails");
    assert!(matches!(error, Error::Subscriber { ref key, .. } if key == "log_level"));
    // the write itself stands
    assert_eq!(manager.get_setting("log_level").unwrap(), json!("TRACE"));
    assert!(store.get("log_level").await.unwrap().is_some());
}

#[test]
fn subscription_to_undeclared_key_fails_at_build() {
    let error = SettingsManager::builder(app_schema(), Arc::new(MemoryStore::new()))
        .on_change("LOG_LEVEL", |_, _| Ok(()))
        .build()
        .expect_err("unknown key");
    assert!(matches!(error, Error::UnknownKey(ref key) if key == "LOG_LEVEL"));
}

#[tokio::test]
async fn reload_picks_up_writes_from_another_instance() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let (calls, callback) = recorder();
    let reader = SettingsManager::builder(app_schema(), store.clone())
        .on_change("max_connections", callback)
        .build()
        .unwrap();
    reader.initialize().await.unwrap();
    let writer = ready(store).await;

    let mut events = reader.events().subscribe();
    writer
        .update_setting("max_connections", json!(32), SUPERUSER)
        .await
        .unwrap();
    assert_eq!(reader.get_setting("max_connections").unwrap(), json!(10));

    let changed = reader.reload().await.unwrap();
    assert_eq!(changed, vec!["max_connections".to_owned()]);
    match events.next().await.expect("event") {
        SettingsEvent::Reloaded { changed } => {
            assert_eq!(changed, vec!["max_connections".to_owned()]);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(reader.get_setting("max_connections").unwrap(), json!(32));
    assert_eq!(*calls.lock().unwrap(), vec![(json!(10), json!(32))]);

    assert!(reader.reload().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_updates_keep_storage_and_view_in_step() {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(ready(store.clone()).await);

    let writes = (0..32).map(|n| {
        let manager = manager.clone();
        tokio::spawn(async move {
            let key = if n % 2 == 0 { "max_connections" } else { "log_level" };
            let value = if n % 2 == 0 { json!(n) } else { json!(format!("L{n}")) };
            manager.update_setting(key, value, SUPERUSER).await
        })
    });
    for result in futures::future::join_all(writes).await {
        result.expect("task").expect("update");
    }

    for key in ["max_connections", "log_level"] {
        let stored = store.get(key).await.unwrap().expect("row").value;
        assert_eq!(manager.get_setting(key).unwrap(), stored, "{key}");
    }
}

#[tokio::test]
async fn typed_reads() {
    #[derive(Debug, Deserialize)]
    struct AppSettings {
        app_name: String,
        max_connections: u32,
        feature_flags: Vec<String>,
    }

    let manager = ready(Arc::new(MemoryStore::new())).await;
    manager
        .update_setting("feature_flags", json!(["beta"]), "tester")
        .await
        .unwrap();

    let max: u32 = manager.get_as("max_connections").unwrap();
    assert_eq!(max, 10);
    assert!(manager.get_as::<bool>("app_name").is_err());

    let settings: AppSettings = manager.materialize().unwrap();
    assert_eq!(settings.app_name, "My App");
    assert_eq!(settings.max_connections, 10);
    assert_eq!(settings.feature_flags, vec!["beta".to_owned()]);
}

#[tokio::test]
async fn sqlite_backed_manager_survives_restart() {
    let store: Arc<dyn SettingsStore> =
        Arc::new(SqliteStore::new("sqlite::memory:", 1, "app_settings").unwrap());

    let first = ready(store.clone()).await;
    first
        .update_setting("feature_flags", json!(["x"]), "developer")
        .await
        .unwrap();
    drop(first);

    let second = ready(store).await;
    let effective = second.effective("feature_flags").unwrap();
    assert_eq!(effective.value, json!(["x"]));
    assert_eq!(effective.source, SettingSource::Database);
}

#[tokio::test]
async fn reload_loop_applies_external_writes_until_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(ready(store.clone()).await);
    let cancel = CancellationToken::new();
    let handle = spawn_reload_loop(manager.clone(), Duration::from_millis(10), cancel.clone());

    store
        .set("log_level", &json!("ERROR"), OverrideMetadata::now(None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.get_setting("log_level").unwrap(), json!("ERROR"));

    cancel.cancel();
    handle.await.expect("loop should exit cleanly");
}

#[tokio::test]
async fn builder_from_config_applies_superuser_and_rejects_bad_config() {
    let mut config = crate::config::ManagerConfig {
        superuser_role: Some("root".to_owned()),
        ..Default::default()
    };
    let manager = super::SettingsManagerBuilder::from_config(app_schema(), &config)
        .unwrap()
        .environment(EnvironmentLayer::from_pairs(
            &config.environment,
            Vec::<(String, String)>::new(),
        ))
        .build()
        .unwrap();
    manager.initialize().await.unwrap();
    manager
        .update_setting("app_name", json!("Configured"), "root")
        .await
        .expect("configured superuser");

    config.storage.pool_size = 0;
    let error = super::SettingsManagerBuilder::from_config(app_schema(), &config)
        .err()
        .expect("invalid config");
    assert_eq!(error.kind(), "config");
}
