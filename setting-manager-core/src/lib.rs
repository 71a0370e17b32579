pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod permissions;
pub mod schema;
pub mod storage;
pub mod sweeper;

pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use events::{EventBus, SettingsEvent};
pub use manager::{
    spawn_reload_loop, EffectiveSetting, SettingInfo, SettingSource, SettingsManager,
    SettingsManagerBuilder,
};
pub use permissions::{AccessPolicy, AccessRule, RoleAccessPolicy};
pub use schema::{
    DeclaredType, FieldBuilder, FieldDescriptor, SchemaBuilder, SchemaDocument, SettingsSchema,
};
pub use storage::SettingsStore;
