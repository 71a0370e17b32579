pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load, load_from_file};
pub use schema::{
    EnvironmentConfig, LoggingConfig, ManagerConfig, ReloadConfig, StorageBackendKind,
    StorageConfig,
};
pub use validation::validate_config;
