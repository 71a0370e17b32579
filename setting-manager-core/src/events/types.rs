use std::collections::BTreeSet;

use crate::manager::types::SettingSource;

#[derive(Debug, Clone)]
pub enum SettingsEvent {
    Initialized {
        fields: usize,
        overrides: usize,
    },
    Swept {
        removed: BTreeSet<String>,
    },
    Reloaded {
        changed: Vec<String>,
    },
    /// Values are omitted so sensitive settings never travel over the bus.
    Updated {
        key: String,
        role: String,
        source: SettingSource,
    },
    Reset {
        key: String,
        source: SettingSource,
    },
    ResetAll {
        changed: Vec<String>,
    },
    AccessDenied {
        key: String,
        role: String,
    },
}
