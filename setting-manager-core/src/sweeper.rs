use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info};

use crate::error::Result;
use crate::storage::SettingsStore;

/// Deletes persisted overrides whose key is no longer declared. Returns the
/// removed keys. Declared keys are never touched, whatever their value.
pub async fn sweep(
    store: &dyn SettingsStore,
    valid_keys: &HashSet<String>,
) -> Result<BTreeSet<String>> {
    let stored = store.get_keys().await?;
    let stale: HashSet<String> = stored.difference(valid_keys).cloned().collect();

    if stale.is_empty() {
        debug!(stored = stored.len(), "no stale setting overrides");
        return Ok(BTreeSet::new());
    }

    store.delete_many(&stale).await?;
    let removed: BTreeSet<String> = stale.into_iter().collect();
    info!(?removed, "removed overrides for undeclared settings");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use serde_json::json;

    use super::sweep;
    use crate::storage::model::OverrideMetadata;
    use crate::storage::{MemoryStore, SettingsStore};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (key, value) in [
            ("app_name", json!("kept")),
            ("port", json!("not-a-number")),
            ("legacy_flag", json!(true)),
            ("old_timeout", json!(30)),
        ] {
            store
                .set(key, &value, OverrideMetadata::now(None))
                .await
                .unwrap();
        }
        store
    }

    fn valid() -> HashSet<String> {
        ["app_name", "port"].map(str::to_owned).into()
    }

    #[tokio::test]
    async fn removes_exactly_the_undeclared_keys() {
        let store = seeded().await;

        let removed = sweep(&store, &valid()).await.unwrap();
        assert_eq!(
            removed,
            BTreeSet::from(["legacy_flag".to_owned(), "old_timeout".to_owned()])
        );
        // a malformed value under a declared key stays
        assert_eq!(store.get_keys().await.unwrap(), valid());
    }

    #[tokio::test]
    async fn second_sweep_removes_nothing() {
        let store = seeded().await;

        sweep(&store, &valid()).await.unwrap();
        let second = sweep(&store, &valid()).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.len().await, 2);
    }
}
