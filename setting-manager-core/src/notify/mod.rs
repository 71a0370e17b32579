//! Synchronous per-key change callbacks.
//!
//! Callbacks run on the writer's task, in registration order, after the
//! write is committed. Every callback runs even if an earlier one fails;
//! each failure is logged and the first one is returned to the writer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

pub type CallbackResult = std::result::Result<(), String>;

pub type ChangeCallback = Arc<dyn Fn(&Value, &Value) -> CallbackResult + Send + Sync>;

#[derive(Clone, Default)]
pub struct ChangeNotifier {
    subscribers: HashMap<String, Vec<ChangeCallback>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, key: impl Into<String>, callback: F)
    where
        F: Fn(&Value, &Value) -> CallbackResult + Send + Sync + 'static,
    {
        self.subscribers
            .entry(key.into())
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.subscribers.keys().map(String::as_str)
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.get(key).map(Vec::len).unwrap_or(0)
    }

    pub fn notify(&self, key: &str, old_value: &Value, new_value: &Value) -> Result<()> {
        let Some(callbacks) = self.subscribers.get(key) else {
            return Ok(());
        };

        let mut first_failure = None;
        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(reason) = callback(old_value, new_value) {
                warn!(key, subscriber = index, %reason, "change subscriber failed");
                first_failure.get_or_insert(reason);
            }
        }

        match first_failure {
            Some(reason) => Err(Error::Subscriber {
                key: key.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscribers
            .iter()
            .map(|(key, callbacks)| (key.as_str(), callbacks.len()))
            .collect();
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &counts)
            .finish()
    }
}
