use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOverride {
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
    pub updated_by_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideMetadata {
    pub updated_at: DateTime<Utc>,
    pub updated_by_role: Option<String>,
}

impl OverrideMetadata {
    pub fn now(role: Option<&str>) -> Self {
        Self {
            updated_at: Utc::now(),
            updated_by_role: role.map(str::to_owned),
        }
    }
}

/// Decodes a stored JSON payload. Text that is not JSON comes back as a JSON
/// string so one bad row cannot block loading the rest.
pub(crate) fn decode_value(key: &str, payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|err| {
        warn!(setting = key, error = %err, "stored override is not JSON; using raw text");
        Value::String(payload.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::decode_value;

    #[test]
    fn non_json_payload_becomes_a_string() {
        assert_eq!(decode_value("app_name", "plain text"), json!("plain text"));
        assert_eq!(decode_value("workers", "4"), json!(4));
        assert_eq!(decode_value("name", r#""quoted""#), json!("quoted"));
    }
}
