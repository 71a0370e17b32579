use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::manager::{SettingInfo, SettingSource};
use crate::schema::DeclaredType;

pub const MASKED_VALUE: &str = "********";
pub const DEFAULT_SECTION: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingView {
    pub name: String,
    pub value: Value,
    pub source: SettingSource,
    pub description: String,
    #[serde(rename = "type")]
    pub declared_type: DeclaredType,
    pub sensitive: bool,
    pub editable: bool,
}

impl SettingView {
    pub fn from_info(info: SettingInfo, editable: bool, reveal: bool) -> Self {
        let value = if info.sensitive && !reveal {
            Value::String(MASKED_VALUE.to_owned())
        } else {
            info.value
        };
        Self {
            name: info.name,
            value,
            source: info.source,
            description: info.description,
            declared_type: info.declared_type,
            sensitive: info.sensitive,
            editable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub name: String,
    pub settings: Vec<SettingView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequest {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}
