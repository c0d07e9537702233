use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::category::Category;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub data_files: Vec<Record>,
    #[serde(default)]
    pub models: Vec<Record>,
    #[serde(default)]
    pub device_info: Vec<DeviceInfoEntry>,
    // anything else the acquisition tool wrote is passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    // model type for analyzed data, file kind (Image, Audio, ...) for data files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    // written back exactly as read; see `is_deleted`
    #[serde(
        default,
        deserialize_with = "deserialize_deleted",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted: Option<Value>,
    // values are null, a timestamp string, or a list of them
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetaDataField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Record>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn model_category(&self) -> Category {
        self.category
            .as_deref()
            .map(Category::from)
            .unwrap_or_else(|| Category::Other("Unknown".to_string()))
    }

    /// True for `true` or a "Deleted" status; anything else is intact.
    pub fn is_deleted(&self) -> bool {
        match &self.deleted {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("deleted"),
            _ => false,
        }
    }

    /// Label used in logs: the name when present, otherwise the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaDataField {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceInfoEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

// Acquisition tools disagree on how deletion is written: a bool, or a
// status string where only "Deleted" counts ("Intact", "Unknown", ...).
fn deserialize_deleted<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(Some(value)),
        other => Err(serde::de::Error::custom(format!(
            "expected a bool or deletion status, found {}",
            other
        ))),
    }
}
