//! Published entity state and the host sink that receives it.

use serde::Serialize;
use serde_json::{Map, Value};

/// Device the status sensor is grouped under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// (integration domain, config entry id).
    pub identifiers: (String, String),
    pub manufacturer: String,
    pub name: String,
    pub sw_version: String,
    pub entry_type: String,
}

/// Snapshot of one entity as handed to the host state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub unique_id: String,
    pub name: Option<String>,
    pub state: Option<String>,
    pub unit: Option<String>,
    pub icon: Option<String>,
    pub available: bool,
    pub attributes: Map<String, Value>,
    /// `diagnostic` for entities that describe the integration itself.
    pub entity_category: Option<String>,
    pub device: Option<DeviceInfo>,
}

impl EntityState {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Host state machine.
pub trait StateSink: Send + Sync {
    /// Insert or overwrite the state of `state.entity_id`.
    fn write(&self, state: EntityState);

    fn remove(&self, entity_id: &str);
}

/// Attribute map that drops absent and empty values on insert.
#[derive(Debug, Default)]
pub(crate) struct Attributes(Map<String, Value>);

impl Attributes {
    pub(crate) fn put(&mut self, key: &str, value: impl Into<Option<Value>>) -> &mut Self {
        match value.into() {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(v) => {
                self.0.insert(key.to_string(), v);
            }
        }
        self
    }

    pub(crate) fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
