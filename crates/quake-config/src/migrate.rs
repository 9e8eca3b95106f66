//! Stored entry version migration.
//!
//! Version history:
//! - v1: everything (including radius / magnitude / intervals) lived in `data`.
//! - v2: user-editable settings moved to `options`.
//!
//! Entries written by a newer build are refused; setup must not proceed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::flow::{validate_coordinates, validate_options};
use crate::{ConfigEntry, ConfigError, EntryData, EntryOptions, CONFIG_VERSION};

const OPTION_KEYS: &[&str] = &["minimum_magnitude", "radius", "scan_interval", "start_time"];

/// Entry as persisted by the host, before it is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub entry_id: String,
    pub version: u32,
    pub title: String,
    pub unique_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub entry: ConfigEntry,
    /// Version the entry was upgraded from; `None` when already current.
    pub migrated_from: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationError {
    UnsupportedVersion { version: u32, supported: u32 },
    Malformed(String),
    Invalid(ConfigError),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::UnsupportedVersion { version, supported } => write!(
                f,
                "config entry version {version} is not supported (supported: 1..={supported})"
            ),
            MigrationError::Malformed(msg) => write!(f, "malformed config entry: {msg}"),
            MigrationError::Invalid(e) => write!(f, "invalid config entry: {e}"),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<ConfigError> for MigrationError {
    fn from(e: ConfigError) -> Self {
        MigrationError::Invalid(e)
    }
}

pub fn migrate_entry(stored: StoredEntry) -> Result<Migrated, MigrationError> {
    let (data, options, migrated_from) = match stored.version {
        1 => {
            let (data, options) = split_v1(&stored.data, &stored.options);
            info!(
                entry_id = %stored.entry_id,
                "migrating config entry from version 1 to {CONFIG_VERSION}"
            );
            (data, options, Some(1))
        }
        CONFIG_VERSION => (stored.data.clone(), stored.options.clone(), None),
        other => {
            return Err(MigrationError::UnsupportedVersion {
                version: other,
                supported: CONFIG_VERSION,
            })
        }
    };

    let data: EntryData =
        serde_json::from_value(data).map_err(|e| MigrationError::Malformed(e.to_string()))?;
    let options = options_with_defaults(options)?;
    validate_coordinates(data.latitude, data.longitude)?;
    validate_options(&options)?;

    Ok(Migrated {
        entry: ConfigEntry {
            entry_id: stored.entry_id,
            version: CONFIG_VERSION,
            title: stored.title,
            unique_id: stored.unique_id,
            data,
            options,
        },
        migrated_from,
    })
}

/// Move option keys out of a v1 `data` blob. Keys already in `options` win.
fn split_v1(data: &Value, options: &Value) -> (Value, Value) {
    let mut data_map = data.as_object().cloned().unwrap_or_default();
    let mut opt_map = Map::new();
    for key in OPTION_KEYS {
        if let Some(v) = data_map.remove(*key) {
            opt_map.insert((*key).to_string(), v);
        }
    }
    if let Some(existing) = options.as_object() {
        for (k, v) in existing {
            opt_map.insert(k.clone(), v.clone());
        }
    }
    (Value::Object(data_map), Value::Object(opt_map))
}

fn options_with_defaults(options: Value) -> Result<EntryOptions, MigrationError> {
    let mut merged = serde_json::to_value(EntryOptions::default())
        .map_err(|e| MigrationError::Malformed(e.to_string()))?;
    if let (Some(base), Some(over)) = (merged.as_object_mut(), options.as_object()) {
        for (k, v) in over {
            if !v.is_null() {
                base.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(merged).map_err(|e| MigrationError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(version: u32, data: Value, options: Value) -> StoredEntry {
        StoredEntry {
            entry_id: "e1".to_string(),
            version,
            title: "Home".to_string(),
            unique_id: "Home".to_string(),
            data,
            options,
        }
    }

    #[test]
    fn v1_options_move_out_of_data() {
        let s = stored(
            1,
            json!({
                "location": "Home",
                "latitude": 42.0,
                "longitude": 13.0,
                "radius": 120,
                "minimum_magnitude": 2.0,
            }),
            Value::Null,
        );
        let m = migrate_entry(s).unwrap();
        assert_eq!(m.migrated_from, Some(1));
        assert_eq!(m.entry.version, CONFIG_VERSION);
        assert_eq!(m.entry.options.radius, 120.0);
        assert_eq!(m.entry.options.minimum_magnitude, 2.0);
        assert_eq!(m.entry.options.scan_interval, 300);
        assert_eq!(m.entry.data.location, "Home");
    }

    #[test]
    fn current_version_passes_through() {
        let s = stored(
            2,
            json!({"location": "Home", "latitude": 42.0, "longitude": 13.0}),
            json!({"minimum_magnitude": 1.5, "radius": 10.0, "scan_interval": 60, "start_time": 6}),
        );
        let m = migrate_entry(s).unwrap();
        assert_eq!(m.migrated_from, None);
        assert_eq!(m.entry.options.start_time, 6);
    }

    #[test]
    fn future_version_is_refused() {
        let s = stored(3, json!({}), json!({}));
        let err = migrate_entry(s).unwrap_err();
        assert_eq!(
            err,
            MigrationError::UnsupportedVersion {
                version: 3,
                supported: 2
            }
        );
        assert_eq!(
            err.to_string(),
            "config entry version 3 is not supported (supported: 1..=2)"
        );
    }

    #[test]
    fn missing_coordinates_are_malformed() {
        let s = stored(2, json!({"location": "Home"}), json!({}));
        assert!(matches!(
            migrate_entry(s).unwrap_err(),
            MigrationError::Malformed(_)
        ));
    }

    #[test]
    fn stored_round_trip_is_current() {
        let s = stored(
            2,
            json!({"location": "Home", "latitude": 42.0, "longitude": 13.0}),
            json!({}),
        );
        let entry = migrate_entry(s).unwrap().entry;
        let again = migrate_entry(entry.to_stored()).unwrap();
        assert_eq!(again.entry, entry);
        assert_eq!(again.migrated_from, None);
    }
}
