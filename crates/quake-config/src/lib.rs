//! quake-config
//!
//! Config entry model for one monitored location: the immutable entry data
//! (location, coordinates), the user-editable options (radius, magnitude,
//! polling interval, lookback window), defaults, unit conversion and the
//! options hash that decides when an entry must be reloaded.

pub mod flow;
pub mod migrate;
pub mod yaml;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use flow::{ConfigFlow, FlowResult, NewEntry, OptionsFlow, OptionsInput, UserInput};
pub use migrate::{migrate_entry, MigrationError, Migrated, StoredEntry};
pub use yaml::{load_layered_yaml, load_layered_yaml_from_strings, LoadedImport};

pub const DOMAIN: &str = "ingv_centro_nazionale_terremoti";
pub const DEFAULT_NAME: &str = "INGV Earthquakes";
pub const MANUFACTURER: &str = "Istituto Nazionale di Geofisica e Vulcanologia";

pub const DEFAULT_MINIMUM_MAGNITUDE: f64 = 3.0;
pub const DEFAULT_RADIUS: f64 = 50.0;
/// Seconds.
pub const DEFAULT_SCAN_INTERVAL: u64 = 300;
/// Hours.
pub const DEFAULT_START_TIME: u64 = 24;
pub const DEFAULT_UNIT_OF_MEASUREMENT: &str = "quakes";

pub const IMAGE_URL_PATTERN: &str =
    "https://shakemap.ingv.it/data/{}/current/products/intensity.jpg";

/// Entry schema version written by this build.
pub const CONFIG_VERSION: u32 = 2;

pub const KM_PER_MILE: f64 = 1.609344;

// ---------------------------------------------------------------------------
// Entry model
// ---------------------------------------------------------------------------

/// Fixed part of an entry; changing it means creating a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryData {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// User-editable part of an entry. Any change triggers a full reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    pub minimum_magnitude: f64,
    /// In the host's length unit (km under metric, miles under imperial).
    pub radius: f64,
    /// Polling interval, seconds.
    pub scan_interval: u64,
    /// Lookback window, hours.
    pub start_time: u64,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            minimum_magnitude: DEFAULT_MINIMUM_MAGNITUDE,
            radius: DEFAULT_RADIUS,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            start_time: DEFAULT_START_TIME,
        }
    }
}

impl EntryOptions {
    /// SHA-256 over the canonical JSON of the options.
    pub fn hash(&self) -> String {
        // Struct field order is fixed, so serde_json output is canonical.
        let canonical = serde_json::to_string(self).unwrap_or_default();
        sha256_hex(canonical.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub version: u32,
    pub title: String,
    /// Location name; one entry per location.
    pub unique_id: String,
    pub data: EntryData,
    pub options: EntryOptions,
}

impl ConfigEntry {
    pub fn to_stored(&self) -> StoredEntry {
        StoredEntry {
            entry_id: self.entry_id.clone(),
            version: self.version,
            title: self.title.clone(),
            unique_id: self.unique_id.clone(),
            data: serde_json::to_value(&self.data).unwrap_or_default(),
            options: serde_json::to_value(&self.options).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host defaults + units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    Metric,
    Imperial,
}

/// Values the host platform supplies when the user leaves a field blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostDefaults {
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub units: UnitSystem,
}

/// Radius as the feed manager wants it: always km.
pub fn radius_in_km(radius: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => radius,
        UnitSystem::Imperial => radius * KM_PER_MILE,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected user or import input.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidLatitude(f64),
    InvalidLongitude(f64),
    NegativeRadius(f64),
    NegativeMagnitude(f64),
    NonPositive { field: &'static str },
    EmptyLocation,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidLatitude(v) => {
                write!(f, "latitude must be within [-90, 90], got {v}")
            }
            ConfigError::InvalidLongitude(v) => {
                write!(f, "longitude must be within [-180, 180], got {v}")
            }
            ConfigError::NegativeRadius(v) => write!(f, "radius must be >= 0, got {v}"),
            ConfigError::NegativeMagnitude(v) => {
                write!(f, "minimum_magnitude must be >= 0, got {v}")
            }
            ConfigError::NonPositive { field } => write!(f, "{field} must be a positive integer"),
            ConfigError::EmptyLocation => write!(f, "location must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
