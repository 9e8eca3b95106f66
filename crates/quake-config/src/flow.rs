//! Config flow (new location) and options flow (edit an existing one).
//!
//! Both flows are pure: they take the submitted input plus whatever context
//! they need and return a [`FlowResult`]. Persisting the outcome is the
//! caller's job.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{ConfigEntry, ConfigError, EntryData, EntryOptions, HostDefaults, CONFIG_VERSION};

/// Abort reason when a location is configured twice.
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Raw input of the user step (and of a YAML import).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    pub minimum_magnitude: Option<f64>,
    pub scan_interval: Option<u64>,
    pub start_time: Option<u64>,
}

impl UserInput {
    pub fn is_empty(&self) -> bool {
        *self == UserInput::default()
    }
}

/// Raw input of the options step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsInput {
    pub minimum_magnitude: Option<f64>,
    pub radius: Option<f64>,
    pub scan_interval: Option<u64>,
    pub start_time: Option<u64>,
}

impl OptionsInput {
    pub fn is_empty(&self) -> bool {
        *self == OptionsInput::default()
    }
}

/// An entry the flow wants created; ids are assigned by [`NewEntry::into_entry`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub title: String,
    pub unique_id: String,
    pub data: EntryData,
    pub options: EntryOptions,
}

impl NewEntry {
    pub fn into_entry(self) -> ConfigEntry {
        ConfigEntry {
            entry_id: Uuid::new_v4().simple().to_string(),
            version: CONFIG_VERSION,
            title: self.title,
            unique_id: self.unique_id,
            data: self.data,
            options: self.options,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    /// Render a form; `defaults` pre-fills its fields.
    ShowForm { step_id: &'static str, defaults: Value },
    CreateEntry(NewEntry),
    UpdateOptions(EntryOptions),
    Abort { reason: &'static str },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ConfigError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ConfigError::InvalidLatitude(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ConfigError::InvalidLongitude(longitude));
    }
    Ok(())
}

pub fn validate_options(options: &EntryOptions) -> Result<(), ConfigError> {
    if options.minimum_magnitude.is_nan() || options.minimum_magnitude < 0.0 {
        return Err(ConfigError::NegativeMagnitude(options.minimum_magnitude));
    }
    if options.radius.is_nan() || options.radius < 0.0 {
        return Err(ConfigError::NegativeRadius(options.radius));
    }
    if options.scan_interval == 0 {
        return Err(ConfigError::NonPositive {
            field: "scan_interval",
        });
    }
    if options.start_time == 0 {
        return Err(ConfigError::NonPositive {
            field: "start_time",
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config flow
// ---------------------------------------------------------------------------

pub struct ConfigFlow<'a> {
    host: &'a HostDefaults,
}

impl<'a> ConfigFlow<'a> {
    pub fn new(host: &'a HostDefaults) -> Self {
        Self { host }
    }

    fn show_form(&self) -> FlowResult {
        FlowResult::ShowForm {
            step_id: "user",
            defaults: json!({
                "location": self.host.location_name,
                "latitude": self.host.latitude,
                "longitude": self.host.longitude,
            }),
        }
    }

    /// `configured` holds the unique ids (location names) of existing entries.
    pub fn step_user(
        &self,
        input: Option<&UserInput>,
        configured: &BTreeSet<String>,
    ) -> Result<FlowResult, ConfigError> {
        debug!(?input, "config flow user step");
        let Some(input) = input.filter(|i| !i.is_empty()) else {
            return Ok(self.show_form());
        };

        let location = input
            .location
            .clone()
            .unwrap_or_else(|| self.host.location_name.clone());
        if location.trim().is_empty() {
            return Err(ConfigError::EmptyLocation);
        }
        if configured.contains(&location) {
            return Ok(FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            });
        }

        let latitude = input.latitude.unwrap_or(self.host.latitude);
        let longitude = input.longitude.unwrap_or(self.host.longitude);
        validate_coordinates(latitude, longitude)?;

        let defaults = EntryOptions::default();
        let options = EntryOptions {
            minimum_magnitude: input
                .minimum_magnitude
                .unwrap_or(defaults.minimum_magnitude),
            radius: input.radius.unwrap_or(defaults.radius),
            scan_interval: input.scan_interval.unwrap_or(defaults.scan_interval),
            start_time: input.start_time.unwrap_or(defaults.start_time),
        };
        validate_options(&options)?;

        Ok(FlowResult::CreateEntry(NewEntry {
            title: location.clone(),
            unique_id: location.clone(),
            data: EntryData {
                location,
                latitude,
                longitude,
            },
            options,
        }))
    }

    /// Import from YAML goes through the same path as the user step.
    pub fn step_import(
        &self,
        input: &UserInput,
        configured: &BTreeSet<String>,
    ) -> Result<FlowResult, ConfigError> {
        debug!("importing config entry from yaml");
        self.step_user(Some(input), configured)
    }
}

// ---------------------------------------------------------------------------
// Options flow
// ---------------------------------------------------------------------------

pub struct OptionsFlow {
    current: EntryOptions,
}

impl OptionsFlow {
    pub fn new(current: &EntryOptions) -> Self {
        Self {
            current: current.clone(),
        }
    }

    pub fn step_init(&self, input: Option<&OptionsInput>) -> Result<FlowResult, ConfigError> {
        let Some(input) = input.filter(|i| !i.is_empty()) else {
            return Ok(FlowResult::ShowForm {
                step_id: "init",
                defaults: serde_json::to_value(&self.current).unwrap_or(Value::Null),
            });
        };

        let options = EntryOptions {
            minimum_magnitude: input
                .minimum_magnitude
                .unwrap_or(self.current.minimum_magnitude),
            radius: input.radius.unwrap_or(self.current.radius),
            scan_interval: input.scan_interval.unwrap_or(self.current.scan_interval),
            start_time: input.start_time.unwrap_or(self.current.start_time),
        };
        validate_options(&options)?;
        Ok(FlowResult::UpdateOptions(options))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
