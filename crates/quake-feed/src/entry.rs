//! Decoded feed entry as handed out by the feed manager.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current entry mapping: External Identifier -> decoded entry.
pub type FeedEntries = BTreeMap<String, FeedEntry>;

/// One seismic event as decoded by the feed manager.
///
/// Every field except the external id is optional: the upstream QuakeML
/// documents routinely omit depth, region or evaluation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Opaque identifier assigned by the feed; may change format between polls.
    pub external_id: String,
    pub title: Option<String>,
    /// (latitude, longitude) in decimal degrees.
    pub coordinates: Option<(f64, f64)>,
    /// Hypocentre depth in km.
    pub depth: Option<f64>,
    pub magnitude: Option<f64>,
    /// Free-text region description ("3 km SW Norcia (PG)").
    pub region: Option<String>,
    /// Origin time of the event.
    pub origin_time: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// QuakeML evaluation status ("preliminary", "confirmed", "reviewed", ...).
    pub evaluation_status: Option<String>,
    /// QuakeML evaluation mode ("manual" | "automatic").
    pub evaluation_mode: Option<String>,
    /// Distance from the configured reference point, km.
    pub distance_to_home: Option<f64>,
    pub attribution: Option<String>,
    /// Event id as published by the feed itself, when the document carries one.
    pub event_id: Option<String>,
}

impl FeedEntry {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Self::default()
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|(lat, _)| lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|(_, lon)| lon)
    }
}
