//! quake-feed
//!
//! Boundary to the external earthquake feed manager.
//!
//! This crate owns the decoded entry shape, the status snapshot, the four
//! callback slots and the manager traits. It does **not** poll, parse QuakeML
//! or compute distances; concrete managers live outside this workspace and
//! are handed in through [`FeedFactory`].

pub mod entry;
pub mod manager;
pub mod status;

pub use entry::{FeedEntries, FeedEntry};
pub use manager::{AsyncFeedManager, FeedError, FeedFactory, FeedHandle, FeedManager, FeedSink};
pub use status::{FeedStatus, StatusInfo};

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Construction parameters for a feed manager.
///
/// Distances are always kilometres here; unit conversion happens before the
/// settings are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Reference point (latitude, longitude) used for the radius filter.
    pub coordinates: (f64, f64),
    pub filter_radius_km: f64,
    pub filter_minimum_magnitude: f64,
    /// How far back the feed query reaches.
    #[serde(with = "lookback_hours")]
    pub starttime_delta: Duration,
}

impl FeedSettings {
    pub fn new(
        coordinates: (f64, f64),
        filter_radius_km: f64,
        filter_minimum_magnitude: f64,
        lookback_hours: i64,
    ) -> Self {
        Self {
            coordinates,
            filter_radius_km,
            filter_minimum_magnitude,
            starttime_delta: Duration::hours(lookback_hours),
        }
    }
}

mod lookback_hours {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_hours())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::hours(i64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_lookback_is_hours() {
        let s = FeedSettings::new((41.9, 12.5), 50.0, 3.0, 24);
        assert_eq!(s.starttime_delta.num_hours(), 24);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["starttime_delta"], 24);

        let back: FeedSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }
}
