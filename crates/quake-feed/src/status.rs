//! Status snapshot reported by the feed manager after each update.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall outcome of one feed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Ok,
    Error,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStatus::Ok => "OK",
            FeedStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known outcome of a refresh cycle.
///
/// Replaced wholesale on every status callback; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status: FeedStatus,
    /// Number of entries currently held by the feed manager.
    pub total: Option<u32>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_update_successful: Option<DateTime<Utc>>,
    /// Timestamp of the most recent event seen in the feed.
    pub last_timestamp: Option<DateTime<Utc>>,
    pub created: u32,
    pub updated: u32,
    pub removed: u32,
}

impl StatusInfo {
    pub fn ok(at: DateTime<Utc>, total: u32) -> Self {
        Self {
            status: FeedStatus::Ok,
            total: Some(total),
            last_update: Some(at),
            last_update_successful: Some(at),
            last_timestamp: None,
            created: 0,
            updated: 0,
            removed: 0,
        }
    }

    pub fn error(at: DateTime<Utc>) -> Self {
        Self {
            status: FeedStatus::Error,
            total: None,
            last_update: Some(at),
            last_update_successful: None,
            last_timestamp: None,
            created: 0,
            updated: 0,
            removed: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FeedStatus::Ok
    }

    /// Keep the counts and success timestamps of `previous` on a failed outcome.
    ///
    /// An error snapshot only carries the outcome and the attempt time; the
    /// entity counts of the last good cycle stay visible. Ok snapshots are
    /// returned untouched.
    pub fn carry_forward(self, previous: Option<&StatusInfo>) -> StatusInfo {
        if self.is_ok() {
            return self;
        }
        let Some(prev) = previous else {
            return self;
        };
        StatusInfo {
            status: self.status,
            last_update: self.last_update.or(prev.last_update),
            total: prev.total,
            last_update_successful: prev.last_update_successful,
            last_timestamp: prev.last_timestamp,
            created: prev.created,
            updated: prev.updated,
            removed: prev.removed,
        }
    }
}
