//! quake-integration
//!
//! Host-facing side of the earthquake feed: the point-marker and status
//! entities, an in-process signal bus, and the per-entry lifecycle
//! (import, setup, options reload, unload).

pub mod dispatcher;
pub mod geo_location;
pub mod sensor;
pub mod setup;
pub mod state;

pub use dispatcher::{split_unsubscribe, LocalDispatcher};
pub use geo_location::{display_name, image_url, GeoLocationEvent, GeoLocationPlatform};
pub use sensor::{sensor_name, status_attributes, StatusSensor};
pub use setup::{HostServices, Integration};
pub use state::{DeviceInfo, EntityState, StateSink};
