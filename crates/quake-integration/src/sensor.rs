//! Diagnostic status sensor: one per config entry.

use std::sync::{Arc, Mutex, PoisonError};

use quake_config::{ConfigEntry, DEFAULT_NAME, DEFAULT_UNIT_OF_MEASUREMENT, DOMAIN, MANUFACTURER};
use quake_feed::StatusInfo;
use quake_reconcile::{
    slugify, status_unique_id, Coordinator, RegistrationRequest, Signal, Unsubscribe,
    SENSOR_DOMAIN,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::dispatcher::split_unsubscribe;
use crate::state::{Attributes, DeviceInfo, EntityState, StateSink};

const ICON: &str = "mdi:pulse";

pub fn sensor_name(title: &str) -> String {
    format!("Ingv Earthquakes {title} status")
}

/// Status attributes; zero counts and absent timestamps are left out.
pub fn status_attributes(status: &StatusInfo) -> serde_json::Map<String, Value> {
    let count = |n: u32| (n > 0).then(|| json!(n));
    let mut attrs = Attributes::default();
    attrs
        .put("status", Some(json!(status.status.as_str())))
        .put("last_update", status.last_update.map(|t| json!(t.to_rfc3339())))
        .put(
            "last_update_successful",
            status.last_update_successful.map(|t| json!(t.to_rfc3339())),
        )
        .put(
            "last_timestamp",
            status.last_timestamp.map(|t| json!(t.to_rfc3339())),
        )
        .put("created", count(status.created))
        .put("updated", count(status.updated))
        .put("removed", count(status.removed));
    attrs.into_map()
}

pub struct StatusSensor {
    coordinator: Coordinator,
    states: Arc<dyn StateSink>,
    entity_id: String,
    unique_id: String,
    name: String,
    device: DeviceInfo,
    subscription: Mutex<Option<Unsubscribe>>,
}

impl StatusSensor {
    pub fn setup(
        coordinator: &Coordinator,
        entry: &ConfigEntry,
        states: Arc<dyn StateSink>,
    ) -> Arc<Self> {
        let unique_id = status_unique_id(&entry.unique_id);
        let entity_id = coordinator.registry().get_or_create(&RegistrationRequest {
            domain: SENSOR_DOMAIN.to_string(),
            platform: DOMAIN.to_string(),
            unique_id: unique_id.clone(),
            suggested_object_id: format!("ingv_earthquakes_{}_status", slugify(&entry.title)),
            config_entry_id: Some(entry.entry_id.clone()),
        });

        let sensor = Arc::new(StatusSensor {
            coordinator: coordinator.clone(),
            states,
            entity_id,
            unique_id,
            name: sensor_name(&entry.title),
            device: DeviceInfo {
                identifiers: (DOMAIN.to_string(), entry.entry_id.clone()),
                manufacturer: MANUFACTURER.to_string(),
                name: DEFAULT_NAME.to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
                entry_type: "service".to_string(),
            },
            subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&sensor);
        let unsub = coordinator.dispatcher().connect(
            &coordinator.data_changed_signal(),
            Arc::new(move |_: &Signal| {
                if let Some(s) = weak.upgrade() {
                    s.update();
                }
            }),
        );
        let (own, held) = split_unsubscribe(unsub);
        *sensor
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(own);
        coordinator.add_listener(held);

        sensor.update();
        debug!(entity_id = %sensor.entity_id, "status sensor setup done");
        sensor
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn update(&self) {
        let status = self.coordinator.status_info();
        self.states.write(EntityState {
            entity_id: self.entity_id.clone(),
            unique_id: self.unique_id.clone(),
            name: Some(self.name.clone()),
            state: status.as_ref().and_then(|s| s.total).map(|t| t.to_string()),
            unit: Some(DEFAULT_UNIT_OF_MEASUREMENT.to_string()),
            icon: Some(ICON.to_string()),
            available: true,
            attributes: status.as_ref().map(status_attributes).unwrap_or_default(),
            entity_category: Some("diagnostic".to_string()),
            device: Some(self.device.clone()),
        });
    }

    pub fn unload(&self) {
        let taken = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(unsub) = taken {
            unsub();
        }
        self.states.remove(&self.entity_id);
    }
}
