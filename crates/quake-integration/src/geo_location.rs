//! Point-marker entities, one per active event.
//!
//! The platform listens on the coordinator's creation signal. Each entity
//! registers itself, subscribes to its own delete signal and to the
//! coordinator's data-changed signal, and republishes its state from the
//! coordinator on every data change.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use quake_config::{DOMAIN, IMAGE_URL_PATTERN};
use quake_feed::FeedEntry;
use quake_reconcile::{
    canonical_object_id, geo_unique_id, Coordinator, NewEntity, RegistrationRequest, Signal,
    Unsubscribe, GEO_LOCATION_DOMAIN,
};
use serde_json::json;
use tracing::debug;

use crate::dispatcher::split_unsubscribe;
use crate::state::{Attributes, EntityState, StateSink};

pub const ICON: &str = "mdi:pulse";
pub const UNIT_KM: &str = "km";
pub const SOURCE: &str = DOMAIN;

pub fn image_url(event_id: &str) -> String {
    IMAGE_URL_PATTERN.replace("{}", event_id)
}

/// Display name: magnitude and region when both are known.
pub fn display_name(entry: &FeedEntry) -> Option<String> {
    let region = entry.region.as_deref().filter(|r| !r.is_empty());
    match (entry.magnitude, region) {
        (Some(m), Some(r)) => Some(format!("M {m:.1} - {r}")),
        (Some(m), None) => Some(format!("M {m:.1}")),
        (None, Some(r)) => Some(r.to_string()),
        (None, None) => entry.title.clone(),
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

struct PlatformInner {
    states: Arc<dyn StateSink>,
    entities: Mutex<BTreeMap<String, Arc<GeoLocationEvent>>>,
}

impl PlatformInner {
    fn entities(&self) -> MutexGuard<'_, BTreeMap<String, Arc<GeoLocationEvent>>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-marker platform of one config entry.
#[derive(Clone)]
pub struct GeoLocationPlatform {
    inner: Arc<PlatformInner>,
}

impl GeoLocationPlatform {
    /// Start listening for new events of `coordinator`.
    pub fn setup(coordinator: &Coordinator, states: Arc<dyn StateSink>) -> Self {
        let platform = Self {
            inner: Arc::new(PlatformInner {
                states,
                entities: Mutex::new(BTreeMap::new()),
            }),
        };

        let weak = Arc::downgrade(&platform.inner);
        let unsub = coordinator.dispatcher().connect(
            &coordinator.new_entity_signal(),
            Arc::new(move |signal: &Signal| {
                if let (Signal::NewEntity(new), Some(inner)) = (signal, weak.upgrade()) {
                    GeoLocationEvent::add(&inner, new);
                }
            }),
        );
        coordinator.add_listener(unsub);
        platform
    }

    pub fn entity(&self, event_id: &str) -> Option<Arc<GeoLocationEvent>> {
        self.inner.entities().get(event_id).cloned()
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.inner.entities().keys().cloned().collect()
    }

    /// Detach and withdraw every live entity. Registry records are kept.
    pub fn unload(&self) {
        let entities: Vec<Arc<GeoLocationEvent>> =
            std::mem::take(&mut *self.inner.entities()).into_values().collect();
        for entity in entities {
            entity.detach();
            self.inner.states.remove(&entity.entity_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

pub struct GeoLocationEvent {
    coordinator: Coordinator,
    platform: Weak<PlatformInner>,
    event_id: String,
    unique_id: String,
    entity_id: String,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    last: Mutex<Option<FeedEntry>>,
}

impl GeoLocationEvent {
    fn add(platform: &Arc<PlatformInner>, new: &NewEntity) {
        let coordinator = new.coordinator.clone();
        let unique_id = geo_unique_id(&new.scope, &new.event_id);
        let entity_id = coordinator.registry().get_or_create(&RegistrationRequest {
            domain: GEO_LOCATION_DOMAIN.to_string(),
            platform: DOMAIN.to_string(),
            unique_id: unique_id.clone(),
            suggested_object_id: canonical_object_id(&new.scope, &new.event_id),
            config_entry_id: Some(coordinator.entry_id().to_string()),
        });

        let entity = Arc::new(GeoLocationEvent {
            coordinator: coordinator.clone(),
            platform: Arc::downgrade(platform),
            event_id: new.event_id.clone(),
            unique_id,
            entity_id,
            subscriptions: Mutex::new(Vec::new()),
            last: Mutex::new(None),
        });

        let dispatcher = coordinator.dispatcher();
        let weak = Arc::downgrade(&entity);
        let on_delete = dispatcher.connect(
            &coordinator.delete_signal(&new.event_id),
            Arc::new(move |_: &Signal| {
                if let Some(e) = weak.upgrade() {
                    e.delete();
                }
            }),
        );
        let weak = Arc::downgrade(&entity);
        let on_change = dispatcher.connect(
            &coordinator.data_changed_signal(),
            Arc::new(move |_: &Signal| {
                if let Some(e) = weak.upgrade() {
                    e.update();
                }
            }),
        );

        for unsub in [on_delete, on_change] {
            let (own, held) = split_unsubscribe(unsub);
            entity.subscriptions().push(own);
            coordinator.add_entity_listener(&entity.event_id, held);
        }

        let previous = platform
            .entities()
            .insert(entity.event_id.clone(), Arc::clone(&entity));
        if let Some(previous) = previous {
            previous.detach();
        }
        debug!(entity_id = %entity.entity_id, event_id = %entity.event_id, "geo location entity added");
        entity.update();
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Unsubscribe>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    fn detach(&self) {
        let subs: Vec<Unsubscribe> = std::mem::take(&mut *self.subscriptions());
        for unsub in subs {
            unsub();
        }
    }

    /// Pull the current entry from the coordinator and publish it.
    ///
    /// When the entry is gone the last known data stays on display and the
    /// entity reports unavailable.
    pub fn update(&self) {
        let Some(platform) = self.platform.upgrade() else {
            return;
        };
        let current = self.coordinator.get_entry(&self.event_id);
        let available = current.is_some();
        let entry = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if current.is_some() {
                *last = current;
            }
            last.clone()
        };
        platform.states.write(self.render(entry.as_ref(), available));
    }

    fn delete(&self) {
        debug!(entity_id = %self.entity_id, event_id = %self.event_id, "geo location entity removed");
        self.detach();
        let Some(platform) = self.platform.upgrade() else {
            return;
        };
        {
            let mut entities = platform.entities();
            if entities
                .get(&self.event_id)
                .map(|e| std::ptr::eq(Arc::as_ptr(e), self))
                .unwrap_or(false)
            {
                entities.remove(&self.event_id);
            }
        }
        platform.states.remove(&self.entity_id);
    }

    fn render(&self, entry: Option<&FeedEntry>, available: bool) -> EntityState {
        let mut attrs = Attributes::default();
        let external_id = self
            .coordinator
            .external_id_for(&self.event_id)
            .or_else(|| entry.map(|e| e.external_id.clone()));
        attrs
            .put("external_id", external_id.map(|v| json!(v)))
            .put("event_id", Some(json!(self.event_id)))
            .put("source", Some(json!(SOURCE)));

        if let Some(e) = entry {
            attrs
                .put("title", e.title.as_ref().map(|v| json!(v)))
                .put("region", e.region.as_ref().map(|v| json!(v)))
                .put("magnitude", e.magnitude.map(|v| json!(v)))
                .put("depth", e.depth.map(|v| json!(v)))
                .put("attribution", e.attribution.as_ref().map(|v| json!(v)))
                .put(
                    "publication_date",
                    e.origin_time.map(|t| json!(t.to_rfc3339())),
                )
                .put(
                    "evaluation_status",
                    e.evaluation_status.as_ref().map(|v| json!(v)),
                )
                .put(
                    "evaluation_mode",
                    e.evaluation_mode.as_ref().map(|v| json!(v)),
                )
                .put("latitude", e.latitude().map(|v| json!(v)))
                .put("longitude", e.longitude().map(|v| json!(v)));
        }
        attrs.put("image_url", Some(json!(image_url(&self.event_id))));

        EntityState {
            entity_id: self.entity_id.clone(),
            unique_id: self.unique_id.clone(),
            name: entry.and_then(display_name),
            state: entry
                .and_then(|e| e.distance_to_home)
                .map(|d| format!("{d:.1}")),
            unit: Some(UNIT_KM.to_string()),
            icon: Some(ICON.to_string()),
            available,
            attributes: attrs.into_map(),
            entity_category: None,
            device: None,
        }
    }
}
