//! In-memory host doubles and scripted feed managers for the scenario suite.

mod feed;
mod registry;
mod states;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use quake_config::{
    ConfigEntry, EntryData, EntryOptions, HostDefaults, UnitSystem, CONFIG_VERSION,
};
use quake_feed::FeedHandle;
use quake_integration::{HostServices, Integration, LocalDispatcher};
use quake_reconcile::{Coordinator, CoordinatorConfig, Dispatcher, Signal, Unsubscribe};

pub use feed::{
    quake, AsyncScriptedFeed, Callback, Cycle, Gate, ScriptControl, ScriptedFactory, ScriptedFeed,
};
pub use registry::MemoryRegistry;
pub use states::MemoryStates;

/// External identifier in the shape the INGV web service publishes.
pub fn external_id(event_id: &str) -> String {
    format!("smi:webservices.ingv.it/fdsnws/event/1/query?eventId={event_id}")
}

pub fn host_defaults(units: UnitSystem) -> HostDefaults {
    HostDefaults {
        location_name: "Home".to_string(),
        latitude: 41.9,
        longitude: 12.5,
        units,
    }
}

pub fn config_entry(entry_id: &str, location: &str) -> ConfigEntry {
    ConfigEntry {
        entry_id: entry_id.to_string(),
        version: CONFIG_VERSION,
        title: location.to_string(),
        unique_id: location.to_string(),
        data: EntryData {
            location: location.to_string(),
            latitude: 42.35,
            longitude: 13.4,
        },
        options: EntryOptions::default(),
    }
}

/// One shared set of host services.
#[derive(Clone, Default)]
pub struct Harness {
    pub dispatcher: Arc<LocalDispatcher>,
    pub registry: Arc<MemoryRegistry>,
    pub states: Arc<MemoryStates>,
    pub factory: Arc<ScriptedFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bare coordinator on these services; no platforms, no refresh loop.
    pub fn coordinator(&self, entry_id: &str, scope: &str, feed: FeedHandle) -> Coordinator {
        Coordinator::new(
            CoordinatorConfig {
                entry_id: entry_id.to_string(),
                scope: scope.to_string(),
                name: format!("test-{scope}"),
                update_interval: Duration::from_secs(300),
            },
            feed,
            self.dispatcher.clone(),
            self.registry.clone(),
        )
    }

    pub fn host_services(&self, units: UnitSystem) -> HostServices {
        HostServices {
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            states: self.states.clone(),
            feeds: self.factory.clone(),
            defaults: host_defaults(units),
        }
    }

    pub fn integration(&self) -> Integration {
        Integration::new(self.host_services(UnitSystem::Metric))
    }
}

/// Records every signal delivered on the watched names.
#[derive(Default)]
pub struct SignalLog {
    seen: Arc<Mutex<Vec<(String, Signal)>>>,
    subscriptions: Vec<Unsubscribe>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, dispatcher: &dyn Dispatcher, signal: &str) {
        let seen = Arc::clone(&self.seen);
        let name = signal.to_string();
        let unsub = dispatcher.connect(
            signal,
            Arc::new(move |payload: &Signal| {
                seen.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((name.clone(), payload.clone()));
            }),
        );
        self.subscriptions.push(unsub);
    }

    pub fn count(&self, signal: &str) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(name, _)| name == signal)
            .count()
    }

    pub fn total(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Event ids carried by creation signals, in delivery order.
    pub fn created_event_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|(_, s)| match s {
                Signal::NewEntity(new) => Some(new.event_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Event ids carried by delete signals, in delivery order.
    pub fn deleted_event_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|(_, s)| match s {
                Signal::Delete { event_id } => Some(event_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
