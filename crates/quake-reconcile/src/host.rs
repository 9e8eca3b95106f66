//! Host platform services the coordinator depends on.
//!
//! The host owns the signal bus and the entity registry; this crate only
//! calls into them. Implementations must be cheap and non-blocking: they
//! are invoked from inside a refresh cycle.

use std::sync::Arc;

use crate::{RegistrationRequest, RegistryEntry, RegistryError, Signal};

/// Callback attached to a named signal.
pub type Listener = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Detaches a listener. Calling it twice is impossible by construction.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Named-signal bus.
pub trait Dispatcher: Send + Sync {
    /// Deliver `payload` to every listener connected to `signal`.
    fn send(&self, signal: &str, payload: &Signal);

    fn connect(&self, signal: &str, listener: Listener) -> Unsubscribe;
}

/// Persistent directory of entity ids.
pub trait EntityRegistry: Send + Sync {
    fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<RegistryEntry>;

    fn entry(&self, entity_id: &str) -> Option<RegistryEntry>;

    /// Entity id already registered for `(domain, platform, unique_id)`.
    fn entity_id_for(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String>;

    /// Return the existing entity id for the request's unique id, or register
    /// a new one derived from the suggested object id.
    fn get_or_create(&self, req: &RegistrationRequest) -> String;

    fn remove(&self, entity_id: &str);

    /// Move a record to a new entity id. Fails if the target exists.
    fn rename(&self, entity_id: &str, new_entity_id: &str) -> Result<(), RegistryError>;
}
