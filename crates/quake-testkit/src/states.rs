use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use quake_integration::{EntityState, StateSink};

/// In-memory host state machine. Keeps a write counter per entity.
#[derive(Default)]
pub struct MemoryStates {
    states: Mutex<BTreeMap<String, EntityState>>,
    writes: Mutex<BTreeMap<String, usize>>,
}

impl MemoryStates {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, EntityState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.lock().get(entity_id).cloned()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Entity ids of one family (`geo_location`, `sensor`).
    pub fn ids_in_domain(&self, domain: &str) -> Vec<String> {
        let prefix = format!("{domain}.");
        self.lock()
            .keys()
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn write_count(&self, entity_id: &str) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }
}

impl StateSink for MemoryStates {
    fn write(&self, state: EntityState) {
        *self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(state.entity_id.clone())
            .or_default() += 1;
        self.lock().insert(state.entity_id.clone(), state);
    }

    fn remove(&self, entity_id: &str) {
        self.lock().remove(entity_id);
    }
}
