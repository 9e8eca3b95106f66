use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use quake_reconcile::{EntityRegistry, RegistrationRequest, RegistryEntry, RegistryError};

/// In-memory entity registry.
///
/// Collisions on the suggested object id get `_2`, `_3`, ... appended, the
/// same way a real host resolves them.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
    removed: Mutex<Vec<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record directly, bypassing collision handling.
    pub fn insert(
        &self,
        entity_id: &str,
        unique_id: &str,
        platform: &str,
        config_entry_id: Option<&str>,
    ) {
        self.lock().insert(
            entity_id.to_string(),
            RegistryEntry {
                entity_id: entity_id.to_string(),
                unique_id: unique_id.to_string(),
                platform: platform.to_string(),
                config_entry_id: config_entry_id.map(str::to_string),
            },
        );
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.lock().contains_key(entity_id)
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every `remove` call, in order.
    pub fn removed(&self) -> Vec<String> {
        self.removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EntityRegistry for MemoryRegistry {
    fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<RegistryEntry> {
        self.lock()
            .values()
            .filter(|e| e.belongs_to(config_entry_id))
            .cloned()
            .collect()
    }

    fn entry(&self, entity_id: &str) -> Option<RegistryEntry> {
        self.lock().get(entity_id).cloned()
    }

    fn entity_id_for(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.lock()
            .values()
            .find(|e| e.domain() == domain && e.platform == platform && e.unique_id == unique_id)
            .map(|e| e.entity_id.clone())
    }

    fn get_or_create(&self, req: &RegistrationRequest) -> String {
        if let Some(existing) = self.entity_id_for(&req.domain, &req.platform, &req.unique_id) {
            return existing;
        }
        let mut entries = self.lock();
        let base = format!("{}.{}", req.domain, req.suggested_object_id);
        let mut entity_id = base.clone();
        let mut n = 2;
        while entries.contains_key(&entity_id) {
            entity_id = format!("{base}_{n}");
            n += 1;
        }
        entries.insert(
            entity_id.clone(),
            RegistryEntry {
                entity_id: entity_id.clone(),
                unique_id: req.unique_id.clone(),
                platform: req.platform.clone(),
                config_entry_id: req.config_entry_id.clone(),
            },
        );
        entity_id
    }

    fn remove(&self, entity_id: &str) {
        self.lock().remove(entity_id);
        self.removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entity_id.to_string());
    }

    fn rename(&self, entity_id: &str, new_entity_id: &str) -> Result<(), RegistryError> {
        let mut entries = self.lock();
        if entries.contains_key(new_entity_id) {
            return Err(RegistryError::EntityIdTaken {
                entity_id: new_entity_id.to_string(),
            });
        }
        let mut entry = entries
            .remove(entity_id)
            .ok_or_else(|| RegistryError::NotFound {
                entity_id: entity_id.to_string(),
            })?;
        entry.entity_id = new_entity_id.to_string();
        entries.insert(new_entity_id.to_string(), entry);
        Ok(())
    }
}
