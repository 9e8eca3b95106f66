//! Stale registry cleanup.
//!
//! Deletion signals only reach entities that are currently loaded. A record
//! whose entity never came back (crash mid-cycle, unload between cycles) is
//! caught here on the next successful refresh.

use std::collections::BTreeSet;

use tracing::debug;

use crate::engine::stale_registry_entries;
use crate::EntityRegistry;

/// Remove this entry's point-marker records whose event is not in `current`.
///
/// Returns the removed entity ids.
pub fn remove_stale_entities(
    registry: &dyn EntityRegistry,
    entry_id: &str,
    scope: &str,
    current: &BTreeSet<String>,
) -> Vec<String> {
    let entries = registry.entries_for_config_entry(entry_id);
    let stale = stale_registry_entries(&entries, entry_id, scope, current);
    for entity_id in &stale {
        debug!(entity_id = %entity_id, "removing orphaned registry entry");
        registry.remove(entity_id);
    }
    stale
}
