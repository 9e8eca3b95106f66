//! Pure reconciliation decisions. No IO, no locks, no clock.
//!
//! The coordinator gathers its state, calls into here, and applies the
//! result against the host. Keeping the set algebra separate makes every
//! decision reproducible from its inputs.

use std::collections::BTreeSet;

use quake_config::DOMAIN;

use crate::event_id::event_id;
use crate::types::{canonical_entity_id, has_collision_suffix, GEO_LOCATION_DOMAIN};
use crate::RegistryEntry;

/// Event ids whose entities must be deleted after a successful cycle.
///
/// `stale = active - current`, `to_remove = (pending ∪ stale) - current`,
/// restricted to ids that are still active. Ids flagged for removal that
/// reappeared in the same cycle are never deleted.
pub fn plan_deletions(
    active: &BTreeSet<String>,
    pending: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> BTreeSet<String> {
    let stale: BTreeSet<&String> = active.difference(current).collect();
    pending
        .iter()
        .chain(stale.into_iter())
        .filter(|id| !current.contains(*id) && active.contains(*id))
        .cloned()
        .collect()
}

/// Event id encoded in a point-marker unique id (`{scope}_{event}`).
///
/// The remainder goes through the normaliser too, so records keyed by an
/// older external-identifier format resolve to the same event.
pub fn derive_event_id<'a>(unique_id: &'a str, scope: &str) -> Option<&'a str> {
    let rest = unique_id.strip_prefix(scope)?.strip_prefix('_')?;
    let id = event_id(rest);
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn is_own_geo_entry(e: &RegistryEntry, entry_id: &str) -> bool {
    e.platform == DOMAIN && e.domain() == GEO_LOCATION_DOMAIN && e.belongs_to(entry_id)
}

/// Registry records of this entry whose event is no longer in the feed.
///
/// Records whose unique id does not carry an event id are left alone.
pub fn stale_registry_entries(
    entries: &[RegistryEntry],
    entry_id: &str,
    scope: &str,
    current: &BTreeSet<String>,
) -> Vec<String> {
    let mut out: Vec<String> = entries
        .iter()
        .filter(|e| is_own_geo_entry(e, entry_id))
        .filter(|e| match derive_event_id(&e.unique_id, scope) {
            Some(id) => !current.contains(id),
            None => false,
        })
        .map(|e| e.entity_id.clone())
        .collect();
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// Legacy entity-id normalisation
// ---------------------------------------------------------------------------

/// One step of the legacy entity-id normalisation pass.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LegacyAction {
    /// Canonical id is free.
    Rename { from: String, to: String },
    /// This entry already holds the canonical id for the same event.
    RemoveDuplicate { entity_id: String, kept: String },
    /// Canonical id is held by an old config entry's record for the same
    /// event; drop that record, then rename.
    ReplaceStale {
        stale: String,
        from: String,
        to: String,
    },
    /// Canonical id belongs to a different live entity.
    Skip { entity_id: String, blocked_by: String },
}

/// Decide what to do with every collision-suffixed record of this entry.
///
/// `lookup` resolves an entity id against the current registry. All
/// decisions derive from current registry state, so the pass can be re-run
/// at any time.
pub fn plan_legacy_renames<F>(
    entries: &[RegistryEntry],
    entry_id: &str,
    scope: &str,
    lookup: F,
) -> Vec<LegacyAction>
where
    F: Fn(&str) -> Option<RegistryEntry>,
{
    let mut own: Vec<&RegistryEntry> = entries
        .iter()
        .filter(|e| is_own_geo_entry(e, entry_id))
        .collect();
    own.sort();

    let mut actions = Vec::new();
    for e in own {
        let Some(event) = derive_event_id(&e.unique_id, scope) else {
            continue;
        };
        let canonical = canonical_entity_id(scope, event);
        if e.entity_id == canonical || !has_collision_suffix(&e.entity_id, &canonical) {
            continue;
        }

        let action = match lookup(&canonical) {
            None => LegacyAction::Rename {
                from: e.entity_id.clone(),
                to: canonical,
            },
            Some(target)
                if target.platform == DOMAIN
                    && derive_event_id(&target.unique_id, scope) == Some(event) =>
            {
                if target.belongs_to(entry_id) {
                    LegacyAction::RemoveDuplicate {
                        entity_id: e.entity_id.clone(),
                        kept: target.entity_id,
                    }
                } else {
                    LegacyAction::ReplaceStale {
                        stale: target.entity_id,
                        from: e.entity_id.clone(),
                        to: canonical,
                    }
                }
            }
            Some(target) => LegacyAction::Skip {
                entity_id: e.entity_id.clone(),
                blocked_by: target.entity_id,
            },
        };
        actions.push(action);
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stale_active_ids_are_deleted() {
        let d = plan_deletions(&set(&["A", "B", "C"]), &set(&[]), &set(&["A", "B"]));
        assert_eq!(d, set(&["C"]));
    }

    #[test]
    fn pending_but_present_is_kept() {
        let d = plan_deletions(&set(&["A", "B"]), &set(&["B"]), &set(&["A", "B"]));
        assert!(d.is_empty());
    }

    #[test]
    fn pending_and_gone_is_deleted_once() {
        let d = plan_deletions(&set(&["A", "B"]), &set(&["B"]), &set(&["A"]));
        assert_eq!(d, set(&["B"]));
    }

    #[test]
    fn pending_but_never_active_is_ignored() {
        let d = plan_deletions(&set(&["A"]), &set(&["Z"]), &set(&["A"]));
        assert!(d.is_empty());
    }

    #[test]
    fn derive_strips_scope_and_normalises() {
        assert_eq!(derive_event_id("Home_123", "Home"), Some("123"));
        assert_eq!(
            derive_event_id("Home_smi:x/query?eventId=123", "Home"),
            Some("123")
        );
        assert_eq!(derive_event_id("Home_status", "Home"), Some("status"));
        assert_eq!(derive_event_id("Other_123", "Home"), None);
        assert_eq!(derive_event_id("Home123", "Home"), None);
        assert_eq!(derive_event_id("Home_", "Home"), None);
    }

    fn rec(entity_id: &str, unique_id: &str, entry: &str) -> RegistryEntry {
        RegistryEntry {
            entity_id: entity_id.to_string(),
            unique_id: unique_id.to_string(),
            platform: DOMAIN.to_string(),
            config_entry_id: Some(entry.to_string()),
        }
    }

    #[test]
    fn stale_registry_selection() {
        let entries = vec![
            rec("geo_location.ingv_home_1", "Home_1", "e1"),
            rec("geo_location.ingv_home_2", "Home_2", "e1"),
            rec("sensor.ingv_home_status", "Home_status", "e1"),
            rec("geo_location.ingv_home_3", "Home_3", "e2"),
            rec("geo_location.weird", "unrelated", "e1"),
        ];
        let stale = stale_registry_entries(&entries, "e1", "Home", &set(&["1"]));
        assert_eq!(stale, vec!["geo_location.ingv_home_2".to_string()]);
    }
}
