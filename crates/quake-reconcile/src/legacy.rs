//! Legacy entity-id normalisation.
//!
//! Older releases let the registry resolve id collisions between locations
//! that saw the same quake, leaving records such as
//! `geo_location.ingv_home_37482911_2`. This pass moves them back to the
//! canonical id. It is best-effort and idempotent: run at setup and again
//! after a version migration, re-deriving every decision from the registry.
//!
//! Conflict order:
//! 1. the canonical id is already held by this entry for the same event:
//!    keep it, drop the suffixed duplicate;
//! 2. it is held by another (old) config entry's record for the same event:
//!    drop that record, then rename;
//! 3. it is held by anything else: skip and log.

use tracing::{debug, info, warn};

use crate::engine::{plan_legacy_renames, LegacyAction};
use crate::EntityRegistry;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyReport {
    /// (from, to) pairs.
    pub renamed: Vec<(String, String)>,
    pub removed: Vec<String>,
    pub skipped: Vec<String>,
}

impl LegacyReport {
    pub fn is_noop(&self) -> bool {
        self.renamed.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

pub fn normalize_legacy_entity_ids(
    registry: &dyn EntityRegistry,
    entry_id: &str,
    scope: &str,
) -> LegacyReport {
    let entries = registry.entries_for_config_entry(entry_id);
    let actions = plan_legacy_renames(&entries, entry_id, scope, |id| registry.entry(id));

    let mut report = LegacyReport::default();
    for action in actions {
        match action {
            LegacyAction::Rename { from, to } => rename(registry, from, to, &mut report),
            LegacyAction::RemoveDuplicate { entity_id, kept } => {
                debug!(entity_id = %entity_id, kept = %kept, "removing duplicate legacy entity");
                registry.remove(&entity_id);
                report.removed.push(entity_id);
            }
            LegacyAction::ReplaceStale { stale, from, to } => {
                debug!(stale = %stale, "removing entity of a previous config entry");
                registry.remove(&stale);
                report.removed.push(stale);
                rename(registry, from, to, &mut report);
            }
            LegacyAction::Skip {
                entity_id,
                blocked_by,
            } => {
                warn!(
                    entity_id = %entity_id,
                    blocked_by = %blocked_by,
                    "legacy entity id not normalised, canonical id held by another entity"
                );
                report.skipped.push(entity_id);
            }
        }
    }

    if !report.is_noop() {
        info!(
            entry_id,
            renamed = report.renamed.len(),
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "legacy entity ids normalised"
        );
    }
    report
}

fn rename(registry: &dyn EntityRegistry, from: String, to: String, report: &mut LegacyReport) {
    match registry.rename(&from, &to) {
        Ok(()) => {
            debug!(from = %from, to = %to, "renamed legacy entity id");
            report.renamed.push((from, to));
        }
        Err(e) => {
            warn!(from = %from, to = %to, error = %e, "legacy entity rename failed");
            report.skipped.push(from);
        }
    }
}
