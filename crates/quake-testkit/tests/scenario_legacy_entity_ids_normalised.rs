//! Scenario: Legacy Entity Ids Normalised
//!
//! # Invariants under test
//! Collision-suffixed point-marker ids (`<canonical>_<digits>`) are moved
//! back to the canonical id, resolving conflicts in this order:
//! 1. canonical id held by this entry for the same event: drop the duplicate;
//! 2. canonical id held by an old config entry for the same event: drop that
//!    record, then rename;
//! 3. canonical id held by anything else: skip, leave both untouched.
//!
//! The pass is idempotent and a rename collision never aborts it: the
//! entry keeps its old id, is reported as skipped, and later actions of the
//! same pass still run.

use quake_config::DOMAIN;
use quake_reconcile::{
    normalize_legacy_entity_ids, EntityRegistry, LegacyReport, RegistrationRequest, RegistryEntry,
    RegistryError,
};
use quake_testkit::MemoryRegistry;

fn registry() -> MemoryRegistry {
    MemoryRegistry::new()
}

// ---------------------------------------------------------------------------
// Free canonical id
// ---------------------------------------------------------------------------

#[test]
fn suffixed_id_is_renamed_when_canonical_is_free() {
    let r = registry();
    r.insert("geo_location.ingv_home_100_2", "Home_100", DOMAIN, Some("e1"));

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert_eq!(
        report.renamed,
        vec![(
            "geo_location.ingv_home_100_2".to_string(),
            "geo_location.ingv_home_100".to_string()
        )]
    );
    assert!(r.contains("geo_location.ingv_home_100"));
    assert!(!r.contains("geo_location.ingv_home_100_2"));
    assert_eq!(
        r.entry("geo_location.ingv_home_100").map(|e| e.unique_id),
        Some("Home_100".to_string())
    );
}

// ---------------------------------------------------------------------------
// Conflict order
// ---------------------------------------------------------------------------

#[test]
fn same_entry_same_event_keeps_canonical_and_drops_duplicate() {
    let r = registry();
    r.insert("geo_location.ingv_home_200", "Home_200", DOMAIN, Some("e1"));
    r.insert(
        "geo_location.ingv_home_200_2",
        "Home_smi:webservices.ingv.it/fdsnws/event/1/query?eventId=200",
        DOMAIN,
        Some("e1"),
    );

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert!(report.renamed.is_empty());
    assert_eq!(report.removed, vec!["geo_location.ingv_home_200_2"]);
    assert!(r.contains("geo_location.ingv_home_200"));
    assert!(!r.contains("geo_location.ingv_home_200_2"));
}

#[test]
fn old_entry_record_is_replaced() {
    let r = registry();
    // Left behind by a config entry that was deleted and re-added.
    r.insert("geo_location.ingv_home_300", "Home_300", DOMAIN, Some("old"));
    r.insert("geo_location.ingv_home_300_2", "Home_300", DOMAIN, Some("e1"));

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert_eq!(report.removed, vec!["geo_location.ingv_home_300"]);
    assert_eq!(report.renamed.len(), 1);
    let moved = r.entry("geo_location.ingv_home_300").expect("renamed record");
    assert_eq!(moved.config_entry_id.as_deref(), Some("e1"));
}

#[test]
fn unrelated_holder_is_skipped() {
    let r = registry();
    r.insert("geo_location.ingv_home_400", "Home_999", DOMAIN, Some("e1"));
    r.insert("geo_location.ingv_home_400_3", "Home_400", DOMAIN, Some("e1"));

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert_eq!(report.skipped, vec!["geo_location.ingv_home_400_3"]);
    assert!(report.renamed.is_empty());
    assert!(report.removed.is_empty());
    assert!(r.contains("geo_location.ingv_home_400"));
    assert!(r.contains("geo_location.ingv_home_400_3"));
}

#[test]
fn canonical_held_by_other_integration_is_skipped() {
    let r = registry();
    r.insert("geo_location.ingv_home_500", "Home_500", "other_feed", Some("x"));
    r.insert("geo_location.ingv_home_500_2", "Home_500", DOMAIN, Some("e1"));

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert_eq!(report.skipped, vec!["geo_location.ingv_home_500_2"]);
    assert!(r.contains("geo_location.ingv_home_500"));
}

// ---------------------------------------------------------------------------
// Scope of the pass
// ---------------------------------------------------------------------------

#[test]
fn non_legacy_ids_are_left_alone() {
    let r = registry();
    r.insert("geo_location.ingv_home_600", "Home_600", DOMAIN, Some("e1"));
    r.insert("geo_location.my_renamed_quake", "Home_601", DOMAIN, Some("e1"));
    r.insert("geo_location.ingv_home_602_2", "Home_602", DOMAIN, Some("e2"));
    r.insert("sensor.ingv_earthquakes_home_status", "Home_status", DOMAIN, Some("e1"));

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert!(report.is_noop());
    assert_eq!(r.len(), 4);
}

#[test]
fn pass_is_idempotent() {
    let r = registry();
    r.insert("geo_location.ingv_home_700_2", "Home_700", DOMAIN, Some("e1"));
    r.insert("geo_location.ingv_home_701", "Home_701", DOMAIN, Some("e1"));
    r.insert("geo_location.ingv_home_701_2", "Home_701", DOMAIN, Some("e1"));

    let first = normalize_legacy_entity_ids(&r, "e1", "Home");
    assert!(!first.is_noop());
    let ids_after_first = r.entity_ids();

    let second = normalize_legacy_entity_ids(&r, "e1", "Home");
    assert_eq!(second, LegacyReport::default());
    assert_eq!(r.entity_ids(), ids_after_first);
}

// ---------------------------------------------------------------------------
// Rename collisions at apply time
// ---------------------------------------------------------------------------

/// Registry whose lookups lag behind its records: `entry` does not see
/// `hidden`, so the plan treats that id as free while `rename` still finds
/// it taken.
struct LaggingRegistry {
    inner: MemoryRegistry,
    hidden: String,
}

impl EntityRegistry for LaggingRegistry {
    fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<RegistryEntry> {
        self.inner.entries_for_config_entry(config_entry_id)
    }

    fn entry(&self, entity_id: &str) -> Option<RegistryEntry> {
        if entity_id == self.hidden {
            return None;
        }
        self.inner.entry(entity_id)
    }

    fn entity_id_for(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.inner.entity_id_for(domain, platform, unique_id)
    }

    fn get_or_create(&self, req: &RegistrationRequest) -> String {
        self.inner.get_or_create(req)
    }

    fn remove(&self, entity_id: &str) {
        self.inner.remove(entity_id)
    }

    fn rename(&self, entity_id: &str, new_entity_id: &str) -> Result<(), RegistryError> {
        self.inner.rename(entity_id, new_entity_id)
    }
}

#[test]
fn rename_collision_is_skipped_and_pass_continues() {
    let inner = registry();
    inner.insert("geo_location.ingv_home_800", "Elsewhere_800", DOMAIN, Some("other"));
    inner.insert("geo_location.ingv_home_800_2", "Home_800", DOMAIN, Some("e1"));
    inner.insert("geo_location.ingv_home_801_2", "Home_801", DOMAIN, Some("e1"));
    let r = LaggingRegistry {
        inner,
        hidden: "geo_location.ingv_home_800".to_string(),
    };

    let report = normalize_legacy_entity_ids(&r, "e1", "Home");

    assert_eq!(report.skipped, vec!["geo_location.ingv_home_800_2"]);
    assert!(report.removed.is_empty());
    assert_eq!(
        report.renamed,
        vec![(
            "geo_location.ingv_home_801_2".to_string(),
            "geo_location.ingv_home_801".to_string()
        )]
    );
    assert!(r.inner.contains("geo_location.ingv_home_800_2"));
    assert_eq!(
        r.inner
            .entry("geo_location.ingv_home_800")
            .map(|e| e.unique_id),
        Some("Elsewhere_800".to_string())
    );
    assert!(r.inner.contains("geo_location.ingv_home_801"));
}
