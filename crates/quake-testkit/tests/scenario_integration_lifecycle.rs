//! Scenario: Integration Lifecycle
//!
//! # Invariants under test
//! - Setting up an entry builds one feed manager, starts refreshing at once
//!   and publishes one point marker per active event plus the status sensor.
//! - A removed event withdraws its entity state and its registry record in
//!   the same refresh; a failed refresh keeps entities, only availability
//!   follows the feed.
//! - Unchanged options never reload; changed options rebuild the feed.
//! - Unload withdraws every state and listener but keeps registry records.
//! - Stored version 1 entries migrate on setup; unknown versions refuse to
//!   load without building a feed.
//! - YAML import creates an entry once per location.

use std::time::Duration;

use quake_config::{
    load_layered_yaml_from_strings, EntryOptions, OptionsInput, StoredEntry, UnitSystem,
    CONFIG_VERSION, DOMAIN,
};
use quake_feed::{FeedEntries, FeedEntry};
use quake_integration::Integration;
use quake_testkit::{config_entry, external_id, quake, Cycle, Harness, ScriptControl, ScriptedFeed};
use serde_json::json;

const HOME_SENSOR: &str = "sensor.ingv_earthquakes_home_status";
const HOME_QUAKE: &str = "geo_location.ingv_home_1001";

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn sensor_state(h: &Harness, entity_id: &str) -> Option<String> {
    h.states.get(entity_id).and_then(|s| s.state)
}

/// Entry `e1` for "Home" whose first cycle reports one quake.
async fn home_with_one_quake(h: &Harness, integration: &Integration) -> ScriptedFeed {
    let feed = ScriptedFeed::new();
    feed.push(
        Cycle::ok([quake(&external_id("1001"), 3.4, "Norcia (PG)", 12.34)])
            .create(&external_id("1001"))
            .counted(),
    );
    h.factory.enqueue(feed.handle());
    integration
        .setup_entry(config_entry("e1", "Home").to_stored())
        .await
        .expect("setup");
    eventually("first refresh", || {
        sensor_state(h, HOME_SENSOR).as_deref() == Some("1")
    })
    .await;
    feed
}

// ---------------------------------------------------------------------------
// Setup and refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn setup_publishes_marker_and_status_after_first_refresh() {
    let h = Harness::new();
    let integration = h.integration();
    let feed = home_with_one_quake(&h, &integration).await;

    assert_eq!(feed.update_count(), 1);
    assert_eq!(h.factory.built().len(), 1);
    assert_eq!(h.factory.built()[0].filter_radius_km, EntryOptions::default().radius);

    let marker = h.states.get(HOME_QUAKE).expect("point marker state");
    assert!(marker.available);
    assert_eq!(marker.name.as_deref(), Some("M 3.4 - Norcia (PG)"));
    assert_eq!(marker.state.as_deref(), Some("12.3"));
    assert_eq!(marker.unit.as_deref(), Some("km"));
    assert_eq!(marker.attribute("event_id"), Some(&json!("1001")));
    assert_eq!(marker.attribute("external_id"), Some(&json!(external_id("1001"))));
    assert_eq!(marker.attribute("source"), Some(&json!(DOMAIN)));

    let sensor = h.states.get(HOME_SENSOR).expect("status sensor state");
    assert_eq!(sensor.name.as_deref(), Some("Ingv Earthquakes Home status"));
    assert_eq!(sensor.unit.as_deref(), Some("quakes"));
    assert_eq!(sensor.entity_category.as_deref(), Some("diagnostic"));
    assert_eq!(sensor.attribute("status"), Some(&json!("OK")));
    assert_eq!(sensor.attribute("created"), Some(&json!(1)));
    assert_eq!(sensor.attribute("removed"), None);

    assert!(h.registry.contains(HOME_QUAKE));
    assert!(h.registry.contains(HOME_SENSOR));
    let geo = integration.geo_platform("e1").await.expect("geo platform");
    assert_eq!(geo.event_ids(), vec!["1001".to_string()]);

    integration.shutdown().await;
}

#[tokio::test]
async fn setting_up_a_loaded_entry_twice_fails() {
    let h = Harness::new();
    let integration = h.integration();
    let _feed = home_with_one_quake(&h, &integration).await;

    h.factory.enqueue(ScriptedFeed::new().handle());
    let again = integration
        .setup_entry(config_entry("e1", "Home").to_stored())
        .await;

    assert!(again.is_err());
    assert_eq!(h.factory.built().len(), 1, "no second feed built");
    integration.shutdown().await;
}

#[tokio::test]
async fn removed_event_withdraws_state_and_registry_record() {
    let h = Harness::new();
    let integration = h.integration();
    let feed = home_with_one_quake(&h, &integration).await;
    let coord = integration.coordinator("e1").await.expect("coordinator");

    feed.push(
        Cycle::ok(Vec::<FeedEntry>::new())
            .remove(&external_id("1001"))
            .counted(),
    );
    coord.refresh().await;

    assert!(h.states.get(HOME_QUAKE).is_none());
    assert!(!h.registry.contains(HOME_QUAKE));
    assert!(h.registry.contains(HOME_SENSOR));
    let geo = integration.geo_platform("e1").await.expect("geo platform");
    assert!(geo.event_ids().is_empty());
    assert_eq!(sensor_state(&h, HOME_SENSOR).as_deref(), Some("0"));

    integration.shutdown().await;
}

#[tokio::test]
async fn failed_refresh_keeps_marker_but_follows_feed_availability() {
    let h = Harness::new();
    let integration = h.integration();
    let feed = home_with_one_quake(&h, &integration).await;
    let coord = integration.coordinator("e1").await.expect("coordinator");

    let mut failed = Cycle::failed();
    failed.entries = Some(FeedEntries::new());
    feed.push(failed);
    coord.refresh().await;

    let marker = h.states.get(HOME_QUAKE).expect("marker survives");
    assert!(!marker.available);
    assert_eq!(marker.state.as_deref(), Some("12.3"), "last known data kept");
    assert!(h.registry.contains(HOME_QUAKE));
    assert!(h.registry.removed().is_empty());

    let sensor = h.states.get(HOME_SENSOR).expect("status sensor state");
    assert_eq!(sensor.attribute("status"), Some(&json!("ERROR")));
    assert!(sensor.available);

    integration.shutdown().await;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_changed_options_reload_the_entry() {
    let h = Harness::new();
    let integration = h.integration();
    let _feed = home_with_one_quake(&h, &integration).await;

    let same = OptionsInput {
        radius: Some(EntryOptions::default().radius),
        ..OptionsInput::default()
    };
    assert!(!integration.update_options("e1", &same).await.expect("same"));
    assert!(!integration
        .update_options("e1", &OptionsInput::default())
        .await
        .expect("empty"));
    assert_eq!(h.factory.built().len(), 1);

    h.factory.enqueue(ScriptedFeed::new().handle());
    let wider = OptionsInput {
        radius: Some(100.0),
        ..OptionsInput::default()
    };
    assert!(integration.update_options("e1", &wider).await.expect("wider"));

    let built = h.factory.built();
    assert_eq!(built.len(), 2);
    assert_eq!(built[1].filter_radius_km, 100.0);
    let entry = integration.entry("e1").await.expect("entry reloaded");
    assert_eq!(entry.options.radius, 100.0);

    integration.shutdown().await;
}

#[tokio::test]
async fn invalid_options_are_rejected_without_reload() {
    let h = Harness::new();
    let integration = h.integration();
    let _feed = home_with_one_quake(&h, &integration).await;

    let bad = OptionsInput {
        radius: Some(-5.0),
        ..OptionsInput::default()
    };
    assert!(integration.update_options("e1", &bad).await.is_err());
    assert_eq!(h.factory.built().len(), 1);
    assert_eq!(
        integration.entry("e1").await.map(|e| e.options.radius),
        Some(EntryOptions::default().radius)
    );

    integration.shutdown().await;
}

// ---------------------------------------------------------------------------
// Unload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unload_withdraws_states_and_listeners() {
    let h = Harness::new();
    let integration = h.integration();
    let _feed = home_with_one_quake(&h, &integration).await;
    assert!(h.dispatcher.total_listeners() > 0);

    assert!(integration.unload_entry("e1").await.expect("unload"));

    assert!(h.states.entity_ids().is_empty());
    assert_eq!(h.dispatcher.total_listeners(), 0);
    assert!(h.registry.contains(HOME_QUAKE), "records outlive the entities");
    assert!(integration.entries().await.is_empty());

    assert!(!integration.unload_entry("e1").await.expect("second unload"));
}

#[tokio::test]
async fn unknown_entries_are_ignored() {
    let h = Harness::new();
    let integration = h.integration();

    assert!(!integration.unload_entry("nope").await.expect("unload"));
    assert!(!integration.reload_entry("nope").await.expect("reload"));
    let input = OptionsInput {
        radius: Some(10.0),
        ..OptionsInput::default()
    };
    assert!(!integration.update_options("nope", &input).await.expect("options"));
    assert!(h.factory.built().is_empty());
}

#[tokio::test]
async fn entries_for_two_locations_are_independent() {
    let h = Harness::new();
    let integration = h.integration();
    let _home = home_with_one_quake(&h, &integration).await;

    let work = ScriptedFeed::new();
    work.push(
        Cycle::ok([quake(&external_id("1001"), 3.4, "Norcia (PG)", 48.0)])
            .create(&external_id("1001")),
    );
    h.factory.enqueue(work.handle());
    integration
        .setup_entry(config_entry("e2", "Work").to_stored())
        .await
        .expect("setup work");
    eventually("work marker", || {
        h.states.get("geo_location.ingv_work_1001").is_some()
    })
    .await;

    assert!(integration.unload_entry("e1").await.expect("unload home"));

    assert!(h.states.get(HOME_QUAKE).is_none());
    let work_marker = h
        .states
        .get("geo_location.ingv_work_1001")
        .expect("other entry untouched");
    assert_eq!(work_marker.state.as_deref(), Some("48.0"));

    integration.shutdown().await;
    assert_eq!(h.dispatcher.total_listeners(), 0);
}

// ---------------------------------------------------------------------------
// Stored versions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn version_one_entry_is_migrated_on_setup() {
    let h = Harness::new();
    let integration = h.integration();
    h.factory.enqueue(ScriptedFeed::new().handle());
    let stored = StoredEntry {
        entry_id: "old".to_string(),
        version: 1,
        title: "Norcia".to_string(),
        unique_id: "Norcia".to_string(),
        data: json!({
            "location": "Norcia",
            "latitude": 42.79,
            "longitude": 13.09,
            "radius": 75.0,
            "minimum_magnitude": 4.0,
        }),
        options: json!({}),
    };

    let entry = integration.setup_entry(stored).await.expect("migrated setup");

    assert_eq!(entry.version, CONFIG_VERSION);
    assert_eq!(entry.options.radius, 75.0);
    assert_eq!(entry.options.minimum_magnitude, 4.0);
    assert_eq!(
        entry.options.scan_interval,
        EntryOptions::default().scan_interval
    );
    let built = h.factory.built();
    assert_eq!(built[0].filter_radius_km, 75.0);
    assert_eq!(built[0].filter_minimum_magnitude, 4.0);

    integration.shutdown().await;
}

#[tokio::test]
async fn unknown_version_refuses_to_load() {
    let h = Harness::new();
    let integration = h.integration();
    h.factory.enqueue(ScriptedFeed::new().handle());
    let mut stored = config_entry("e1", "Home").to_stored();
    stored.version = CONFIG_VERSION + 1;

    assert!(integration.setup_entry(stored).await.is_err());
    assert!(h.factory.built().is_empty());
    assert!(integration.entries().await.is_empty());
    assert!(h.states.entity_ids().is_empty());
}

#[tokio::test]
async fn legacy_marker_id_is_renamed_before_entities_attach() {
    let h = Harness::new();
    h.registry
        .insert("geo_location.ingv_home_1001_2", "Home_1001", DOMAIN, Some("e1"));
    let integration = h.integration();
    let _feed = home_with_one_quake(&h, &integration).await;

    assert!(h.registry.contains(HOME_QUAKE));
    assert!(!h.registry.contains("geo_location.ingv_home_1001_2"));
    assert!(h.states.get(HOME_QUAKE).is_some());
    assert_eq!(h.states.ids_in_domain("geo_location"), vec![HOME_QUAKE]);

    integration.shutdown().await;
}

// ---------------------------------------------------------------------------
// Units and import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imperial_radius_reaches_the_feed_in_km() {
    let h = Harness::new();
    let integration = Integration::new(h.host_services(UnitSystem::Imperial));
    h.factory.enqueue(ScriptedFeed::new().handle());
    let mut entry = config_entry("e1", "Home");
    entry.options.radius = 10.0;

    integration
        .setup_entry(entry.to_stored())
        .await
        .expect("setup");

    let km = h.factory.built()[0].filter_radius_km;
    assert!((km - 16.09344).abs() < 1e-9, "got {km}");
    assert_eq!(
        integration.entry("e1").await.map(|e| e.options.radius),
        Some(10.0),
        "stored radius stays in the user's unit"
    );
    integration.shutdown().await;
}

#[tokio::test]
async fn yaml_import_creates_one_entry_per_location() {
    let h = Harness::new();
    let integration = h.integration();
    let base = "ingv_centro_nazionale_terremoti:\n  location: Norcia\n  latitude: 42.79\n  longitude: 13.09\n";
    let overlay = "ingv_centro_nazionale_terremoti:\n  radius: 25\n";
    let loaded = load_layered_yaml_from_strings(&[base, overlay]).expect("yaml");

    h.factory.enqueue(ScriptedFeed::new().handle());
    let entry = integration
        .import_yaml(&loaded)
        .await
        .expect("import")
        .expect("entry created");
    assert_eq!(entry.title, "Norcia");
    assert_eq!(entry.unique_id, "Norcia");
    assert_eq!(entry.options.radius, 25.0);
    assert_eq!(entry.data.latitude, 42.79);

    let again = integration.import_yaml(&loaded).await.expect("reimport");
    assert!(again.is_none(), "location already configured");
    assert_eq!(h.factory.built().len(), 1);

    let unrelated = load_layered_yaml_from_strings(&["logger:\n  default: info\n"]).expect("yaml");
    assert!(integration.import_yaml(&unrelated).await.expect("noop").is_none());

    integration.shutdown().await;
}
