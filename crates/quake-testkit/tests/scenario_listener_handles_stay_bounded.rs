//! Scenario: Listener Handles Stay Bounded
//!
//! # Invariants under test
//! - The coordinator holds subscriptions only for live entities plus the
//!   platform's own listener; a deleted event's handles are released in the
//!   refresh that deletes it.
//! - After any number of create/delete cycles the held count and the
//!   dispatcher's listener table return to their idle size.
//! - Stop releases everything that is still held.

use std::sync::Arc;

use quake_feed::FeedEntry;
use quake_integration::{GeoLocationPlatform, StateSink};
use quake_testkit::{external_id, quake, Cycle, Harness, ScriptControl, ScriptedFeed};

#[tokio::test]
async fn create_delete_churn_leaves_no_stale_handles() {
    let h = Harness::new();
    let feed = ScriptedFeed::new();
    let coord = h.coordinator("e1", "Home", feed.handle());
    let states: Arc<dyn StateSink> = h.states.clone();
    let geo = GeoLocationPlatform::setup(&coord, states);

    let idle_held = coord.held_listener_count();
    let idle_connected = h.dispatcher.total_listeners();
    assert_eq!(idle_held, 1);

    for n in 0..200 {
        let id = n.to_string();
        let ext = external_id(&id);
        feed.push(Cycle::ok([quake(&ext, 3.0, "Norcia (PG)", 10.0)]).create(&ext));
        coord.refresh().await;
        // Delete listener and data-changed listener of the live entity.
        assert_eq!(coord.held_listener_count(), idle_held + 2);

        feed.push(Cycle::ok(Vec::<FeedEntry>::new()).remove(&ext));
        coord.refresh().await;
    }

    assert!(geo.event_ids().is_empty());
    assert!(coord.active_event_ids().is_empty());
    assert_eq!(coord.held_listener_count(), idle_held);
    assert_eq!(h.dispatcher.total_listeners(), idle_connected);
}

#[tokio::test]
async fn stop_releases_live_entity_handles() {
    let h = Harness::new();
    let feed = ScriptedFeed::new();
    let coord = h.coordinator("e1", "Home", feed.handle());
    let states: Arc<dyn StateSink> = h.states.clone();
    let _geo = GeoLocationPlatform::setup(&coord, states);

    feed.push(
        Cycle::ok([
            quake(&external_id("1"), 3.0, "Norcia (PG)", 10.0),
            quake(&external_id("2"), 3.3, "Visso (MC)", 18.0),
        ])
        .create(&external_id("1"))
        .create(&external_id("2")),
    );
    coord.refresh().await;
    assert_eq!(coord.held_listener_count(), 5);

    coord.stop();

    assert_eq!(coord.held_listener_count(), 0);
    assert_eq!(h.dispatcher.total_listeners(), 0);
}
