//! Scenario: Refresh Loop Stops
//!
//! # Invariants under test
//! - The first refresh runs immediately, then one per interval.
//! - Stopping the coordinator ends the loop; no refresh happens afterwards.

use std::time::Duration;

use quake_reconcile::spawn_refresh_loop;
use quake_testkit::{AsyncScriptedFeed, Harness, ScriptControl, ScriptedFeed};

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn loop_ticks_on_interval_and_exits_on_stop() {
    let h = Harness::new();
    let feed = AsyncScriptedFeed::new();
    let coord = h.coordinator("e1", "Home", feed.handle());

    let task = spawn_refresh_loop(coord.clone());
    settle().await;
    assert_eq!(feed.update_count(), 1, "first refresh is immediate");

    tokio::time::advance(Duration::from_secs(299)).await;
    settle().await;
    assert_eq!(feed.update_count(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(feed.update_count(), 2);

    coord.stop();
    task.await.expect("refresh loop");

    tokio::time::advance(Duration::from_secs(3_000)).await;
    settle().await;
    assert_eq!(feed.update_count(), 2);
}

#[tokio::test]
async fn blocking_feed_loop_exits_on_stop() {
    let h = Harness::new();
    let feed = ScriptedFeed::new();
    let coord = h.coordinator("e1", "Home", feed.handle());

    let task = spawn_refresh_loop(coord.clone());
    while feed.update_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    coord.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop exits promptly")
        .expect("refresh loop");
    assert_eq!(feed.update_count(), 1);
}
