//! Periodic refresh driver.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::Coordinator;

/// Spawn a task that refreshes `coordinator` at its configured interval.
///
/// The first refresh runs immediately. Refreshes never overlap: the next
/// tick is awaited only after the previous cycle returns. The task exits
/// once the coordinator is stopped; a cycle already running is not cut
/// short.
pub fn spawn_refresh_loop(coordinator: Coordinator) -> JoinHandle<()> {
    let interval = coordinator.config().update_interval;
    let mut shutdown = coordinator.shutdown_signal();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() || coordinator.is_stopped() {
                break;
            }
            coordinator.refresh().await;
        }
        debug!(name = %coordinator.config().name, "refresh loop exited");
    })
}
