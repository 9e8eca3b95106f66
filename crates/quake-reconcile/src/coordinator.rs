//! Reconciliation coordinator: one per configured location.
//!
//! # State
//!
//! - **active**: event ids with a live entity in the host.
//! - **pending_removal**: ids the feed reported removed this cycle; cleared
//!   at the start and the end of every refresh.
//! - **id_map**: event id -> most recent external identifier.
//! - **created**: ids first seen during the running update; their creation
//!   signals go out once the update has returned.
//! - **status**: last status snapshot.
//!
//! All of it is created empty, mutated only by feed callbacks and the
//! refresh continuation, and cleared by [`Coordinator::stop`].
//!
//! # Concurrency
//!
//! The host scheduler serialises refreshes. Feed callbacks run inside the
//! manager's update (possibly on the blocking pool) and only touch the
//! in-memory state under a short mutex. Every host call (dispatcher,
//! registry) happens in the refresh continuation, after the update has
//! returned, with the lock released so listeners may call back in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use quake_feed::{FeedEntries, FeedEntry, FeedHandle, FeedSink, StatusInfo};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cleanup::remove_stale_entities;
use crate::engine::plan_deletions;
use crate::event_id::event_id;
use crate::types::{data_changed_signal, delete_signal, new_entity_signal, NewEntity, Signal};
use crate::{Dispatcher, EntityRegistry, Unsubscribe};

/// Static identity of a coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub entry_id: String,
    /// Config entry unique id; prefixes every entity unique id.
    pub scope: String,
    pub name: String,
    pub update_interval: Duration,
}

#[derive(Default)]
struct ReconcileState {
    active: BTreeSet<String>,
    pending_removal: BTreeSet<String>,
    id_map: BTreeMap<String, String>,
    created: Vec<String>,
    status: Option<StatusInfo>,
    stopped: bool,
}

struct Inner {
    config: CoordinatorConfig,
    feed: FeedHandle,
    dispatcher: Arc<dyn Dispatcher>,
    registry: Arc<dyn EntityRegistry>,
    state: Mutex<ReconcileState>,
    listeners: Mutex<Vec<Unsubscribe>>,
    /// Per-event subscriptions, released when the event is deleted.
    entity_listeners: Mutex<BTreeMap<String, Vec<Unsubscribe>>>,
    shutdown: watch::Sender<bool>,
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.inner.config.name)
            .field("entry_id", &self.inner.config.entry_id)
            .field("feed", &self.inner.feed)
            .finish()
    }
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        feed: FeedHandle,
        dispatcher: Arc<dyn Dispatcher>,
        registry: Arc<dyn EntityRegistry>,
    ) -> Self {
        let (shutdown, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                feed,
                dispatcher,
                registry,
                state: Mutex::new(ReconcileState::default()),
                listeners: Mutex::new(Vec::new()),
                entity_listeners: Mutex::new(BTreeMap::new()),
                shutdown,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReconcileState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn entry_id(&self) -> &str {
        &self.inner.config.entry_id
    }

    pub fn scope(&self) -> &str {
        &self.inner.config.scope
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.inner.registry
    }

    /// Name of the creation signal for this coordinator.
    pub fn new_entity_signal(&self) -> String {
        new_entity_signal(self.entry_id())
    }

    pub fn data_changed_signal(&self) -> String {
        data_changed_signal(self.entry_id())
    }

    pub fn delete_signal(&self, event_id: &str) -> String {
        delete_signal(self.entry_id(), event_id)
    }

    pub fn ptr_eq(&self, other: &Coordinator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Run one refresh cycle and return the feed's current entries.
    ///
    /// Never fails: a failed update is recorded in the status snapshot,
    /// every active entity is kept and the next scheduled cycle retries.
    pub async fn refresh(&self) -> FeedEntries {
        if self.is_stopped() {
            debug!(name = %self.inner.config.name, "refresh skipped, coordinator stopped");
            return FeedEntries::new();
        }
        self.state().pending_removal.clear();

        let sink: Arc<dyn FeedSink> = Arc::new(self.clone());
        let outcome = self.inner.feed.update(sink).await;

        let succeeded = match outcome {
            Ok(()) => self.status_info().map(|s| s.is_ok()).unwrap_or(false),
            Err(e) => {
                self.on_status(StatusInfo::error(Utc::now()));
                warn!(name = %self.inner.config.name, error = %e, "feed update failed");
                false
            }
        };

        self.announce_created();

        let entries = self.inner.feed.entries();
        if succeeded {
            self.reconcile(&entries);
        } else {
            let active = self.state().active.len();
            warn!(
                name = %self.inner.config.name,
                active,
                "feed status is not OK, keeping active entities"
            );
        }

        self.state().pending_removal.clear();
        debug!(name = %self.inner.config.name, total = entries.len(), "feed entity coordinator updated");
        self.send(&self.data_changed_signal(), &Signal::DataChanged);
        entries
    }

    /// Send the creation signals queued by `on_create` during the update.
    fn announce_created(&self) {
        let created = {
            let mut st = self.state();
            if st.stopped {
                st.created.clear();
                return;
            }
            std::mem::take(&mut st.created)
        };
        for id in created {
            debug!(entry_id = %self.entry_id(), event_id = %id, "announcing new entity");
            let payload = Signal::NewEntity(NewEntity {
                coordinator: self.clone(),
                scope: self.scope().to_string(),
                event_id: id,
            });
            self.send(&self.new_entity_signal(), &payload);
        }
    }

    fn reconcile(&self, entries: &FeedEntries) {
        let current: BTreeSet<String> = entries
            .keys()
            .map(|ext| event_id(ext).to_string())
            .collect();

        let deletions = {
            let mut st = self.state();
            if st.stopped {
                // Stopped while the update was in flight; the cleared state stays cleared.
                return;
            }
            let deletions = plan_deletions(&st.active, &st.pending_removal, &current);
            for id in &deletions {
                st.active.remove(id);
                st.id_map.remove(id);
            }
            for ext in entries.keys() {
                st.id_map.insert(event_id(ext).to_string(), ext.clone());
            }
            deletions
        };

        for id in &deletions {
            debug!(entry_id = %self.entry_id(), event_id = %id, "removing entity");
            self.send(&self.delete_signal(id), &Signal::Delete { event_id: id.clone() });
            self.release_entity_listeners(id);
        }

        let removed = remove_stale_entities(
            self.inner.registry.as_ref(),
            self.entry_id(),
            self.scope(),
            &current,
        );
        if !deletions.is_empty() || !removed.is_empty() {
            info!(
                name = %self.inner.config.name,
                deleted = deletions.len(),
                registry_removed = removed.len(),
                "reconciled feed entries"
            );
        }
    }

    fn send(&self, signal: &str, payload: &Signal) {
        self.inner.dispatcher.send(signal, payload);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Hold `unsub` until [`stop`](Self::stop). After stop it runs at once.
    pub fn add_listener(&self, unsub: Unsubscribe) {
        if self.is_stopped() {
            unsub();
            return;
        }
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unsub);
    }

    /// Hold `unsub` for the entity of `event_id` until that event is
    /// deleted or the coordinator stops. After stop it runs at once.
    pub fn add_entity_listener(&self, event_id: &str, unsub: Unsubscribe) {
        if self.is_stopped() {
            unsub();
            return;
        }
        self.entity_listeners()
            .entry(event_id.to_string())
            .or_default()
            .push(unsub);
    }

    fn entity_listeners(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Unsubscribe>>> {
        self.inner
            .entity_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn release_entity_listeners(&self, event_id: &str) {
        let held = self.entity_listeners().remove(event_id).unwrap_or_default();
        for unsub in held {
            unsub();
        }
    }

    /// Number of unsubscribe handles currently held, shared and per event.
    pub fn held_listener_count(&self) -> usize {
        let shared = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        shared + self.entity_listeners().values().map(Vec::len).sum::<usize>()
    }

    /// Release subscriptions, clear all state and end the refresh loop.
    ///
    /// Idempotent. A refresh already in flight finishes but does not
    /// repopulate the cleared state.
    pub fn stop(&self) {
        {
            let mut st = self.state();
            st.stopped = true;
            st.active.clear();
            st.pending_removal.clear();
            st.id_map.clear();
            st.created.clear();
        }
        let mut listeners: Vec<Unsubscribe> = std::mem::take(
            &mut *self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let per_entity = std::mem::take(&mut *self.entity_listeners());
        listeners.extend(per_entity.into_values().flatten());
        let released = listeners.len();
        for unsub in listeners {
            unsub();
        }
        self.inner.shutdown.send_replace(true);
        debug!(name = %self.inner.config.name, released, "feed entity coordinator stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    /// Receiver that flips to `true` on [`stop`](Self::stop).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn resolve(&self, id: &str) -> Option<String> {
        let st = self.state();
        if st.stopped {
            return None;
        }
        Some(st.id_map.get(id).cloned().unwrap_or_else(|| id.to_string()))
    }

    /// Decoded entry for an event id (or, unmapped, an external identifier).
    pub fn get_entry(&self, id: &str) -> Option<FeedEntry> {
        let external_id = self.resolve(id)?;
        self.inner.feed.entry(&external_id)
    }

    pub fn entry_available(&self, id: &str) -> bool {
        self.get_entry(id).is_some()
    }

    pub fn status_info(&self) -> Option<StatusInfo> {
        self.state().status.clone()
    }

    pub fn active_event_ids(&self) -> BTreeSet<String> {
        self.state().active.clone()
    }

    pub fn pending_removals(&self) -> BTreeSet<String> {
        self.state().pending_removal.clone()
    }

    pub fn external_id_for(&self, event_id: &str) -> Option<String> {
        self.state().id_map.get(event_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Feed callbacks
// ---------------------------------------------------------------------------

impl FeedSink for Coordinator {
    fn on_create(&self, external_id: &str) {
        let id = event_id(external_id).to_string();
        let mut st = self.state();
        if st.stopped {
            return;
        }
        st.id_map.insert(id.clone(), external_id.to_string());
        if !st.active.insert(id.clone()) {
            debug!(event_id = %id, "duplicate creation ignored");
            return;
        }
        debug!(external_id, event_id = %id, "new entry received");
        st.created.push(id);
    }

    fn on_update(&self, external_id: &str) {
        // Entities refresh from the data-changed signal at the end of the cycle.
        debug!(external_id, "update received");
    }

    fn on_remove(&self, external_id: &str) {
        let id = event_id(external_id).to_string();
        debug!(external_id, event_id = %id, "remove received");
        let mut st = self.state();
        if !st.stopped {
            st.pending_removal.insert(id);
        }
    }

    fn on_status(&self, status: StatusInfo) {
        debug!(status = %status.status, total = ?status.total, "status update received");
        let mut st = self.state();
        let merged = status.carry_forward(st.status.as_ref());
        st.status = Some(merged);
    }
}
