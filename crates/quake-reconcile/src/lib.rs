//! quake-reconcile
//!
//! Reconciles the feed manager's current entries against the entities the
//! host platform holds for one configured location.
//!
//! - Event ids are derived from volatile external identifiers.
//! - Removals are only acted on after a refresh whose overall status is OK.
//! - A failed refresh never deletes anything; entities go unavailable instead.
//! - Orphaned registry records self-heal on the next good refresh.
//!
//! Host services are injected through [`Dispatcher`] and [`EntityRegistry`].

mod cleanup;
mod coordinator;
mod engine;
mod event_id;
mod host;
mod legacy;
mod schedule;
mod types;

pub use cleanup::remove_stale_entities;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use engine::{
    derive_event_id, plan_deletions, plan_legacy_renames, stale_registry_entries, LegacyAction,
};
pub use event_id::{event_id, EVENT_ID_QUERY_KEY};
pub use host::{Dispatcher, EntityRegistry, Listener, Unsubscribe};
pub use legacy::{normalize_legacy_entity_ids, LegacyReport};
pub use schedule::spawn_refresh_loop;
pub use types::*;
