//! In-process signal bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use quake_reconcile::{Dispatcher, Listener, Signal, Unsubscribe};

#[derive(Default)]
struct Table {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, Listener)>>,
}

/// Named-signal dispatcher. Listeners run synchronously on the sender's
/// thread, with the table unlocked so they may connect or disconnect.
#[derive(Clone, Default)]
pub struct LocalDispatcher {
    table: Arc<Mutex<Table>>,
}

impl LocalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener_count(&self, signal: &str) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .get(signal)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl Dispatcher for LocalDispatcher {
    fn send(&self, signal: &str, payload: &Signal) {
        let targets: Vec<Listener> = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            match table.listeners.get(signal) {
                Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        for listener in targets {
            listener(payload);
        }
    }

    fn connect(&self, signal: &str, listener: Listener) -> Unsubscribe {
        let id = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.next_id += 1;
            let id = table.next_id;
            table
                .listeners
                .entry(signal.to_string())
                .or_default()
                .push((id, listener));
            id
        };

        let table = Arc::clone(&self.table);
        let signal = signal.to_string();
        Box::new(move || {
            let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(list) = table.listeners.get_mut(&signal) {
                list.retain(|(lid, _)| *lid != id);
                if list.is_empty() {
                    table.listeners.remove(&signal);
                }
            }
        })
    }
}

/// Split one unsubscribe into two handles; whichever runs first detaches,
/// the other becomes a no-op.
///
/// Entities detach themselves on delete, the coordinator detaches whatever
/// is left on stop.
pub fn split_unsubscribe(unsub: Unsubscribe) -> (Unsubscribe, Unsubscribe) {
    let slot = Arc::new(Mutex::new(Some(unsub)));
    let other = Arc::clone(&slot);
    let fire = |slot: Arc<Mutex<Option<Unsubscribe>>>| {
        let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(unsub) = taken {
            unsub();
        }
    };
    (Box::new(move || fire(slot)), Box::new(move || fire(other)))
}
