//! Scripted feed managers.
//!
//! Each `update` consumes one scripted [`Cycle`]: the entry mapping is
//! replaced, the scripted callbacks fire in order, then the status. With
//! the script exhausted an update repeats the current entries with an OK
//! status and no callbacks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use async_trait::async_trait;
use chrono::Utc;
use quake_feed::{
    AsyncFeedManager, FeedEntries, FeedEntry, FeedError, FeedFactory, FeedHandle, FeedManager,
    FeedSettings, FeedSink, StatusInfo,
};
use tokio::sync::Notify;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callback {
    Create(String),
    Update(String),
    Remove(String),
}

#[derive(Clone, Debug)]
pub struct Cycle {
    /// `None` keeps the previous mapping.
    pub entries: Option<FeedEntries>,
    pub callbacks: Vec<Callback>,
    pub status: Option<StatusInfo>,
    /// Returned from `update` after the callbacks ran.
    pub error: Option<FeedError>,
}

impl Cycle {
    /// Successful cycle ending with `entries`; status total follows the count.
    pub fn ok(entries: impl IntoIterator<Item = FeedEntry>) -> Self {
        let entries: FeedEntries = entries
            .into_iter()
            .map(|e| (e.external_id.clone(), e))
            .collect();
        let total = u32::try_from(entries.len()).unwrap_or(u32::MAX);
        Self {
            entries: Some(entries),
            callbacks: Vec::new(),
            status: Some(StatusInfo::ok(Utc::now(), total)),
            error: None,
        }
    }

    /// Cycle whose status reports an error; the mapping is left untouched.
    pub fn failed() -> Self {
        Self {
            entries: None,
            callbacks: Vec::new(),
            status: Some(StatusInfo::error(Utc::now())),
            error: None,
        }
    }

    /// Cycle whose update returns `error` without reporting a status.
    pub fn erroring(error: FeedError) -> Self {
        Self {
            entries: None,
            callbacks: Vec::new(),
            status: None,
            error: Some(error),
        }
    }

    pub fn create(mut self, external_id: &str) -> Self {
        self.callbacks.push(Callback::Create(external_id.to_string()));
        self
    }

    pub fn update(mut self, external_id: &str) -> Self {
        self.callbacks.push(Callback::Update(external_id.to_string()));
        self
    }

    pub fn remove(mut self, external_id: &str) -> Self {
        self.callbacks.push(Callback::Remove(external_id.to_string()));
        self
    }

    pub fn with_status(mut self, status: StatusInfo) -> Self {
        self.status = Some(status);
        self
    }

    /// Fill the status counts from the scripted callbacks.
    pub fn counted(mut self) -> Self {
        if let Some(status) = self.status.as_mut() {
            for cb in &self.callbacks {
                match cb {
                    Callback::Create(_) => status.created += 1,
                    Callback::Update(_) => status.updated += 1,
                    Callback::Remove(_) => status.removed += 1,
                }
            }
        }
        self
    }
}

/// A decoded entry with the fields the entities display.
pub fn quake(external_id: &str, magnitude: f64, region: &str, distance_km: f64) -> FeedEntry {
    let mut e = FeedEntry::new(external_id);
    e.title = Some(format!("Terremoto {region}"));
    e.magnitude = Some(magnitude);
    e.region = Some(region.to_string());
    e.distance_to_home = Some(distance_km);
    e.coordinates = Some((42.8, 13.1));
    e.depth = Some(9.5);
    e.attribution = Some("INGV".to_string());
    e.evaluation_status = Some("preliminary".to_string());
    e.evaluation_mode = Some("automatic".to_string());
    e
}

// ---------------------------------------------------------------------------
// Shared script
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    entries: FeedEntries,
    cycles: VecDeque<Cycle>,
    updates: usize,
    threads: Vec<ThreadId>,
}

#[derive(Clone, Default)]
struct Shared {
    script: Arc<Mutex<Script>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, sink: &dyn FeedSink) -> Result<(), FeedError> {
        // Callbacks run with the script unlocked; sinks read entries back.
        let cycle = {
            let mut script = self.lock();
            script.updates += 1;
            script.threads.push(std::thread::current().id());
            let cycle = match script.cycles.pop_front() {
                Some(c) => c,
                None => {
                    let total = u32::try_from(script.entries.len()).unwrap_or(u32::MAX);
                    Cycle {
                        entries: None,
                        callbacks: Vec::new(),
                        status: Some(StatusInfo::ok(Utc::now(), total)),
                        error: None,
                    }
                }
            };
            if let Some(entries) = cycle.entries.clone() {
                script.entries = entries;
            }
            cycle
        };

        for cb in &cycle.callbacks {
            match cb {
                Callback::Create(id) => sink.on_create(id),
                Callback::Update(id) => sink.on_update(id),
                Callback::Remove(id) => sink.on_remove(id),
            }
        }
        if let Some(status) = cycle.status {
            sink.on_status(status);
        }
        match cycle.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Test-side controls shared by both manager flavours.
pub trait ScriptControl {
    fn push(&self, cycle: Cycle);
    fn update_count(&self) -> usize;
    /// Thread each update ran on, in order.
    fn update_threads(&self) -> Vec<ThreadId>;
}

macro_rules! script_control {
    ($ty:ty) => {
        impl ScriptControl for $ty {
            fn push(&self, cycle: Cycle) {
                self.shared.lock().cycles.push_back(cycle);
            }

            fn update_count(&self) -> usize {
                self.shared.lock().updates
            }

            fn update_threads(&self) -> Vec<ThreadId> {
                self.shared.lock().threads.clone()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Blocking manager
// ---------------------------------------------------------------------------

/// Scripted manager with a blocking `update`.
#[derive(Clone, Default)]
pub struct ScriptedFeed {
    shared: Shared,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle::blocking(self.clone())
    }
}

script_control!(ScriptedFeed);

impl FeedManager for ScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted-blocking"
    }

    fn update(&self, sink: &dyn FeedSink) -> Result<(), FeedError> {
        self.shared.run(sink)
    }

    fn entries(&self) -> FeedEntries {
        self.shared.lock().entries.clone()
    }

    fn entry(&self, external_id: &str) -> Option<FeedEntry> {
        self.shared.lock().entries.get(external_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Suspending manager
// ---------------------------------------------------------------------------

/// Holds an async update at its start until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until an update is parked at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Scripted manager with a suspending `update`.
#[derive(Clone, Default)]
pub struct AsyncScriptedFeed {
    shared: Shared,
    gate: Option<Arc<Gate>>,
}

impl AsyncScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update waits at the returned gate before running its cycle.
    pub fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        (
            Self {
                shared: Shared::default(),
                gate: Some(Arc::clone(&gate)),
            },
            gate,
        )
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle::suspending(self.clone())
    }
}

script_control!(AsyncScriptedFeed);

#[async_trait]
impl AsyncFeedManager for AsyncScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted-async"
    }

    async fn update(&self, sink: &dyn FeedSink) -> Result<(), FeedError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        tokio::task::yield_now().await;
        self.shared.run(sink)
    }

    fn entries(&self) -> FeedEntries {
        self.shared.lock().entries.clone()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Hands out one prepared handle per `build`, recording the settings.
#[derive(Default)]
pub struct ScriptedFactory {
    handles: Mutex<VecDeque<FeedHandle>>,
    settings: Mutex<Vec<FeedSettings>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, handle: FeedHandle) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(handle);
    }

    /// Settings of every `build` call, in order.
    pub fn built(&self) -> Vec<FeedSettings> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FeedFactory for ScriptedFactory {
    fn build(&self, settings: &FeedSettings) -> anyhow::Result<FeedHandle> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(settings.clone());
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted feed left to build"))
    }
}
