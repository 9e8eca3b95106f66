//! Feed manager contract.
//!
//! The external manager polls the remote feed, applies the radius and
//! magnitude filters, de-duplicates entries and reports what changed through
//! a [`FeedSink`]. Some managers update synchronously, others suspend;
//! [`FeedHandle`] hides the difference from the coordinator.

use std::fmt;
use std::sync::Arc;

use crate::{FeedEntries, FeedEntry, FeedSettings, StatusInfo};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a feed update may return.
///
/// Managers normally report failures through [`FeedSink::on_status`]; an
/// `Err` here means the update did not even get that far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Network or transport failure.
    Transport(String),
    /// The feed document could not be decoded.
    Decode(String),
    /// The offloaded blocking update panicked or was cancelled.
    Offload(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "feed transport error: {msg}"),
            FeedError::Decode(msg) => write!(f, "feed decode error: {msg}"),
            FeedError::Offload(msg) => write!(f, "offloaded feed update failed: {msg}"),
        }
    }
}

impl std::error::Error for FeedError {}

// ---------------------------------------------------------------------------
// Callback slots
// ---------------------------------------------------------------------------

/// The four callback slots a feed manager reports into.
///
/// All calls happen synchronously inside `update` and must return quickly:
/// implementations only touch in-memory state.
pub trait FeedSink: Send + Sync {
    fn on_create(&self, external_id: &str);
    fn on_update(&self, external_id: &str);
    fn on_remove(&self, external_id: &str);
    fn on_status(&self, status: StatusInfo);
}

// ---------------------------------------------------------------------------
// Manager traits
// ---------------------------------------------------------------------------

/// A manager whose update blocks the calling thread.
pub trait FeedManager: Send + Sync {
    fn name(&self) -> &'static str;

    fn update(&self, sink: &dyn FeedSink) -> Result<(), FeedError>;

    /// Current External Identifier -> entry mapping.
    fn entries(&self) -> FeedEntries;

    fn entry(&self, external_id: &str) -> Option<FeedEntry> {
        self.entries().get(external_id).cloned()
    }
}

/// A manager whose update suspends instead of blocking.
#[async_trait::async_trait]
pub trait AsyncFeedManager: Send + Sync {
    fn name(&self) -> &'static str;

    async fn update(&self, sink: &dyn FeedSink) -> Result<(), FeedError>;

    fn entries(&self) -> FeedEntries;

    fn entry(&self, external_id: &str) -> Option<FeedEntry> {
        self.entries().get(external_id).cloned()
    }
}

/// Either flavour of manager, behind one awaitable `update`.
#[derive(Clone)]
pub enum FeedHandle {
    Blocking(Arc<dyn FeedManager>),
    Async(Arc<dyn AsyncFeedManager>),
}

impl FeedHandle {
    pub fn blocking(manager: impl FeedManager + 'static) -> Self {
        FeedHandle::Blocking(Arc::new(manager))
    }

    pub fn suspending(manager: impl AsyncFeedManager + 'static) -> Self {
        FeedHandle::Async(Arc::new(manager))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeedHandle::Blocking(m) => m.name(),
            FeedHandle::Async(m) => m.name(),
        }
    }

    /// Run one manager update.
    ///
    /// A blocking manager is moved onto the blocking thread pool and awaited
    /// so the scheduler thread is never held by network IO.
    pub async fn update(&self, sink: Arc<dyn FeedSink>) -> Result<(), FeedError> {
        match self {
            FeedHandle::Blocking(manager) => {
                let manager = Arc::clone(manager);
                tokio::task::spawn_blocking(move || manager.update(sink.as_ref()))
                    .await
                    .map_err(|e| FeedError::Offload(e.to_string()))?
            }
            FeedHandle::Async(manager) => manager.update(sink.as_ref()).await,
        }
    }

    pub fn entries(&self) -> FeedEntries {
        match self {
            FeedHandle::Blocking(m) => m.entries(),
            FeedHandle::Async(m) => m.entries(),
        }
    }

    pub fn entry(&self, external_id: &str) -> Option<FeedEntry> {
        match self {
            FeedHandle::Blocking(m) => m.entry(external_id),
            FeedHandle::Async(m) => m.entry(external_id),
        }
    }
}

impl fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FeedHandle::Blocking(_) => "Blocking",
            FeedHandle::Async(_) => "Async",
        };
        f.debug_struct("FeedHandle")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}

/// Builds a manager for one configured location.
pub trait FeedFactory: Send + Sync {
    fn build(&self, settings: &FeedSettings) -> anyhow::Result<FeedHandle>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
