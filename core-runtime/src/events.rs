//! # Event Bus System
//!
//! Typed, fire-and-forget notifications from the synchronization engine,
//! delivered over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps engine-level [`SyncEvent`]s and
//!   per-entry [`EntryEvent`]s
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Publishing never fails the publisher: the engine calls `emit(..).ok()`, so
//! a bus with no subscribers simply drops events.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut entries = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Entry(_)));
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = entries.recv().await {
//!         println!("{}", event.description());
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events are frequent; subscribers that fall further behind than
/// this receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Engine lifecycle and pass events
    Sync(SyncEvent),
    /// Per-entry processing events
    Entry(EntryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Entry(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::PassFailed { .. }) => EventSeverity::Error,
            CoreEvent::Entry(EntryEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Entry(EntryEvent::Completed { removed: false, .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::PassCompleted { .. })
            | CoreEvent::Sync(SyncEvent::EngineStarted { .. })
            | CoreEvent::Sync(SyncEvent::EngineStopped)
            | CoreEvent::Sync(SyncEvent::LedgerReset { .. })
            | CoreEvent::Entry(EntryEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Engine-level events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The automatic polling loop started.
    EngineStarted {
        /// Base polling interval in seconds.
        interval_secs: u64,
    },
    /// The automatic polling loop stopped and the ledger was saved.
    EngineStopped,
    /// A pass began.
    PassStarted {
        pass_id: String,
        /// "scheduled" or "manual"
        trigger: String,
    },
    /// A pass finished; entry-level failures are counted, not fatal.
    PassCompleted {
        pass_id: String,
        new_entries: u64,
        succeeded: u64,
        failed: u64,
        removed: u64,
        duration_ms: u64,
        /// Interval chosen for the next wait, in seconds.
        next_interval_secs: u64,
    },
    /// A pass aborted (listing failed or the ledger could not be saved).
    PassFailed { pass_id: String, message: String },
    /// Ledger membership was cleared on request.
    LedgerReset {
        /// Number of identifiers dropped.
        cleared: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::EngineStarted { .. } => "Sync engine started",
            SyncEvent::EngineStopped => "Sync engine stopped",
            SyncEvent::PassStarted { .. } => "Sync pass started",
            SyncEvent::PassCompleted { .. } => "Sync pass completed",
            SyncEvent::PassFailed { .. } => "Sync pass failed",
            SyncEvent::LedgerReset { .. } => "Processed-entry ledger reset",
        }
    }
}

// ============================================================================
// Entry Events
// ============================================================================

/// Events for a single entry moving through the processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EntryEvent {
    /// Processing began for an entry.
    Started {
        entry_id: String,
        display_name: String,
    },
    /// Acquisition progress. Informational only.
    Progress {
        entry_id: String,
        /// 0-100 when known.
        percent: Option<u8>,
        eta_secs: Option<u64>,
        /// e.g. "downloading", "converting"
        phase: String,
    },
    /// Media saved and the attempt record committed.
    Completed {
        entry_id: String,
        file_path: String,
        file_size: u64,
        /// Whether the entry was retired from the source list.
        removed: bool,
    },
    /// The entry reached a failed terminal state.
    Failed { entry_id: String, message: String },
}

impl EntryEvent {
    fn description(&self) -> &str {
        match self {
            EntryEvent::Started { .. } => "Entry processing started",
            EntryEvent::Progress { .. } => "Entry acquisition in progress",
            EntryEvent::Completed { .. } => "Entry saved",
            EntryEvent::Failed { .. } => "Entry failed",
        }
    }

    /// Identifier of the entry this event is about.
    pub fn entry_id(&self) -> &str {
        match self {
            EntryEvent::Started { entry_id, .. }
            | EntryEvent::Progress { entry_id, .. }
            | EntryEvent::Completed { entry_id, .. }
            | EntryEvent::Failed { entry_id, .. } => entry_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none. Publishers normally discard the result with `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
