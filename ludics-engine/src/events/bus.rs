//! Event bus for engine observers
//!
//! Provides pub/sub messaging using Tokio broadcast channels, with a bounded
//! in-memory history of everything published. Each engine owns its bus, so
//! tests get isolated instances.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::history::EventHistory;
use super::types::LudicsEvent;
use crate::state::TraversalStatus;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Default number of events kept in history
pub const DEFAULT_HISTORY_CAPACITY: usize = 512;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Failed to send event: {0}")]
    SendFailed(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels and a history ring buffer
pub struct EventBus {
    /// Broadcast sender for publishing events
    sender: broadcast::Sender<LudicsEvent>,

    /// Recently published events
    history: EventHistory,
}

impl EventBus {
    /// Create a new event bus with the default history size
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an event bus retaining up to `capacity` events
    pub fn with_history(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: EventHistory::new(capacity),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: LudicsEvent) -> EventBusResult<()> {
        let event_type = event.event_type();
        self.history.record(&event);

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
            }
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<LudicsEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Subscribe to the events matching `filter` only
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.subscribe(),
            filter,
        }
    }

    /// Events retained by this bus
    pub fn history(&self) -> &EventHistory {
        &self.history
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history.len())
            .finish()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by dialogue ID
    pub dialogue_id: Option<String>,
    /// Filter by design ID
    pub design_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
    /// Only traversals that ended with this status
    pub traversal_status: Option<TraversalStatus>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by dialogue ID
    pub fn dialogue(mut self, dialogue_id: &str) -> Self {
        self.dialogue_id = Some(dialogue_id.to_string());
        self
    }

    /// Filter by design ID
    pub fn design(mut self, design_id: &str) -> Self {
        self.design_id = Some(design_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Only traversals ending with `status`
    pub fn status(mut self, status: TraversalStatus) -> Self {
        self.traversal_status = Some(status);
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &LudicsEvent) -> bool {
        if let Some(ref did) = self.dialogue_id {
            if event.dialogue_id() != did {
                return false;
            }
        }

        if let Some(ref design) = self.design_id {
            if !event.involves_design(design) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        match (self.traversal_status, event) {
            (Some(wanted), LudicsEvent::Traversal { status, .. }) => *status == wanted,
            (Some(_), _) => false,
            (None, _) => true,
        }
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<LudicsEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<LudicsEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
