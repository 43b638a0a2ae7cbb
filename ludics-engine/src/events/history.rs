//! Bounded in-memory event history
//!
//! The bus records every published event here so callers (and tests) can
//! inspect what the engine emitted without holding a live subscription.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::LudicsEvent;

/// Ring buffer of the most recent events
#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    events: Mutex<VecDeque<LudicsEvent>>,
}

impl EventHistory {
    /// Create a history keeping at most `capacity` events (0 disables recording)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LudicsEvent>> {
        // A poisoned buffer still holds valid events
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an event, evicting the oldest when full
    pub fn record(&self, event: &LudicsEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
    }

    /// All retained events, oldest first
    pub fn events(&self) -> Vec<LudicsEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Retained events for one dialogue
    pub fn dialogue_events(&self, dialogue_id: &str) -> Vec<LudicsEvent> {
        self.lock()
            .iter()
            .filter(|e| e.dialogue_id() == dialogue_id)
            .cloned()
            .collect()
    }

    /// Retained events at or after `since`
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<LudicsEvent> {
        self.lock()
            .iter()
            .filter(|e| e.timestamp() >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        let mut events = self.lock();
        debug!(dropped = events.len(), "Event history cleared");
        events.clear();
    }

    pub fn stats(&self) -> EventStats {
        EventStats::from_events(&self.events())
    }
}

/// Aggregate statistics for events
#[derive(Debug, Default, serde::Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: HashMap<String, usize>,
    pub unique_dialogues: usize,
    pub acts_appended: usize,
    pub traversals: usize,
    pub convergent_traversals: usize,
    pub cs_updates: usize,
    pub compiles: usize,
}

impl EventStats {
    pub fn from_events(events: &[LudicsEvent]) -> Self {
        let mut stats = Self::default();
        let mut dialogues = HashSet::new();

        for event in events {
            stats.total_events += 1;

            let event_type = event.event_type().to_string();
            *stats.events_by_type.entry(event_type).or_insert(0) += 1;
            dialogues.insert(event.dialogue_id().to_string());

            match event {
                LudicsEvent::ActAppended { .. } => stats.acts_appended += 1,
                LudicsEvent::Traversal { status, .. } => {
                    stats.traversals += 1;
                    if *status == crate::state::TraversalStatus::Convergent {
                        stats.convergent_traversals += 1;
                    }
                }
                LudicsEvent::CsUpdated { .. } => stats.cs_updates += 1,
                LudicsEvent::DesignsCompiled { .. } => stats.compiles += 1,
            }
        }

        stats.unique_dialogues = dialogues.len();
        stats
    }
}
