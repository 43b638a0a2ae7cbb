//! Event hooks for engine observers
//!
//! This module provides the pub/sub surface through which analytics and the
//! optional NLI scorer watch the engine.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): act appends, traversals, commitment
//!    updates and compile completions.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub. The bus is an
//!    explicit object handed to the engine, never a global registry.
//!
//! 3. **Event History** (`history.rs`): bounded ring buffer of published
//!    events for inspection and statistics.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Appender   │────▶│  Event Bus   │────▶│  Subscribers │
//! │   Stepper    │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │   History    │
//!                      │ (ring buffer)│
//!                      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ludics_engine::events::{EventBus, EventFilter};
//! use ludics_engine::TraversalStatus;
//!
//! let bus = EventBus::with_history(256).shared();
//! let mut wins = bus.subscribe_filtered(EventFilter::new().status(TraversalStatus::Convergent));
//! let event = wins.recv().await?;
//! ```

pub mod bus;
pub mod history;
pub mod types;

// Re-export core types
pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus, DEFAULT_HISTORY_CAPACITY,
};
pub use history::{EventHistory, EventStats};
pub use types::{EventId, ExpressionPair, LudicsEvent};
