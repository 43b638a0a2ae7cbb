//! State persistence module for compiled dialogues
//!
//! This module provides the store behind every engine component:
//! - Loci forming each dialogue's address tree
//! - Designs and their chronicles of acts
//! - Traversal traces (immutable once written)
//! - Commitment elements per participant
//!
//! # Architecture
//!
//! The store keeps one ordered table per record type, keyed by the compound
//! keys in [`schema::keys`]:
//!
//! - `loci`: `locus:{dialogue}:{path}`
//! - `designs`: `design:{id}`
//! - `acts` / `chronicles`: `act:{design}:{order}`, ordered by chronicle position
//! - `traces`: `trace:{dialogue}:{nanos}:{id}`, ordered by creation time
//! - `commitments`: `cs:{owner}:{dialogue}:{id}`
//!
//! With the `heavy-state` feature, [`persist::RocksSnapshot`] saves and
//! restores the whole store through RocksDB column families.
//!
//! # Usage
//!
//! ```ignore
//! use ludics_engine::state::{StateStore, Design, Participant};
//!
//! let store = StateStore::new().shared();
//! store.ensure_root("delib-1").await;
//! store.put_design(Design::new("delib-1", Participant::Proponent)).await;
//! ```

#[cfg(feature = "heavy-state")]
pub mod persist;
pub mod schema;
pub mod store;
pub mod types;

// Re-export core types
#[cfg(feature = "heavy-state")]
pub use persist::RocksSnapshot;
pub use store::{ResetSummary, SharedStateStore, StateStore, StoreError, StoreResult, Tables};
pub use types::{
    Act, ActBody, ActDraft, ActId, ActMeta, ChronicleEntry, CommitmentElement, Design, DesignId,
    DialogueId, Locus, Participant, Polarity, ProperAct, ScopeActors, ScopeMetadata, ScopeType,
    Trace, TracePair, TraversalReason, TraversalStatus,
};
