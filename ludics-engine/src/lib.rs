//! Ludics Dialogue Engine
//!
//! This library turns a deliberation's ordered move log into pairs of
//! opposing designs over a shared locus tree, and plays them against each
//! other:
//! - Compilation of moves into Proponent/Opponent designs, optionally one
//!   pair per topic or argument scope
//! - A single validated write path for acts (additive and alternation checks)
//! - Bounded traversal with convergence/divergence verdicts, decisive slices
//!   and endorsement
//! - Commitment stores with rule-based inference and contradiction detection
//! - Forest aggregation of per-scope verdicts
//!
//! # Features
//!
//! ## Designs
//! - `compile_from_moves`: rebuild a dialogue's designs under its compile lock
//! - `append_acts`: append a validated batch to one chronicle
//! - `validate_visibility`: check every justification was visible when cited
//!
//! ## Interaction
//! - `step_interaction`: play a design pair and record the trace
//! - `check_orthogonal`: whether a pair converges
//! - `compute_forest_traces`: one traversal per scope, with global metrics
//!
//! ## Commitments
//! - `apply_to_cs` / `list_cs`: idempotent add and erase, listing
//! - `interact_ce`: derive consequences without persisting them
//! - `set_entitlement`: suspend or restore an element
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ludics_engine::{EngineConfig, InMemoryMoveLog, LudicsEngine, StepOptions};
//!
//! let log = Arc::new(InMemoryMoveLog::from_moves(moves));
//! let engine = LudicsEngine::new(EngineConfig::from_env(), log);
//! let compiled = engine.compile_from_moves("delib-1").await?;
//! let result = engine.step_interaction(&StepOptions::new("delib-1")).await?;
//! ```

pub mod append;
pub mod collision;
pub mod commitments;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod forest;
pub mod locus;
pub mod moves;
pub mod orthogonality;
pub mod state;
pub mod stepper;
pub mod visibility;

// Re-export key types
pub use append::{append_acts, AppendOptions, AppendOutcome};
pub use collision::{detect_collisions, DirCollision};
pub use commitments::{
    CommitmentDraft, Contradiction, CsApplied, CsListing, CsUpdate, DerivedFact, EraseSpec,
    InferenceResult,
};
pub use compile::{CompileLock, CompileOutcome, CompiledScope, SkippedAct};
pub use config::{EngineConfig, ScopingStrategy};
pub use engine::LudicsEngine;
pub use error::{LudicsError, LudicsResult};
pub use events::{EventBus, EventFilter, LudicsEvent, SharedEventBus};
pub use forest::{find_cross_scope_chains, CrossScopeChain, Forest, GlobalMetrics, ScopeTrace, ScopeVerdict};
pub use locus::{LocusError, LocusPath};
pub use moves::{
    DialogueMove, IdentityResolver, InMemoryMoveLog, MapResolver, MoveLog, MovePayload,
    PayloadAct, PayloadPolarity, TargetResolver,
};
pub use orthogonality::OrthogonalityReport;
pub use state::{
    Act, ActDraft, Design, Participant, Polarity, StateStore, Trace, TracePair, TraversalReason,
    TraversalStatus,
};
pub use stepper::{CompositionMode, Endorsement, Phase, StepOptions, StepResult};
pub use visibility::{validate_visibility, VisibilityViolation};
