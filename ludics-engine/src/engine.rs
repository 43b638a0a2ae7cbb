//! Engine facade
//!
//! [`LudicsEngine`] owns the store, event bus, compile lock and collaborators
//! and exposes every engine operation behind one handle. Each instance is
//! isolated; two engines never share a lock, bus or store unless handed the
//! same shared references.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::append::{append_acts, AppendOptions, AppendOutcome};
use crate::collision::{detect_collisions, DirCollision};
use crate::commitments::{self, CsApplied, CsListing, CsUpdate, InferenceResult};
use crate::compile::{CompileLock, CompileOutcome, Compiler};
use crate::config::{EngineConfig, ScopingStrategy};
use crate::error::LudicsResult;
use crate::events::{EventBus, LudicsEvent, SharedEventBus};
use crate::forest::{compute_forest_traces, Forest};
use crate::moves::{IdentityResolver, MoveLog, TargetResolver};
use crate::orthogonality::{check_orthogonal, OrthogonalityReport};
use crate::state::{ActDraft, SharedStateStore, StateStore};
use crate::stepper::{StepOptions, StepResult, Stepper};
use crate::visibility::validate_visibility;

/// Dialogue interaction engine
pub struct LudicsEngine {
    store: SharedStateStore,
    bus: SharedEventBus,
    lock: CompileLock,
    move_log: Arc<dyn MoveLog>,
    resolver: Arc<dyn TargetResolver>,
    config: EngineConfig,
}

impl LudicsEngine {
    /// Create an engine with a fresh store and bus
    pub fn new(config: EngineConfig, move_log: Arc<dyn MoveLog>) -> Self {
        let bus = EventBus::with_history(config.event_history_capacity).shared();
        Self {
            store: StateStore::new().shared(),
            bus,
            lock: CompileLock::new(),
            move_log,
            resolver: Arc::new(IdentityResolver),
            config,
        }
    }

    /// Use a custom topic resolver for topic scoping
    pub fn with_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use an existing store (e.g. restored from a snapshot)
    pub fn with_store(mut self, store: SharedStateStore) -> Self {
        self.store = store;
        self
    }

    /// Publish onto an existing bus
    pub fn with_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compile_lock(&self) -> &CompileLock {
        &self.lock
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LudicsEvent> {
        self.bus.subscribe()
    }

    fn compiler(&self) -> Compiler<'_> {
        Compiler {
            store: &self.store,
            bus: &self.bus,
            lock: &self.lock,
            move_log: self.move_log.as_ref(),
            resolver: self.resolver.as_ref(),
            config: &self.config,
        }
    }

    fn stepper(&self) -> Stepper<'_> {
        Stepper {
            store: &self.store,
            bus: &self.bus,
            config: &self.config,
        }
    }

    // =========================================================================
    // Designs
    // =========================================================================

    /// Rebuild a dialogue's designs using the configured scoping
    pub async fn compile_from_moves(&self, dialogue_id: &str) -> LudicsResult<CompileOutcome> {
        self.compile_with(dialogue_id, self.config.default_scoping)
            .await
    }

    /// Rebuild a dialogue's designs with an explicit scoping strategy
    pub async fn compile_with(
        &self,
        dialogue_id: &str,
        strategy: ScopingStrategy,
    ) -> LudicsResult<CompileOutcome> {
        self.compiler().compile(dialogue_id, strategy).await
    }

    pub async fn append_acts(
        &self,
        design_id: &str,
        drafts: Vec<ActDraft>,
        options: &AppendOptions,
    ) -> LudicsResult<AppendOutcome> {
        append_acts(&self.store, &self.bus, design_id, drafts, options).await
    }

    pub async fn validate_visibility(&self, design_id: &str) -> LudicsResult<()> {
        validate_visibility(&self.store, design_id).await
    }

    /// Directory collisions between two designs' openings
    pub async fn detect_collisions(
        &self,
        pos_design_id: &str,
        neg_design_id: &str,
    ) -> LudicsResult<Vec<DirCollision>> {
        let pos = self.store.list_acts(pos_design_id).await?;
        let neg = self.store.list_acts(neg_design_id).await?;
        Ok(detect_collisions(&pos, &neg))
    }

    // =========================================================================
    // Interaction
    // =========================================================================

    pub async fn step_interaction(&self, options: &StepOptions) -> LudicsResult<StepResult> {
        self.stepper().step(options).await
    }

    pub async fn check_orthogonal(
        &self,
        dialogue_id: &str,
        pos_design_id: &str,
        neg_design_id: &str,
    ) -> LudicsResult<OrthogonalityReport> {
        check_orthogonal(&self.stepper(), dialogue_id, pos_design_id, neg_design_id).await
    }

    pub async fn compute_forest_traces(&self, dialogue_id: &str) -> LudicsResult<Forest> {
        compute_forest_traces(&self.stepper(), &self.store, dialogue_id, None).await
    }

    // =========================================================================
    // Commitments
    // =========================================================================

    pub async fn apply_to_cs(
        &self,
        dialogue_id: &str,
        owner_id: &str,
        update: CsUpdate,
    ) -> LudicsResult<CsApplied> {
        commitments::apply_to_cs(&self.store, &self.bus, dialogue_id, owner_id, update).await
    }

    pub async fn list_cs(&self, dialogue_id: &str, owner_id: &str) -> CsListing {
        commitments::list_cs(&self.store, dialogue_id, owner_id).await
    }

    pub async fn interact_ce(&self, dialogue_id: &str, owner_id: &str) -> InferenceResult {
        commitments::interact_ce(&self.store, dialogue_id, owner_id).await
    }

    pub async fn set_entitlement(&self, owner_id: &str, label: &str, entitled: bool) -> usize {
        commitments::set_entitlement(&self.store, owner_id, label, entitled).await
    }
}

impl std::fmt::Debug for LudicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LudicsEngine")
            .field("config", &self.config)
            .field("active_compiles", &self.lock.active_keys())
            .finish()
    }
}
