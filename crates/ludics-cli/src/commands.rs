//! Subcommand implementations
//!
//! Each command builds a fresh engine over an in-memory move log, runs one
//! engine operation and returns a serializable report.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use ludics_engine::{
    find_cross_scope_chains, CompileOutcome, CrossScopeChain, DialogueMove, EngineConfig, Forest,
    InMemoryMoveLog, InferenceResult, LudicsEngine, ScopingStrategy, StepOptions, StepResult,
};
use serde::Serialize;
use tracing::info;

use crate::input::CommitmentFile;

/// Engine whose move log holds exactly `moves`
pub fn engine_for(moves: Vec<DialogueMove>, config: EngineConfig) -> LudicsEngine {
    LudicsEngine::new(config, Arc::new(InMemoryMoveLog::from_moves(moves)))
}

pub async fn compile(
    engine: &LudicsEngine,
    dialogue_id: &str,
    scoping: Option<ScopingStrategy>,
) -> Result<CompileOutcome> {
    let strategy = scoping.unwrap_or(engine.config().default_scoping);
    let outcome = engine
        .compile_with(dialogue_id, strategy)
        .await
        .context(format!("Failed to compile dialogue {dialogue_id}"))?;
    info!(
        dialogue_id,
        scopes = outcome.scopes.len(),
        designs = outcome.designs.len(),
        "Compiled"
    );
    Ok(outcome)
}

/// Compile, then play the dialogue's current pair
pub async fn step(
    engine: &LudicsEngine,
    options: &StepOptions,
    scoping: Option<ScopingStrategy>,
) -> Result<StepResult> {
    compile(engine, &options.dialogue_id, scoping).await?;
    engine
        .step_interaction(options)
        .await
        .context(format!("Failed to step dialogue {}", options.dialogue_id))
}

/// Forest of a dialogue with its reference chains
#[derive(Debug, Clone, Serialize)]
pub struct ForestReport {
    #[serde(flatten)]
    pub forest: Forest,
    pub chains: Vec<CrossScopeChain>,
}

/// Compile, then traverse every scope
pub async fn forest(
    engine: &LudicsEngine,
    dialogue_id: &str,
    scoping: Option<ScopingStrategy>,
) -> Result<ForestReport> {
    compile(engine, dialogue_id, scoping).await?;
    let forest = engine
        .compute_forest_traces(dialogue_id)
        .await
        .context(format!("Failed to compute forest for {dialogue_id}"))?;
    let chains = find_cross_scope_chains(&forest);
    Ok(ForestReport { forest, chains })
}

/// Load every owner's store, then run inference per owner
pub async fn infer(
    engine: &LudicsEngine,
    file: CommitmentFile,
    dialogue_id: &str,
) -> Result<BTreeMap<String, InferenceResult>> {
    let mut results = BTreeMap::new();
    for (owner, update) in file.owners {
        engine
            .apply_to_cs(dialogue_id, &owner, update)
            .await
            .context(format!("Failed to load commitments of {owner}"))?;
        let result = engine.interact_ce(dialogue_id, &owner).await;
        info!(
            owner = %owner,
            derived = result.derived_facts.len(),
            contradictions = result.contradictions.len(),
            "Inference done"
        );
        results.insert(owner, result);
    }
    Ok(results)
}
