//! Move-log compiler
//!
//! Turns a deliberation's ordered moves into one Proponent and one Opponent
//! design per scope. Compilation is stop-the-world: under the compile lock
//! every prior design, chronicle and trace of the dialogue is dropped and
//! the designs are rebuilt from the log.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use super::lock::CompileLock;
use super::scope::{partition_moves, ScopePartition};
use crate::append::{append_acts, AppendOptions};
use crate::config::{EngineConfig, ScopingStrategy};
use crate::error::{LudicsError, LudicsResult};
use crate::events::{EventBus, LudicsEvent};
use crate::locus::LocusPath;
use crate::moves::{DialogueMove, MoveKind, MoveLog, PayloadPolarity, TargetResolver};
use crate::state::{
    ActDraft, ActMeta, Design, DesignId, Participant, ScopeType, StateStore,
};
use crate::visibility::{visibility_violations, VisibilityViolation};

/// An act the compiler dropped instead of failing the compile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAct {
    pub design_id: DesignId,
    pub locus: Option<LocusPath>,
    pub move_id: Option<String>,
    /// Error code that caused the skip
    pub code: String,
}

/// Designs built for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScope {
    pub scope: Option<String>,
    pub scope_type: Option<ScopeType>,
    pub proponent_design_id: DesignId,
    pub opponent_design_id: DesignId,
    pub move_count: usize,
    pub act_count: usize,
}

/// Result of compiling a dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub dialogue_id: String,
    pub strategy: ScopingStrategy,
    /// Design ids, Proponent then Opponent for each scope
    pub designs: Vec<DesignId>,
    pub scopes: Vec<CompiledScope>,
    pub skipped_additive: Vec<SkippedAct>,
    pub skipped_alternation: Vec<SkippedAct>,
    pub visibility_violations: Vec<VisibilityViolation>,
}

/// Proponent/Opponent design ids of one scope
#[derive(Debug, Clone)]
struct DesignPair {
    proponent: DesignId,
    opponent: DesignId,
}

impl DesignPair {
    fn for_participant(&self, participant: Participant) -> &DesignId {
        match participant {
            Participant::Proponent => &self.proponent,
            Participant::Opponent => &self.opponent,
        }
    }
}

/// Forward-pass state shared across every scope of one compile
#[derive(Debug, Default)]
struct PassState {
    next_top: u32,
    anchors: HashMap<String, LocusPath>,
    child_counters: HashMap<LocusPath, u32>,
    last_assert: Option<LocusPath>,
}

impl PassState {
    fn fresh_top(&mut self) -> LocusPath {
        self.next_top += 1;
        child_or_root(&LocusPath::root(), &self.next_top.to_string())
    }

    fn pick_child(&mut self, parent: &LocusPath, explicit: Option<&str>) -> LocusPath {
        if let Some(label) = explicit.map(str::trim).filter(|l| !l.is_empty()) {
            match parent.child(label) {
                Ok(child) => return child,
                Err(e) => warn!(parent = %parent, label, "Ignoring invalid child suffix: {}", e),
            }
        }
        let n = self.child_counters.entry(parent.clone()).or_insert(0);
        *n += 1;
        child_or_root(parent, &n.to_string())
    }
}

/// Numeric labels always form valid paths; the fallback is unreachable
fn child_or_root(parent: &LocusPath, label: &str) -> LocusPath {
    parent.child(label).unwrap_or_else(|_| parent.clone())
}

/// Per-move lookup tables resolved before the forward pass
struct MoveContext<'a> {
    path_by_locus_id: &'a HashMap<String, LocusPath>,
    known_designs: &'a HashSet<String>,
}

fn parse_explicit(raw: Option<&str>, move_id: &str) -> Option<LocusPath> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match LocusPath::parse(raw) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(move_id, raw, "Ignoring invalid explicit locus: {}", e);
            None
        }
    }
}

fn declared_participant(m: &DialogueMove, default: Participant) -> Participant {
    match m.polarity.as_deref().map(str::trim) {
        Some("P") => Participant::Proponent,
        Some("O") => Participant::Opponent,
        _ => default,
    }
}

/// Compile one scope's moves into `(design, draft)` pairs
fn compile_moves(
    moves: &[DialogueMove],
    pair: &DesignPair,
    state: &mut PassState,
    ctx: &MoveContext<'_>,
) -> Vec<(DesignId, ActDraft)> {
    let mut out: Vec<(DesignId, ActDraft)> = Vec::new();
    state.last_assert = None;

    for m in moves {
        let kind = m.move_kind();
        let payload = &m.payload;
        let target_key = m.target_key();
        let explicit = parse_explicit(payload.locus_path.as_deref(), &m.id);
        let from_id = m
            .locus_id
            .as_ref()
            .and_then(|id| ctx.path_by_locus_id.get(id).cloned());
        let anchor = target_key.as_ref().and_then(|k| state.anchors.get(k).cloned());
        let default_participant = if kind == MoveKind::Why {
            Participant::Opponent
        } else {
            Participant::Proponent
        };
        let design = pair
            .for_participant(declared_participant(m, default_participant))
            .clone();
        let meta = ActMeta {
            move_id: Some(m.id.clone()),
            ..ActMeta::default()
        };

        // Explicit multi-act payloads win over the kind-driven path
        if let Some(acts) = payload.acts.as_ref().filter(|a| !a.is_empty()) {
            let default_anchor = from_id
                .clone()
                .or_else(|| anchor.clone())
                .or_else(|| state.last_assert.clone())
                .unwrap_or_else(LocusPath::root);
            let mut first_pos: Option<LocusPath> = None;

            for a in acts {
                let locus = parse_explicit(a.locus_path.as_deref(), &m.id)
                    .unwrap_or_else(|| default_anchor.clone());
                let expression = a.expression.clone().unwrap_or_default();
                match a.polarity {
                    Some(PayloadPolarity::Pos) => {
                        first_pos.get_or_insert_with(|| locus.clone());
                        let draft = ActDraft::positive(locus, expression)
                            .with_ramification(a.openings.iter().cloned())
                            .additive(a.additive)
                            .with_meta(meta.clone());
                        out.push((pair.proponent.clone(), draft));
                    }
                    Some(PayloadPolarity::Neg) => {
                        let draft = ActDraft::negative(locus, expression).with_meta(ActMeta {
                            ack: payload.ack,
                            ..meta.clone()
                        });
                        out.push((pair.opponent.clone(), draft));
                    }
                    Some(PayloadPolarity::Daimon) => {
                        let expression = a.expression.clone().unwrap_or_else(|| "END".to_string());
                        out.push((
                            pair.proponent.clone(),
                            ActDraft::daimon(expression).with_meta(meta.clone()),
                        ));
                    }
                    None => debug!(move_id = %m.id, "Payload act without polarity skipped"),
                }
            }

            let new_anchor = first_pos.unwrap_or(default_anchor);
            if let Some(k) = &target_key {
                state.anchors.insert(k.clone(), new_anchor.clone());
            }
            state.last_assert = Some(new_anchor);
            continue;
        }

        let expression = m.expression();
        let resolved_parent = || {
            explicit
                .clone()
                .or_else(|| from_id.clone())
                .or_else(|| anchor.clone())
                .or_else(|| state.last_assert.clone())
                .unwrap_or_else(LocusPath::root)
        };

        match kind {
            MoveKind::Assert => {
                let locus = explicit
                    .clone()
                    .or_else(|| from_id.clone())
                    .unwrap_or_else(|| state.fresh_top());
                state.last_assert = Some(locus.clone());
                if let Some(k) = &target_key {
                    state.anchors.insert(k.clone(), locus.clone());
                }
                let ramification = payload
                    .ramification
                    .clone()
                    .unwrap_or_else(|| vec!["1".to_string()]);
                let draft = ActDraft::positive(locus, expression)
                    .with_ramification(ramification)
                    .additive(payload.additive)
                    .with_meta(meta.clone());
                out.push((design.clone(), draft));

                if m.ends_with_daimon {
                    out.push((design, ActDraft::daimon("END").with_meta(meta)));
                    state.last_assert = None;
                }
            }
            MoveKind::Why => {
                let locus = resolved_parent();
                let draft = ActDraft::negative(locus.clone(), expression)
                    .justified_by(locus)
                    .with_meta(ActMeta {
                        scheme_key: payload.scheme_key.clone(),
                        cq_id: payload.cq_id.clone(),
                        ack: payload.ack,
                        ..meta
                    });
                out.push((design, draft));
            }
            MoveKind::Grounds => {
                let parent = resolved_parent();
                let child = state.pick_child(&parent, payload.child_suffix.as_deref());
                let delocated = payload
                    .evidence_design_id
                    .clone()
                    .filter(|id| ctx.known_designs.contains(id));
                let draft = ActDraft::positive(child, expression)
                    .with_ramification(payload.ramification.clone().unwrap_or_default())
                    .additive(payload.additive)
                    .justified_by(parent)
                    .with_meta(ActMeta {
                        scheme_key: payload.scheme_key.clone(),
                        cq_id: payload.cq_id.clone(),
                        delocated_from_design_id: delocated,
                        ..meta.clone()
                    });
                out.push((design.clone(), draft));

                if m.ends_with_daimon {
                    out.push((design, ActDraft::daimon("END").with_meta(meta)));
                }
            }
            MoveKind::Retract => {
                let locus = resolved_parent();
                let ramification = payload
                    .ramification
                    .clone()
                    .unwrap_or_else(|| vec!["1".to_string()]);
                let draft = ActDraft::positive(locus, expression)
                    .with_ramification(ramification)
                    .with_meta(meta.clone());
                out.push((design.clone(), draft));
                out.push((design, ActDraft::daimon("RETRACT").with_meta(meta)));
                state.last_assert = None;
            }
            other => {
                debug!(move_id = %m.id, kind = %other, "Move kind has no act mapping; skipped");
            }
        }
    }
    out
}

/// Split a chunk into runs of consecutive acts for the same design
fn design_runs(chunk: &[(DesignId, ActDraft)]) -> Vec<(DesignId, Vec<ActDraft>)> {
    let mut runs: Vec<(DesignId, Vec<ActDraft>)> = Vec::new();
    for (design_id, draft) in chunk {
        match runs.last_mut() {
            Some((id, drafts)) if id == design_id => drafts.push(draft.clone()),
            _ => runs.push((design_id.clone(), vec![draft.clone()])),
        }
    }
    runs
}

/// Compiler bound to one engine's collaborators
pub struct Compiler<'a> {
    pub store: &'a StateStore,
    pub bus: &'a EventBus,
    pub lock: &'a CompileLock,
    pub move_log: &'a dyn MoveLog,
    pub resolver: &'a dyn TargetResolver,
    pub config: &'a EngineConfig,
}

impl<'a> Compiler<'a> {
    /// Rebuild every design of `dialogue_id` from its move log
    pub async fn compile(
        &self,
        dialogue_id: &str,
        strategy: ScopingStrategy,
    ) -> LudicsResult<CompileOutcome> {
        let span = info_span!("compile", dialogue_id, strategy = %strategy);
        self.compile_locked(dialogue_id, strategy)
            .instrument(span)
            .await
    }

    async fn compile_locked(
        &self,
        dialogue_id: &str,
        strategy: ScopingStrategy,
    ) -> LudicsResult<CompileOutcome> {
        let _guard = self.lock.acquire(dialogue_id).await;

        let moves = self.move_log.moves(dialogue_id).await?;
        let path_by_locus_id: HashMap<String, LocusPath> = self
            .store
            .list_loci(dialogue_id)
            .await
            .into_iter()
            .map(|l| (l.id, l.path))
            .collect();
        let partitions = partition_moves(moves, strategy, self.resolver).await;

        // Fresh designs for every scope, installed together with the reset
        let mut designs = Vec::with_capacity(partitions.len() * 2);
        let mut pairs = Vec::with_capacity(partitions.len());
        for part in &partitions {
            let make = |participant| {
                let mut d = Design::new(dialogue_id, participant).with_scope(
                    part.key.clone(),
                    part.scope_type,
                    part.metadata.clone(),
                );
                d.referenced_scopes = part.referenced_scopes.clone();
                d
            };
            let p = make(Participant::Proponent);
            let o = make(Participant::Opponent);
            pairs.push(DesignPair {
                proponent: p.id.clone(),
                opponent: o.id.clone(),
            });
            designs.push(p);
            designs.push(o);
        }
        let design_ids: Vec<DesignId> = designs.iter().map(|d| d.id.clone()).collect();
        let reset = self.store.replace_designs(dialogue_id, designs).await;
        debug!(?reset, designs = design_ids.len(), "Designs recreated");

        let known_designs = self.evidence_designs(&partitions).await;
        let ctx = MoveContext {
            path_by_locus_id: &path_by_locus_id,
            known_designs: &known_designs,
        };

        let mut state = PassState::default();
        let mut outcome = CompileOutcome {
            dialogue_id: dialogue_id.to_string(),
            strategy,
            designs: design_ids,
            scopes: Vec::with_capacity(partitions.len()),
            skipped_additive: Vec::new(),
            skipped_alternation: Vec::new(),
            visibility_violations: Vec::new(),
        };

        for (part, pair) in partitions.iter().zip(&pairs) {
            let acts = compile_moves(&part.moves, pair, &mut state, &ctx);
            let act_count = acts.len();
            self.write_acts(acts, &mut outcome).await?;
            outcome.scopes.push(CompiledScope {
                scope: part.key.clone(),
                scope_type: part.scope_type,
                proponent_design_id: pair.proponent.clone(),
                opponent_design_id: pair.opponent.clone(),
                move_count: part.moves.len(),
                act_count,
            });
        }

        // Settle-all: every design is checked, failures are reported
        for design_id in &outcome.designs {
            let acts = self.store.list_acts(design_id).await?;
            for violation in visibility_violations(design_id, &acts) {
                warn!(
                    design_id = %violation.design_id,
                    act_id = %violation.act_id,
                    justified_by = %violation.justified_by,
                    "Visibility violation after compile"
                );
                outcome.visibility_violations.push(violation);
            }
        }

        self.bus.publish(LudicsEvent::DesignsCompiled {
            dialogue_id: dialogue_id.to_string(),
            design_ids: outcome.designs.clone(),
            scope_count: outcome.scopes.len(),
            skipped_additive: outcome.skipped_additive.len(),
            timestamp: Utc::now(),
        })?;

        info!(
            designs = outcome.designs.len(),
            scopes = outcome.scopes.len(),
            skipped_additive = outcome.skipped_additive.len(),
            skipped_alternation = outcome.skipped_alternation.len(),
            visibility_violations = outcome.visibility_violations.len(),
            "Dialogue compiled"
        );
        Ok(outcome)
    }

    /// Ids of cited evidence designs that exist after the reset
    async fn evidence_designs(&self, partitions: &[ScopePartition]) -> HashSet<String> {
        let mut known = HashSet::new();
        for m in partitions.iter().flat_map(|p| &p.moves) {
            if let Some(id) = &m.payload.evidence_design_id {
                if self.store.get_design(id).await.is_some() {
                    known.insert(id.clone());
                }
            }
        }
        known
    }

    fn append_options(&self) -> AppendOptions {
        AppendOptions {
            enforce_alternation: self.config.enforce_alternation,
            enforce_additive_once: true,
        }
    }

    /// Append compiled acts in batches, tolerating protocol violations
    async fn write_acts(
        &self,
        acts: Vec<(DesignId, ActDraft)>,
        outcome: &mut CompileOutcome,
    ) -> LudicsResult<()> {
        let options = self.append_options();
        let batch = self.config.compile_batch_size.max(1);

        for chunk in acts.chunks(batch) {
            for (design_id, drafts) in design_runs(chunk) {
                match append_acts(self.store, self.bus, &design_id, drafts.clone(), &options).await
                {
                    Ok(_) => {}
                    Err(e) if is_tolerated(&e) => {
                        // Replay the run one act at a time to isolate offenders
                        for draft in drafts {
                            self.append_one(&design_id, draft, &options, outcome).await?;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    async fn append_one(
        &self,
        design_id: &str,
        draft: ActDraft,
        options: &AppendOptions,
        outcome: &mut CompileOutcome,
    ) -> LudicsResult<()> {
        let locus = match &draft.body {
            crate::state::ActBody::Proper(p) => Some(p.locus.clone()),
            crate::state::ActBody::Daimon => None,
        };
        let move_id = draft.meta.move_id.clone();
        match append_acts(self.store, self.bus, design_id, vec![draft], options).await {
            Ok(_) => Ok(()),
            Err(e) if is_tolerated(&e) => {
                let skipped = SkippedAct {
                    design_id: design_id.to_string(),
                    locus,
                    move_id,
                    code: e.code().to_string(),
                };
                warn!(design_id, code = e.code(), "Compiled act skipped: {}", e);
                match e {
                    LudicsError::Alternation { .. } => outcome.skipped_alternation.push(skipped),
                    _ => outcome.skipped_additive.push(skipped),
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn is_tolerated(err: &LudicsError) -> bool {
    matches!(
        err,
        LudicsError::AdditiveReuse { .. } | LudicsError::Alternation { .. }
    )
}
