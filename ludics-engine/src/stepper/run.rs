//! Bounded traversal of a positive/negative design pair

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use super::analysis::{daimon_hints, decisive_indices, endorsement, DaimonHint, Endorsement};
use super::options::{CompositionMode, Phase, StepOptions};
use crate::collision::{detect_collisions, DirCollision};
use crate::config::EngineConfig;
use crate::error::{LudicsError, LudicsResult};
use crate::events::{EventBus, ExpressionPair, LudicsEvent};
use crate::locus::LocusPath;
use crate::state::{
    Act, Design, DesignId, Participant, StateStore, StoreError, Trace, TracePair,
    TraversalReason, TraversalStatus,
};

/// Outcome of one traversal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub trace_id: String,
    pub pos_design_id: DesignId,
    pub neg_design_id: DesignId,
    pub status: TraversalStatus,
    pub reason: Option<TraversalReason>,
    pub pairs: Vec<TracePair>,
    pub decisive_indices: Vec<usize>,
    pub daimon_hints: Vec<DaimonHint>,
    pub used_additive: BTreeMap<String, String>,
    pub endorsement: Option<Endorsement>,
    /// Directory collisions found before play (non-default composition only)
    pub collisions: Vec<DirCollision>,
    pub expression_pairs: Vec<ExpressionPair>,
}

impl StepResult {
    /// Fuel ran out before a verdict
    pub fn is_unfinished(&self) -> bool {
        self.status == TraversalStatus::Ongoing
    }
}

// ============================================================================
// Pure traversal
// ============================================================================

/// Which design of the pair a chronicle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Pos,
    Neg,
}

impl Side {
    fn other(self) -> Self {
        match self {
            Side::Pos => Side::Neg,
            Side::Neg => Side::Pos,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Pos => 0,
            Side::Neg => 1,
        }
    }
}

/// Result of the synchronous loop, before persistence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Walk {
    pub status: TraversalStatus,
    pub reason: Option<TraversalReason>,
    pub pairs: Vec<TracePair>,
    pub used_additive: BTreeMap<String, String>,
    /// Side whose daimon ended the run
    pub daimon_by: Option<Side>,
}

impl Walk {
    fn stop(&mut self, status: TraversalStatus, reason: Option<TraversalReason>) {
        self.status = status;
        self.reason = reason;
    }
}

/// Next playable act of one chronicle at or after `from`
fn next_opener(acts: &[Act], from: usize, focus: Option<&LocusPath>) -> Option<usize> {
    acts.iter().enumerate().skip(from).find_map(|(i, act)| {
        if act.is_daimon() {
            return Some(i);
        }
        let p = act.proper().filter(|_| act.is_positive())?;
        match focus {
            Some(f) if !p.locus.is_under(f) => None,
            _ => Some(i),
        }
    })
}

/// Unused negative act answering `locus` anywhere in `acts`
fn find_dual(
    acts: &[Act],
    used: &HashSet<usize>,
    locus: &LocusPath,
    masked_parent: Option<&LocusPath>,
) -> Option<usize> {
    acts.iter().enumerate().find_map(|(i, act)| {
        if used.contains(&i) || !act.is_negative() {
            return None;
        }
        let at = act.locus()?;
        let hit = at == locus || masked_parent.is_some_and(|m| at.parent().as_ref() == Some(m));
        hit.then_some(i)
    })
}

/// Play `pos` against `neg` for at most `fuel` pairs
pub(crate) fn traverse(
    pos: &[Act],
    neg: &[Act],
    additive_parents: &HashSet<LocusPath>,
    used_additive: BTreeMap<String, String>,
    options: &StepOptions,
    fuel: usize,
) -> Walk {
    let chronicles = [pos, neg];
    let mut cursors = [0usize; 2];
    let mut used_neg: [HashSet<usize>; 2] = [HashSet::new(), HashSet::new()];
    let mut walk = Walk {
        status: TraversalStatus::Ongoing,
        reason: None,
        pairs: Vec::new(),
        used_additive,
        daimon_by: None,
    };

    let mut side = match options.phase {
        Phase::FocusO => Side::Neg,
        Phase::FocusP | Phase::Neutral => Side::Pos,
    };
    let focus = options.focus_at.as_ref();

    for _ in 0..fuel {
        let mine = chronicles[side.index()];
        let theirs = chronicles[side.other().index()];

        let Some(idx) = next_opener(mine, cursors[side.index()], focus) else {
            walk.stop(TraversalStatus::Stuck, Some(TraversalReason::NoResponse));
            break;
        };
        let act = &mine[idx];
        let Some(locus) = act.locus().cloned() else {
            walk.daimon_by = Some(side);
            walk.stop(TraversalStatus::Convergent, None);
            break;
        };

        if let Some(parent) = locus.parent() {
            if additive_parents.contains(&parent) {
                let chosen = locus.last_segment().to_string();
                match walk.used_additive.get(parent.as_str()) {
                    Some(prior) if *prior != chosen => {
                        debug!(parent = %parent, prior = %prior, chosen = %chosen, "Additive choice conflict");
                        walk.stop(
                            TraversalStatus::Divergent,
                            Some(TraversalReason::AdditiveViolation),
                        );
                        break;
                    }
                    Some(_) => {}
                    None => {
                        walk.used_additive.insert(parent.as_str().to_string(), chosen);
                    }
                }
            }
        }

        let masked = locus
            .parent()
            .filter(|parent| options.mask_names_at.contains(parent));
        let other = side.other().index();
        match find_dual(theirs, &used_neg[other], &locus, masked.as_ref()) {
            Some(j) => {
                walk.pairs.push(TracePair {
                    pos_act_id: act.id.clone(),
                    neg_act_id: theirs[j].id.clone(),
                    locus_path: locus.clone(),
                    synthetic: false,
                });
                used_neg[other].insert(j);
                cursors[other] = cursors[other].max(j + 1);
            }
            None if options.virtual_negatives.contains(&locus) => {
                walk.pairs.push(TracePair {
                    pos_act_id: act.id.clone(),
                    neg_act_id: format!("virtual:{}", locus),
                    locus_path: locus.clone(),
                    synthetic: true,
                });
            }
            None if options.draw_at.contains(&locus) => {
                walk.stop(TraversalStatus::Divergent, Some(TraversalReason::ConsensusDraw));
                break;
            }
            None => {
                walk.stop(TraversalStatus::Divergent, Some(TraversalReason::IncoherentMove));
                break;
            }
        }
        cursors[side.index()] = idx + 1;

        // A daimon right behind the matched opener closes the run
        if let Some(next) = next_opener(mine, cursors[side.index()], focus) {
            if mine[next].is_daimon() {
                walk.daimon_by = Some(side);
                walk.stop(TraversalStatus::Convergent, None);
                break;
            }
        }

        if options.phase == Phase::Neutral {
            side = side.other();
        }
    }

    walk
}

// ============================================================================
// Design resolution
// ============================================================================

/// The dialogue's current Proponent/Opponent pair, unscoped designs first
pub(crate) fn current_pair(designs: &[Design]) -> Option<(Design, Design)> {
    let mut scopes: Vec<&Option<String>> = Vec::new();
    for d in designs {
        if !scopes.contains(&&d.scope) {
            scopes.push(&d.scope);
        }
    }
    scopes.sort_by_key(|s| s.is_some());

    scopes.into_iter().find_map(|scope| {
        let pick = |participant| {
            designs
                .iter()
                .find(|d| &d.scope == scope && d.participant == participant)
                .cloned()
        };
        Some((pick(Participant::Proponent)?, pick(Participant::Opponent)?))
    })
}

// ============================================================================
// Stepper
// ============================================================================

/// Runs traversals and records their traces
pub struct Stepper<'a> {
    pub store: &'a StateStore,
    pub bus: &'a EventBus,
    pub config: &'a EngineConfig,
}

impl<'a> Stepper<'a> {
    /// Play a design pair and persist the trace
    pub async fn step(&self, options: &StepOptions) -> LudicsResult<StepResult> {
        let span = info_span!("step", dialogue_id = %options.dialogue_id);
        self.step_inner(options).instrument(span).await
    }

    async fn step_inner(&self, options: &StepOptions) -> LudicsResult<StepResult> {
        let dialogue_id = options.dialogue_id.as_str();
        let (pos_design, neg_design) = self.resolve(options).await?;
        let pos_acts = self.store.list_acts(&pos_design.id).await?;
        let neg_acts = self.store.list_acts(&neg_design.id).await?;

        let additive_parents: HashSet<LocusPath> = self
            .store
            .list_loci(dialogue_id)
            .await
            .into_iter()
            .filter(|l| l.is_additive)
            .map(|l| l.path)
            .collect();
        let prior_additive = self
            .store
            .latest_trace(dialogue_id, &pos_design.id, &neg_design.id)
            .await
            .map(|t| t.used_additive)
            .unwrap_or_default();

        let collisions = match options.composition {
            CompositionMode::Assoc => Vec::new(),
            CompositionMode::Partial | CompositionMode::Spiritual => {
                detect_collisions(&pos_acts, &neg_acts)
            }
        };

        let fuel = options.fuel.unwrap_or(self.config.default_fuel);
        let walk = if options.composition == CompositionMode::Partial && !collisions.is_empty() {
            debug!(collisions = collisions.len(), "Partial composition refused");
            Walk {
                status: TraversalStatus::Divergent,
                reason: Some(TraversalReason::DirCollision),
                pairs: Vec::new(),
                used_additive: prior_additive,
                daimon_by: None,
            }
        } else {
            traverse(&pos_acts, &neg_acts, &additive_parents, prior_additive, options, fuel)
        };

        let by_id: HashMap<&str, (&Act, &Design)> = pos_acts
            .iter()
            .map(|a| (a.id.as_str(), (a, &pos_design)))
            .chain(neg_acts.iter().map(|a| (a.id.as_str(), (a, &neg_design))))
            .collect();

        let justification: HashMap<String, LocusPath> = by_id
            .values()
            .filter_map(|(act, _)| {
                let just = act.proper()?.justified_by.clone()?;
                Some((act.id.clone(), just))
            })
            .collect();
        let decisive = decisive_indices(&walk.pairs, &justification);

        let endorsed = if walk.status == TraversalStatus::Convergent {
            let last = walk.pairs.last();
            let final_negative = last
                .filter(|p| !p.synthetic)
                .and_then(|p| by_id.get(p.neg_act_id.as_str()))
                .map(|(act, design)| (*act, design.participant));
            let daimon_by = walk.daimon_by.map(|side| match side {
                Side::Pos => pos_design.participant,
                Side::Neg => neg_design.participant,
            });
            endorsement(last, final_negative, daimon_by)
        } else {
            None
        };

        let expression_pairs: Vec<ExpressionPair> = walk
            .pairs
            .iter()
            .map(|p| ExpressionPair {
                locus_path: p.locus_path.clone(),
                pos_act_id: p.pos_act_id.clone(),
                neg_act_id: p.neg_act_id.clone(),
                positive: expression_of(&by_id, &p.pos_act_id),
                negative: expression_of(&by_id, &p.neg_act_id),
            })
            .collect();

        let trace = Trace {
            id: uuid::Uuid::new_v4().to_string(),
            dialogue_id: dialogue_id.to_string(),
            pos_design_id: pos_design.id.clone(),
            neg_design_id: neg_design.id.clone(),
            status: walk.status,
            reason: walk.reason,
            pairs: walk.pairs.clone(),
            used_additive: walk.used_additive.clone(),
            decisive_indices: (!decisive.is_empty()).then(|| decisive.clone()),
            created_at: Utc::now(),
        };
        let trace = self.record_trace(trace).await?;

        self.bus.publish(LudicsEvent::Traversal {
            dialogue_id: dialogue_id.to_string(),
            trace_id: trace.id.clone(),
            pos_design_id: trace.pos_design_id.clone(),
            neg_design_id: trace.neg_design_id.clone(),
            status: trace.status,
            reason: trace.reason,
            pair_count: trace.pairs.len(),
            expression_pairs: expression_pairs.clone(),
            timestamp: Utc::now(),
        })?;

        info!(
            status = %trace.status,
            reason = trace.reason.map(|r| r.as_str()).unwrap_or("-"),
            pairs = trace.pairs.len(),
            "Traversal recorded"
        );

        let hints = daimon_hints(pos_acts.iter().chain(neg_acts.iter()));
        Ok(StepResult {
            trace_id: trace.id,
            pos_design_id: trace.pos_design_id,
            neg_design_id: trace.neg_design_id,
            status: trace.status,
            reason: trace.reason,
            pairs: trace.pairs,
            decisive_indices: decisive,
            daimon_hints: hints,
            used_additive: trace.used_additive,
            endorsement: endorsed,
            collisions,
            expression_pairs,
        })
    }

    /// Requested pair when both ids are live in this dialogue, else the current pair
    async fn resolve(&self, options: &StepOptions) -> LudicsResult<(Design, Design)> {
        let dialogue_id = options.dialogue_id.as_str();
        if let (Some(pos_id), Some(neg_id)) = (&options.pos_design_id, &options.neg_design_id) {
            let pos = self.store.get_design(pos_id).await;
            let neg = self.store.get_design(neg_id).await;
            match (pos, neg) {
                (Some(p), Some(n)) if p.dialogue_id == dialogue_id && n.dialogue_id == dialogue_id => {
                    return Ok((p, n));
                }
                _ => debug!(pos_id = %pos_id, neg_id = %neg_id, "Stale design pair, using current pair"),
            }
        }

        let designs = self.store.list_designs(dialogue_id).await;
        current_pair(&designs).ok_or_else(|| {
            let missing = options
                .pos_design_id
                .clone()
                .unwrap_or_else(|| format!("{dialogue_id}:proponent"));
            LudicsError::no_such_design(missing)
        })
    }

    /// Persist a trace, surviving one concurrent recompile
    async fn record_trace(&self, mut trace: Trace) -> LudicsResult<Trace> {
        let err = match self.store.put_trace(trace.clone()).await {
            Ok(()) => return Ok(trace),
            Err(e) => LudicsError::from(e),
        };
        if !err.is_retryable() {
            return Err(err);
        }
        warn!(trace_id = %trace.id, "Trace write lost its designs: {}", err);

        let mut designs = self.store.list_designs(&trace.dialogue_id).await;
        if designs.is_empty() {
            tokio::time::sleep(self.config.trace_retry_backoff()).await;
            designs = self.store.list_designs(&trace.dialogue_id).await;
        }
        let Some((pos, neg)) = current_pair(&designs) else {
            return Err(LudicsError::no_such_design(trace.pos_design_id));
        };

        trace.pos_design_id = pos.id;
        trace.neg_design_id = neg.id;
        match self.store.put_trace(trace.clone()).await {
            Ok(()) => Ok(trace),
            Err(StoreError::MissingDesign(id)) => Err(LudicsError::no_such_design(id)),
            Err(e) => Err(e.into()),
        }
    }
}

fn expression_of(by_id: &HashMap<&str, (&Act, &Design)>, act_id: &str) -> String {
    by_id
        .get(act_id)
        .map(|(act, _)| act.expression.clone())
        .unwrap_or_default()
}
