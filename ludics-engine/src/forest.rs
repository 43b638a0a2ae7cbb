//! Per-scope traversal of a scoped dialogue
//!
//! Runs one Proponent-vs-Opponent traversal per scope and aggregates the
//! verdicts. Cross-scope references form a directed graph whose edges are
//! reported as reference chains.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LudicsResult;
use crate::state::{Design, Participant, StateStore, TracePair, TraversalStatus};
use crate::stepper::{StepOptions, StepResult, Stepper};

/// Label used for the unscoped design pair
pub const LEGACY_SCOPE: &str = "legacy";

/// Verdict of one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeVerdict {
    Convergent,
    Divergent,
    Stuck,
    /// Missing a side, or the traversal ran out of fuel
    Incomplete,
}

impl From<TraversalStatus> for ScopeVerdict {
    fn from(status: TraversalStatus) -> Self {
        match status {
            TraversalStatus::Convergent => ScopeVerdict::Convergent,
            TraversalStatus::Divergent => ScopeVerdict::Divergent,
            TraversalStatus::Stuck => ScopeVerdict::Stuck,
            TraversalStatus::Ongoing => ScopeVerdict::Incomplete,
        }
    }
}

/// Traversal summary of one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTrace {
    /// `None` for the unscoped pair
    pub scope: Option<String>,
    pub label: String,
    pub status: ScopeVerdict,
    pub trace: Option<StepResult>,
    /// Deepest locus nesting touched by a pair (root = 0)
    pub interaction_depth: usize,
    pub decisive_pairs: Vec<TracePair>,
    /// Other scopes cited by either design of this scope
    pub cross_scope_refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_scopes: usize,
    pub convergent_scopes: usize,
    pub divergent_scopes: usize,
    pub stuck_scopes: usize,
    pub incomplete_scopes: usize,
    /// Total cross-scope references across all scopes
    pub cross_scope_interactions: usize,
}

impl GlobalMetrics {
    fn tally(scopes: &[ScopeTrace]) -> Self {
        let count = |v: ScopeVerdict| scopes.iter().filter(|s| s.status == v).count();
        Self {
            total_scopes: scopes.len(),
            convergent_scopes: count(ScopeVerdict::Convergent),
            divergent_scopes: count(ScopeVerdict::Divergent),
            stuck_scopes: count(ScopeVerdict::Stuck),
            incomplete_scopes: count(ScopeVerdict::Incomplete),
            cross_scope_interactions: scopes.iter().map(|s| s.cross_scope_refs.len()).sum(),
        }
    }
}

/// Every scope of a dialogue with its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    pub dialogue_id: String,
    pub scopes: Vec<ScopeTrace>,
    pub global_metrics: GlobalMetrics,
}

/// One scope citing another
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossScopeChain {
    pub from: String,
    pub to: String,
    /// The target cites the source back
    pub bidirectional: bool,
}

/// Designs of one scope in creation order
struct ScopeDesigns<'a> {
    scope: Option<String>,
    proponent: Option<&'a Design>,
    opponent: Option<&'a Design>,
}

fn group_by_scope(designs: &[Design]) -> Vec<ScopeDesigns<'_>> {
    let mut groups: Vec<ScopeDesigns<'_>> = Vec::new();
    for design in designs {
        let idx = match groups.iter().position(|g| g.scope == design.scope) {
            Some(i) => i,
            None => {
                groups.push(ScopeDesigns {
                    scope: design.scope.clone(),
                    proponent: None,
                    opponent: None,
                });
                groups.len() - 1
            }
        };
        let slot = match design.participant {
            Participant::Proponent => &mut groups[idx].proponent,
            Participant::Opponent => &mut groups[idx].opponent,
        };
        slot.get_or_insert(design);
    }
    groups
}

fn scope_label(scope: &Option<String>, designs: &ScopeDesigns<'_>) -> String {
    designs
        .proponent
        .or(designs.opponent)
        .and_then(|d| d.scope_metadata.as_ref())
        .map(|m| m.label.clone())
        .or_else(|| scope.clone())
        .unwrap_or_else(|| LEGACY_SCOPE.to_string())
}

/// Traverse every scope of `dialogue_id` and aggregate the verdicts
pub async fn compute_forest_traces(
    stepper: &Stepper<'_>,
    store: &StateStore,
    dialogue_id: &str,
    fuel: Option<usize>,
) -> LudicsResult<Forest> {
    let designs = store.list_designs(dialogue_id).await;
    let mut scopes = Vec::new();

    for group in group_by_scope(&designs) {
        let mut refs: Vec<String> = group
            .proponent
            .into_iter()
            .chain(group.opponent)
            .flat_map(|d| d.referenced_scopes.iter().cloned())
            .filter(|r| Some(r) != group.scope.as_ref())
            .collect();
        refs.sort();
        refs.dedup();

        let label = scope_label(&group.scope, &group);
        let (Some(p), Some(o)) = (group.proponent, group.opponent) else {
            debug!(scope = ?group.scope, "Scope is missing a side");
            scopes.push(ScopeTrace {
                scope: group.scope,
                label,
                status: ScopeVerdict::Incomplete,
                trace: None,
                interaction_depth: 0,
                decisive_pairs: Vec::new(),
                cross_scope_refs: refs,
            });
            continue;
        };

        let mut options = StepOptions::new(dialogue_id).pair(&p.id, &o.id);
        options.fuel = fuel;
        let result = stepper.step(&options).await?;

        let interaction_depth = result
            .pairs
            .iter()
            .map(|pair| pair.locus_path.depth().saturating_sub(1))
            .max()
            .unwrap_or(0);
        let decisive_pairs = result
            .decisive_indices
            .iter()
            .filter_map(|&i| result.pairs.get(i).cloned())
            .collect();

        scopes.push(ScopeTrace {
            scope: group.scope,
            label,
            status: result.status.into(),
            trace: Some(result),
            interaction_depth,
            decisive_pairs,
            cross_scope_refs: refs,
        });
    }

    let global_metrics = GlobalMetrics::tally(&scopes);
    info!(
        dialogue_id,
        scopes = global_metrics.total_scopes,
        convergent = global_metrics.convergent_scopes,
        cross_refs = global_metrics.cross_scope_interactions,
        "Forest computed"
    );
    Ok(Forest {
        dialogue_id: dialogue_id.to_string(),
        scopes,
        global_metrics,
    })
}

/// Reference graph over scopes: an edge `a -> b` means scope `a` cites `b`
pub fn scope_graph(forest: &Forest) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    let mut node = |graph: &mut DiGraph<String, ()>, key: &str| {
        *nodes
            .entry(key.to_string())
            .or_insert_with(|| graph.add_node(key.to_string()))
    };

    for scope in &forest.scopes {
        let Some(from) = scope.scope.as_deref() else {
            continue;
        };
        let a = node(&mut graph, from);
        for to in &scope.cross_scope_refs {
            let b = node(&mut graph, to);
            if graph.find_edge(a, b).is_none() {
                graph.add_edge(a, b, ());
            }
        }
    }
    (graph, nodes)
}

/// Deduplicated cross-scope references; a mutual pair is reported once
pub fn find_cross_scope_chains(forest: &Forest) -> Vec<CrossScopeChain> {
    let (graph, _) = scope_graph(forest);
    let mut chains: BTreeMap<(String, String), CrossScopeChain> = BTreeMap::new();

    for edge in graph.edge_indices() {
        let Some((a, b)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let (from, to) = (graph[a].clone(), graph[b].clone());
        let bidirectional = graph.find_edge(b, a).is_some();
        let key = if bidirectional && to < from {
            (to.clone(), from.clone())
        } else {
            (from.clone(), to.clone())
        };
        chains.entry(key.clone()).or_insert(CrossScopeChain {
            from: key.0,
            to: key.1,
            bidirectional,
        });
    }
    chains.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(key: &str, refs: &[&str]) -> ScopeTrace {
        ScopeTrace {
            scope: Some(key.to_string()),
            label: key.to_string(),
            status: ScopeVerdict::Stuck,
            trace: None,
            interaction_depth: 0,
            decisive_pairs: Vec::new(),
            cross_scope_refs: refs.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn forest(scopes: Vec<ScopeTrace>) -> Forest {
        Forest {
            dialogue_id: "d1".to_string(),
            global_metrics: GlobalMetrics::tally(&scopes),
            scopes,
        }
    }

    #[test]
    fn test_chains_mark_mutual_references_once() {
        let f = forest(vec![
            scope("topic:b", &["topic:a"]),
            scope("topic:a", &["topic:b", "topic:c"]),
            scope("topic:c", &[]),
        ]);
        let chains = find_cross_scope_chains(&f);
        assert_eq!(
            chains,
            vec![
                CrossScopeChain {
                    from: "topic:a".to_string(),
                    to: "topic:b".to_string(),
                    bidirectional: true
                },
                CrossScopeChain {
                    from: "topic:a".to_string(),
                    to: "topic:c".to_string(),
                    bidirectional: false
                },
            ]
        );
        assert_eq!(f.global_metrics.cross_scope_interactions, 3);
    }

    #[test]
    fn test_metrics_tally_verdicts() {
        let mut a = scope("a", &[]);
        a.status = ScopeVerdict::Convergent;
        let mut b = scope("b", &[]);
        b.status = ScopeVerdict::Incomplete;
        let m = GlobalMetrics::tally(&[a, b, scope("c", &[])]);
        assert_eq!(m.total_scopes, 3);
        assert_eq!(m.convergent_scopes, 1);
        assert_eq!(m.incomplete_scopes, 1);
        assert_eq!(m.stuck_scopes, 1);
        assert_eq!(m.divergent_scopes, 0);
    }

    #[test]
    fn test_group_by_scope_keeps_first_design_per_side() {
        let s = Some("topic:t".to_string());
        let designs = vec![
            Design::new("d1", Participant::Proponent).with_scope(s.clone(), None, None),
            Design::new("d1", Participant::Proponent),
            Design::new("d1", Participant::Opponent).with_scope(s.clone(), None, None),
        ];
        let groups = group_by_scope(&designs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].scope, s);
        assert_eq!(groups[0].proponent.map(|d| d.id.as_str()), Some(designs[0].id.as_str()));
        assert!(groups[0].opponent.is_some());
        assert!(groups[1].opponent.is_none());
        assert_eq!(scope_label(&groups[1].scope, &groups[1]), LEGACY_SCOPE);
    }
}
