//! Scope partitioning of a move log
//!
//! Legacy mode yields one unscoped partition. Topic and argument modes yield
//! one partition per scope key, plus an unscoped partition for moves that
//! carry no target.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ScopingStrategy;
use crate::moves::{DialogueMove, MoveKind, TargetResolver};
use crate::state::{ScopeActors, ScopeMetadata, ScopeType};

const LABEL_MAX_CHARS: usize = 80;

/// Moves that compile into one design pair
#[derive(Debug, Clone, PartialEq)]
pub struct ScopePartition {
    /// `None` for the unscoped (legacy) pair
    pub key: Option<String>,
    pub scope_type: Option<ScopeType>,
    pub metadata: Option<ScopeMetadata>,
    pub moves: Vec<DialogueMove>,
    /// Other partitions' keys cited by this partition's moves
    pub referenced_scopes: BTreeSet<String>,
}

impl ScopePartition {
    fn unscoped(moves: Vec<DialogueMove>) -> Self {
        Self {
            key: None,
            scope_type: None,
            metadata: None,
            moves,
            referenced_scopes: BTreeSet::new(),
        }
    }
}

/// Scope key of a target under a strategy
pub async fn scope_key_for(
    strategy: ScopingStrategy,
    resolver: &dyn TargetResolver,
    target_type: &str,
    target_id: &str,
) -> Option<String> {
    match strategy {
        ScopingStrategy::Legacy => None,
        ScopingStrategy::Topic => {
            let topic = resolver
                .root_topic(target_type, target_id)
                .await
                .unwrap_or_else(|| target_id.to_string());
            Some(format!("topic:{topic}"))
        }
        ScopingStrategy::Argument => Some(format!("{target_type}:{target_id}")),
    }
}

async fn move_scope_key(
    strategy: ScopingStrategy,
    resolver: &dyn TargetResolver,
    m: &DialogueMove,
) -> Option<String> {
    match (&m.target_type, &m.target_id) {
        (Some(tt), Some(id)) if !tt.is_empty() && !id.is_empty() => {
            scope_key_for(strategy, resolver, tt, id).await
        }
        _ => None,
    }
}

/// Resolve a cited reference (`type:id`, or an already-formed scope key)
async fn reference_scope_key(
    strategy: ScopingStrategy,
    resolver: &dyn TargetResolver,
    reference: &str,
) -> Option<String> {
    let reference = reference.trim();
    if strategy == ScopingStrategy::Topic && reference.starts_with("topic:") {
        return Some(reference.to_string());
    }
    let (tt, id) = reference.split_once(':')?;
    scope_key_for(strategy, resolver, tt, id).await
}

/// Whether a move lands on the Opponent side by default
fn is_opponent_move(m: &DialogueMove) -> bool {
    match m.polarity.as_deref() {
        Some("O") => true,
        Some("P") => false,
        _ => m.move_kind() == MoveKind::Why,
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn truncate_label(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= LABEL_MAX_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(LABEL_MAX_CHARS - 1).collect();
        format!("{cut}…")
    }
}

/// Summarize the moves of one keyed scope
pub fn scope_metadata(key: &str, scope_type: ScopeType, moves: &[DialogueMove]) -> ScopeMetadata {
    let mut actors = ScopeActors::default();
    let mut target_types: BTreeMap<String, usize> = BTreeMap::new();

    for m in moves {
        if let Some(actor) = m.actor_id.as_deref().filter(|a| !a.is_empty()) {
            if is_opponent_move(m) {
                push_unique(&mut actors.opponent, actor);
            } else {
                push_unique(&mut actors.proponent, actor);
            }
            push_unique(&mut actors.all, actor);
        }
        if let Some(tt) = &m.target_type {
            *target_types.entry(tt.clone()).or_insert(0) += 1;
        }
    }

    let label = moves
        .iter()
        .find(|m| m.move_kind() == MoveKind::Assert)
        .or_else(|| moves.first())
        .map(|m| truncate_label(&m.expression()))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| key.to_string());

    ScopeMetadata {
        scope_type,
        label,
        move_count: moves.len(),
        actors,
        target_types: target_types.into_iter().collect(),
        first_move_at: moves.iter().map(|m| m.created_at).min(),
        last_move_at: moves.iter().map(|m| m.created_at).max(),
    }
}

/// Split an ordered move log into scope partitions
///
/// Partitions come back in order of their first move. In scoped modes an
/// empty log yields no partitions at all.
pub async fn partition_moves(
    moves: Vec<DialogueMove>,
    strategy: ScopingStrategy,
    resolver: &dyn TargetResolver,
) -> Vec<ScopePartition> {
    let scope_type = match strategy {
        ScopingStrategy::Legacy => return vec![ScopePartition::unscoped(moves)],
        ScopingStrategy::Topic => ScopeType::Topic,
        ScopingStrategy::Argument => ScopeType::Argument,
    };

    let mut order: Vec<Option<String>> = Vec::new();
    let mut grouped: BTreeMap<Option<String>, Vec<DialogueMove>> = BTreeMap::new();
    let mut cited: BTreeMap<Option<String>, BTreeSet<String>> = BTreeMap::new();

    for m in moves {
        let key = move_scope_key(strategy, resolver, &m).await;
        for reference in &m.payload.references {
            if let Some(r) = reference_scope_key(strategy, resolver, reference).await {
                cited.entry(key.clone()).or_default().insert(r);
            }
        }
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(m);
    }

    let known: BTreeSet<String> = order.iter().flatten().cloned().collect();

    order
        .into_iter()
        .map(|key| {
            let moves = grouped.remove(&key).unwrap_or_default();
            let referenced_scopes: BTreeSet<String> = cited
                .remove(&key)
                .unwrap_or_default()
                .into_iter()
                .filter(|r| known.contains(r) && Some(r) != key.as_ref())
                .collect();
            match &key {
                Some(k) => ScopePartition {
                    metadata: Some(scope_metadata(k, scope_type, &moves)),
                    key: key.clone(),
                    scope_type: Some(scope_type),
                    moves,
                    referenced_scopes,
                },
                None => ScopePartition {
                    referenced_scopes,
                    ..ScopePartition::unscoped(moves)
                },
            }
        })
        .collect()
}
