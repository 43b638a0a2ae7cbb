//! Commitment store operations
//!
//! Elements are keyed by owner, then dialogue. Adds are idempotent on
//! (owner, polarity, base locus, trimmed label); suspension flips
//! `entitled` without deleting anything. A base locus is only an address:
//! the act tree is written by the appender alone.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::inference::{infer, InferenceResult};
use crate::error::LudicsResult;
use crate::events::{EventBus, LudicsEvent};
use crate::locus::LocusPath;
use crate::state::{CommitmentElement, Polarity, StateStore};

/// Element to add to a commitment store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentDraft {
    pub label: String,
    /// `pos` = fact, `neg` = rule
    pub base_polarity: Polarity,
    #[serde(default, alias = "baseLocusPath")]
    pub base_locus: Option<LocusPath>,
    #[serde(default = "default_entitled")]
    pub entitled: bool,
    #[serde(default)]
    pub derived: bool,
}

fn default_entitled() -> bool {
    true
}

impl CommitmentDraft {
    pub fn fact(label: &str) -> Self {
        Self {
            label: label.to_string(),
            base_polarity: Polarity::Positive,
            base_locus: None,
            entitled: true,
            derived: false,
        }
    }

    pub fn rule(label: &str) -> Self {
        Self {
            base_polarity: Polarity::Negative,
            ..Self::fact(label)
        }
    }

    pub fn at(mut self, locus: LocusPath) -> Self {
        self.base_locus = Some(locus);
        self
    }

    pub fn suspended(mut self) -> Self {
        self.entitled = false;
        self
    }
}

/// Selects elements to erase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EraseSpec {
    /// Every element with this trimmed label
    Label(String),
    /// Every element based at this locus
    Locus(LocusPath),
}

impl EraseSpec {
    fn matches(&self, element: &CommitmentElement) -> bool {
        match self {
            EraseSpec::Label(label) => element.label == label.trim(),
            EraseSpec::Locus(locus) => &element.base_locus == locus,
        }
    }
}

/// One change to a participant's commitment store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsUpdate {
    pub add: Vec<CommitmentDraft>,
    pub erase: Vec<EraseSpec>,
}

impl CsUpdate {
    pub fn add(mut self, draft: CommitmentDraft) -> Self {
        self.add.push(draft);
        self
    }

    pub fn erase(mut self, spec: EraseSpec) -> Self {
        self.erase.push(spec);
        self
    }
}

/// Effect of an update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsApplied {
    /// Ids of newly stored elements
    pub added: Vec<String>,
    /// Drafts that matched an existing element
    pub duplicates: usize,
    pub erased: usize,
}

/// Facts and rules currently held by an owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsListing {
    pub facts: Vec<CommitmentElement>,
    pub rules: Vec<CommitmentElement>,
}

/// Apply erasures, then additions, to one owner's store in a dialogue
///
/// Erasure runs first so an update can replace an element in one call.
pub async fn apply_to_cs(
    store: &StateStore,
    bus: &EventBus,
    dialogue_id: &str,
    owner_id: &str,
    update: CsUpdate,
) -> LudicsResult<CsApplied> {
    let mut applied = CsApplied::default();
    {
        let mut tables = store.write().await;

        if !update.erase.is_empty() {
            let before = tables.commitments.len();
            tables.commitments.retain(|_, e| {
                !(e.owner_id == owner_id
                    && e.dialogue_id == dialogue_id
                    && update.erase.iter().any(|spec| spec.matches(e)))
            });
            applied.erased = before - tables.commitments.len();
        }

        for draft in update.add {
            let label = draft.label.trim().to_string();
            let base_locus = draft.base_locus.unwrap_or_else(LocusPath::root);
            let exists = tables.commitments(dialogue_id, owner_id).into_iter().any(|e| {
                e.base_polarity == draft.base_polarity && e.base_locus == base_locus && e.label == label
            });
            if exists {
                applied.duplicates += 1;
                continue;
            }

            let element = CommitmentElement {
                id: uuid::Uuid::new_v4().to_string(),
                dialogue_id: dialogue_id.to_string(),
                owner_id: owner_id.to_string(),
                base_polarity: draft.base_polarity,
                base_locus,
                label,
                entitled: draft.entitled,
                derived: draft.derived,
                created_at: Utc::now(),
            };
            applied.added.push(element.id.clone());
            tables.insert_commitment(element);
        }
    }

    debug!(
        dialogue_id,
        owner_id,
        added = applied.added.len(),
        duplicates = applied.duplicates,
        erased = applied.erased,
        "Commitment store updated"
    );
    bus.publish(LudicsEvent::CsUpdated {
        dialogue_id: dialogue_id.to_string(),
        owner_id: owner_id.to_string(),
        added: applied.added.len(),
        erased: applied.erased,
        timestamp: Utc::now(),
    })?;
    Ok(applied)
}

/// Partition an owner's elements into facts and rules
pub async fn list_cs(store: &StateStore, dialogue_id: &str, owner_id: &str) -> CsListing {
    let (facts, rules): (Vec<_>, Vec<_>) = store
        .list_commitments(dialogue_id, owner_id)
        .await
        .into_iter()
        .partition(CommitmentElement::is_fact);
    CsListing { facts, rules }
}

/// Run inference over an owner's store without changing it
pub async fn interact_ce(store: &StateStore, dialogue_id: &str, owner_id: &str) -> InferenceResult {
    let elements = store.list_commitments(dialogue_id, owner_id).await;
    let result = infer(&elements);
    debug!(
        dialogue_id,
        owner_id,
        derived = result.derived_facts.len(),
        contradictions = result.contradictions.len(),
        "Inference complete"
    );
    result
}

/// Suspend or restore every element of `owner_id` labelled `label`, in every
/// dialogue; returns how many elements matched
pub async fn set_entitlement(store: &StateStore, owner_id: &str, label: &str, entitled: bool) -> usize {
    let label = label.trim();
    let mut tables = store.write().await;
    let mut count = 0;
    for element in tables
        .commitments
        .values_mut()
        .filter(|e| e.owner_id == owner_id && e.label == label)
    {
        element.entitled = entitled;
        count += 1;
    }
    debug!(owner_id, label, entitled, count, "Entitlement changed");
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent_and_trims() {
        let store = StateStore::new();
        let bus = EventBus::new();
        let update = CsUpdate::default()
            .add(CommitmentDraft::fact("  congestion_high  "))
            .add(CommitmentDraft::fact("congestion_high"));
        let applied = apply_to_cs(&store, &bus, "d1", "Proponent", update).await.unwrap();
        assert_eq!(applied.added.len(), 1);
        assert_eq!(applied.duplicates, 1);

        let listing = list_cs(&store, "d1", "Proponent").await;
        assert_eq!(listing.facts.len(), 1);
        assert_eq!(listing.facts[0].label, "congestion_high");
        assert!(store.list_loci("d1").await.is_empty());
    }

    #[tokio::test]
    async fn test_same_label_at_other_locus_is_distinct() {
        let store = StateStore::new();
        let bus = EventBus::new();
        let update = CsUpdate::default()
            .add(CommitmentDraft::fact("A"))
            .add(CommitmentDraft::fact("A").at(LocusPath::parse("0.1").unwrap()))
            .add(CommitmentDraft::rule("A"));
        let applied = apply_to_cs(&store, &bus, "d1", "P", update).await.unwrap();
        assert_eq!(applied.added.len(), 3);
    }

    #[tokio::test]
    async fn test_erase_by_label_and_locus() {
        let store = StateStore::new();
        let bus = EventBus::new();
        let l1 = LocusPath::parse("0.1").unwrap();
        let update = CsUpdate::default()
            .add(CommitmentDraft::fact("A"))
            .add(CommitmentDraft::fact("B").at(l1.clone()))
            .add(CommitmentDraft::rule("A -> C"));
        apply_to_cs(&store, &bus, "d1", "P", update).await.unwrap();

        let erase = CsUpdate::default()
            .erase(EraseSpec::Label(" A ".to_string()))
            .erase(EraseSpec::Locus(l1));
        let applied = apply_to_cs(&store, &bus, "d1", "P", erase).await.unwrap();
        assert_eq!(applied.erased, 2);

        let listing = list_cs(&store, "d1", "P").await;
        assert!(listing.facts.is_empty());
        assert_eq!(listing.rules.len(), 1);
    }

    #[tokio::test]
    async fn test_update_emits_event() {
        let store = StateStore::new();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        apply_to_cs(&store, &bus, "d1", "P", CsUpdate::default().add(CommitmentDraft::fact("A")))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            LudicsEvent::CsUpdated { owner_id, added, erased, .. } => {
                assert_eq!(owner_id, "P");
                assert_eq!(added, 1);
                assert_eq!(erased, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_entitlement_spans_dialogues_and_owner_only() {
        let store = StateStore::new();
        let bus = EventBus::new();
        for dialogue in ["d1", "d2"] {
            apply_to_cs(&store, &bus, dialogue, "P", CsUpdate::default().add(CommitmentDraft::fact("A")))
                .await
                .unwrap();
        }
        apply_to_cs(&store, &bus, "d1", "O", CsUpdate::default().add(CommitmentDraft::fact("A")))
            .await
            .unwrap();

        assert_eq!(set_entitlement(&store, "P", "A", false).await, 2);
        let p = store.list_commitments("d2", "P").await;
        assert!(!p[0].entitled);
        let o = store.list_commitments("d1", "O").await;
        assert!(o[0].entitled);
    }

    #[tokio::test]
    async fn test_interact_ce_does_not_persist_derivations() {
        let store = StateStore::new();
        let bus = EventBus::new();
        let update = CsUpdate::default()
            .add(CommitmentDraft::fact("A"))
            .add(CommitmentDraft::rule("A -> B"));
        apply_to_cs(&store, &bus, "d1", "P", update).await.unwrap();

        let result = interact_ce(&store, "d1", "P").await;
        assert_eq!(result.derived_facts.len(), 1);
        assert_eq!(store.list_commitments("d1", "P").await.len(), 2);
    }
}
