//! In-process state store for compiled dialogues
//!
//! Tables are ordered maps behind a single async `RwLock`, so every read and
//! write is an await point and multi-row writes (an append batch, a dialogue
//! reset) happen under one guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::schema::keys;
use super::types::*;
use crate::locus::LocusPath;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Design not found: {0}")]
    MissingDesign(String),

    #[error("Locus not found: {path} in dialogue {dialogue_id}")]
    MissingLocus { dialogue_id: String, path: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[cfg(feature = "heavy-state")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to StateStore
pub type SharedStateStore = Arc<StateStore>;

/// Rows removed by a dialogue reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub designs: usize,
    pub acts: usize,
    pub traces: usize,
    pub loci: usize,
}

/// All persisted tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub loci: BTreeMap<String, Locus>,
    pub designs: BTreeMap<String, Design>,
    pub acts: BTreeMap<String, Act>,
    pub chronicles: BTreeMap<String, ChronicleEntry>,
    pub traces: BTreeMap<String, Trace>,
    pub commitments: BTreeMap<String, CommitmentElement>,
    /// Next trace sequence number; orders traces by write, not by clock
    #[serde(default)]
    pub trace_seq: u64,
}

/// Iterate the values whose key starts with `prefix`, in key order
fn scan<'a, T>(map: &'a BTreeMap<String, T>, prefix: &str) -> impl Iterator<Item = &'a T> {
    let prefix = prefix.to_string();
    map.range(prefix.clone()..)
        .take_while(move |(k, _)| k.starts_with(prefix.as_str()))
        .map(|(_, v)| v)
}

impl Tables {
    // =========================================================================
    // Loci
    // =========================================================================

    pub fn locus(&self, dialogue_id: &str, path: &LocusPath) -> Option<&Locus> {
        self.loci.get(&keys::locus(dialogue_id, path.as_str()))
    }

    pub fn loci(&self, dialogue_id: &str) -> Vec<&Locus> {
        let prefix = keys::locus_prefix(dialogue_id);
        scan(&self.loci, &prefix)
            .filter(|l| l.dialogue_id == dialogue_id)
            .collect()
    }

    /// Direct children of `parent` that exist in the dialogue
    pub fn children(&self, dialogue_id: &str, parent: &LocusPath) -> Vec<LocusPath> {
        let prefix = format!("{}.", keys::locus(dialogue_id, parent.as_str()));
        scan(&self.loci, &prefix)
            .filter(|l| l.dialogue_id == dialogue_id && l.path.parent().as_ref() == Some(parent))
            .map(|l| l.path.clone())
            .collect()
    }

    pub fn insert_locus(&mut self, locus: Locus) {
        let key = keys::locus(&locus.dialogue_id, locus.path.as_str());
        self.loci.insert(key, locus);
    }

    /// Create `path` and any missing ancestors; returns the created paths
    pub fn ensure_locus(&mut self, dialogue_id: &str, path: &LocusPath) -> Vec<LocusPath> {
        let mut created = Vec::new();
        for p in path.ancestors().into_iter().chain(std::iter::once(path.clone())) {
            if self.locus(dialogue_id, &p).is_none() {
                self.insert_locus(Locus::new(dialogue_id, p.clone()));
                created.push(p);
            }
        }
        created
    }

    /// Flag an existing locus as an additive choice point
    pub fn mark_additive(&mut self, dialogue_id: &str, path: &LocusPath) -> bool {
        match self.loci.get_mut(&keys::locus(dialogue_id, path.as_str())) {
            Some(locus) => {
                locus.is_additive = true;
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Designs and chronicles
    // =========================================================================

    pub fn design(&self, design_id: &str) -> Option<&Design> {
        self.designs.get(&keys::design(design_id))
    }

    pub fn design_mut(&mut self, design_id: &str) -> Option<&mut Design> {
        self.designs.get_mut(&keys::design(design_id))
    }

    /// Designs of a dialogue in creation order
    pub fn designs(&self, dialogue_id: &str) -> Vec<&Design> {
        let mut designs: Vec<&Design> = self
            .designs
            .values()
            .filter(|d| d.dialogue_id == dialogue_id)
            .collect();
        designs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.scope.cmp(&b.scope))
                .then(a.participant.cmp(&b.participant))
                .then(a.id.cmp(&b.id))
        });
        designs
    }

    pub fn acts(&self, design_id: &str) -> Vec<&Act> {
        let prefix = keys::act_prefix(design_id);
        scan(&self.acts, &prefix)
            .filter(|a| a.design_id == design_id)
            .collect()
    }

    pub fn last_act(&self, design_id: &str) -> Option<&Act> {
        self.acts(design_id).into_iter().last()
    }

    pub fn chronicle(&self, design_id: &str) -> Vec<&ChronicleEntry> {
        let prefix = keys::chronicle_prefix(design_id);
        scan(&self.chronicles, &prefix)
            .filter(|c| c.design_id == design_id)
            .collect()
    }

    /// Persist an act and its chronicle entry
    pub fn insert_act(&mut self, act: Act) {
        let entry = ChronicleEntry {
            design_id: act.design_id.clone(),
            order: act.order_in_design,
            act_id: act.id.clone(),
        };
        self.chronicles
            .insert(keys::chronicle(&act.design_id, act.order_in_design), entry);
        self.acts
            .insert(keys::act(&act.design_id, act.order_in_design), act);
    }

    // =========================================================================
    // Traces
    // =========================================================================

    pub fn traces(&self, dialogue_id: &str) -> Vec<&Trace> {
        let prefix = keys::trace_prefix(dialogue_id);
        scan(&self.traces, &prefix)
            .filter(|t| t.dialogue_id == dialogue_id)
            .collect()
    }

    // =========================================================================
    // Dialogue reset
    // =========================================================================

    /// Remove a dialogue's designs with their chronicles, its traces, and
    /// every locus except the root
    pub fn reset_dialogue(&mut self, dialogue_id: &str) -> ResetSummary {
        let design_ids: Vec<String> = self
            .designs(dialogue_id)
            .into_iter()
            .map(|d| d.id.clone())
            .collect();

        let mut summary = ResetSummary::default();
        for design_id in &design_ids {
            let act_prefix = keys::act_prefix(design_id);
            let before = self.acts.len();
            self.acts.retain(|k, _| !k.starts_with(&act_prefix));
            summary.acts += before - self.acts.len();

            let chron_prefix = keys::chronicle_prefix(design_id);
            self.chronicles.retain(|k, _| !k.starts_with(&chron_prefix));
            self.designs.remove(&keys::design(design_id));
        }
        summary.designs = design_ids.len();

        let before = self.traces.len();
        self.traces.retain(|_, t| t.dialogue_id != dialogue_id);
        summary.traces = before - self.traces.len();

        let root = LocusPath::root();
        let before = self.loci.len();
        self.loci
            .retain(|_, l| l.dialogue_id != dialogue_id || l.path == root);
        summary.loci = before - self.loci.len();

        summary
    }

    // =========================================================================
    // Commitments
    // =========================================================================

    pub fn commitments(&self, dialogue_id: &str, owner_id: &str) -> Vec<&CommitmentElement> {
        let prefix = keys::commitment_prefix(owner_id, dialogue_id);
        scan(&self.commitments, &prefix)
            .filter(|e| e.owner_id == owner_id && e.dialogue_id == dialogue_id)
            .collect()
    }

    /// Resume the trace sequence after the highest key on record
    pub fn restore_trace_seq(&mut self) {
        self.trace_seq = self
            .traces
            .keys()
            .filter_map(|k| keys::trace_seq(k))
            .max()
            .map_or(0, |seq| seq + 1);
    }

    pub fn insert_commitment(&mut self, element: CommitmentElement) {
        let key = keys::commitment(&element.owner_id, &element.dialogue_id, &element.id);
        self.commitments.insert(key, element);
    }
}

/// Async state store over [`Tables`]
#[derive(Debug, Default)]
pub struct StateStore {
    tables: RwLock<Tables>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().await
    }

    /// Clone every table
    pub async fn snapshot(&self) -> Tables {
        self.read().await.clone()
    }

    // =========================================================================
    // Locus operations
    // =========================================================================

    /// Ensure the dialogue's root locus exists
    pub async fn ensure_root(&self, dialogue_id: &str) -> Locus {
        let mut tables = self.tables.write().await;
        let root = LocusPath::root();
        tables.ensure_locus(dialogue_id, &root);
        tables
            .locus(dialogue_id, &root)
            .cloned()
            .unwrap_or_else(|| Locus::new(dialogue_id, root))
    }

    pub async fn get_locus(&self, dialogue_id: &str, path: &LocusPath) -> Option<Locus> {
        self.read().await.locus(dialogue_id, path).cloned()
    }

    pub async fn list_loci(&self, dialogue_id: &str) -> Vec<Locus> {
        self.read()
            .await
            .loci(dialogue_id)
            .into_iter()
            .cloned()
            .collect()
    }

    // =========================================================================
    // Design operations
    // =========================================================================

    /// Store a design (insert or replace)
    pub async fn put_design(&self, design: Design) {
        let key = keys::design(&design.id);
        self.tables.write().await.designs.insert(key, design);
    }

    pub async fn get_design(&self, design_id: &str) -> Option<Design> {
        self.read().await.design(design_id).cloned()
    }

    pub async fn list_designs(&self, dialogue_id: &str) -> Vec<Design> {
        self.read()
            .await
            .designs(dialogue_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn list_acts(&self, design_id: &str) -> StoreResult<Vec<Act>> {
        let tables = self.read().await;
        if tables.design(design_id).is_none() {
            return Err(StoreError::MissingDesign(design_id.to_string()));
        }
        Ok(tables.acts(design_id).into_iter().cloned().collect())
    }

    /// Delete every design, act, chronicle entry, trace and non-root locus of
    /// a dialogue.
    pub async fn reset_dialogue(&self, dialogue_id: &str) -> ResetSummary {
        let summary = self.tables.write().await.reset_dialogue(dialogue_id);
        debug!(dialogue_id, ?summary, "Dialogue reset");
        summary
    }

    /// Reset a dialogue and install a fresh set of designs under one guard
    pub async fn replace_designs(&self, dialogue_id: &str, designs: Vec<Design>) -> ResetSummary {
        let mut tables = self.tables.write().await;
        let summary = tables.reset_dialogue(dialogue_id);
        tables.ensure_locus(dialogue_id, &LocusPath::root());
        for design in designs {
            let key = keys::design(&design.id);
            tables.designs.insert(key, design);
        }
        debug!(dialogue_id, ?summary, "Dialogue designs replaced");
        summary
    }

    // =========================================================================
    // Trace operations
    // =========================================================================

    /// Store a trace; both designs must still exist
    pub async fn put_trace(&self, trace: Trace) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        for design_id in [&trace.pos_design_id, &trace.neg_design_id] {
            if tables.design(design_id).is_none() {
                return Err(StoreError::MissingDesign(design_id.clone()));
            }
        }
        let seq = tables.trace_seq;
        tables.trace_seq += 1;
        let key = keys::trace(&trace.dialogue_id, seq, &trace.id);
        tables.traces.insert(key, trace);
        Ok(())
    }

    /// Most recent trace recorded for a design pair
    pub async fn latest_trace(
        &self,
        dialogue_id: &str,
        pos_design_id: &str,
        neg_design_id: &str,
    ) -> Option<Trace> {
        self.read()
            .await
            .traces(dialogue_id)
            .into_iter()
            .rev()
            .find(|t| t.pos_design_id == pos_design_id && t.neg_design_id == neg_design_id)
            .cloned()
    }

    pub async fn list_traces(&self, dialogue_id: &str) -> Vec<Trace> {
        self.read()
            .await
            .traces(dialogue_id)
            .into_iter()
            .cloned()
            .collect()
    }

    // =========================================================================
    // Commitment operations
    // =========================================================================

    pub async fn list_commitments(&self, dialogue_id: &str, owner_id: &str) -> Vec<CommitmentElement> {
        self.read()
            .await
            .commitments(dialogue_id, owner_id)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> LocusPath {
        LocusPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_locus_creates_parent_chain() {
        let store = StateStore::new();
        let created = store.write().await.ensure_locus("d1", &p("0.2.1"));
        assert_eq!(created, vec![p("0"), p("0.2"), p("0.2.1")]);

        let again = store.write().await.ensure_locus("d1", &p("0.2.1"));
        assert!(again.is_empty());
        assert_eq!(store.list_loci("d1").await.len(), 3);
    }

    #[tokio::test]
    async fn test_children_are_direct_only() {
        let store = StateStore::new();
        {
            let mut t = store.write().await;
            t.ensure_locus("d1", &p("0.1.1"));
            t.ensure_locus("d1", &p("0.1.2.5"));
            t.ensure_locus("d1", &p("0.12"));
        }
        let tables = store.read().await;
        assert_eq!(tables.children("d1", &p("0.1")), vec![p("0.1.1"), p("0.1.2")]);
    }

    #[tokio::test]
    async fn test_reset_keeps_root_and_other_dialogues() {
        let store = StateStore::new();
        store.write().await.ensure_locus("d1", &p("0.1"));
        store.write().await.ensure_locus("d2", &p("0.1"));
        let design = Design::new("d1", Participant::Proponent);
        let design_id = design.id.clone();
        store.put_design(design).await;

        let summary = store.reset_dialogue("d1").await;
        assert_eq!(summary.designs, 1);
        assert_eq!(summary.loci, 1);
        assert!(store.get_design(&design_id).await.is_none());
        assert_eq!(store.list_loci("d1").await.len(), 1);
        assert_eq!(store.list_loci("d2").await.len(), 2);
    }

    fn trace(id: &str, pos: &str, neg: &str, at: chrono::DateTime<chrono::Utc>) -> Trace {
        Trace {
            id: id.to_string(),
            dialogue_id: "d1".to_string(),
            pos_design_id: pos.to_string(),
            neg_design_id: neg.to_string(),
            status: TraversalStatus::Stuck,
            reason: Some(TraversalReason::NoResponse),
            pairs: vec![],
            used_additive: BTreeMap::new(),
            decisive_indices: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_put_trace_requires_designs() {
        let store = StateStore::new();
        let trace = trace("t1", "gone", "gone-too", chrono::Utc::now());
        let err = store.put_trace(trace).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingDesign(id) if id == "gone"));
    }

    #[tokio::test]
    async fn test_latest_trace_follows_write_order_on_clock_ties() {
        let store = StateStore::new();
        let pos = Design::new("d1", Participant::Proponent);
        let neg = Design::new("d1", Participant::Opponent);
        let (pos_id, neg_id) = (pos.id.clone(), neg.id.clone());
        store.put_design(pos).await;
        store.put_design(neg).await;

        let at = chrono::Utc::now();
        // ids sort opposite to write order
        store.put_trace(trace("zz-first", &pos_id, &neg_id, at)).await.unwrap();
        store.put_trace(trace("aa-second", &pos_id, &neg_id, at)).await.unwrap();

        let latest = store.latest_trace("d1", &pos_id, &neg_id).await.unwrap();
        assert_eq!(latest.id, "aa-second");

        let mut tables = store.snapshot().await;
        assert_eq!(tables.trace_seq, 2);
        tables.trace_seq = 0;
        tables.restore_trace_seq();
        assert_eq!(tables.trace_seq, 2);
    }
}
