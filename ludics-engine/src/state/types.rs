//! Core record types for the ludics state store
//!
//! These types are the persisted shape of a compiled dialogue: loci, designs,
//! their chronicles of acts, traversal traces and commitment elements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::locus::LocusPath;

/// Identifier of a dialogue (deliberation)
pub type DialogueId = String;

/// Identifier of a design
pub type DesignId = String;

/// Identifier of an act
pub type ActId = String;

/// Polarity of a proper act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// Proponent-style assertive move
    #[serde(rename = "pos", alias = "P", alias = "+")]
    Positive,
    /// Opponent-style challenging move
    #[serde(rename = "neg", alias = "O", alias = "-")]
    Negative,
}

impl Polarity {
    pub fn flip(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarity::Positive => write!(f, "pos"),
            Polarity::Negative => write!(f, "neg"),
        }
    }
}

/// Side of the dialogue a design belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Participant {
    Proponent,
    Opponent,
}

impl Participant {
    /// Polarity this participant opens with
    pub fn polarity(self) -> Polarity {
        match self {
            Participant::Proponent => Polarity::Positive,
            Participant::Opponent => Polarity::Negative,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Participant::Proponent => Participant::Opponent,
            Participant::Opponent => Participant::Proponent,
        }
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Participant::Proponent => write!(f, "Proponent"),
            Participant::Opponent => write!(f, "Opponent"),
        }
    }
}

/// A node of a dialogue's address tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locus {
    /// Unique locus identifier
    pub id: String,
    /// Owning dialogue
    pub dialogue_id: DialogueId,
    /// Canonical dotted path
    pub path: LocusPath,
    /// Whether this locus is an additive choice point
    pub is_additive: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Locus {
    pub fn new(dialogue_id: &str, path: LocusPath) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dialogue_id: dialogue_id.to_string(),
            path,
            is_additive: false,
            created_at: Utc::now(),
        }
    }

    pub fn parent_path(&self) -> Option<LocusPath> {
        self.path.parent()
    }
}

/// Free-form provenance carried by an act
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cq_id: Option<String>,
    /// Evidence faxed in from another design (annotation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delocated_from_design_id: Option<DesignId>,
    /// Explicit acknowledgment marker on a negative act
    #[serde(default)]
    pub ack: bool,
    /// Originating dialogue move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_id: Option<String>,
}

/// Locus payload of a proper act
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProperAct {
    pub polarity: Polarity,
    pub locus: LocusPath,
    /// Child labels opened by this act
    pub ramification: Vec<String>,
    /// Marks the act's locus as an additive choice point
    pub is_additive: bool,
    /// Locus whose content licenses this act
    pub justified_by: Option<LocusPath>,
}

/// Body of an act: a proper move or the terminal daimon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActBody {
    Proper(ProperAct),
    Daimon,
}

/// An act persisted in a design's chronicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
    /// Unique act identifier
    pub id: ActId,
    /// Owning design
    pub design_id: DesignId,
    /// Position in the design's chronicle (strictly increasing)
    pub order_in_design: u32,
    /// Proper move or daimon
    pub body: ActBody,
    /// Human-readable content
    pub expression: String,
    /// Provenance metadata
    #[serde(default)]
    pub meta: ActMeta,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Act {
    pub fn proper(&self) -> Option<&ProperAct> {
        match &self.body {
            ActBody::Proper(p) => Some(p),
            ActBody::Daimon => None,
        }
    }

    pub fn is_daimon(&self) -> bool {
        matches!(self.body, ActBody::Daimon)
    }

    pub fn polarity(&self) -> Option<Polarity> {
        self.proper().map(|p| p.polarity)
    }

    pub fn locus(&self) -> Option<&LocusPath> {
        self.proper().map(|p| &p.locus)
    }

    /// Positive proper act (an opener that can be played on a turn)
    pub fn is_positive(&self) -> bool {
        self.polarity() == Some(Polarity::Positive)
    }

    pub fn is_negative(&self) -> bool {
        self.polarity() == Some(Polarity::Negative)
    }
}

/// Unpersisted act handed to the appender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActDraft {
    pub body: ActBody,
    pub expression: String,
    #[serde(default)]
    pub meta: ActMeta,
}

impl ActDraft {
    /// Proper act with no openings, no justification
    pub fn proper(polarity: Polarity, locus: LocusPath, expression: impl Into<String>) -> Self {
        Self {
            body: ActBody::Proper(ProperAct {
                polarity,
                locus,
                ramification: Vec::new(),
                is_additive: false,
                justified_by: None,
            }),
            expression: expression.into(),
            meta: ActMeta::default(),
        }
    }

    pub fn positive(locus: LocusPath, expression: impl Into<String>) -> Self {
        Self::proper(Polarity::Positive, locus, expression)
    }

    pub fn negative(locus: LocusPath, expression: impl Into<String>) -> Self {
        Self::proper(Polarity::Negative, locus, expression)
    }

    pub fn daimon(expression: impl Into<String>) -> Self {
        Self {
            body: ActBody::Daimon,
            expression: expression.into(),
            meta: ActMeta::default(),
        }
    }

    /// Set the opened child labels (no-op on a daimon)
    pub fn with_ramification<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ActBody::Proper(p) = &mut self.body {
            p.ramification = labels.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn additive(mut self, additive: bool) -> Self {
        if let ActBody::Proper(p) = &mut self.body {
            p.is_additive = additive;
        }
        self
    }

    pub fn justified_by(mut self, locus: LocusPath) -> Self {
        if let ActBody::Proper(p) = &mut self.body {
            p.justified_by = Some(locus);
        }
        self
    }

    pub fn with_meta(mut self, meta: ActMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn polarity(&self) -> Option<Polarity> {
        match &self.body {
            ActBody::Proper(p) => Some(p.polarity),
            ActBody::Daimon => None,
        }
    }
}

/// One row of a design's chronicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub design_id: DesignId,
    pub order: u32,
    pub act_id: ActId,
}

/// How a scoped design partitions the move log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Topic,
    Argument,
}

impl std::fmt::Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeType::Topic => write!(f, "topic"),
            ScopeType::Argument => write!(f, "argument"),
        }
    }
}

/// Participants seen in a scope, split by side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeActors {
    pub proponent: Vec<String>,
    pub opponent: Vec<String>,
    pub all: Vec<String>,
}

/// Summary attached to every design of a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetadata {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub label: String,
    pub move_count: usize,
    pub actors: ScopeActors,
    /// Histogram of target types seen in the scope
    pub target_types: Vec<(String, usize)>,
    pub first_move_at: Option<DateTime<Utc>>,
    pub last_move_at: Option<DateTime<Utc>>,
}

/// One participant's chronicle for a dialogue (or dialogue scope)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    /// Unique design identifier
    pub id: DesignId,
    /// Owning dialogue
    pub dialogue_id: DialogueId,
    /// Proponent or Opponent
    pub participant: Participant,
    /// Root locus of the design
    pub root_locus: LocusPath,
    /// Scope key (`None` = legacy unscoped design)
    pub scope: Option<String>,
    pub scope_type: Option<ScopeType>,
    pub scope_metadata: Option<ScopeMetadata>,
    /// Other scopes this design's moves cite
    #[serde(default)]
    pub referenced_scopes: BTreeSet<String>,
    /// Whether a daimon has been appended
    pub has_daimon: bool,
    /// Incremented on every append batch
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Design {
    pub fn new(dialogue_id: &str, participant: Participant) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dialogue_id: dialogue_id.to_string(),
            participant,
            root_locus: LocusPath::root(),
            scope: None,
            scope_type: None,
            scope_metadata: None,
            referenced_scopes: BTreeSet::new(),
            has_daimon: false,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Attach a scope to this design
    pub fn with_scope(
        mut self,
        scope: Option<String>,
        scope_type: Option<ScopeType>,
        metadata: Option<ScopeMetadata>,
    ) -> Self {
        self.scope = scope;
        self.scope_type = scope_type;
        self.scope_metadata = metadata;
        self
    }
}

/// Terminal (or in-progress) state of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraversalStatus {
    /// Fuel ran out before a verdict
    Ongoing,
    Convergent,
    Divergent,
    Stuck,
}

impl TraversalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TraversalStatus::Ongoing)
    }
}

impl std::fmt::Display for TraversalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalStatus::Ongoing => write!(f, "Ongoing"),
            TraversalStatus::Convergent => write!(f, "Convergent"),
            TraversalStatus::Divergent => write!(f, "Divergent"),
            TraversalStatus::Stuck => write!(f, "Stuck"),
        }
    }
}

/// Why a traversal stopped without converging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalReason {
    NoResponse,
    IncoherentMove,
    AdditiveViolation,
    ConsensusDraw,
    DirCollision,
}

impl TraversalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TraversalReason::NoResponse => "no-response",
            TraversalReason::IncoherentMove => "incoherent-move",
            TraversalReason::AdditiveViolation => "additive-violation",
            TraversalReason::ConsensusDraw => "consensus-draw",
            TraversalReason::DirCollision => "dir-collision",
        }
    }
}

impl std::fmt::Display for TraversalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One matched positive/negative pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePair {
    pub pos_act_id: ActId,
    pub neg_act_id: ActId,
    pub locus_path: LocusPath,
    /// Negative act was synthesized from a virtual locus
    #[serde(default)]
    pub synthetic: bool,
}

/// Immutable record of one traversal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub dialogue_id: DialogueId,
    pub pos_design_id: DesignId,
    pub neg_design_id: DesignId,
    pub status: TraversalStatus,
    pub reason: Option<TraversalReason>,
    pub pairs: Vec<TracePair>,
    /// Additive parent path -> chosen child label
    pub used_additive: BTreeMap<String, String>,
    pub decisive_indices: Option<Vec<usize>>,
    pub created_at: DateTime<Utc>,
}

/// One fact or rule held in a participant's commitment store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentElement {
    pub id: String,
    pub dialogue_id: DialogueId,
    pub owner_id: String,
    /// `Positive` = fact, `Negative` = rule
    pub base_polarity: Polarity,
    pub base_locus: LocusPath,
    /// Fact name or rule string (trimmed)
    pub label: String,
    /// Suspendable without deletion
    pub entitled: bool,
    /// Provenance marker for facts added from inference
    pub derived: bool,
    pub created_at: DateTime<Utc>,
}

impl CommitmentElement {
    pub fn is_fact(&self) -> bool {
        self.base_polarity == Polarity::Positive
    }

    pub fn is_rule(&self) -> bool {
        self.base_polarity == Polarity::Negative
    }
}
