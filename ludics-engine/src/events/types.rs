//! Event types emitted by the ludics engine
//!
//! These events are the observer surface for analytics and the optional NLI
//! contradiction scorer, which reads the expression pairs of a traversal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::state::{ActId, DesignId, DialogueId, Polarity, TraversalReason, TraversalStatus};

/// Unique identifier for events
pub type EventId = String;

/// Positive/negative expressions of one matched pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionPair {
    pub locus_path: LocusPath,
    pub pos_act_id: ActId,
    pub neg_act_id: ActId,
    pub positive: String,
    pub negative: String,
}

/// All engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LudicsEvent {
    /// An act was appended to a design's chronicle
    ActAppended {
        dialogue_id: DialogueId,
        design_id: DesignId,
        act_id: ActId,
        order_in_design: u32,
        /// `None` for a daimon
        polarity: Option<Polarity>,
        locus: Option<LocusPath>,
        timestamp: DateTime<Utc>,
    },

    /// A traversal finished and its trace was recorded
    Traversal {
        dialogue_id: DialogueId,
        trace_id: String,
        pos_design_id: DesignId,
        neg_design_id: DesignId,
        status: TraversalStatus,
        reason: Option<TraversalReason>,
        pair_count: usize,
        expression_pairs: Vec<ExpressionPair>,
        timestamp: DateTime<Utc>,
    },

    /// A participant's commitment store changed
    CsUpdated {
        dialogue_id: DialogueId,
        owner_id: String,
        added: usize,
        erased: usize,
        timestamp: DateTime<Utc>,
    },

    /// A dialogue was recompiled from its move log
    DesignsCompiled {
        dialogue_id: DialogueId,
        design_ids: Vec<DesignId>,
        scope_count: usize,
        skipped_additive: usize,
        timestamp: DateTime<Utc>,
    },
}

impl LudicsEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LudicsEvent::ActAppended { timestamp, .. } => *timestamp,
            LudicsEvent::Traversal { timestamp, .. } => *timestamp,
            LudicsEvent::CsUpdated { timestamp, .. } => *timestamp,
            LudicsEvent::DesignsCompiled { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LudicsEvent::ActAppended { .. } => "act_appended",
            LudicsEvent::Traversal { .. } => "traversal",
            LudicsEvent::CsUpdated { .. } => "cs_updated",
            LudicsEvent::DesignsCompiled { .. } => "designs_compiled",
        }
    }

    /// Every event is dialogue-scoped
    pub fn dialogue_id(&self) -> &str {
        match self {
            LudicsEvent::ActAppended { dialogue_id, .. } => dialogue_id,
            LudicsEvent::Traversal { dialogue_id, .. } => dialogue_id,
            LudicsEvent::CsUpdated { dialogue_id, .. } => dialogue_id,
            LudicsEvent::DesignsCompiled { dialogue_id, .. } => dialogue_id,
        }
    }

    /// Get the design ID if this event concerns a single design
    pub fn design_id(&self) -> Option<&str> {
        match self {
            LudicsEvent::ActAppended { design_id, .. } => Some(design_id),
            _ => None,
        }
    }

    /// Whether this event touches the given design
    pub fn involves_design(&self, design_id: &str) -> bool {
        match self {
            LudicsEvent::ActAppended { design_id: d, .. } => d == design_id,
            LudicsEvent::Traversal {
                pos_design_id,
                neg_design_id,
                ..
            } => pos_design_id == design_id || neg_design_id == design_id,
            LudicsEvent::DesignsCompiled { design_ids, .. } => {
                design_ids.iter().any(|d| d == design_id)
            }
            LudicsEvent::CsUpdated { .. } => false,
        }
    }

    /// Create a new unique event ID
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}
