//! Engine error types
//!
//! Referential and protocol failures surface as [`LudicsError`]. Traversal
//! outcomes (`no-response`, `incoherent-move`, ...) are results, never errors.

use thiserror::Error;

use crate::events::EventBusError;
use crate::locus::LocusError;
use crate::state::{Polarity, StoreError};

/// Result type alias for engine operations
pub type LudicsResult<T> = Result<T, LudicsError>;

/// Errors that can occur during engine operations
#[derive(Error, Debug)]
pub enum LudicsError {
    /// Caller passed a stale or unknown design id
    #[error("Design not found: {design_id}")]
    NoSuchDesign { design_id: String },

    /// Caller referenced a locus that does not exist
    #[error("Locus not found: {path} in dialogue {dialogue_id}")]
    NoSuchLocus { dialogue_id: String, path: String },

    /// An additive locus was given a second distinct child
    #[error(
        "Additive locus {parent} in dialogue {dialogue_id} already resolved to {existing}; cannot add {attempted}"
    )]
    AdditiveReuse {
        dialogue_id: String,
        parent: String,
        existing: String,
        attempted: String,
    },

    /// Two adjacent acts in one design share a polarity
    #[error("Alternation violated in design {design_id}: {polarity} act follows {previous_act_id} of the same polarity")]
    Alternation {
        design_id: String,
        polarity: Polarity,
        previous_act_id: String,
    },

    /// An act cites a justification that is not yet visible
    #[error("Visibility violated in design {design_id}: act {act_id} is justified by unseen locus {justified_by}")]
    Visibility {
        design_id: String,
        act_id: String,
        justified_by: String,
    },

    #[error("Invalid locus: {0}")]
    InvalidLocus(#[from] LocusError),

    /// Rule string could not be parsed
    #[error("Malformed rule '{rule}': {message}")]
    RuleParse { rule: String, message: String },

    /// The move log collaborator failed
    #[error("Move log error: {message}")]
    MoveLog { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event bus error: {0}")]
    Event(#[from] EventBusError),
}

impl LudicsError {
    /// Create a design not found error
    pub fn no_such_design(design_id: impl Into<String>) -> Self {
        Self::NoSuchDesign {
            design_id: design_id.into(),
        }
    }

    /// Create a locus not found error
    pub fn no_such_locus(dialogue_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NoSuchLocus {
            dialogue_id: dialogue_id.into(),
            path: path.into(),
        }
    }

    /// Create a rule parse error
    pub fn rule_parse(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleParse {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a move log error
    pub fn move_log(message: impl Into<String>) -> Self {
        Self::MoveLog {
            message: message.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchDesign { .. } => "NO_SUCH_DESIGN",
            Self::NoSuchLocus { .. } => "NO_SUCH_LOCUS",
            Self::AdditiveReuse { .. } => "ADDITIVE_REUSE",
            Self::Alternation { .. } => "ALTERNATION",
            Self::Visibility { .. } => "VISIBILITY",
            Self::InvalidLocus(_) => "INVALID_LOCUS",
            Self::RuleParse { .. } => "RULE_PARSE",
            Self::MoveLog { .. } => "MOVE_LOG",
            Self::Store(StoreError::MissingDesign(_)) => "DESIGN_RACE",
            Self::Store(_) => "STORE",
            Self::Event(_) => "EVENT",
        }
    }

    /// Check if this error is retryable
    ///
    /// Only a store write that lost its design to a concurrent recompile is
    /// retried, and only by the stepper's trace write.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::MissingDesign(_)))
    }

    /// Whether this error is a dialogue protocol violation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::AdditiveReuse { .. } | Self::Alternation { .. } | Self::Visibility { .. }
        )
    }
}
