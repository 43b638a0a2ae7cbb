//! Commitment stores and query-time inference
//!
//! - `rules`: parser for the `A & not B -> C` rule language
//! - `inference`: fixpoint derivation and contradiction detection
//! - `cs`: add/erase/list/suspend operations over the state store

pub mod cs;
pub mod inference;
pub mod rules;

pub use cs::{
    apply_to_cs, interact_ce, list_cs, set_entitlement, CommitmentDraft, CsApplied, CsListing,
    CsUpdate, EraseSpec,
};
pub use inference::{infer, Contradiction, DerivedFact, InferenceResult, MalformedRule};
pub use rules::{parse_literal, parse_rule, Literal, Rule, RuleError};
