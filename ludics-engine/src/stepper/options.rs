//! Traversal options

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::state::DesignId;

/// Which side may move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Only the positive design plays openers
    #[serde(rename = "focus-P")]
    FocusP,
    /// Only the negative design plays openers
    #[serde(rename = "focus-O")]
    FocusO,
    /// Sides alternate
    #[default]
    #[serde(rename = "neutral")]
    Neutral,
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "focus-P" | "P" => Ok(Phase::FocusP),
            "focus-O" | "O" => Ok(Phase::FocusO),
            "neutral" | "" => Ok(Phase::Neutral),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// How the two designs are composed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionMode {
    /// Associative composition, no directory check
    #[default]
    Assoc,
    /// A directory collision diverges before play
    Partial,
    /// Collisions are reported for a delocation retry, play proceeds
    Spiritual,
}

impl std::str::FromStr for CompositionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assoc" => Ok(CompositionMode::Assoc),
            "partial" => Ok(CompositionMode::Partial),
            "spiritual" => Ok(CompositionMode::Spiritual),
            other => Err(format!("unknown composition mode: {other}")),
        }
    }
}

/// Inputs of one traversal run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOptions {
    pub dialogue_id: String,
    /// Positive design; stale or missing ids fall back to the current pair
    pub pos_design_id: Option<DesignId>,
    pub neg_design_id: Option<DesignId>,
    /// Maximum matched pairs; `None` uses the engine default
    pub fuel: Option<usize>,
    pub phase: Phase,
    /// Restrict openers to this sub-tree
    pub focus_at: Option<LocusPath>,
    /// Loci where a missing negative act is synthesized
    pub virtual_negatives: BTreeSet<LocusPath>,
    /// Loci where a missing negative act is a consensual draw
    pub draw_at: BTreeSet<LocusPath>,
    /// Parents whose child names are hidden from the dual search
    pub mask_names_at: BTreeSet<LocusPath>,
    pub composition: CompositionMode,
}

impl StepOptions {
    pub fn new(dialogue_id: &str) -> Self {
        Self {
            dialogue_id: dialogue_id.to_string(),
            ..Self::default()
        }
    }

    pub fn pair(mut self, pos_design_id: &str, neg_design_id: &str) -> Self {
        self.pos_design_id = Some(pos_design_id.to_string());
        self.neg_design_id = Some(neg_design_id.to_string());
        self
    }

    pub fn fuel(mut self, fuel: usize) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn focus_at(mut self, locus: LocusPath) -> Self {
        self.focus_at = Some(locus);
        self
    }

    pub fn virtual_negative(mut self, locus: LocusPath) -> Self {
        self.virtual_negatives.insert(locus);
        self
    }

    pub fn draw_at(mut self, locus: LocusPath) -> Self {
        self.draw_at.insert(locus);
        self
    }

    pub fn mask_names_at(mut self, locus: LocusPath) -> Self {
        self.mask_names_at.insert(locus);
        self
    }

    pub fn composition(mut self, mode: CompositionMode) -> Self {
        self.composition = mode;
        self
    }
}
