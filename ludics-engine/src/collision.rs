//! Directory-collision detection for non-associative composition
//!
//! A collision is a base locus where both designs open overlapping child
//! labels, so a local choice at that address is ambiguous.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::state::Act;

/// Overlapping openings at one base locus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirCollision {
    pub base: LocusPath,
    pub overlap: Vec<String>,
}

/// Opened labels per base locus, over every positive act of a design
pub fn openings_by_base(acts: &[Act]) -> BTreeMap<LocusPath, BTreeSet<String>> {
    let mut out: BTreeMap<LocusPath, BTreeSet<String>> = BTreeMap::new();
    for proper in acts.iter().filter(|a| a.is_positive()).filter_map(Act::proper) {
        out.entry(proper.locus.clone())
            .or_default()
            .extend(proper.ramification.iter().map(|r| r.trim().to_string()));
    }
    out
}

/// Bases where the two designs' opened label sets intersect
pub fn detect_collisions(a_acts: &[Act], b_acts: &[Act]) -> Vec<DirCollision> {
    let a = openings_by_base(a_acts);
    let b = openings_by_base(b_acts);

    a.iter()
        .filter_map(|(base, a_labels)| {
            let b_labels = b.get(base)?;
            let overlap: Vec<String> = a_labels.intersection(b_labels).cloned().collect();
            (!overlap.is_empty()).then(|| DirCollision {
                base: base.clone(),
                overlap,
            })
        })
        .collect()
}
