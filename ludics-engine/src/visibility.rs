//! Visibility validation for compiled designs
//!
//! An act's justification must point at a locus already played in the same
//! design, or at the act's own locus or one of its ancestors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LudicsError, LudicsResult};
use crate::locus::LocusPath;
use crate::state::{Act, StateStore};

/// One act citing an unseen justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityViolation {
    pub design_id: String,
    pub act_id: String,
    pub justified_by: LocusPath,
}

impl From<VisibilityViolation> for LudicsError {
    fn from(v: VisibilityViolation) -> Self {
        LudicsError::Visibility {
            design_id: v.design_id,
            act_id: v.act_id,
            justified_by: v.justified_by.to_string(),
        }
    }
}

/// Replay `acts` in chronicle order and collect every violation
pub fn visibility_violations(design_id: &str, acts: &[Act]) -> Vec<VisibilityViolation> {
    let mut ordered: Vec<&Act> = acts.iter().collect();
    ordered.sort_by_key(|a| a.order_in_design);

    let mut seen: HashSet<&LocusPath> = HashSet::new();
    let mut violations = Vec::new();

    for act in ordered {
        let Some(proper) = act.proper() else {
            continue;
        };
        if let Some(justification) = &proper.justified_by {
            let visible =
                seen.contains(justification) || justification.is_prefix_of(&proper.locus);
            if !visible {
                violations.push(VisibilityViolation {
                    design_id: design_id.to_string(),
                    act_id: act.id.clone(),
                    justified_by: justification.clone(),
                });
            }
        }
        seen.insert(&proper.locus);
    }
    violations
}

/// Validate a stored design, failing on the first offending act
pub async fn validate_visibility(store: &StateStore, design_id: &str) -> LudicsResult<()> {
    let acts = store
        .list_acts(design_id)
        .await
        .map_err(|_| LudicsError::no_such_design(design_id))?;

    match visibility_violations(design_id, &acts).into_iter().next() {
        Some(violation) => {
            warn!(
                design_id,
                act_id = %violation.act_id,
                justified_by = %violation.justified_by,
                "Visibility violation"
            );
            Err(violation.into())
        }
        None => Ok(()),
    }
}
