//! Orthogonality check: a design pair is orthogonal when its interaction
//! converges to a daimon.

use serde::{Deserialize, Serialize};

use crate::error::LudicsResult;
use crate::stepper::{StepOptions, StepResult, Stepper};
use crate::state::TraversalStatus;

/// Verdict plus the trace that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthogonalityReport {
    pub orthogonal: bool,
    #[serde(flatten)]
    pub trace: StepResult,
}

/// Play `pos_design_id` against `neg_design_id` with default options
pub async fn check_orthogonal(
    stepper: &Stepper<'_>,
    dialogue_id: &str,
    pos_design_id: &str,
    neg_design_id: &str,
) -> LudicsResult<OrthogonalityReport> {
    let options = StepOptions::new(dialogue_id).pair(pos_design_id, neg_design_id);
    let trace = stepper.step(&options).await?;
    Ok(OrthogonalityReport {
        orthogonal: trace.status == TraversalStatus::Convergent,
        trace,
    })
}
