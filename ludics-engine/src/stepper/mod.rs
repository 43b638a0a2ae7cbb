//! Interaction stepper
//!
//! Plays a positive design against a negative one, pairing each positive
//! opener with a dual negative act, until a daimon, a missing response, a
//! divergence or the fuel limit.

pub mod analysis;
pub mod options;
pub mod run;

pub use analysis::{DaimonHint, Endorsement, EndorsementBasis};
pub use options::{CompositionMode, Phase, StepOptions};
pub use run::{StepResult, Stepper};
