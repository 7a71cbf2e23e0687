//! Sensitivity oracle boundary.
//!
//! The physical load-flow and sensitivity computation is an external
//! collaborator reached through [`SensitivityOracle`]. [`SensitivityComputer`]
//! adds the retry-with-fallback policy and never lets a failure escape as an
//! error; [`LinearFlowModel`] is a concrete DC-like oracle driven by data.

mod computer;
mod linear_model;
mod result;

pub use computer::SensitivityComputer;
pub use linear_model::{FailureMode, LinearFlowModel};
pub use result::SystematicSensitivityResult;

use crate::applied::AppliedRemedialActions;
use rao_core::{Contingency, CoreResult, FlowCnec, Network, RangeAction};
use serde::{Deserialize, Serialize};

/// Outcome of one sensitivity computation, globally or for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationStatus {
    #[default]
    Default,
    Fallback,
    Failure,
}

impl ComputationStatus {
    pub fn is_failure(self) -> bool {
        self == ComputationStatus::Failure
    }
}

/// Numerical configuration requested from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivityMode {
    Default,
    /// Looser parameters used after a failure in default mode.
    Fallback,
}

/// What one computation must cover.
#[derive(Debug, Clone, Copy)]
pub struct SensitivityRequest<'a> {
    pub cnecs: &'a [FlowCnec],
    pub range_actions: &'a [RangeAction],
    pub contingencies: &'a [Contingency],
    /// Post-contingency actions simulated for their own state only.
    pub applied_remedial_actions: &'a AppliedRemedialActions,
    pub compute_ptdf_sums: bool,
    pub compute_loop_flows: bool,
}

/// External physical simulator. Implementations must not mutate the
/// network they are given.
pub trait SensitivityOracle: Send + Sync {
    fn name(&self) -> &str;

    fn compute(
        &self,
        network: &Network,
        request: &SensitivityRequest<'_>,
        mode: SensitivityMode,
    ) -> CoreResult<SystematicSensitivityResult>;
}
