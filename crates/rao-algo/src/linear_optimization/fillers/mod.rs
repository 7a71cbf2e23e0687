//! Composable units building the range action MILP.
//!
//! Fillers are applied in order; a filler may only reference variables
//! created by the fillers before it (flows come from [`CoreProblemFiller`]).

mod core_problem;
mod discrete_pst;
mod group;
mod loop_flow;
mod min_margin;
mod mnec;
mod relative_margin;

pub use core_problem::CoreProblemFiller;
pub use discrete_pst::{DiscretePstGroupFiller, DiscretePstTapFiller};
pub use group::ContinuousRangeActionGroupFiller;
pub use loop_flow::MaxLoopFlowFiller;
pub use min_margin::MaxMinMarginFiller;
pub use mnec::MnecFiller;
pub use relative_margin::MaxMinRelativeMarginFiller;

use super::problem::LinearProblem;
use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::CoreResult;

pub trait ProblemFiller: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create variables, constraints and objective terms.
    fn fill(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()>;

    /// Refresh coefficients after the oracle ran on new setpoints.
    fn update_between_sensitivity_iteration(
        &self,
        _problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Refresh after setpoints were rounded, before re-solving the MILP.
    fn update_between_mip_iteration(
        &self,
        _problem: &mut LinearProblem,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        Ok(())
    }
}
