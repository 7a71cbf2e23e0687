//! Range action optimisation by successive MILPs.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`problem`] | [`LinearProblem`] with typed keys |
//! | [`solver`] | [`MilpSolver`] trait and the `good_lp` backend |
//! | [`fillers`] | the [`ProblemFiller`] units composing the MILP |
//! | [`iterating`] | [`IteratingLinearOptimizer`], the MILP / oracle loop |

pub mod fillers;
pub mod iterating;
pub mod problem;
pub mod solver;

pub use fillers::ProblemFiller;
pub use iterating::{
    IteratingLinearOptimizer, IterationOutcome, LinearOptimizationResult, LinearOptimizationStatus,
    LinearOptimizerInput,
};
pub use problem::{ConstraintKey, Direction, LinearProblem, LinearProblemStatus, VariableKey, VariableKind};
pub use solver::{GoodLpSolver, MilpSolver};
