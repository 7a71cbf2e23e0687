//! # rao-algo: remedial action optimisation
//!
//! Searches, for each network state of a study, the remedial actions that
//! maximise the worst margin of the monitored elements.
//!
//! | Module | Role |
//! |--------|------|
//! | [`sensitivity`] | Oracle boundary, retry with fallback, [`LinearFlowModel`] |
//! | [`objective`] | Functional and virtual cost evaluators |
//! | [`perimeter`] | State tree and optimisation perimeters |
//! | [`linear_optimization`] | MILP over range actions, iterated to convergence |
//! | [`search_tree`] | Best-first search over network action combinations |
//! | [`automaton`] | Deterministic automaton simulation |
//! | [`castor`] | Preventive, automaton, curative and second preventive stages |
//! | [`result`] | [`PerimeterResult`] and the final [`RaoResult`] |
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{Castor, LinearFlowModel};
//! use std::sync::Arc;
//!
//! let castor = Castor::new(Arc::new(model), parameters);
//! let result = castor.run(&network, &crac)?;
//! println!("{}", result.to_json_pretty()?);
//! ```

pub mod activation;
pub mod applied;
pub mod automaton;
pub mod castor;
mod hashing;
pub mod linear_optimization;
pub mod objective;
pub mod perimeter;
pub mod result;
pub mod search_tree;
pub mod sensitivity;

pub use activation::RangeActionActivation;
pub use applied::AppliedRemedialActions;
pub use automaton::{AutomatonResult, AutomatonSimulator};
pub use castor::{Castor, ScenarioResult};
pub use linear_optimization::{GoodLpSolver, LinearProblemStatus, MilpSolver};
pub use objective::{ObjectiveFunction, ObjectiveFunctionResult};
pub use perimeter::{ContingencyScenario, OptimizationPerimeter, StateTree};
pub use result::{
    CnecResult, OptimizationInstant, OptimizationStepsExecuted, PerimeterResult, RangeActionResult, RaoResult,
    StateResult,
};
pub use search_tree::{SearchTree, SearchTreeInput, TreeParameters};
pub use sensitivity::{
    ComputationStatus, FailureMode, LinearFlowModel, SensitivityComputer, SensitivityMode, SensitivityOracle,
    SensitivityRequest, SystematicSensitivityResult,
};
