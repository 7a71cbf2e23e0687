//! # rao-core: data model for remedial action optimisation
//!
//! Everything the optimiser reads but never decides:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`state`] | [`Instant`], [`Contingency`], [`State`] |
//! | [`cnec`] | [`FlowCnec`], thresholds, sides, units, margins |
//! | [`remedial_action`] | [`NetworkAction`], [`RangeAction`], usage rules |
//! | [`crac`] | [`Crac`] catalog and availability resolution |
//! | [`network`] | [`Network`] element-state registry and [`AreaGraph`] |
//! | [`parameters`] | [`RaoParameters`] loaded from TOML |
//! | [`error`] | [`RaoError`] and [`CoreResult`] |

pub mod cnec;
pub mod crac;
pub mod error;
pub mod network;
pub mod parameters;
pub mod remedial_action;
pub mod state;

pub use cnec::{FlowCnec, LoopFlowThreshold, Side, Threshold, Unit};
pub use crac::Crac;
pub use error::{CoreResult, RaoError};
pub use network::{AreaGraph, Branch, Network, PhaseShifter};
pub use parameters::{
    CurativeStopCriterion, ObjectiveFunctionKind, PreventiveStopCriterion, PstModel,
    RaUsageLimits, RaoParameters, SecondPreventiveExecutionCondition, SolverKind,
};
pub use remedial_action::{
    ActionType, ElementaryAction, NetworkAction, PstRange, Range, RangeAction,
    RangeActionCategory, RangeActionKind, RangeType, RemedialAction, RemedialActionInfo,
    UsageMethod, UsageRule,
};
pub use state::{Contingency, Instant, State};
