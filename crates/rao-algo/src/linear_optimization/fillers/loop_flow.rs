use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::parameters::LoopFlowParameters;
use rao_core::{CoreResult, FlowCnec, Side};

/// Loop flows kept under `max(threshold, |initial loop flow| + acceptable increase)`.
///
/// The loop flow is linearised as the flow variable minus the commercial
/// flow of the last sensitivity run, so bounds move between iterations.
pub struct MaxLoopFlowFiller {
    cnecs: Vec<FlowCnec>,
    initial_flows: SystematicSensitivityResult,
    parameters: LoopFlowParameters,
}

impl MaxLoopFlowFiller {
    pub fn new(cnecs: Vec<FlowCnec>, initial_flows: SystematicSensitivityResult, parameters: LoopFlowParameters) -> Self {
        Self {
            cnecs: cnecs
                .into_iter()
                .filter(|c| c.loop_flow_threshold.is_some())
                .collect(),
            initial_flows,
            parameters,
        }
    }

    fn loop_flow_bound(&self, cnec: &FlowCnec, side: Side) -> f64 {
        let threshold = cnec.loop_flow_threshold_mw().unwrap_or(f64::INFINITY);
        let initial = self.initial_flows.loop_flow(&cnec.id, side).unwrap_or(0.0);
        threshold.max(initial.abs() + self.parameters.acceptable_increase)
    }

    fn set_bounds(&self, problem: &mut LinearProblem, flows: &SystematicSensitivityResult) -> CoreResult<()> {
        let adjustment = self.parameters.constraint_adjustment_coefficient;
        for cnec in &self.cnecs {
            for &side in &cnec.sides {
                let bound = self.loop_flow_bound(cnec, side);
                let commercial = match (flows.flow(&cnec.id, side), flows.loop_flow(&cnec.id, side)) {
                    (Some(flow), Some(loop_flow)) => flow - loop_flow,
                    _ => 0.0,
                };
                problem.set_constraint_bounds(
                    &ConstraintKey::LoopFlowUpper {
                        cnec: cnec.id.clone(),
                        side,
                    },
                    f64::NEG_INFINITY,
                    bound + commercial - adjustment,
                )?;
                problem.set_constraint_bounds(
                    &ConstraintKey::LoopFlowLower {
                        cnec: cnec.id.clone(),
                        side,
                    },
                    -bound + commercial + adjustment,
                    f64::INFINITY,
                )?;
            }
        }
        Ok(())
    }
}

impl ProblemFiller for MaxLoopFlowFiller {
    fn name(&self) -> &'static str {
        "max-loop-flow"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for cnec in &self.cnecs {
            for &side in &cnec.sides {
                let flow = VariableKey::Flow {
                    cnec: cnec.id.clone(),
                    side,
                };
                let violation = VariableKey::LoopFlowViolation {
                    cnec: cnec.id.clone(),
                    side,
                };
                problem.add_variable(violation.clone(), VariableKind::Continuous, 0.0, f64::INFINITY)?;

                let upper = ConstraintKey::LoopFlowUpper {
                    cnec: cnec.id.clone(),
                    side,
                };
                problem.add_constraint(upper.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                problem.set_coefficient(&upper, &flow, 1.0)?;
                problem.set_coefficient(&upper, &violation, -1.0)?;

                let lower = ConstraintKey::LoopFlowLower {
                    cnec: cnec.id.clone(),
                    side,
                };
                problem.add_constraint(lower.clone(), f64::NEG_INFINITY, f64::INFINITY)?;
                problem.set_coefficient(&lower, &flow, 1.0)?;
                problem.set_coefficient(&lower, &violation, 1.0)?;

                problem.set_objective_coefficient(&violation, self.parameters.violation_cost)?;
            }
        }
        self.set_bounds(problem, flows)
    }

    fn update_between_sensitivity_iteration(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.set_bounds(problem, flows)
    }
}
