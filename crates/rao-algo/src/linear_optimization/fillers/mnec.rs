use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::parameters::MnecParameters;
use rao_core::{CoreResult, FlowCnec, Unit};

/// Monitored Cnecs may not lose more than the acceptable margin decrease
/// compared to their initial flow. Violations are slack variables priced
/// in the objective instead of hard constraints.
pub struct MnecFiller {
    mnecs: Vec<FlowCnec>,
    initial_flows: SystematicSensitivityResult,
    parameters: MnecParameters,
}

impl MnecFiller {
    pub fn new(mnecs: Vec<FlowCnec>, initial_flows: SystematicSensitivityResult, parameters: MnecParameters) -> Self {
        Self {
            mnecs,
            initial_flows,
            parameters,
        }
    }
}

impl ProblemFiller for MnecFiller {
    fn name(&self) -> &'static str {
        "mnec"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        let acceptable = self.parameters.acceptable_margin_decrease;
        let adjustment = self.parameters.constraint_adjustment_coefficient;
        for mnec in &self.mnecs {
            let cost = self.parameters.violation_cost / mnec.sides.len().max(1) as f64;
            for &side in &mnec.sides {
                let Some(initial) = self.initial_flows.flow(&mnec.id, side) else {
                    continue;
                };
                let flow = VariableKey::Flow {
                    cnec: mnec.id.clone(),
                    side,
                };
                let violation = VariableKey::MnecViolation {
                    cnec: mnec.id.clone(),
                    side,
                };
                problem.add_variable(violation.clone(), VariableKind::Continuous, 0.0, f64::INFINITY)?;

                if let Some(max) = mnec.upper_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MnecUpper {
                        cnec: mnec.id.clone(),
                        side,
                    };
                    let ub = max.max(initial + acceptable) - adjustment;
                    problem.add_constraint(key.clone(), f64::NEG_INFINITY, ub)?;
                    problem.set_coefficient(&key, &flow, 1.0)?;
                    problem.set_coefficient(&key, &violation, -1.0)?;
                }
                if let Some(min) = mnec.lower_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MnecLower {
                        cnec: mnec.id.clone(),
                        side,
                    };
                    let lb = min.min(initial - acceptable) + adjustment;
                    problem.add_constraint(key.clone(), lb, f64::INFINITY)?;
                    problem.set_coefficient(&key, &flow, 1.0)?;
                    problem.set_coefficient(&key, &violation, 1.0)?;
                }
                problem.set_objective_coefficient(&violation, cost)?;
            }
        }
        Ok(())
    }
}
