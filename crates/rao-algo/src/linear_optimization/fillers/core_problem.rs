use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::hashing::sha256_prefix;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rao_core::parameters::RangeActionsOptimizationParameters;
use rao_core::{CoreResult, FlowCnec, RangeAction, RaoError};

/// Amplitude of the deterministic penalty perturbation.
const PENALTY_PERTURBATION: f64 = 0.001;

/// Flow definition and range action variation.
///
/// Per Cnec side: `F − Σ s_r · S_r = ref − Σ s_r · current_r`.
/// Per range action: setpoint `S_r` in its admissible range and absolute
/// variation `AV_r ≥ |S_r − prePerimeter_r|`, penalised in the objective.
pub struct CoreProblemFiller {
    cnecs: Vec<FlowCnec>,
    range_actions: Vec<RangeAction>,
    initial_setpoints: RangeActionActivation,
    pre_perimeter_setpoints: RangeActionActivation,
    parameters: RangeActionsOptimizationParameters,
    network_name: String,
}

impl CoreProblemFiller {
    pub fn new(
        cnecs: Vec<FlowCnec>,
        range_actions: Vec<RangeAction>,
        initial_setpoints: RangeActionActivation,
        pre_perimeter_setpoints: RangeActionActivation,
        parameters: RangeActionsOptimizationParameters,
        network_name: impl Into<String>,
    ) -> Self {
        Self {
            cnecs,
            range_actions,
            initial_setpoints,
            pre_perimeter_setpoints,
            parameters,
            network_name: network_name.into(),
        }
    }

    fn pre_perimeter_setpoint(&self, ra: &RangeAction) -> CoreResult<f64> {
        self.pre_perimeter_setpoints.setpoint(&ra.id).ok_or_else(|| {
            RaoError::Validation(format!("no pre-perimeter setpoint for range action '{}'", ra.id))
        })
    }

    fn threshold(&self, ra: &RangeAction) -> f64 {
        self.parameters.sensitivity_threshold(ra.category())
    }

    /// Whether the action has no significant effect on any optimized Cnec.
    fn is_insensitive(&self, ra: &RangeAction, flows: &SystematicSensitivityResult) -> bool {
        let threshold = self.threshold(ra);
        self.cnecs.iter().filter(|c| c.optimized).all(|cnec| {
            cnec.sides
                .iter()
                .all(|&side| flows.sensitivity(&ra.id, &cnec.id, side).abs() < threshold)
        })
    }

    fn penalty(&self, ra: &RangeAction) -> f64 {
        let seed = sha256_prefix(&[&self.network_name, &ra.id]);
        let perturbation = StdRng::seed_from_u64(seed).gen::<f64>() * PENALTY_PERTURBATION;
        self.parameters.penalty_cost(ra.category()) + perturbation
    }

    fn add_range_action_variables(
        &self,
        problem: &mut LinearProblem,
        ra: &RangeAction,
        flows: &SystematicSensitivityResult,
    ) -> CoreResult<()> {
        let previous = self.pre_perimeter_setpoint(ra)?;
        let initial = self.initial_setpoints.setpoint(&ra.id).unwrap_or(previous);
        let (lb, ub) = if self.is_insensitive(ra, flows) {
            (previous, previous)
        } else {
            ra.admissible_range(initial, previous)?
        };

        let setpoint = VariableKey::Setpoint { action: ra.id.clone() };
        let variation = VariableKey::AbsoluteVariation { action: ra.id.clone() };
        problem.add_variable(setpoint.clone(), VariableKind::Continuous, lb, ub)?;
        problem.add_variable(variation.clone(), VariableKind::Continuous, 0.0, f64::INFINITY)?;

        // AV - S >= -prev and AV + S >= prev
        let positive = ConstraintKey::AbsoluteVariationPositive { action: ra.id.clone() };
        problem.add_constraint(positive.clone(), -previous, f64::INFINITY)?;
        problem.set_coefficient(&positive, &variation, 1.0)?;
        problem.set_coefficient(&positive, &setpoint, -1.0)?;

        let negative = ConstraintKey::AbsoluteVariationNegative { action: ra.id.clone() };
        problem.add_constraint(negative.clone(), previous, f64::INFINITY)?;
        problem.set_coefficient(&negative, &variation, 1.0)?;
        problem.set_coefficient(&negative, &setpoint, 1.0)?;

        problem.set_objective_coefficient(&variation, self.penalty(ra))
    }

    fn set_flow_constraint(
        &self,
        problem: &mut LinearProblem,
        cnec: &FlowCnec,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for &side in &cnec.sides {
            let key = ConstraintKey::Flow {
                cnec: cnec.id.clone(),
                side,
            };
            let reference = flows.flow(&cnec.id, side).unwrap_or(0.0);
            let mut rhs = reference;
            for ra in &self.range_actions {
                let sensitivity = flows.sensitivity(&ra.id, &cnec.id, side);
                let setpoint = VariableKey::Setpoint { action: ra.id.clone() };
                if sensitivity.abs() >= self.threshold(ra) {
                    let current = match activation.setpoint(&ra.id) {
                        Some(sp) => sp,
                        None => self.pre_perimeter_setpoint(ra)?,
                    };
                    rhs -= sensitivity * current;
                    problem.set_coefficient(&key, &setpoint, -sensitivity)?;
                } else {
                    problem.set_coefficient(&key, &setpoint, 0.0)?;
                }
            }
            problem.set_constraint_bounds(&key, rhs, rhs)?;
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for ra in &self.range_actions {
            self.add_range_action_variables(problem, ra, flows)?;
        }
        for cnec in &self.cnecs {
            for &side in &cnec.sides {
                let flow = VariableKey::Flow {
                    cnec: cnec.id.clone(),
                    side,
                };
                let key = ConstraintKey::Flow {
                    cnec: cnec.id.clone(),
                    side,
                };
                problem.add_variable(flow.clone(), VariableKind::Continuous, f64::NEG_INFINITY, f64::INFINITY)?;
                problem.add_constraint(key.clone(), 0.0, 0.0)?;
                problem.set_coefficient(&key, &flow, 1.0)?;
            }
            self.set_flow_constraint(problem, cnec, flows, activation)?;
        }
        Ok(())
    }

    fn update_between_sensitivity_iteration(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for cnec in &self.cnecs {
            self.set_flow_constraint(problem, cnec, flows, activation)?;
        }
        Ok(())
    }
}
