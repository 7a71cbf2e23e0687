use super::fillers::{
    ContinuousRangeActionGroupFiller, CoreProblemFiller, DiscretePstGroupFiller, DiscretePstTapFiller,
    MaxLoopFlowFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller, ProblemFiller,
};
use super::problem::{LinearProblem, LinearProblemStatus, VariableKey};
use super::solver::MilpSolver;
use crate::activation::RangeActionActivation;
use crate::applied::AppliedRemedialActions;
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::sensitivity::{SensitivityComputer, SensitivityRequest, SystematicSensitivityResult};
use rao_core::{Contingency, CoreResult, FlowCnec, Network, PstModel, RangeAction, RaoParameters};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearOptimizationStatus {
    Optimal,
    Infeasible,
    Abnormal,
    MaxIterationReached,
    SensitivityComputationFailed,
}

impl fmt::Display for LinearOptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinearOptimizationStatus::Optimal => "OPTIMAL",
            LinearOptimizationStatus::Infeasible => "INFEASIBLE",
            LinearOptimizationStatus::Abnormal => "ABNORMAL",
            LinearOptimizationStatus::MaxIterationReached => "MAX_ITERATION_REACHED",
            LinearOptimizationStatus::SensitivityComputationFailed => "SENSITIVITY_COMPUTATION_FAILED",
        };
        f.write_str(s)
    }
}

/// Result of one MILP / oracle iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Strictly lower cost: the iteration becomes the new best.
    Improved,
    /// Same setpoints as the best iteration.
    Converged,
    /// Not better: rolled back to the best iteration.
    Degraded,
}

/// Everything the optimizer reads; nothing here is mutated.
pub struct LinearOptimizerInput<'a> {
    /// Network with the leaf's network actions applied.
    pub network: &'a Network,
    pub cnecs: &'a [FlowCnec],
    pub contingencies: &'a [Contingency],
    /// Range actions the MILP may move.
    pub range_actions: &'a [RangeAction],
    pub applied_remedial_actions: &'a AppliedRemedialActions,
    pub initial_setpoints: &'a RangeActionActivation,
    pub pre_perimeter_setpoints: &'a RangeActionActivation,
    pub initial_flows: &'a SystematicSensitivityResult,
    pub pre_perimeter_flows: &'a SystematicSensitivityResult,
    /// Evaluation of the leaf before optimisation.
    pub starting_flows: &'a SystematicSensitivityResult,
    pub starting_activation: &'a RangeActionActivation,
    pub objective_function: &'a ObjectiveFunction,
    pub sensitivity_computer: &'a SensitivityComputer,
    pub solver: &'a dyn MilpSolver,
    pub parameters: &'a RaoParameters,
}

#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub status: LinearOptimizationStatus,
    pub activation: RangeActionActivation,
    pub flows: SystematicSensitivityResult,
    pub objective: ObjectiveFunctionResult,
    pub iterations: usize,
}

/// Solve the MILP, re-run the oracle on the new setpoints, refresh the
/// fillers and solve again, as long as the cost decreases by more than
/// `min_iteration_improvement`.
pub struct IteratingLinearOptimizer;

impl IteratingLinearOptimizer {
    pub fn build_fillers(input: &LinearOptimizerInput<'_>) -> CoreResult<Vec<Box<dyn ProblemFiller>>> {
        let parameters = input.parameters;
        let unit = parameters.objective_function.unit;
        let optimized: Vec<FlowCnec> = input.cnecs.iter().filter(|c| c.optimized).cloned().collect();
        let ranges = &parameters.range_actions;

        let mut fillers: Vec<Box<dyn ProblemFiller>> = vec![Box::new(CoreProblemFiller::new(
            input.cnecs.to_vec(),
            input.range_actions.to_vec(),
            input.initial_setpoints.clone(),
            input.pre_perimeter_setpoints.clone(),
            ranges.clone(),
            input.network.name.clone(),
        ))];

        if parameters.relative_margins_enabled() {
            fillers.push(Box::new(MaxMinRelativeMarginFiller::new(
                optimized,
                unit,
                parameters.relative_margins.ptdf_sum_lower_bound,
                input.pre_perimeter_flows,
            )));
        } else {
            fillers.push(Box::new(MaxMinMarginFiller::new(optimized, unit)));
        }

        let mnecs: Vec<FlowCnec> = input.cnecs.iter().filter(|c| c.monitored).cloned().collect();
        if !mnecs.is_empty() {
            fillers.push(Box::new(MnecFiller::new(
                mnecs,
                input.initial_flows.clone(),
                parameters.mnec.clone(),
            )));
        }
        if parameters.loop_flow.enabled {
            fillers.push(Box::new(MaxLoopFlowFiller::new(
                input.cnecs.to_vec(),
                input.initial_flows.clone(),
                parameters.loop_flow.clone(),
            )));
        }
        if ranges.pst_model == PstModel::ApproximatedIntegers {
            fillers.push(Box::new(DiscretePstTapFiller::new(
                input.range_actions,
                input.initial_setpoints,
                input.pre_perimeter_setpoints,
            )?));
            let groups = DiscretePstGroupFiller::new(
                input.range_actions,
                input.initial_setpoints,
                input.pre_perimeter_setpoints,
            )?;
            if !groups.is_empty() {
                fillers.push(Box::new(groups));
            }
        }
        let groups = ContinuousRangeActionGroupFiller::new(input.range_actions);
        if !groups.is_empty() {
            fillers.push(Box::new(groups));
        }
        Ok(fillers)
    }

    pub fn optimize(input: &LinearOptimizerInput<'_>) -> CoreResult<LinearOptimizationResult> {
        let mut best = LinearOptimizationResult {
            status: LinearOptimizationStatus::Optimal,
            activation: input.starting_activation.clone(),
            flows: input.starting_flows.clone(),
            objective: input
                .objective_function
                .evaluate(input.starting_flows, input.starting_activation),
            iterations: 0,
        };
        let max_iterations = input.parameters.range_actions.max_mip_iterations;
        if max_iterations == 0 || input.range_actions.is_empty() {
            debug!("Linear optimization skipped: nothing to optimize");
            best.status = LinearOptimizationStatus::MaxIterationReached;
            return Ok(best);
        }

        let fillers = Self::build_fillers(input)?;
        let mut problem = LinearProblem::new();
        for filler in &fillers {
            filler.fill(&mut problem, &best.flows, &best.activation)?;
        }

        for iteration in 1..=max_iterations {
            best.iterations = iteration;
            let status = problem.solve(input.solver)?;
            if status != LinearProblemStatus::Optimal {
                warn!(iteration, %status, "Linear problem could not be solved");
                best.status = if iteration == 1 {
                    match status {
                        LinearProblemStatus::Infeasible => LinearOptimizationStatus::Infeasible,
                        _ => LinearOptimizationStatus::Abnormal,
                    }
                } else {
                    LinearOptimizationStatus::Optimal
                };
                return Ok(best);
            }

            let mut candidate = Self::read_setpoints(&problem, input.range_actions, &best.activation)?;
            if input.parameters.range_actions.pst_model == PstModel::ApproximatedIntegers {
                for filler in &fillers {
                    filler.update_between_mip_iteration(&mut problem, &candidate)?;
                }
                if problem.solve(input.solver)? == LinearProblemStatus::Optimal {
                    candidate = Self::read_setpoints(&problem, input.range_actions, &best.activation)?;
                } else {
                    debug!(iteration, "Second MIP solve failed, keeping the first rounded setpoints");
                }
            }

            if !candidate.differs_from(&best.activation, input.range_actions) {
                info!(iteration, outcome = ?IterationOutcome::Converged, cost = best.objective.cost(), "Linear optimization converged");
                best.status = LinearOptimizationStatus::Optimal;
                return Ok(best);
            }

            let flows = Self::evaluate(input, &candidate)?;
            if flows.status().is_failure() {
                warn!(iteration, "Sensitivity computation failed during linear optimization");
                best.status = LinearOptimizationStatus::SensitivityComputationFailed;
                return Ok(best);
            }
            let objective = input.objective_function.evaluate(&flows, &candidate);

            let min_improvement = input.parameters.range_actions.min_iteration_improvement;
            let outcome = if objective.cost() < best.objective.cost() - min_improvement {
                IterationOutcome::Improved
            } else {
                IterationOutcome::Degraded
            };
            info!(
                iteration,
                ?outcome,
                cost = objective.cost(),
                functional = objective.functional_cost,
                "Linear optimization iteration"
            );
            match outcome {
                IterationOutcome::Improved => {
                    for filler in &fillers {
                        filler.update_between_sensitivity_iteration(&mut problem, &flows, &candidate)?;
                    }
                    best.activation = candidate;
                    best.flows = flows;
                    best.objective = objective;
                }
                IterationOutcome::Degraded | IterationOutcome::Converged => {
                    debug!(iteration, "Rolling back to the previous iteration");
                    best.status = LinearOptimizationStatus::Optimal;
                    return Ok(best);
                }
            }
        }

        best.status = LinearOptimizationStatus::MaxIterationReached;
        Ok(best)
    }

    /// Solved setpoints rounded to what the network can apply: nearest tap
    /// angle for PSTs, nearest MW otherwise.
    fn read_setpoints(
        problem: &LinearProblem,
        range_actions: &[RangeAction],
        previous: &RangeActionActivation,
    ) -> CoreResult<RangeActionActivation> {
        let mut activation = previous.clone();
        for ra in range_actions {
            let key = VariableKey::Setpoint { action: ra.id.clone() };
            let Some(value) = problem.value(&key) else {
                continue;
            };
            let rounded = match ra.as_pst() {
                Some(pst) => pst.angle(pst.tap_of(value))?,
                None => {
                    let bounds = problem.variable(&key)?;
                    round_within(value, bounds.lb, bounds.ub)
                }
            };
            activation.set(ra.id.clone(), rounded);
        }
        Ok(activation)
    }

    fn evaluate(input: &LinearOptimizerInput<'_>, activation: &RangeActionActivation) -> CoreResult<SystematicSensitivityResult> {
        let mut network = input.network.clone();
        activation.apply_on(&mut network, input.range_actions)?;
        let request = SensitivityRequest {
            cnecs: input.cnecs,
            range_actions: input.range_actions,
            contingencies: input.contingencies,
            applied_remedial_actions: input.applied_remedial_actions,
            compute_ptdf_sums: input.parameters.relative_margins_enabled(),
            compute_loop_flows: input.parameters.loop_flow.enabled,
        };
        Ok(input.sensitivity_computer.compute(&network, &request))
    }
}

/// Nearest integer MW, kept inside `[lb, ub]` (lower bound wins if inverted).
fn round_within(value: f64, lb: f64, ub: f64) -> f64 {
    let rounded = value.round();
    if rounded > ub {
        ub.max(lb)
    } else if rounded < lb {
        lb
    } else {
        rounded
    }
}

#[cfg(all(test, feature = "solver-microlp"))]
mod tests {
    use super::*;
    use crate::linear_optimization::GoodLpSolver;
    use crate::sensitivity::{LinearFlowModel, SensitivityMode, SensitivityOracle};
    use rao_core::{Range, RangeActionKind, Side, State, Threshold};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Real flows follow `model`, reported sensitivities are overridden.
    struct MisleadingOracle {
        model: LinearFlowModel,
        reported: f64,
    }

    impl SensitivityOracle for MisleadingOracle {
        fn name(&self) -> &str {
            "misleading"
        }

        fn compute(
            &self,
            network: &Network,
            request: &SensitivityRequest<'_>,
            mode: SensitivityMode,
        ) -> CoreResult<SystematicSensitivityResult> {
            let mut result = self.model.compute(network, request, mode)?;
            for side in [Side::One, Side::Two] {
                result.set_sensitivity("hvdc", "c1", side, self.reported);
            }
            Ok(result)
        }
    }

    fn optimize_with(oracle: Arc<dyn SensitivityOracle>, parameters: RaoParameters) -> LinearOptimizationResult {
        let network = Network::new("n");
        let cnecs = vec![FlowCnec::new("c1", "line1", State::preventive()).with_threshold(Threshold::symmetric_mw(100.0))];
        let range_actions = vec![RangeAction::new("hvdc", RangeActionKind::Hvdc { element: "dc".into() })
            .with_range(Range::absolute(-30.0, 30.0))];
        let applied = AppliedRemedialActions::new();
        let computer = SensitivityComputer::new(oracle, 0);
        let request = SensitivityRequest {
            cnecs: &cnecs,
            range_actions: &range_actions,
            contingencies: &[],
            applied_remedial_actions: &applied,
            compute_ptdf_sums: false,
            compute_loop_flows: false,
        };
        let flows = computer.compute(&network, &request);
        let setpoints = RangeActionActivation::from_network(&range_actions, &network).unwrap();
        let objective = ObjectiveFunction::build(&cnecs, &BTreeSet::from([State::preventive()]), &flows, &parameters);
        let solver = GoodLpSolver::default();
        let input = LinearOptimizerInput {
            network: &network,
            cnecs: &cnecs,
            contingencies: &[],
            range_actions: &range_actions,
            applied_remedial_actions: &applied,
            initial_setpoints: &setpoints,
            pre_perimeter_setpoints: &setpoints,
            initial_flows: &flows,
            pre_perimeter_flows: &flows,
            starting_flows: &flows,
            starting_activation: &setpoints,
            objective_function: &objective,
            sensitivity_computer: &computer,
            solver: &solver,
            parameters: &parameters,
        };
        IteratingLinearOptimizer::optimize(&input).unwrap()
    }

    #[test]
    fn test_degraded_iteration_rolls_back() {
        // The MILP believes +2 MW per MW while the network answers -2.
        let model = LinearFlowModel::new()
            .with_reference_flow("c1", 50.0)
            .with_sensitivity("dc", "c1", -2.0);
        let result = optimize_with(Arc::new(MisleadingOracle { model, reported: 2.0 }), RaoParameters::default());

        assert_eq!(result.status, LinearOptimizationStatus::Optimal);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.activation.setpoint("hvdc"), Some(0.0), "starting setpoint restored");
        assert!((result.objective.cost() + 50.0).abs() < 1e-6, "got {}", result.objective.cost());
    }

    #[test]
    fn test_improvement_below_tolerance_is_not_kept() {
        let model = LinearFlowModel::new()
            .with_reference_flow("c1", 50.0)
            .with_sensitivity("dc", "c1", 2.0);
        let mut parameters = RaoParameters::default();
        parameters.range_actions.min_iteration_improvement = 100.0;
        let result = optimize_with(Arc::new(model), parameters);
        assert_eq!(result.activation.setpoint("hvdc"), Some(0.0), "a 50 MW gain is below the tolerance");

        let model = LinearFlowModel::new()
            .with_reference_flow("c1", 50.0)
            .with_sensitivity("dc", "c1", 2.0);
        let result = optimize_with(Arc::new(model), RaoParameters::default());
        assert_eq!(result.activation.setpoint("hvdc"), Some(-25.0));
        assert!((result.objective.cost() + 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_round_within_bounds() {
        assert_eq!(round_within(12.4, -30.0, 30.0), 12.0);
        assert_eq!(round_within(29.7, -30.0, 29.5), 29.5);
        assert_eq!(round_within(-31.0, -30.0, 30.0), -30.0);
        assert_eq!(round_within(1.0, 5.0, 3.0), 5.0, "inverted bounds must not panic");
        assert_eq!(round_within(2.2, f64::NAN, 3.0), 2.0, "NaN bound must not panic");
    }
}
