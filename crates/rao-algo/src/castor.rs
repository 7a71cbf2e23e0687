//! Multi-stage orchestration.
//!
//! 1. Initial sensitivity run on the untouched network (cost floor).
//! 2. Preventive search tree; its actions are applied.
//! 3. Per contingency scenario, in parallel: automaton simulation, then a
//!    curative search tree.
//! 4. Optional second preventive search with post-contingency decisions
//!    fixed.
//! 5. Post-check: never return a result costlier than the initial one.

use crate::activation::RangeActionActivation;
use crate::applied::AppliedRemedialActions;
use crate::automaton::{AutomatonResult, AutomatonSimulator};
use crate::linear_optimization::{GoodLpSolver, MilpSolver};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::perimeter::{ContingencyScenario, OptimizationPerimeter, StateTree};
use crate::result::{OptimizationInstant, OptimizationStepsExecuted, PerimeterResult, RaoResult};
use crate::search_tree::{LeafStatus, SearchTree, SearchTreeInput, TreeParameters};
use crate::sensitivity::{SensitivityComputer, SensitivityOracle, SensitivityRequest, SystematicSensitivityResult};
use chrono::Utc;
use rao_core::{
    Crac, CoreResult, CurativeStopCriterion, FlowCnec, Instant, Network, PreventiveStopCriterion, RangeAction,
    RaoError, RaoParameters, SecondPreventiveExecutionCondition, State, Unit, UsageMethod,
};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Remedial action optimiser over all stages of a study.
pub struct Castor {
    oracle: Arc<dyn SensitivityOracle>,
    solver: Arc<dyn MilpSolver>,
    parameters: RaoParameters,
}

impl Castor {
    pub fn new(oracle: Arc<dyn SensitivityOracle>, parameters: RaoParameters) -> Self {
        let ranges = &parameters.range_actions;
        let solver = Arc::new(GoodLpSolver::new(ranges.solver, ranges.relative_mip_gap));
        Self {
            oracle,
            solver,
            parameters,
        }
    }

    pub fn with_solver(mut self, solver: Arc<dyn MilpSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn parameters(&self) -> &RaoParameters {
        &self.parameters
    }

    pub fn run(&self, network: &Network, crac: &Crac) -> CoreResult<RaoResult> {
        self.parameters.validate()?;
        crac.validate(network)?;
        let started = web_time::Instant::now();
        info!(
            network = %network.name,
            crac = %crac.id,
            oracle = self.oracle.name(),
            solver = self.solver.name(),
            "Starting remedial action optimization"
        );

        let study = Study::new(network, crac, &self.parameters, Arc::clone(&self.oracle), Arc::clone(&self.solver))?;
        if study.initial_flows.status().is_failure() {
            error!("Initial sensitivity analysis failed, no optimization performed");
            return Ok(study.initial_result(OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation));
        }

        let preventive_started = web_time::Instant::now();
        let preventive = study.optimize_preventive()?;
        let preventive_duration = preventive_started.elapsed();
        if preventive.status == LeafStatus::Error {
            warn!("Preventive perimeter could not be optimized, falling back to initial situation");
            return Ok(study.initial_result(OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation));
        }

        let first = study.optimize_post_contingency(preventive)?;
        let mut result = study.first_pass_result(&first);

        if study.should_run_second_preventive(&first, preventive_duration) {
            let second = study.run_second_preventive(&first)?;
            if second.final_objective.cost() < first.after_cra_objective.cost() {
                info!(
                    first = first.after_cra_objective.cost(),
                    second = second.final_objective.cost(),
                    "Second preventive optimization improved the result"
                );
                result = study.second_pass_result(&first, &second);
            } else {
                info!(
                    first = first.after_cra_objective.cost(),
                    second = second.final_objective.cost(),
                    "Second preventive optimization did not improve, keeping first preventive result"
                );
                result.optimization_steps_executed = OptimizationStepsExecuted::SecondPreventiveFellBackToFirstPreventiveSituation;
            }
        }

        let result = study.post_check(result);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Remedial action optimization finished");
        Ok(result)
    }
}

/// Outcome of one contingency scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ContingencyScenario,
    pub automaton: Option<AutomatonResult>,
    pub curative: Option<PerimeterResult>,
}

struct FirstPass {
    preventive: PerimeterResult,
    after_pra_flows: SystematicSensitivityResult,
    after_pra_objective: ObjectiveFunctionResult,
    scenarios: Vec<ScenarioResult>,
    after_ara_flows: SystematicSensitivityResult,
    after_ara_objective: ObjectiveFunctionResult,
    after_cra_flows: SystematicSensitivityResult,
    after_cra_objective: ObjectiveFunctionResult,
}

struct SecondPass {
    preventive: PerimeterResult,
    after_pra_flows: SystematicSensitivityResult,
    after_pra_objective: ObjectiveFunctionResult,
    after_ara_flows: SystematicSensitivityResult,
    after_ara_objective: ObjectiveFunctionResult,
    final_flows: SystematicSensitivityResult,
    final_objective: ObjectiveFunctionResult,
}

/// Shared, read-only data of one run.
struct Study<'a> {
    network: &'a Network,
    crac: &'a Crac,
    parameters: &'a RaoParameters,
    computer: SensitivityComputer,
    solver: Arc<dyn MilpSolver>,
    tree: StateTree,
    range_actions: Vec<RangeAction>,
    objective: ObjectiveFunction,
    initial_flows: SystematicSensitivityResult,
    initial_setpoints: RangeActionActivation,
    initial_objective: ObjectiveFunctionResult,
}

impl<'a> Study<'a> {
    fn new(
        network: &'a Network,
        crac: &'a Crac,
        parameters: &'a RaoParameters,
        oracle: Arc<dyn SensitivityOracle>,
        solver: Arc<dyn MilpSolver>,
    ) -> CoreResult<Self> {
        let computer = SensitivityComputer::new(oracle, parameters.sensitivity.max_retries_with_fallback);
        let range_actions: Vec<RangeAction> = crac.range_actions().cloned().collect();
        let no_applied = AppliedRemedialActions::new();
        let initial_flows = computer.compute(
            network,
            &request(parameters, &crac.cnecs, &range_actions, crac, &no_applied),
        );
        let objective = ObjectiveFunction::build(&crac.cnecs, &crac.states(), &initial_flows, parameters);
        let initial_setpoints = RangeActionActivation::from_network(&range_actions, network)?;
        let initial_objective = objective.evaluate(&initial_flows, &initial_setpoints);
        info!(
            cost = initial_objective.cost(),
            functional = initial_objective.functional_cost,
            virtual_cost = initial_objective.virtual_cost(),
            "Initial sensitivity analysis"
        );
        Ok(Self {
            network,
            crac,
            parameters,
            computer,
            solver,
            tree: StateTree::new(crac),
            range_actions,
            objective,
            initial_flows,
            initial_setpoints,
            initial_objective,
        })
    }

    fn unit(&self) -> Unit {
        self.parameters.objective_function.unit
    }

    fn search_input(
        &self,
        perimeter: OptimizationPerimeter,
        network: &Network,
        pre_perimeter_flows: SystematicSensitivityResult,
        applied_remedial_actions: AppliedRemedialActions,
        tree_parameters: TreeParameters,
    ) -> CoreResult<SearchTreeInput> {
        let objective_function = ObjectiveFunction::build(
            perimeter.cnecs(),
            perimeter.states(),
            &self.initial_flows,
            self.parameters,
        );
        let pre_perimeter_setpoints = RangeActionActivation::from_network(perimeter.range_actions(), network)?;
        Ok(SearchTreeInput {
            perimeter,
            network: network.clone(),
            initial_flows: self.initial_flows.clone(),
            initial_setpoints: self.initial_setpoints.clone(),
            pre_perimeter_flows,
            pre_perimeter_setpoints,
            applied_remedial_actions,
            objective_function,
            sensitivity_computer: self.computer.clone(),
            solver: Arc::clone(&self.solver),
            parameters: self.parameters.clone(),
            tree_parameters,
        })
    }

    fn optimize_preventive(&self) -> CoreResult<PerimeterResult> {
        let perimeter = OptimizationPerimeter::preventive(self.crac, &self.tree, &self.initial_flows, self.unit());
        info!(
            cnecs = perimeter.cnecs().len(),
            network_actions = perimeter.network_actions().len(),
            range_actions = perimeter.range_actions().len(),
            "Optimizing preventive perimeter"
        );
        let input = self.search_input(
            perimeter,
            self.network,
            self.initial_flows.clone(),
            AppliedRemedialActions::new(),
            TreeParameters::preventive(self.parameters),
        )?;
        let result = SearchTree::new(input).run()?;
        info!(cost = result.cost(), functional = result.functional_cost(), "Preventive perimeter optimized");
        Ok(result)
    }

    /// Apply the preventive result, then run every contingency scenario.
    fn optimize_post_contingency(&self, preventive: PerimeterResult) -> CoreResult<FirstPass> {
        let mut network = self.network.clone();
        preventive.apply_on(&mut network)?;
        let no_applied = AppliedRemedialActions::new();
        let after_pra_flows = self.computer.compute(
            &network,
            &request(self.parameters, &self.crac.cnecs, &self.range_actions, self.crac, &no_applied),
        );
        let after_pra_setpoints = RangeActionActivation::from_network(&self.range_actions, &network)?;
        let after_pra_objective = self.objective.evaluate(&after_pra_flows, &after_pra_setpoints);
        info!(cost = after_pra_objective.cost(), "Sensitivity analysis after preventive actions");

        let preventive_unsecure = self.parameters.objective_function.preventive_stop_criterion
            == PreventiveStopCriterion::Secure
            && preventive.cost() > 0.0;
        let scenarios = if self.tree.scenarios().is_empty() {
            info!("No contingency scenario with post-contingency actions");
            Vec::new()
        } else if preventive_unsecure {
            info!("Preventive perimeter could not be secured, post-contingency perimeters are not optimized");
            Vec::new()
        } else {
            self.optimize_scenarios(&network, &after_pra_flows, preventive.cost())?
        };

        let mut after_ara_flows = after_pra_flows.clone();
        for scenario in &scenarios {
            if let Some(automaton) = &scenario.automaton {
                let co = scenario.scenario.contingency.as_str();
                after_ara_flows.overwrite_with(
                    &automaton.flows,
                    self.crac
                        .cnecs
                        .iter()
                        .filter(|c| c.state.contingency_id() == Some(co) && c.state.instant >= Instant::Auto),
                );
            }
        }
        let after_ara_objective = self.objective.evaluate(&after_ara_flows, &after_pra_setpoints);

        let mut after_cra_flows = after_ara_flows.clone();
        for curative in scenarios.iter().filter_map(|s| s.curative.as_ref()) {
            after_cra_flows.overwrite_with(&curative.flows, self.crac.cnecs_at(&curative.state));
        }
        let after_cra_objective = self.objective.evaluate(&after_cra_flows, &after_pra_setpoints);
        info!(
            after_ara = after_ara_objective.cost(),
            after_cra = after_cra_objective.cost(),
            "Post-contingency perimeters optimized"
        );

        Ok(FirstPass {
            preventive,
            after_pra_flows,
            after_pra_objective,
            scenarios,
            after_ara_flows,
            after_ara_objective,
            after_cra_flows,
            after_cra_objective,
        })
    }

    fn optimize_scenarios(
        &self,
        network: &Network,
        flows: &SystematicSensitivityResult,
        preventive_cost: f64,
    ) -> CoreResult<Vec<ScenarioResult>> {
        let threads = self.parameters.multithreading.contingency_scenarios_in_parallel.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| RaoError::Other(format!("failed to build scenario thread pool: {e}")))?;
        info!(scenarios = self.tree.scenarios().len(), threads, "Optimizing contingency scenarios");
        let results: Vec<CoreResult<ScenarioResult>> = pool.install(|| {
            self.tree
                .scenarios()
                .par_iter()
                .map(|scenario| self.optimize_scenario(scenario, network, flows, preventive_cost))
                .collect()
        });
        results.into_iter().collect()
    }

    fn optimize_scenario(
        &self,
        scenario: &ContingencyScenario,
        network: &Network,
        flows: &SystematicSensitivityResult,
        preventive_cost: f64,
    ) -> CoreResult<ScenarioResult> {
        let simulator = AutomatonSimulator::new(self.crac, &self.computer, &self.range_actions, self.parameters);
        let automaton = scenario
            .automaton_state
            .as_ref()
            .map(|state| simulator.simulate(state, network, flows))
            .transpose()?;
        let (network, flows) = match &automaton {
            Some(a) => (&a.network, &a.flows),
            None => (network, flows),
        };

        let curative = match &scenario.curative_state {
            Some(state) => {
                let perimeter = OptimizationPerimeter::curative(self.crac, state, flows, self.unit());
                info!(%state, range_actions = perimeter.range_actions().len(), network_actions = perimeter.network_actions().len(), "Optimizing curative perimeter");
                let input = self.search_input(
                    perimeter,
                    network,
                    flows.clone(),
                    AppliedRemedialActions::new(),
                    TreeParameters::curative(self.parameters, preventive_cost),
                )?;
                let result = SearchTree::new(input).run()?;
                info!(%state, cost = result.cost(), "Curative perimeter optimized");
                Some(result)
            }
            None => None,
        };
        Ok(ScenarioResult {
            scenario: scenario.clone(),
            automaton,
            curative,
        })
    }

    fn should_run_second_preventive(&self, first: &FirstPass, preventive_duration: Duration) -> bool {
        let second = &self.parameters.second_preventive;
        if second.execution_condition == SecondPreventiveExecutionCondition::Disabled {
            return false;
        }
        if first.scenarios.iter().all(|s| s.curative.is_none()) {
            info!("Second preventive optimization skipped: no curative perimeter was optimized");
            return false;
        }
        if let Some(target) = second.target_end_time {
            let expected_end = Utc::now() + chrono::Duration::milliseconds(preventive_duration.as_millis() as i64);
            if expected_end > target {
                info!(%target, %expected_end, "Second preventive optimization skipped: not enough time left");
                return false;
            }
        }

        if second.execution_condition == SecondPreventiveExecutionCondition::CostIncrease
            && first.after_cra_objective.cost() <= self.initial_objective.cost()
        {
            info!("Second preventive optimization skipped: cost did not increase");
            return false;
        }

        let objective = &self.parameters.objective_function;
        let target = first.preventive.cost() - objective.curative_min_obj_improvement;
        let curatives: Vec<&PerimeterResult> = first.scenarios.iter().filter_map(|s| s.curative.as_ref()).collect();
        let unsecure = curatives.iter().any(|c| c.functional_cost() >= 0.0);
        let above_preventive = curatives.iter().any(|c| c.cost() > target);
        let run = match objective.curative_stop_criterion {
            CurativeStopCriterion::MinObjective => true,
            CurativeStopCriterion::Secure => unsecure,
            CurativeStopCriterion::PreventiveObjective => above_preventive,
            CurativeStopCriterion::PreventiveObjectiveAndSecure => unsecure || above_preventive,
        };
        if run {
            info!(condition = ?second.execution_condition, "Second preventive optimization triggered");
        } else {
            info!(condition = ?second.execution_condition, "Second preventive optimization not needed");
        }
        run
    }

    /// Post-contingency decisions of the first pass, per state.
    fn applied_post_contingency(&self, first: &FirstPass) -> AppliedRemedialActions {
        let mut applied = AppliedRemedialActions::new();
        for scenario in &first.scenarios {
            if let Some(automaton) = &scenario.automaton {
                for na in &automaton.network_actions {
                    applied.add_network_action(&automaton.state, na.clone());
                }
            }
            if let Some(curative) = &scenario.curative {
                for na in &curative.network_actions {
                    applied.add_network_action(&curative.state, na.clone());
                }
                for ra in curative.activated_range_actions() {
                    if let Some(setpoint) = curative.activation.setpoint(&ra.id) {
                        applied.add_range_action(&curative.state, ra.clone(), setpoint);
                    }
                }
            }
        }
        applied
    }

    /// Range actions also usable at a curative state; their curative
    /// setpoints stay fixed unless re-optimisation is allowed.
    fn curative_range_action_ids(&self, first: &FirstPass) -> BTreeSet<String> {
        let curative_states: Vec<&State> = first
            .scenarios
            .iter()
            .filter_map(|s| s.scenario.curative_state.as_ref())
            .collect();
        self.range_actions
            .iter()
            .filter(|ra| {
                curative_states
                    .iter()
                    .any(|state| self.crac.usage_method(*ra, state) != UsageMethod::Unavailable)
            })
            .map(|ra| ra.id.clone())
            .collect()
    }

    fn run_second_preventive(&self, first: &FirstPass) -> CoreResult<SecondPass> {
        let applied = self.applied_post_contingency(first);
        let mut perimeter = OptimizationPerimeter::build(
            self.crac,
            State::preventive(),
            self.crac.states(),
            &self.initial_flows,
            self.unit(),
        );
        // Range actions excluded from the search keep their first preventive setpoints.
        let mut network = self.network.clone();
        let mut kept_from_first = Vec::new();
        if !self.parameters.second_preventive.re_optimize_curative_range_actions {
            let excluded = self.curative_range_action_ids(first);
            debug!(excluded = ?excluded, "Range actions kept at their first preventive setpoints");
            kept_from_first = first
                .preventive
                .range_actions
                .iter()
                .filter(|ra| excluded.contains(&ra.id))
                .cloned()
                .collect();
            first.preventive.activation.apply_on(&mut network, &kept_from_first)?;
            perimeter = perimeter.without_range_actions(&excluded);
        }
        let pre_perimeter_flows = self.computer.compute(
            &network,
            &request(self.parameters, perimeter.cnecs(), perimeter.range_actions(), self.crac, &applied),
        );

        let mut tree_parameters = TreeParameters::second_preventive(self.parameters);
        if self.parameters.second_preventive.hint_from_first_preventive {
            let forced: BTreeSet<&str> = perimeter.forced_network_actions().iter().map(|na| na.id.as_str()).collect();
            let hint: Vec<String> = first
                .preventive
                .network_actions
                .iter()
                .filter(|na| !forced.contains(na.id.as_str()))
                .map(|na| na.id.clone())
                .collect();
            if !hint.is_empty() {
                tree_parameters.predefined_combinations.push(hint);
            }
        }
        info!(
            cnecs = perimeter.cnecs().len(),
            range_actions = perimeter.range_actions().len(),
            "Optimizing second preventive perimeter"
        );
        let input = self.search_input(perimeter, &network, pre_perimeter_flows, applied.clone(), tree_parameters)?;
        let mut preventive = SearchTree::new(input).run()?;
        preventive.carry_range_actions(&first.preventive, &kept_from_first);

        preventive.apply_on(&mut network)?;
        let setpoints = RangeActionActivation::from_network(&self.range_actions, &network)?;
        let evaluate = |applied: &AppliedRemedialActions| {
            let flows = self.computer.compute(
                &network,
                &request(self.parameters, &self.crac.cnecs, &self.range_actions, self.crac, applied),
            );
            let objective = self.objective.evaluate(&flows, &setpoints);
            (flows, objective)
        };
        let (after_pra_flows, after_pra_objective) = evaluate(&AppliedRemedialActions::new());
        let (after_ara_flows, after_ara_objective) = evaluate(&automatons_only(first));
        let (final_flows, final_objective) = evaluate(&applied);
        Ok(SecondPass {
            preventive,
            after_pra_flows,
            after_pra_objective,
            after_ara_flows,
            after_ara_objective,
            final_flows,
            final_objective,
        })
    }

    fn record_post_contingency_decisions(&self, result: &mut RaoResult, first: &FirstPass) {
        for scenario in &first.scenarios {
            if let Some(automaton) = &scenario.automaton {
                result.record_network_actions(&automaton.state, &automaton.network_actions);
            }
            if let Some(curative) = &scenario.curative {
                result.record_perimeter(curative);
            }
        }
    }

    fn first_pass_result(&self, first: &FirstPass) -> RaoResult {
        let unit = self.unit();
        let mut result = RaoResult::new(OptimizationStepsExecuted::FirstPreventiveOnly);
        result.record_instant(OptimizationInstant::Initial, self.crac, &self.initial_flows, self.initial_objective.clone(), unit);
        result.record_instant(OptimizationInstant::AfterPra, self.crac, &first.after_pra_flows, first.after_pra_objective.clone(), unit);
        if first.scenarios.iter().any(|s| s.automaton.is_some()) {
            result.record_instant(OptimizationInstant::AfterAra, self.crac, &first.after_ara_flows, first.after_ara_objective.clone(), unit);
        }
        if first.scenarios.iter().any(|s| s.curative.is_some()) {
            result.record_instant(OptimizationInstant::AfterCra, self.crac, &first.after_cra_flows, first.after_cra_objective.clone(), unit);
        }
        result.record_perimeter(&first.preventive);
        self.record_post_contingency_decisions(&mut result, first);
        result
    }

    fn second_pass_result(&self, first: &FirstPass, second: &SecondPass) -> RaoResult {
        let unit = self.unit();
        let mut result = RaoResult::new(OptimizationStepsExecuted::SecondPreventiveImprovedFirst);
        result.record_instant(OptimizationInstant::Initial, self.crac, &self.initial_flows, self.initial_objective.clone(), unit);
        result.record_instant(OptimizationInstant::AfterPra, self.crac, &second.after_pra_flows, second.after_pra_objective.clone(), unit);
        if first.scenarios.iter().any(|s| s.automaton.is_some()) {
            result.record_instant(OptimizationInstant::AfterAra, self.crac, &second.after_ara_flows, second.after_ara_objective.clone(), unit);
        }
        result.record_instant(OptimizationInstant::AfterCra, self.crac, &second.final_flows, second.final_objective.clone(), unit);
        result.record_perimeter(&second.preventive);
        self.record_post_contingency_decisions(&mut result, first);
        result
    }

    fn initial_result(&self, steps: OptimizationStepsExecuted) -> RaoResult {
        let mut result = RaoResult::new(steps);
        result.record_instant(
            OptimizationInstant::Initial,
            self.crac,
            &self.initial_flows,
            self.initial_objective.clone(),
            self.unit(),
        );
        result
    }

    fn post_check(&self, result: RaoResult) -> RaoResult {
        let initial = self.initial_objective.cost();
        let optimized = result.final_cost();
        info!(initial, optimized, "Cost before RAO = {initial:.2}, cost after RAO = {optimized:.2}");
        if self.parameters.objective_function.forbid_cost_increase && optimized > initial {
            let steps = match result.optimization_steps_executed {
                OptimizationStepsExecuted::FirstPreventiveOnly
                | OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation => {
                    OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation
                }
                _ => OptimizationStepsExecuted::SecondPreventiveFellBackToInitialSituation,
            };
            warn!(initial, optimized, "Optimization increased the cost, falling back to initial situation");
            return self.initial_result(steps);
        }
        result
    }
}

/// First-pass automaton decisions only.
fn automatons_only(first: &FirstPass) -> AppliedRemedialActions {
    let mut applied = AppliedRemedialActions::new();
    for automaton in first.scenarios.iter().filter_map(|s| s.automaton.as_ref()) {
        for na in &automaton.network_actions {
            applied.add_network_action(&automaton.state, na.clone());
        }
    }
    applied
}

fn request<'r>(
    parameters: &RaoParameters,
    cnecs: &'r [FlowCnec],
    range_actions: &'r [RangeAction],
    crac: &'r Crac,
    applied: &'r AppliedRemedialActions,
) -> SensitivityRequest<'r> {
    SensitivityRequest {
        cnecs,
        range_actions,
        contingencies: &crac.contingencies,
        applied_remedial_actions: applied,
        compute_ptdf_sums: parameters.relative_margins_enabled(),
        compute_loop_flows: parameters.loop_flow.enabled,
    }
}
