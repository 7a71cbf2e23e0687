//! Cost evaluators.
//!
//! Total cost = functional cost (minus the worst margin) + Σ virtual costs
//! (MNEC violations, loop-flow excess, sensitivity failure overcost).

mod loop_flow;
mod min_margin;
mod mnec;
mod sensitivity_failure;

pub use loop_flow::LoopFlowViolationEvaluator;
pub use min_margin::MinMarginEvaluator;
pub use mnec::MnecViolationEvaluator;
pub use sensitivity_failure::SensitivityFailureOvercostEvaluator;

use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{FlowCnec, RaoParameters, State};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub trait CostEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn compute_cost(
        &self,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
        excluded_contingencies: &BTreeSet<String>,
    ) -> f64;

    /// At most `n` Cnecs contributing to the cost, costliest first.
    fn costly_elements(
        &self,
        flows: &SystematicSensitivityResult,
        excluded_contingencies: &BTreeSet<String>,
        n: usize,
    ) -> Vec<FlowCnec>;
}

pub(crate) fn is_excluded(cnec: &FlowCnec, excluded: &BTreeSet<String>) -> bool {
    cnec.state
        .contingency_id()
        .is_some_and(|co| excluded.contains(co))
}

/// Costs of one evaluated situation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveFunctionResult {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
}

impl ObjectiveFunctionResult {
    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }
}

/// Functional evaluator plus the virtual ones relevant to a perimeter.
pub struct ObjectiveFunction {
    functional: Box<dyn CostEvaluator>,
    virtual_evaluators: Vec<Box<dyn CostEvaluator>>,
    excluded_contingencies: BTreeSet<String>,
}

impl ObjectiveFunction {
    pub fn new(functional: Box<dyn CostEvaluator>) -> Self {
        Self {
            functional,
            virtual_evaluators: Vec::new(),
            excluded_contingencies: BTreeSet::new(),
        }
    }

    pub fn with_virtual(mut self, evaluator: Box<dyn CostEvaluator>) -> Self {
        self.virtual_evaluators.push(evaluator);
        self
    }

    pub fn with_excluded_contingencies(mut self, excluded: BTreeSet<String>) -> Self {
        self.excluded_contingencies = excluded;
        self
    }

    /// Evaluators configured from parameters for the given Cnecs.
    ///
    /// `initial_flows` anchors MNEC and loop-flow tolerances; `states` are
    /// the states whose sensitivity failure must be priced.
    pub fn build(
        cnecs: &[FlowCnec],
        states: &BTreeSet<State>,
        initial_flows: &SystematicSensitivityResult,
        parameters: &RaoParameters,
    ) -> Self {
        let unit = parameters.objective_function.unit;
        let optimized: Vec<FlowCnec> = cnecs.iter().filter(|c| c.optimized).cloned().collect();
        let functional = if parameters.relative_margins_enabled() {
            MinMarginEvaluator::relative(optimized, unit, parameters.relative_margins.ptdf_sum_lower_bound)
        } else {
            MinMarginEvaluator::absolute(optimized, unit)
        };
        let mut objective = ObjectiveFunction::new(Box::new(functional));

        let mnecs: Vec<FlowCnec> = cnecs.iter().filter(|c| c.monitored).cloned().collect();
        if !mnecs.is_empty() {
            objective = objective.with_virtual(Box::new(MnecViolationEvaluator::new(
                mnecs,
                initial_flows.clone(),
                parameters.mnec.clone(),
            )));
        }
        if parameters.loop_flow.enabled {
            let loop_flow_cnecs: Vec<FlowCnec> = cnecs
                .iter()
                .filter(|c| c.loop_flow_threshold.is_some())
                .cloned()
                .collect();
            if !loop_flow_cnecs.is_empty() {
                objective = objective.with_virtual(Box::new(LoopFlowViolationEvaluator::new(
                    loop_flow_cnecs,
                    initial_flows.clone(),
                    parameters.loop_flow.clone(),
                )));
            }
        }
        objective.with_virtual(Box::new(SensitivityFailureOvercostEvaluator::new(
            states.clone(),
            parameters.objective_function.sensitivity_failure_overcost,
        )))
    }

    pub fn excluded_contingencies(&self) -> &BTreeSet<String> {
        &self.excluded_contingencies
    }

    pub fn evaluate(
        &self,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> ObjectiveFunctionResult {
        let excluded = &self.excluded_contingencies;
        ObjectiveFunctionResult {
            functional_cost: self.functional.compute_cost(flows, activation, excluded),
            virtual_costs: self
                .virtual_evaluators
                .iter()
                .map(|e| (e.name().to_string(), e.compute_cost(flows, activation, excluded)))
                .collect(),
        }
    }

    pub fn most_limiting_elements(&self, flows: &SystematicSensitivityResult, n: usize) -> Vec<FlowCnec> {
        self.functional
            .costly_elements(flows, &self.excluded_contingencies, n)
    }

    pub fn costly_elements(&self, flows: &SystematicSensitivityResult, virtual_cost: &str, n: usize) -> Vec<FlowCnec> {
        self.virtual_evaluators
            .iter()
            .find(|e| e.name() == virtual_cost)
            .map(|e| e.costly_elements(flows, &self.excluded_contingencies, n))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitivity::ComputationStatus;
    use rao_core::{Instant, Side, Threshold};

    #[test]
    fn test_total_cost_adds_virtual_costs() {
        let prev = FlowCnec::new("prev", "l", State::preventive()).with_threshold(Threshold::symmetric_mw(100.0));
        let cur = FlowCnec::new("cur", "l", State::post_contingency(Instant::Curative, "co"))
            .with_threshold(Threshold::symmetric_mw(100.0));
        let states: BTreeSet<State> = [prev.state.clone(), cur.state.clone()].into();
        let mut initial = SystematicSensitivityResult::new(ComputationStatus::Default);
        initial.set_flow("prev", Side::One, 40.0);
        initial.set_flow("cur", Side::One, 130.0);
        let parameters = RaoParameters::default();
        let objective = ObjectiveFunction::build(&[prev, cur], &states, &initial, &parameters);

        let result = objective.evaluate(&initial, &RangeActionActivation::new());
        assert!((result.functional_cost - 30.0).abs() < 1e-9, "worst margin is -30");
        assert_eq!(result.virtual_cost(), 0.0);

        let mut failed = initial.clone();
        failed.set_state_status(&State::post_contingency(Instant::Curative, "co"), ComputationStatus::Failure);
        let result = objective.evaluate(&failed, &RangeActionActivation::new());
        assert_eq!(result.virtual_cost(), parameters.objective_function.sensitivity_failure_overcost);
        assert_eq!(result.cost(), result.functional_cost + result.virtual_cost());
    }

    #[test]
    fn test_excluded_contingencies_are_ignored() {
        let cur = FlowCnec::new("cur", "l", State::post_contingency(Instant::Curative, "co"))
            .with_threshold(Threshold::symmetric_mw(100.0));
        let prev = FlowCnec::new("prev", "l", State::preventive()).with_threshold(Threshold::symmetric_mw(100.0));
        let mut flows = SystematicSensitivityResult::new(ComputationStatus::Default);
        flows.set_flow("prev", Side::One, 10.0);
        flows.set_flow("cur", Side::One, 130.0);
        let objective = ObjectiveFunction::new(Box::new(MinMarginEvaluator::absolute(
            vec![prev, cur],
            rao_core::Unit::Megawatt,
        )))
        .with_excluded_contingencies(["co".to_string()].into());
        let result = objective.evaluate(&flows, &RangeActionActivation::new());
        assert!((result.functional_cost + 90.0).abs() < 1e-9);
    }
}
