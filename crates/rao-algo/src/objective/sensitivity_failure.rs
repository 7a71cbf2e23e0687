use super::CostEvaluator;
use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{FlowCnec, State};
use std::collections::BTreeSet;
use tracing::debug;

/// Flat overcost as soon as one state in scope failed.
pub struct SensitivityFailureOvercostEvaluator {
    states: BTreeSet<State>,
    overcost: f64,
}

impl SensitivityFailureOvercostEvaluator {
    pub fn new(states: BTreeSet<State>, overcost: f64) -> Self {
        Self { states, overcost }
    }
}

impl CostEvaluator for SensitivityFailureOvercostEvaluator {
    fn name(&self) -> &'static str {
        "sensitivity-failure-cost"
    }

    fn compute_cost(
        &self,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
        excluded_contingencies: &BTreeSet<String>,
    ) -> f64 {
        if flows.status().is_failure() {
            debug!("Sensitivity failure for the whole perimeter");
            return self.overcost;
        }
        let failed = self
            .states
            .iter()
            .filter(|s| !s.contingency_id().is_some_and(|co| excluded_contingencies.contains(co)))
            .find(|s| flows.state_status(s).is_failure());
        match failed {
            Some(state) => {
                debug!(state = %state, "Sensitivity failure");
                self.overcost
            }
            None => 0.0,
        }
    }

    fn costly_elements(
        &self,
        _flows: &SystematicSensitivityResult,
        _excluded_contingencies: &BTreeSet<String>,
        _n: usize,
    ) -> Vec<FlowCnec> {
        Vec::new()
    }
}
