use super::{is_excluded, CostEvaluator};
use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::parameters::LoopFlowParameters;
use rao_core::FlowCnec;
use std::collections::BTreeSet;

/// Loop flow above `max(threshold, |initial| + acceptable increase)`, priced per MW.
pub struct LoopFlowViolationEvaluator {
    cnecs: Vec<FlowCnec>,
    initial_flows: SystematicSensitivityResult,
    parameters: LoopFlowParameters,
}

impl LoopFlowViolationEvaluator {
    pub fn new(cnecs: Vec<FlowCnec>, initial_flows: SystematicSensitivityResult, parameters: LoopFlowParameters) -> Self {
        Self {
            cnecs,
            initial_flows,
            parameters,
        }
    }

    fn excess(&self, flows: &SystematicSensitivityResult, cnec: &FlowCnec) -> f64 {
        let Some(threshold) = cnec.loop_flow_threshold_mw() else {
            return 0.0;
        };
        cnec.sides
            .iter()
            .filter_map(|&side| {
                let current = flows.loop_flow(&cnec.id, side)?;
                let initial = self.initial_flows.loop_flow(&cnec.id, side).unwrap_or(0.0);
                let limit = threshold.max(initial.abs() + self.parameters.acceptable_increase);
                Some((current.abs() - limit).max(0.0))
            })
            .fold(0.0, f64::max)
    }
}

impl CostEvaluator for LoopFlowViolationEvaluator {
    fn name(&self) -> &'static str {
        "loop-flow-cost"
    }

    fn compute_cost(
        &self,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
        excluded_contingencies: &BTreeSet<String>,
    ) -> f64 {
        self.cnecs
            .iter()
            .filter(|c| !is_excluded(c, excluded_contingencies))
            .map(|c| self.excess(flows, c) * self.parameters.violation_cost)
            .sum()
    }

    fn costly_elements(
        &self,
        flows: &SystematicSensitivityResult,
        excluded_contingencies: &BTreeSet<String>,
        n: usize,
    ) -> Vec<FlowCnec> {
        let mut violated: Vec<(&FlowCnec, f64)> = self
            .cnecs
            .iter()
            .filter(|c| !is_excluded(c, excluded_contingencies))
            .map(|c| (c, self.excess(flows, c)))
            .filter(|(_, e)| *e > 0.0)
            .collect();
        violated.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        violated.into_iter().take(n).map(|(c, _)| c.clone()).collect()
    }
}
