use super::{is_excluded, CostEvaluator};
use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::parameters::MnecParameters;
use rao_core::{FlowCnec, Unit};
use std::collections::BTreeSet;

/// Priced margin loss of monitored Cnecs beyond the acceptable decrease:
/// `max(0, min(0, initialMargin − acceptable) − margin) · cost`, in MW.
pub struct MnecViolationEvaluator {
    mnecs: Vec<FlowCnec>,
    initial_flows: SystematicSensitivityResult,
    parameters: MnecParameters,
}

impl MnecViolationEvaluator {
    pub fn new(mnecs: Vec<FlowCnec>, initial_flows: SystematicSensitivityResult, parameters: MnecParameters) -> Self {
        Self {
            mnecs,
            initial_flows,
            parameters,
        }
    }

    fn violation(&self, flows: &SystematicSensitivityResult, mnec: &FlowCnec) -> f64 {
        let current = flows.margin(mnec, Unit::Megawatt);
        let initial = self.initial_flows.margin(mnec, Unit::Megawatt);
        if !current.is_finite() || !initial.is_finite() {
            return 0.0;
        }
        let floor = (initial - self.parameters.acceptable_margin_decrease).min(0.0);
        (floor - current).max(0.0)
    }
}

impl CostEvaluator for MnecViolationEvaluator {
    fn name(&self) -> &'static str {
        "mnec-cost"
    }

    fn compute_cost(
        &self,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
        excluded_contingencies: &BTreeSet<String>,
    ) -> f64 {
        self.mnecs
            .iter()
            .filter(|m| !is_excluded(m, excluded_contingencies))
            .map(|m| self.violation(flows, m) * self.parameters.violation_cost)
            .sum()
    }

    fn costly_elements(
        &self,
        flows: &SystematicSensitivityResult,
        excluded_contingencies: &BTreeSet<String>,
        n: usize,
    ) -> Vec<FlowCnec> {
        let mut violated: Vec<(&FlowCnec, f64)> = self
            .mnecs
            .iter()
            .filter(|m| !is_excluded(m, excluded_contingencies))
            .map(|m| (m, self.violation(flows, m)))
            .filter(|(_, v)| *v > 0.0)
            .collect();
        violated.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        violated.into_iter().take(n).map(|(m, _)| m.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitivity::ComputationStatus;
    use rao_core::{Side, State, Threshold};

    #[test]
    fn test_violation_beyond_acceptable_decrease() {
        let mnec = FlowCnec::new("m", "l", State::preventive())
            .with_threshold(Threshold::symmetric_mw(100.0))
            .monitored_only();
        let mut initial = SystematicSensitivityResult::new(ComputationStatus::Default);
        initial.set_flow("m", Side::One, 120.0);
        let evaluator = MnecViolationEvaluator::new(vec![mnec], initial, MnecParameters::default());

        let mut flows = SystematicSensitivityResult::new(ComputationStatus::Default);
        flows.set_flow("m", Side::One, 160.0);
        let none = BTreeSet::new();
        // initial margin -20, floor -70, margin -60: tolerated
        assert_eq!(evaluator.compute_cost(&flows, &RangeActionActivation::new(), &none), 0.0);
        flows.set_flow("m", Side::One, 180.0);
        let cost = evaluator.compute_cost(&flows, &RangeActionActivation::new(), &none);
        assert!((cost - 100.0).abs() < 1e-9, "10 MW over the floor at cost 10, got {cost}");
        assert_eq!(evaluator.costly_elements(&flows, &none, 5).len(), 1);
    }
}
