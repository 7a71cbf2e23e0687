use super::{is_excluded, CostEvaluator};
use crate::activation::RangeActionActivation;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{FlowCnec, Unit};
use std::collections::BTreeSet;

/// Functional cost: minus the worst (relative) margin of optimized Cnecs.
pub struct MinMarginEvaluator {
    cnecs: Vec<FlowCnec>,
    unit: Unit,
    /// PTDF floor when margins are relative.
    relative: Option<f64>,
}

impl MinMarginEvaluator {
    pub fn absolute(cnecs: Vec<FlowCnec>, unit: Unit) -> Self {
        Self {
            cnecs,
            unit,
            relative: None,
        }
    }

    pub fn relative(cnecs: Vec<FlowCnec>, unit: Unit, ptdf_sum_lower_bound: f64) -> Self {
        Self {
            cnecs,
            unit,
            relative: Some(ptdf_sum_lower_bound),
        }
    }

    fn margin(&self, flows: &SystematicSensitivityResult, cnec: &FlowCnec) -> f64 {
        match self.relative {
            Some(lb) => flows.relative_margin(cnec, self.unit, lb),
            None => flows.margin(cnec, self.unit),
        }
    }

    /// Largest threshold of the perimeter, in the objective unit.
    fn highest_threshold(&self) -> f64 {
        self.cnecs
            .iter()
            .map(|c| c.highest_threshold_mw() / c.unit_to_mw(self.unit))
            .fold(0.0, f64::max)
    }

    fn ranked<'a>(
        &'a self,
        flows: &SystematicSensitivityResult,
        excluded: &BTreeSet<String>,
    ) -> Vec<(&'a FlowCnec, f64)> {
        let mut ranked: Vec<(&FlowCnec, f64)> = self
            .cnecs
            .iter()
            .filter(|c| !is_excluded(c, excluded))
            .map(|c| (c, self.margin(flows, c)))
            .filter(|(_, m)| m.is_finite())
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        ranked
    }
}

impl CostEvaluator for MinMarginEvaluator {
    fn name(&self) -> &'static str {
        "min-margin"
    }

    fn compute_cost(
        &self,
        flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
        excluded_contingencies: &BTreeSet<String>,
    ) -> f64 {
        match self.ranked(flows, excluded_contingencies).first() {
            Some((_, margin)) => -margin,
            // Nothing constrains the perimeter: stay finite and comparable.
            None => -self.highest_threshold(),
        }
    }

    fn costly_elements(
        &self,
        flows: &SystematicSensitivityResult,
        excluded_contingencies: &BTreeSet<String>,
        n: usize,
    ) -> Vec<FlowCnec> {
        self.ranked(flows, excluded_contingencies)
            .into_iter()
            .take(n)
            .map(|(c, _)| c.clone())
            .collect()
    }
}
