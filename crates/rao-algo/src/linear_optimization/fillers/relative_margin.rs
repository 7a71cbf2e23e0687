use super::{MaxMinMarginFiller, ProblemFiller};
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{CoreResult, FlowCnec, Side, Unit};
use std::collections::HashMap;

/// Ratio between the big-M of negative margins and the largest threshold.
const NEGATIVE_MARGIN_FACTOR: f64 = 5.0;

/// Maximise the minimum relative margin when every margin is positive.
///
/// A binary sign `P` selects the regime: with `P = 0` the absolute `MM`
/// (capped at 0) is maximised, with `P = 1` the relative margin `MRM`, the
/// margin divided by the floored PTDF zonal sum. Big-M values come from the
/// largest threshold divided by the PTDF floor.
pub struct MaxMinRelativeMarginFiller {
    base: MaxMinMarginFiller,
    ptdf_sum_lower_bound: f64,
    ptdf_sums: HashMap<(String, Side), f64>,
}

impl MaxMinRelativeMarginFiller {
    /// `ptdf_source` provides the zonal PTDF sums, usually the pre-perimeter flows.
    pub fn new(
        optimized_cnecs: Vec<FlowCnec>,
        unit: Unit,
        ptdf_sum_lower_bound: f64,
        ptdf_source: &SystematicSensitivityResult,
    ) -> Self {
        let ptdf_sums = optimized_cnecs
            .iter()
            .flat_map(|c| c.sides.iter().map(move |&s| (c, s)))
            .map(|(c, s)| ((c.id.clone(), s), ptdf_source.ptdf_sum(&c.id, s).unwrap_or(1.0)))
            .collect();
        Self {
            base: MaxMinMarginFiller::new(optimized_cnecs, unit),
            ptdf_sum_lower_bound,
            ptdf_sums,
        }
    }

    fn ptdf(&self, cnec: &str, side: Side) -> f64 {
        self.ptdf_sums
            .get(&(cnec.to_string(), side))
            .copied()
            .unwrap_or(1.0)
            .max(self.ptdf_sum_lower_bound)
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn name(&self) -> &'static str {
        "max-min-relative-margin"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.base.fill(problem, flows, activation)?;

        let highest = self
            .base
            .cnecs()
            .iter()
            .map(FlowCnec::highest_threshold_mw)
            .fold(0.0, f64::max);
        let max_positive_relative = highest / self.ptdf_sum_lower_bound;
        let max_negative_relative = NEGATIVE_MARGIN_FACTOR * max_positive_relative;
        let max_negative = NEGATIVE_MARGIN_FACTOR * highest;

        let mm_lb = problem.variable(&VariableKey::MinMargin)?.lb;
        problem.set_variable_bounds(&VariableKey::MinMargin, mm_lb, 0.0)?;
        problem.add_variable(
            VariableKey::MinRelativeMargin,
            VariableKind::Continuous,
            0.0,
            max_positive_relative,
        )?;
        problem.add_variable(VariableKey::MarginSign, VariableKind::Binary, 0.0, 1.0)?;

        // P = 1 forces MM >= 0, hence MM = 0
        let negative = ConstraintKey::MarginSignNegative;
        problem.add_constraint(negative.clone(), f64::NEG_INFINITY, max_negative)?;
        problem.set_coefficient(&negative, &VariableKey::MarginSign, max_negative)?;
        problem.set_coefficient(&negative, &VariableKey::MinMargin, -1.0)?;

        // P = 0 forces MRM = 0
        let positive = ConstraintKey::MarginSignPositive;
        problem.add_constraint(positive.clone(), f64::NEG_INFINITY, 0.0)?;
        problem.set_coefficient(&positive, &VariableKey::MinRelativeMargin, 1.0)?;
        problem.set_coefficient(&positive, &VariableKey::MarginSign, -max_positive_relative)?;

        let unit = self.base.unit();
        for cnec in self.base.cnecs() {
            for &side in &cnec.sides {
                let coefficient = cnec.unit_to_mw(unit) * self.ptdf(&cnec.id, side);
                let relaxation = coefficient * max_negative_relative;
                let flow = VariableKey::Flow {
                    cnec: cnec.id.clone(),
                    side,
                };
                if let Some(min) = cnec.lower_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinRelativeMarginLower {
                        cnec: cnec.id.clone(),
                        side,
                    };
                    problem.add_constraint(key.clone(), f64::NEG_INFINITY, -min + relaxation)?;
                    problem.set_coefficient(&key, &VariableKey::MinRelativeMargin, coefficient)?;
                    problem.set_coefficient(&key, &VariableKey::MarginSign, relaxation)?;
                    problem.set_coefficient(&key, &flow, -1.0)?;
                }
                if let Some(max) = cnec.upper_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinRelativeMarginUpper {
                        cnec: cnec.id.clone(),
                        side,
                    };
                    problem.add_constraint(key.clone(), f64::NEG_INFINITY, max + relaxation)?;
                    problem.set_coefficient(&key, &VariableKey::MinRelativeMargin, coefficient)?;
                    problem.set_coefficient(&key, &VariableKey::MarginSign, relaxation)?;
                    problem.set_coefficient(&key, &flow, 1.0)?;
                }
            }
        }
        problem.set_objective_coefficient(&VariableKey::MinRelativeMargin, -1.0)
    }
}
