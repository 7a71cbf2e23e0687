use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{CoreResult, FlowCnec, Side, Unit};

/// Maximise the minimum margin `MM` over optimized Cnecs.
///
/// `MM` is expressed in the objective unit while flows are in MW, hence the
/// `c = MW per unit` coefficient: `c·MM − F ≤ −fmin` and `c·MM + F ≤ fmax`.
pub struct MaxMinMarginFiller {
    optimized_cnecs: Vec<FlowCnec>,
    unit: Unit,
}

impl MaxMinMarginFiller {
    pub fn new(optimized_cnecs: Vec<FlowCnec>, unit: Unit) -> Self {
        Self {
            optimized_cnecs,
            unit,
        }
    }

    pub(crate) fn cnecs(&self) -> &[FlowCnec] {
        &self.optimized_cnecs
    }

    pub(crate) fn unit(&self) -> Unit {
        self.unit
    }

    fn has_bound(cnec: &FlowCnec, side: Side) -> bool {
        cnec.lower_bound(side, Unit::Megawatt).is_some() || cnec.upper_bound(side, Unit::Megawatt).is_some()
    }
}

impl ProblemFiller for MaxMinMarginFiller {
    fn name(&self) -> &'static str {
        "max-min-margin"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        let constrained = self
            .optimized_cnecs
            .iter()
            .any(|c| c.sides.iter().any(|&s| Self::has_bound(c, s)));
        // Nothing bounds MM without optimized Cnecs: pin it so only virtual costs count.
        let (lb, ub) = if constrained {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            (0.0, 0.0)
        };
        problem.add_variable(VariableKey::MinMargin, VariableKind::Continuous, lb, ub)?;

        for cnec in &self.optimized_cnecs {
            let coefficient = cnec.unit_to_mw(self.unit);
            for &side in &cnec.sides {
                let flow = VariableKey::Flow {
                    cnec: cnec.id.clone(),
                    side,
                };
                if let Some(min) = cnec.lower_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinMarginLower {
                        cnec: cnec.id.clone(),
                        side,
                    };
                    problem.add_constraint(key.clone(), f64::NEG_INFINITY, -min)?;
                    problem.set_coefficient(&key, &VariableKey::MinMargin, coefficient)?;
                    problem.set_coefficient(&key, &flow, -1.0)?;
                }
                if let Some(max) = cnec.upper_bound(side, Unit::Megawatt) {
                    let key = ConstraintKey::MinMarginUpper {
                        cnec: cnec.id.clone(),
                        side,
                    };
                    problem.add_constraint(key.clone(), f64::NEG_INFINITY, max)?;
                    problem.set_coefficient(&key, &VariableKey::MinMargin, coefficient)?;
                    problem.set_coefficient(&key, &flow, 1.0)?;
                }
            }
        }
        problem.set_objective_coefficient(&VariableKey::MinMargin, -1.0)
    }
}
