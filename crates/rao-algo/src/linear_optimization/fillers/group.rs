use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{CoreResult, RangeAction};
use std::collections::BTreeMap;

/// Range actions sharing a `group_id` follow one group setpoint: `S_r − G = 0`.
pub struct ContinuousRangeActionGroupFiller {
    groups: BTreeMap<String, Vec<String>>,
}

impl ContinuousRangeActionGroupFiller {
    pub fn new(range_actions: &[RangeAction]) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ra in range_actions {
            if let Some(group) = &ra.group_id {
                groups.entry(group.clone()).or_default().push(ra.id.clone());
            }
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl ProblemFiller for ContinuousRangeActionGroupFiller {
    fn name(&self) -> &'static str {
        "range-action-group"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        _activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for (group, members) in &self.groups {
            let group_setpoint = VariableKey::GroupSetpoint { group: group.clone() };
            problem.add_variable(
                group_setpoint.clone(),
                VariableKind::Continuous,
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            for id in members {
                let key = ConstraintKey::RangeActionGroup { action: id.clone() };
                problem.add_constraint(key.clone(), 0.0, 0.0)?;
                problem.set_coefficient(&key, &VariableKey::Setpoint { action: id.clone() }, 1.0)?;
                problem.set_coefficient(&key, &group_setpoint, -1.0)?;
            }
        }
        Ok(())
    }
}
