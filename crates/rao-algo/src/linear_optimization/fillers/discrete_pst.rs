use super::ProblemFiller;
use crate::activation::RangeActionActivation;
use crate::linear_optimization::problem::{
    ConstraintKey, Direction, LinearProblem, VariableKey, VariableKind,
};
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{CoreResult, PstRange, RangeAction, RaoError};
use std::collections::{BTreeMap, HashMap};

/// Admissible tap interval of a PST range action.
fn admissible_taps(
    ra: &RangeAction,
    pst: &PstRange,
    initial: &RangeActionActivation,
    pre_perimeter: &RangeActionActivation,
) -> CoreResult<(i32, i32)> {
    let previous = pre_perimeter.setpoint(&ra.id).ok_or_else(|| {
        RaoError::Validation(format!("no pre-perimeter setpoint for range action '{}'", ra.id))
    })?;
    let initial = initial.setpoint(&ra.id).unwrap_or(previous);
    let (lo, hi) = ra.admissible_range(initial, previous)?;
    let (a, b) = (pst.tap_of(lo), pst.tap_of(hi));
    Ok((a.min(b), a.max(b)))
}

fn current_tap(ra: &RangeAction, pst: &PstRange, activation: &RangeActionActivation) -> CoreResult<i32> {
    activation
        .setpoint(&ra.id)
        .map(|sp| pst.tap_of(sp))
        .ok_or_else(|| RaoError::Validation(format!("no setpoint for range action '{}'", ra.id)))
}

#[derive(Clone, Copy)]
enum SlopeMode {
    /// Average slope up to the end of the admissible range.
    WholeRange,
    /// Slope of the next tap only.
    SingleTap,
}

/// Integer tap variations around the current tap.
///
/// `S − slopeUp·up − slopeDown·down = angle(t)`, `binUp + binDown ≤ 1`,
/// `up ≤ (max − t)·binUp` and `down ≤ (t − min)·binDown`.
pub struct DiscretePstTapFiller {
    psts: Vec<RangeAction>,
    tap_ranges: HashMap<String, (i32, i32)>,
}

impl DiscretePstTapFiller {
    pub fn new(
        range_actions: &[RangeAction],
        initial: &RangeActionActivation,
        pre_perimeter: &RangeActionActivation,
    ) -> CoreResult<Self> {
        let mut psts = Vec::new();
        let mut tap_ranges = HashMap::new();
        for ra in range_actions {
            if let Some(pst) = ra.as_pst() {
                tap_ranges.insert(ra.id.clone(), admissible_taps(ra, pst, initial, pre_perimeter)?);
                psts.push(ra.clone());
            }
        }
        Ok(Self { psts, tap_ranges })
    }

    fn slopes(pst: &PstRange, tap: i32, min: i32, max: i32, mode: SlopeMode) -> CoreResult<(f64, f64)> {
        let angle = pst.angle(tap)?;
        let (up_target, down_target) = match mode {
            SlopeMode::WholeRange => (max, min),
            SlopeMode::SingleTap => ((tap + 1).min(max), (tap - 1).max(min)),
        };
        let up = if up_target > tap {
            (pst.angle(up_target)? - angle) / f64::from(up_target - tap)
        } else {
            0.0
        };
        let down = if down_target < tap {
            (pst.angle(down_target)? - angle) / f64::from(tap - down_target)
        } else {
            0.0
        };
        Ok((up, down))
    }

    fn tap_range(&self, ra: &RangeAction) -> CoreResult<(i32, i32)> {
        self.tap_ranges
            .get(&ra.id)
            .copied()
            .ok_or_else(|| RaoError::Validation(format!("no tap range for '{}'", ra.id)))
    }

    fn refresh(&self, problem: &mut LinearProblem, activation: &RangeActionActivation, mode: SlopeMode) -> CoreResult<()> {
        for ra in &self.psts {
            let Some(pst) = ra.as_pst() else { continue };
            let (min, max) = self.tap_range(ra)?;
            let tap = current_tap(ra, pst, activation)?.clamp(min, max);
            let (up_slope, down_slope) = Self::slopes(pst, tap, min, max, mode)?;
            let (up_room, down_room) = (f64::from(max - tap), f64::from(tap - min));

            let up = VariableKey::TapVariation {
                action: ra.id.clone(),
                direction: Direction::Up,
            };
            let down = VariableKey::TapVariation {
                action: ra.id.clone(),
                direction: Direction::Down,
            };
            let up_binary = VariableKey::TapVariationBinary {
                action: ra.id.clone(),
                direction: Direction::Up,
            };
            let down_binary = VariableKey::TapVariationBinary {
                action: ra.id.clone(),
                direction: Direction::Down,
            };
            problem.set_variable_bounds(&up, 0.0, up_room)?;
            problem.set_variable_bounds(&down, 0.0, down_room)?;

            let tap_to_angle = ConstraintKey::TapToAngle { action: ra.id.clone() };
            let angle = pst.angle(tap)?;
            problem.set_constraint_bounds(&tap_to_angle, angle, angle)?;
            problem.set_coefficient(&tap_to_angle, &up, -up_slope)?;
            problem.set_coefficient(&tap_to_angle, &down, -down_slope)?;

            let up_link = ConstraintKey::TapVariationBinary {
                action: ra.id.clone(),
                direction: Direction::Up,
            };
            let down_link = ConstraintKey::TapVariationBinary {
                action: ra.id.clone(),
                direction: Direction::Down,
            };
            problem.set_coefficient(&up_link, &up_binary, -up_room)?;
            problem.set_coefficient(&down_link, &down_binary, -down_room)?;
        }
        Ok(())
    }
}

impl ProblemFiller for DiscretePstTapFiller {
    fn name(&self) -> &'static str {
        "discrete-pst-tap"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for ra in &self.psts {
            let setpoint = VariableKey::Setpoint { action: ra.id.clone() };
            for direction in [Direction::Up, Direction::Down] {
                let variation = VariableKey::TapVariation {
                    action: ra.id.clone(),
                    direction,
                };
                let binary = VariableKey::TapVariationBinary {
                    action: ra.id.clone(),
                    direction,
                };
                problem.add_variable(variation.clone(), VariableKind::Integer, 0.0, 0.0)?;
                problem.add_variable(binary.clone(), VariableKind::Binary, 0.0, 1.0)?;

                let link = ConstraintKey::TapVariationBinary {
                    action: ra.id.clone(),
                    direction,
                };
                problem.add_constraint(link.clone(), f64::NEG_INFINITY, 0.0)?;
                problem.set_coefficient(&link, &variation, 1.0)?;
            }

            let tap_to_angle = ConstraintKey::TapToAngle { action: ra.id.clone() };
            problem.add_constraint(tap_to_angle.clone(), 0.0, 0.0)?;
            problem.set_coefficient(&tap_to_angle, &setpoint, 1.0)?;

            let up_or_down = ConstraintKey::UpOrDown { action: ra.id.clone() };
            problem.add_constraint(up_or_down.clone(), f64::NEG_INFINITY, 1.0)?;
            for direction in [Direction::Up, Direction::Down] {
                let binary = VariableKey::TapVariationBinary {
                    action: ra.id.clone(),
                    direction,
                };
                problem.set_coefficient(&up_or_down, &binary, 1.0)?;
            }
        }
        self.refresh(problem, activation, SlopeMode::WholeRange)
    }

    fn update_between_sensitivity_iteration(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.refresh(problem, activation, SlopeMode::WholeRange)
    }

    fn update_between_mip_iteration(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.refresh(problem, activation, SlopeMode::SingleTap)
    }
}

/// One integer tap per group of PSTs sharing a `group_id`:
/// `groupTap − up + down = currentTap` for every member.
pub struct DiscretePstGroupFiller {
    groups: BTreeMap<String, Vec<RangeAction>>,
    group_ranges: BTreeMap<String, (i32, i32)>,
}

impl DiscretePstGroupFiller {
    pub fn new(
        range_actions: &[RangeAction],
        initial: &RangeActionActivation,
        pre_perimeter: &RangeActionActivation,
    ) -> CoreResult<Self> {
        let mut groups: BTreeMap<String, Vec<RangeAction>> = BTreeMap::new();
        let mut group_ranges: BTreeMap<String, (i32, i32)> = BTreeMap::new();
        for ra in range_actions {
            let (Some(group), Some(pst)) = (ra.group_id.as_ref(), ra.as_pst()) else {
                continue;
            };
            let (min, max) = admissible_taps(ra, pst, initial, pre_perimeter)?;
            group_ranges
                .entry(group.clone())
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).max(min);
                    *hi = (*hi).min(max);
                })
                .or_insert((min, max));
            groups.entry(group.clone()).or_default().push(ra.clone());
        }
        Ok(Self { groups, group_ranges })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn refresh(&self, problem: &mut LinearProblem, activation: &RangeActionActivation) -> CoreResult<()> {
        for members in self.groups.values() {
            for ra in members {
                let Some(pst) = ra.as_pst() else { continue };
                let tap = f64::from(current_tap(ra, pst, activation)?);
                let key = ConstraintKey::PstGroupTap { action: ra.id.clone() };
                problem.set_constraint_bounds(&key, tap, tap)?;
            }
        }
        Ok(())
    }
}

impl ProblemFiller for DiscretePstGroupFiller {
    fn name(&self) -> &'static str {
        "discrete-pst-group"
    }

    fn fill(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        for (group, members) in &self.groups {
            let (min, max) = self.group_ranges.get(group).copied().unwrap_or((0, 0));
            let group_tap = VariableKey::GroupTap { group: group.clone() };
            problem.add_variable(group_tap.clone(), VariableKind::Integer, f64::from(min), f64::from(max))?;
            for ra in members {
                let key = ConstraintKey::PstGroupTap { action: ra.id.clone() };
                problem.add_constraint(key.clone(), 0.0, 0.0)?;
                problem.set_coefficient(&key, &group_tap, 1.0)?;
                problem.set_coefficient(
                    &key,
                    &VariableKey::TapVariation {
                        action: ra.id.clone(),
                        direction: Direction::Up,
                    },
                    -1.0,
                )?;
                problem.set_coefficient(
                    &key,
                    &VariableKey::TapVariation {
                        action: ra.id.clone(),
                        direction: Direction::Down,
                    },
                    1.0,
                )?;
            }
        }
        self.refresh(problem, activation)
    }

    fn update_between_sensitivity_iteration(
        &self,
        problem: &mut LinearProblem,
        _flows: &SystematicSensitivityResult,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.refresh(problem, activation)
    }

    fn update_between_mip_iteration(
        &self,
        problem: &mut LinearProblem,
        activation: &RangeActionActivation,
    ) -> CoreResult<()> {
        self.refresh(problem, activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{Range, RangeType};

    fn pst() -> RangeAction {
        // non-linear table: slopes differ per tap
        let table = [(-2, -3.0), (-1, -1.0), (0, 0.0), (1, 1.0), (2, 3.0)].into_iter().collect();
        RangeAction::pst("ra", "pst", table)
    }

    #[test]
    fn test_slopes_whole_range_and_single_tap() {
        let ra = pst();
        let table = ra.as_pst().unwrap();
        let (up, down) = DiscretePstTapFiller::slopes(table, 0, -2, 2, SlopeMode::WholeRange).unwrap();
        assert_eq!((up, down), (1.5, -1.5));
        let (up, down) = DiscretePstTapFiller::slopes(table, 1, -2, 2, SlopeMode::SingleTap).unwrap();
        assert_eq!((up, down), (2.0, -1.0));
        let (up, _) = DiscretePstTapFiller::slopes(table, 2, -2, 2, SlopeMode::SingleTap).unwrap();
        assert_eq!(up, 0.0, "no room above the last tap");
    }

    #[test]
    fn test_tap_range_follows_relative_range() {
        let ra = pst().with_range(Range {
            kind: RangeType::RelativeToPreviousInstant,
            min: -1.0,
            max: 1.0,
        });
        let mut setpoints = RangeActionActivation::new();
        setpoints.set("ra", 1.0);
        let filler = DiscretePstTapFiller::new(&[ra], &setpoints, &setpoints).unwrap();
        assert_eq!(filler.tap_ranges["ra"], (0, 2));
    }
}
