use super::ComputationStatus;
use rao_core::{FlowCnec, Side, State, Unit};
use std::collections::{BTreeMap, HashMap};

/// Flows and sensitivities returned by one oracle run.
///
/// Flows are always stored in MW; conversions to the objective unit happen
/// through the Cnec. A Cnec whose flow is missing (its state failed) has an
/// infinite margin so it never drives the functional cost; the failure is
/// priced by the sensitivity-failure evaluator instead.
#[derive(Debug, Clone, Default)]
pub struct SystematicSensitivityResult {
    status: ComputationStatus,
    state_status: BTreeMap<State, ComputationStatus>,
    flows: HashMap<(String, Side), f64>,
    ptdf_sums: HashMap<(String, Side), f64>,
    loop_flows: HashMap<(String, Side), f64>,
    sensitivities: HashMap<(String, String, Side), f64>,
}

impl SystematicSensitivityResult {
    pub fn new(status: ComputationStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Empty result of a computation that failed everywhere.
    pub fn failed() -> Self {
        Self::new(ComputationStatus::Failure)
    }

    pub fn status(&self) -> ComputationStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ComputationStatus) {
        self.status = status;
    }

    /// Status of one state; states never computed inherit the global status.
    pub fn state_status(&self, state: &State) -> ComputationStatus {
        self.state_status.get(state).copied().unwrap_or(self.status)
    }

    pub fn set_state_status(&mut self, state: &State, status: ComputationStatus) {
        self.state_status.insert(state.clone(), status);
    }

    pub fn state_statuses(&self) -> impl Iterator<Item = (&State, ComputationStatus)> {
        self.state_status.iter().map(|(s, st)| (s, *st))
    }

    /// Re-label every non-failed state (used after a fallback retry).
    pub(crate) fn mark_fallback(&mut self) {
        self.status = ComputationStatus::Fallback;
        for status in self.state_status.values_mut() {
            if !status.is_failure() {
                *status = ComputationStatus::Fallback;
            }
        }
    }

    pub fn set_flow(&mut self, cnec: &str, side: Side, flow_mw: f64) {
        self.flows.insert((cnec.to_string(), side), flow_mw);
    }

    pub fn set_ptdf_sum(&mut self, cnec: &str, side: Side, value: f64) {
        self.ptdf_sums.insert((cnec.to_string(), side), value);
    }

    pub fn set_loop_flow(&mut self, cnec: &str, side: Side, value: f64) {
        self.loop_flows.insert((cnec.to_string(), side), value);
    }

    pub fn set_sensitivity(&mut self, range_action: &str, cnec: &str, side: Side, value: f64) {
        self.sensitivities
            .insert((range_action.to_string(), cnec.to_string(), side), value);
    }

    pub fn flow(&self, cnec: &str, side: Side) -> Option<f64> {
        self.flows.get(&(cnec.to_string(), side)).copied()
    }

    pub fn ptdf_sum(&self, cnec: &str, side: Side) -> Option<f64> {
        self.ptdf_sums.get(&(cnec.to_string(), side)).copied()
    }

    pub fn loop_flow(&self, cnec: &str, side: Side) -> Option<f64> {
        self.loop_flows.get(&(cnec.to_string(), side)).copied()
    }

    /// Flow sensitivity in MW per setpoint unit; zero when not computed.
    pub fn sensitivity(&self, range_action: &str, cnec: &str, side: Side) -> f64 {
        self.sensitivities
            .get(&(range_action.to_string(), cnec.to_string(), side))
            .copied()
            .unwrap_or(0.0)
    }

    /// Margin of one side in `unit`.
    pub fn side_margin(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        match self.flow(&cnec.id, side) {
            Some(flow) => cnec.compute_margin(flow, side, unit),
            None => f64::INFINITY,
        }
    }

    /// Worst margin across the Cnec's sides.
    pub fn margin(&self, cnec: &FlowCnec, unit: Unit) -> f64 {
        cnec.sides
            .iter()
            .map(|&side| self.side_margin(cnec, side, unit))
            .fold(f64::INFINITY, f64::min)
    }

    /// Worst relative margin: positive margins are divided by the PTDF zonal
    /// sum floored at `ptdf_sum_lower_bound`, negative ones are kept as is.
    pub fn relative_margin(&self, cnec: &FlowCnec, unit: Unit, ptdf_sum_lower_bound: f64) -> f64 {
        cnec.sides
            .iter()
            .map(|&side| {
                let margin = self.side_margin(cnec, side, unit);
                if margin > 0.0 {
                    let ptdf = self.ptdf_sum(&cnec.id, side).unwrap_or(0.0);
                    margin / ptdf.max(ptdf_sum_lower_bound)
                } else {
                    margin
                }
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Loop flow above the Cnec's loop-flow threshold, worst side, in MW.
    pub fn loop_flow_excess(&self, cnec: &FlowCnec) -> f64 {
        let Some(threshold) = cnec.loop_flow_threshold_mw() else {
            return 0.0;
        };
        cnec.sides
            .iter()
            .filter_map(|&side| self.loop_flow(&cnec.id, side))
            .map(|lf| (lf.abs() - threshold).max(0.0))
            .fold(0.0, f64::max)
    }

    /// Take the flows and state statuses of `cnecs` from `other`. Used to
    /// assemble one view of a network after several perimeters.
    pub fn overwrite_with<'a>(&mut self, other: &Self, cnecs: impl IntoIterator<Item = &'a FlowCnec>) {
        for cnec in cnecs {
            for &side in &cnec.sides {
                let key = (cnec.id.clone(), side);
                for (target, source) in [
                    (&mut self.flows, &other.flows),
                    (&mut self.ptdf_sums, &other.ptdf_sums),
                    (&mut self.loop_flows, &other.loop_flows),
                ] {
                    match source.get(&key) {
                        Some(&value) => target.insert(key.clone(), value),
                        None => target.remove(&key),
                    };
                }
            }
            self.set_state_status(&cnec.state, other.state_status(&cnec.state));
        }
    }

    /// The `n` Cnecs with the lowest margin, worst first. Ties keep id order.
    pub fn most_limiting_elements<'a>(
        &self,
        cnecs: impl IntoIterator<Item = &'a FlowCnec>,
        unit: Unit,
        n: usize,
    ) -> Vec<&'a FlowCnec> {
        let mut ranked: Vec<(&FlowCnec, f64)> = cnecs
            .into_iter()
            .map(|c| (c, self.margin(c, unit)))
            .filter(|(_, m)| m.is_finite())
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
        ranked.into_iter().take(n).map(|(c, _)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::Threshold;

    #[test]
    fn test_margin_is_worst_side_and_missing_flow_is_ignored() {
        let cnec = FlowCnec::new("c", "l", State::preventive())
            .with_sides(vec![Side::One, Side::Two])
            .with_threshold(Threshold::symmetric_mw(100.0));
        let mut result = SystematicSensitivityResult::new(ComputationStatus::Default);
        assert_eq!(result.margin(&cnec, Unit::Megawatt), f64::INFINITY);
        result.set_flow("c", Side::One, 80.0);
        result.set_flow("c", Side::Two, -95.0);
        assert!((result.margin(&cnec, Unit::Megawatt) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_relative_margin_floors_ptdf() {
        let cnec = FlowCnec::new("c", "l", State::preventive())
            .with_threshold(Threshold::symmetric_mw(100.0));
        let mut result = SystematicSensitivityResult::new(ComputationStatus::Default);
        result.set_flow("c", Side::One, 50.0);
        result.set_ptdf_sum("c", Side::One, 0.001);
        let relative = result.relative_margin(&cnec, Unit::Megawatt, 0.5);
        assert!((relative - 100.0).abs() < 1e-9, "50 / max(0.001, 0.5), got {relative}");
        result.set_flow("c", Side::One, 150.0);
        assert!((result.relative_margin(&cnec, Unit::Megawatt, 0.5) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_overwrite_with_takes_flows_and_status() {
        let cur = State::post_contingency(rao_core::Instant::Curative, "co");
        let a = FlowCnec::new("a", "l", State::preventive());
        let b = FlowCnec::new("b", "l", cur.clone());
        let mut merged = SystematicSensitivityResult::new(ComputationStatus::Default);
        merged.set_flow("a", Side::One, 1.0);
        merged.set_flow("b", Side::One, 2.0);
        let mut curative = SystematicSensitivityResult::new(ComputationStatus::Default);
        curative.set_state_status(&cur, ComputationStatus::Failure);
        merged.overwrite_with(&curative, [&b]);
        assert_eq!(merged.flow("a", Side::One), Some(1.0));
        assert_eq!(merged.flow("b", Side::One), None, "failed state has no flow");
        assert!(merged.state_status(&cur).is_failure());
    }

    #[test]
    fn test_most_limiting_elements_order() {
        let a = FlowCnec::new("a", "l", State::preventive()).with_threshold(Threshold::symmetric_mw(100.0));
        let b = FlowCnec::new("b", "l", State::preventive()).with_threshold(Threshold::symmetric_mw(100.0));
        let mut result = SystematicSensitivityResult::default();
        result.set_flow("a", Side::One, 10.0);
        result.set_flow("b", Side::One, 90.0);
        let worst = result.most_limiting_elements([&a, &b], Unit::Megawatt, 1);
        assert_eq!(worst[0].id, "b");
    }
}
