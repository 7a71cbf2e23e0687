use super::{
    ComputationStatus, SensitivityMode, SensitivityOracle, SensitivityRequest,
    SystematicSensitivityResult,
};
use rao_core::{CoreResult, FlowCnec, Network, RangeAction, RangeActionKind, RaoError, State};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// When the model pretends the computation diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    Never,
    /// Fail with default parameters, succeed in fallback mode.
    DefaultModeOnly,
    Always,
}

/// Data-driven linear flow oracle.
///
/// The flow of a Cnec is
/// `reference + Σ outage impacts of open branches + Σ sensitivity · (value − base)`
/// where the sum runs over every element with a sensitivity on that Cnec and
/// `value` is the PST angle or the injection/HVDC setpoint found on the
/// network. Both sides of a branch carry the same flow.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearFlowModel {
    /// Cnec id → flow in MW with every branch closed and base values applied.
    pub reference_flows: BTreeMap<String, f64>,
    /// Branch id → Cnec id → flow change in MW when the branch is open.
    pub outage_impacts: BTreeMap<String, BTreeMap<String, f64>>,
    /// Element id → Cnec id → MW per setpoint unit (degree for PSTs).
    pub element_sensitivities: BTreeMap<String, BTreeMap<String, f64>>,
    /// Element id → setpoint at which the reference flows hold.
    pub base_values: BTreeMap<String, f64>,
    /// Cnec id → zonal PTDF sum, defaults to 1.
    pub ptdf_sums: BTreeMap<String, f64>,
    /// Cnec id → commercial flow; loop flow is flow minus this value.
    pub commercial_flows: BTreeMap<String, f64>,
    pub failure_mode: FailureMode,
    /// Contingencies whose states always fail.
    pub failing_contingencies: BTreeSet<String>,
    /// Number of initial calls reported as failed.
    pub fail_first_calls: usize,
    #[serde(skip)]
    calls: AtomicUsize,
}

impl Clone for LinearFlowModel {
    fn clone(&self) -> Self {
        Self {
            reference_flows: self.reference_flows.clone(),
            outage_impacts: self.outage_impacts.clone(),
            element_sensitivities: self.element_sensitivities.clone(),
            base_values: self.base_values.clone(),
            ptdf_sums: self.ptdf_sums.clone(),
            commercial_flows: self.commercial_flows.clone(),
            failure_mode: self.failure_mode,
            failing_contingencies: self.failing_contingencies.clone(),
            fail_first_calls: self.fail_first_calls,
            calls: AtomicUsize::new(self.calls.load(Ordering::SeqCst)),
        }
    }
}

impl LinearFlowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_flow(mut self, cnec: &str, flow_mw: f64) -> Self {
        self.reference_flows.insert(cnec.to_string(), flow_mw);
        self
    }

    pub fn with_sensitivity(mut self, element: &str, cnec: &str, mw_per_unit: f64) -> Self {
        self.element_sensitivities
            .entry(element.to_string())
            .or_default()
            .insert(cnec.to_string(), mw_per_unit);
        self
    }

    pub fn with_outage_impact(mut self, branch: &str, cnec: &str, delta_mw: f64) -> Self {
        self.outage_impacts
            .entry(branch.to_string())
            .or_default()
            .insert(cnec.to_string(), delta_mw);
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Number of `compute` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn element_value(&self, network: &Network, element: &str) -> CoreResult<f64> {
        match network.phase_shifters.get(element) {
            Some(pst) => pst.angle(),
            None => Ok(network.setpoint(element)),
        }
    }

    fn flow(&self, network: &Network, cnec: &FlowCnec) -> CoreResult<f64> {
        if network.branches.get(&cnec.element).is_some_and(|b| !b.connected) {
            return Ok(0.0);
        }
        let mut flow = self.reference_flows.get(&cnec.id).copied().unwrap_or(0.0);
        for (branch, impacts) in &self.outage_impacts {
            if network.branches.get(branch).is_some_and(|b| !b.connected) {
                flow += impacts.get(&cnec.id).copied().unwrap_or(0.0);
            }
        }
        for (element, per_cnec) in &self.element_sensitivities {
            if let Some(sensitivity) = per_cnec.get(&cnec.id) {
                let base = self.base_values.get(element).copied().unwrap_or(0.0);
                flow += sensitivity * (self.element_value(network, element)? - base);
            }
        }
        Ok(flow)
    }

    fn element_sensitivity(&self, element: &str, cnec: &str) -> f64 {
        self.element_sensitivities
            .get(element)
            .and_then(|m| m.get(cnec))
            .copied()
            .unwrap_or(0.0)
    }

    fn range_action_sensitivity(&self, ra: &RangeAction, cnec: &str) -> f64 {
        match &ra.kind {
            RangeActionKind::Pst(pst) => self.element_sensitivity(&pst.element, cnec),
            RangeActionKind::Hvdc { element } => self.element_sensitivity(element, cnec),
            RangeActionKind::Injection { distribution_keys } => distribution_keys
                .iter()
                .map(|(element, key)| key * self.element_sensitivity(element, cnec))
                .sum(),
            RangeActionKind::CounterTrade { .. } => self.element_sensitivity(&ra.id, cnec),
        }
    }

    /// Network of one state: contingency elements opened and the state's
    /// post-contingency actions applied.
    fn state_network(
        &self,
        network: &Network,
        state: &State,
        request: &SensitivityRequest<'_>,
    ) -> CoreResult<Network> {
        let mut state_network = network.clone();
        if let Some(co_id) = state.contingency_id() {
            let contingency = request
                .contingencies
                .iter()
                .find(|c| c.id == co_id)
                .ok_or_else(|| RaoError::Sensitivity(format!("unknown contingency '{co_id}'")))?;
            for element in &contingency.elements {
                if state_network.branches.contains_key(element) {
                    state_network.set_connected(element, false)?;
                }
            }
        }
        request
            .applied_remedial_actions
            .apply_for(&mut state_network, state)?;
        Ok(state_network)
    }
}

impl SensitivityOracle for LinearFlowModel {
    fn name(&self) -> &str {
        "linear-flow-model"
    }

    fn compute(
        &self,
        network: &Network,
        request: &SensitivityRequest<'_>,
        mode: SensitivityMode,
    ) -> CoreResult<SystematicSensitivityResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let forced_failure = call < self.fail_first_calls
            || match self.failure_mode {
                FailureMode::Never => false,
                FailureMode::DefaultModeOnly => mode == SensitivityMode::Default,
                FailureMode::Always => true,
            };
        if forced_failure {
            return Ok(SystematicSensitivityResult::failed());
        }

        let status = match mode {
            SensitivityMode::Default => ComputationStatus::Default,
            SensitivityMode::Fallback => ComputationStatus::Fallback,
        };
        let mut result = SystematicSensitivityResult::new(status);

        let mut by_state: BTreeMap<&State, Vec<&FlowCnec>> = BTreeMap::new();
        for cnec in request.cnecs {
            by_state.entry(&cnec.state).or_default().push(cnec);
        }

        for (state, cnecs) in by_state {
            if state
                .contingency_id()
                .is_some_and(|co| self.failing_contingencies.contains(co))
            {
                result.set_state_status(state, ComputationStatus::Failure);
                continue;
            }
            let state_network = self.state_network(network, state, request)?;
            for cnec in cnecs {
                let flow = self.flow(&state_network, cnec)?;
                for &side in &cnec.sides {
                    result.set_flow(&cnec.id, side, flow);
                    if request.compute_ptdf_sums {
                        let ptdf = self.ptdf_sums.get(&cnec.id).copied().unwrap_or(1.0);
                        result.set_ptdf_sum(&cnec.id, side, ptdf);
                    }
                    if request.compute_loop_flows {
                        let commercial = self.commercial_flows.get(&cnec.id).copied().unwrap_or(0.0);
                        result.set_loop_flow(&cnec.id, side, flow - commercial);
                    }
                    for ra in request.range_actions {
                        let sensitivity = self.range_action_sensitivity(ra, &cnec.id);
                        if sensitivity != 0.0 {
                            result.set_sensitivity(&ra.id, &cnec.id, side, sensitivity);
                        }
                    }
                }
            }
            result.set_state_status(state, status);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied::AppliedRemedialActions;
    use rao_core::{Contingency, Instant, Side, Threshold};

    fn network() -> Network {
        let mut network = Network::new("n");
        network.add_branch("line", "A", "B");
        network.add_branch("other", "A", "B");
        network.add_phase_shifter("pst", 0, (-5..=5).map(|t| (t, t as f64)).collect());
        network
    }

    #[test]
    fn test_flow_combines_reference_outage_and_setpoints() {
        let model = LinearFlowModel::new()
            .with_reference_flow("c-prev", 100.0)
            .with_reference_flow("c-cur", 100.0)
            .with_outage_impact("other", "c-cur", 40.0)
            .with_sensitivity("pst", "c-prev", -5.0)
            .with_sensitivity("pst", "c-cur", -5.0);
        let prev = FlowCnec::new("c-prev", "line", State::preventive())
            .with_threshold(Threshold::symmetric_mw(200.0));
        let cur = FlowCnec::new("c-cur", "line", State::post_contingency(Instant::Curative, "co"))
            .with_threshold(Threshold::symmetric_mw(200.0));
        let cnecs = vec![prev, cur];
        let contingencies = vec![Contingency::new("co", vec!["other".into()])];
        let pst = RangeAction::pst("pst-ra", "pst", (-5..=5).map(|t| (t, t as f64)).collect());
        let range_actions = vec![pst];
        let applied = AppliedRemedialActions::new();
        let request = SensitivityRequest {
            cnecs: &cnecs,
            range_actions: &range_actions,
            contingencies: &contingencies,
            applied_remedial_actions: &applied,
            compute_ptdf_sums: false,
            compute_loop_flows: true,
        };

        let mut net = network();
        net.set_pst_tap("pst", 2).unwrap();
        let result = model.compute(&net, &request, SensitivityMode::Default).unwrap();
        assert_eq!(result.flow("c-prev", Side::One), Some(90.0));
        assert_eq!(result.flow("c-cur", Side::One), Some(130.0));
        assert_eq!(result.sensitivity("pst-ra", "c-cur", Side::One), -5.0);
        assert_eq!(result.loop_flow("c-prev", Side::One), Some(90.0));
        assert!(net.is_connected("other").unwrap(), "oracle must not mutate the network");
    }

    #[test]
    fn test_failure_modes() {
        let model = LinearFlowModel::new().with_failure_mode(FailureMode::DefaultModeOnly);
        let applied = AppliedRemedialActions::new();
        let request = SensitivityRequest {
            cnecs: &[],
            range_actions: &[],
            contingencies: &[],
            applied_remedial_actions: &applied,
            compute_ptdf_sums: false,
            compute_loop_flows: false,
        };
        let net = network();
        let default = model.compute(&net, &request, SensitivityMode::Default).unwrap();
        assert_eq!(default.status(), ComputationStatus::Failure);
        let fallback = model.compute(&net, &request, SensitivityMode::Fallback).unwrap();
        assert_eq!(fallback.status(), ComputationStatus::Fallback);
        assert_eq!(model.call_count(), 2);
    }
}
