//! Deterministic simulation of automatons after an outage.
//!
//! Automatons are not optimised: forced network actions fire, and so do
//! flow-guarded ones whose Cnec is overloaded after preventive actions.

use crate::applied::AppliedRemedialActions;
use crate::sensitivity::{SensitivityComputer, SensitivityRequest, SystematicSensitivityResult};
use rao_core::{Contingency, Crac, CoreResult, FlowCnec, Network, NetworkAction, RangeAction, RaoParameters, State, UsageMethod};
use tracing::{debug, info, warn};

/// Network and flows after the automatons of one contingency.
#[derive(Debug, Clone)]
pub struct AutomatonResult {
    pub state: State,
    pub network_actions: Vec<NetworkAction>,
    pub network: Network,
    pub flows: SystematicSensitivityResult,
}

pub struct AutomatonSimulator<'a> {
    crac: &'a Crac,
    sensitivity_computer: &'a SensitivityComputer,
    range_actions: &'a [RangeAction],
    parameters: &'a RaoParameters,
}

impl<'a> AutomatonSimulator<'a> {
    /// `range_actions` are the ones whose sensitivities later curative
    /// searches read.
    pub fn new(
        crac: &'a Crac,
        sensitivity_computer: &'a SensitivityComputer,
        range_actions: &'a [RangeAction],
        parameters: &'a RaoParameters,
    ) -> Self {
        Self {
            crac,
            sensitivity_computer,
            range_actions,
            parameters,
        }
    }

    /// Network actions triggered at `auto_state` given the current flows.
    pub fn triggered_actions(&self, auto_state: &State, flows: &SystematicSensitivityResult) -> Vec<NetworkAction> {
        let unit = self.parameters.objective_function.unit;
        let margin = |cnec: &FlowCnec| flows.margin(cnec, unit);
        self.crac
            .network_actions()
            .filter(|na| match self.crac.usage_method(*na, auto_state) {
                UsageMethod::Forced => true,
                UsageMethod::ToBeEvaluated => self.crac.is_available(*na, auto_state, margin),
                UsageMethod::Available => {
                    debug!(action = %na.id, state = %auto_state, "Available automaton is not forced, ignored");
                    false
                }
                UsageMethod::Unavailable => false,
            })
            .cloned()
            .collect()
    }

    /// Apply the triggered automatons of `auto_state` on a copy of `network`
    /// (post-preventive) and recompute the post-contingency flows.
    pub fn simulate(
        &self,
        auto_state: &State,
        network: &Network,
        flows: &SystematicSensitivityResult,
    ) -> CoreResult<AutomatonResult> {
        let unsupported = self
            .crac
            .range_actions()
            .filter(|ra| self.crac.usage_method(*ra, auto_state) != UsageMethod::Unavailable)
            .count();
        if unsupported > 0 {
            warn!(state = %auto_state, count = unsupported, "Range automatons are not supported, skipped");
        }

        let triggered = self.triggered_actions(auto_state, flows);
        if triggered.is_empty() {
            info!(state = %auto_state, "No automaton triggered");
            return Ok(AutomatonResult {
                state: auto_state.clone(),
                network_actions: Vec::new(),
                network: network.clone(),
                flows: flows.clone(),
            });
        }

        let mut network = network.clone();
        let mut applied = Vec::new();
        for na in triggered {
            if !na.can_apply(&network) {
                warn!(action = %na.id, state = %auto_state, "Automaton cannot be applied, skipped");
                continue;
            }
            na.apply(&mut network)?;
            applied.push(na);
        }
        info!(
            state = %auto_state,
            actions = ?applied.iter().map(|na| na.id.as_str()).collect::<Vec<_>>(),
            "Automatons applied"
        );

        let contingency = auto_state.contingency_id();
        let cnecs: Vec<FlowCnec> = self
            .crac
            .cnecs
            .iter()
            .filter(|c| c.state.contingency_id() == contingency && c.state.instant >= auto_state.instant)
            .cloned()
            .collect();
        let contingencies: Vec<Contingency> = self
            .crac
            .contingencies
            .iter()
            .filter(|c| Some(c.id.as_str()) == contingency)
            .cloned()
            .collect();
        let no_applied = AppliedRemedialActions::new();
        let request = SensitivityRequest {
            cnecs: &cnecs,
            range_actions: self.range_actions,
            contingencies: &contingencies,
            applied_remedial_actions: &no_applied,
            compute_ptdf_sums: self.parameters.relative_margins_enabled(),
            compute_loop_flows: self.parameters.loop_flow.enabled,
        };
        let flows = self.sensitivity_computer.compute(&network, &request);
        if flows.status().is_failure() {
            warn!(state = %auto_state, "Sensitivity computation failed after automatons");
        }
        Ok(AutomatonResult {
            state: auto_state.clone(),
            network_actions: applied,
            network,
            flows,
        })
    }
}
