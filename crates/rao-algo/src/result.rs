//! Results of one perimeter and of a whole optimisation.

use crate::activation::RangeActionActivation;
use crate::objective::ObjectiveFunctionResult;
use crate::search_tree::{Leaf, LeafStatus};
use crate::sensitivity::{ComputationStatus, SystematicSensitivityResult};
use rao_core::{Crac, CoreResult, Network, NetworkAction, RangeAction, Side, State, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Best leaf of one search tree, detached from the tree.
#[derive(Debug, Clone)]
pub struct PerimeterResult {
    pub state: State,
    pub status: LeafStatus,
    /// Applied network actions, forced ones included.
    pub network_actions: Vec<NetworkAction>,
    /// Range actions of the perimeter.
    pub range_actions: Vec<RangeAction>,
    pub activation: RangeActionActivation,
    pub pre_perimeter_activation: RangeActionActivation,
    pub flows: SystematicSensitivityResult,
    pub objective: ObjectiveFunctionResult,
}

impl PerimeterResult {
    pub fn from_leaf(
        state: State,
        leaf: Leaf,
        range_actions: Vec<RangeAction>,
        pre_perimeter_activation: RangeActionActivation,
    ) -> Self {
        Self {
            state,
            status: leaf.status(),
            network_actions: leaf.network_actions().to_vec(),
            range_actions,
            activation: leaf.activation().clone(),
            pre_perimeter_activation,
            flows: leaf.flows().clone(),
            objective: leaf.objective().clone(),
        }
    }

    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    pub fn functional_cost(&self) -> f64 {
        self.objective.functional_cost
    }

    pub fn virtual_cost(&self) -> f64 {
        self.objective.virtual_cost()
    }

    /// Range actions moved away from their pre-perimeter setpoint.
    pub fn activated_range_actions(&self) -> Vec<&RangeAction> {
        let moved: Vec<&str> = self
            .activation
            .activated_against(&self.pre_perimeter_activation)
            .collect();
        self.range_actions
            .iter()
            .filter(|ra| moved.contains(&ra.id.as_str()))
            .collect()
    }

    /// Carry the setpoints of `range_actions` over from `other`, for range
    /// actions this perimeter could not move itself.
    pub fn carry_range_actions(&mut self, other: &PerimeterResult, range_actions: &[RangeAction]) {
        for ra in range_actions {
            let Some(setpoint) = other.activation.setpoint(&ra.id) else {
                continue;
            };
            self.activation.set(ra.id.clone(), setpoint);
            if let Some(pre) = other.pre_perimeter_activation.setpoint(&ra.id) {
                self.pre_perimeter_activation.set(ra.id.clone(), pre);
            }
            if !self.range_actions.iter().any(|known| known.id == ra.id) {
                self.range_actions.push(ra.clone());
            }
        }
    }

    /// Write the network actions and setpoints on `network`.
    pub fn apply_on(&self, network: &mut Network) -> CoreResult<()> {
        for na in &self.network_actions {
            na.apply(network)?;
        }
        self.activation.apply_on(network, &self.range_actions)
    }
}

/// Point of the optimisation at which costs and flows are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationInstant {
    Initial,
    AfterPra,
    AfterAra,
    AfterCra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationStepsExecuted {
    FirstPreventiveOnly,
    FirstPreventiveFellBackToInitialSituation,
    SecondPreventiveImprovedFirst,
    SecondPreventiveFellBackToFirstPreventiveSituation,
    SecondPreventiveFellBackToInitialSituation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeActionResult {
    pub setpoint: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<i32>,
    pub activated: bool,
}

/// Decisions and status of one state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    pub computation_status: ComputationStatus,
    pub activated_network_actions: Vec<String>,
    pub range_actions: BTreeMap<String, RangeActionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnecResult {
    pub cnec: String,
    pub state: String,
    pub instant: OptimizationInstant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_side_one: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_side_two: Option<f64>,
    /// Worst margin in the objective unit; `None` when the flow is unknown.
    pub margin: Option<f64>,
}

/// Final artifact of an optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaoResult {
    pub optimization_steps_executed: OptimizationStepsExecuted,
    pub costs: BTreeMap<OptimizationInstant, ObjectiveFunctionResult>,
    /// Keyed by state id.
    pub states: BTreeMap<String, StateResult>,
    pub cnecs: Vec<CnecResult>,
}

impl RaoResult {
    pub fn new(optimization_steps_executed: OptimizationStepsExecuted) -> Self {
        Self {
            optimization_steps_executed,
            costs: BTreeMap::new(),
            states: BTreeMap::new(),
            cnecs: Vec::new(),
        }
    }

    /// Record costs, flows and state statuses seen at `instant`.
    pub fn record_instant(
        &mut self,
        instant: OptimizationInstant,
        crac: &Crac,
        flows: &SystematicSensitivityResult,
        objective: ObjectiveFunctionResult,
        unit: Unit,
    ) {
        self.costs.insert(instant, objective);
        self.cnecs.retain(|c| c.instant != instant);
        for cnec in &crac.cnecs {
            let margin = flows.margin(cnec, unit);
            self.cnecs.push(CnecResult {
                cnec: cnec.id.clone(),
                state: cnec.state.id(),
                instant,
                flow_side_one: flows.flow(&cnec.id, Side::One),
                flow_side_two: flows.flow(&cnec.id, Side::Two),
                margin: margin.is_finite().then_some(margin),
            });
        }
        for state in crac.states() {
            self.states.entry(state.id()).or_default().computation_status = flows.state_status(&state);
        }
    }

    /// Record the decisions of a perimeter on its main state.
    pub fn record_perimeter(&mut self, perimeter: &PerimeterResult) {
        let entry = self.states.entry(perimeter.state.id()).or_default();
        entry.activated_network_actions = perimeter.network_actions.iter().map(|na| na.id.clone()).collect();
        entry.range_actions.clear();
        let activated: Vec<&str> = perimeter
            .activated_range_actions()
            .into_iter()
            .map(|ra| ra.id.as_str())
            .collect();
        for ra in &perimeter.range_actions {
            if let Some(setpoint) = perimeter.activation.setpoint(&ra.id) {
                entry.range_actions.insert(
                    ra.id.clone(),
                    RangeActionResult {
                        setpoint,
                        tap: perimeter.activation.tap(ra),
                        activated: activated.contains(&ra.id.as_str()),
                    },
                );
            }
        }
    }

    /// Record network actions triggered at a state outside any search.
    pub fn record_network_actions(&mut self, state: &State, actions: &[NetworkAction]) {
        self.states
            .entry(state.id())
            .or_default()
            .activated_network_actions = actions.iter().map(|na| na.id.clone()).collect();
    }

    pub fn cost(&self, instant: OptimizationInstant) -> Option<f64> {
        self.costs.get(&instant).map(ObjectiveFunctionResult::cost)
    }

    pub fn functional_cost(&self, instant: OptimizationInstant) -> Option<f64> {
        self.costs.get(&instant).map(|c| c.functional_cost)
    }

    pub fn virtual_cost(&self, instant: OptimizationInstant) -> Option<f64> {
        self.costs.get(&instant).map(ObjectiveFunctionResult::virtual_cost)
    }

    /// Costs of the last recorded instant.
    pub fn final_costs(&self) -> Option<(OptimizationInstant, &ObjectiveFunctionResult)> {
        self.costs.iter().next_back().map(|(i, c)| (*i, c))
    }

    pub fn final_cost(&self) -> f64 {
        self.final_costs().map_or(0.0, |(_, c)| c.cost())
    }

    /// Every optimized Cnec has a positive margin after the last instant.
    pub fn is_secure(&self) -> bool {
        self.final_costs()
            .is_some_and(|(_, c)| c.functional_cost < 0.0 && c.virtual_cost() <= 0.0)
    }

    pub fn computation_status(&self, state: &State) -> ComputationStatus {
        self.states
            .get(&state.id())
            .map_or(ComputationStatus::Default, |s| s.computation_status)
    }

    /// Failure if any state failed, fallback if any state fell back.
    pub fn global_computation_status(&self) -> ComputationStatus {
        let statuses = self.states.values().map(|s| s.computation_status);
        statuses.fold(ComputationStatus::Default, |acc, s| match (acc, s) {
            (ComputationStatus::Failure, _) | (_, ComputationStatus::Failure) => ComputationStatus::Failure,
            (ComputationStatus::Fallback, _) | (_, ComputationStatus::Fallback) => ComputationStatus::Fallback,
            _ => ComputationStatus::Default,
        })
    }

    pub fn activated_network_actions(&self, state: &State) -> Vec<&str> {
        self.states
            .get(&state.id())
            .map(|s| s.activated_network_actions.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_activated(&self, state: &State, remedial_action: &str) -> bool {
        self.states.get(&state.id()).is_some_and(|s| {
            s.activated_network_actions.iter().any(|id| id == remedial_action)
                || s.range_actions.get(remedial_action).is_some_and(|r| r.activated)
        })
    }

    pub fn setpoint(&self, state: &State, range_action: &str) -> Option<f64> {
        self.states
            .get(&state.id())
            .and_then(|s| s.range_actions.get(range_action))
            .map(|r| r.setpoint)
    }

    pub fn tap(&self, state: &State, range_action: &str) -> Option<i32> {
        self.states
            .get(&state.id())
            .and_then(|s| s.range_actions.get(range_action))
            .and_then(|r| r.tap)
    }

    pub fn margin(&self, cnec: &str, instant: OptimizationInstant) -> Option<f64> {
        self.cnecs
            .iter()
            .find(|c| c.cnec == cnec && c.instant == instant)
            .and_then(|c| c.margin)
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
