use super::combination::{canonical_id, NetworkActionCombination};
use super::SearchTreeInput;
use crate::activation::{RangeActionActivation, SETPOINT_EPSILON};
use crate::linear_optimization::{IteratingLinearOptimizer, LinearOptimizationStatus, LinearOptimizerInput};
use crate::objective::ObjectiveFunctionResult;
use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{FlowCnec, Network, NetworkAction, RangeAction, RangeActionCategory};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Created,
    Evaluated,
    Optimized,
    Error,
}

/// One node of the search tree: a set of applied network actions, then
/// the range action setpoints found for it.
#[derive(Debug, Clone)]
pub struct Leaf {
    network_actions: Vec<NetworkAction>,
    combination: Option<NetworkActionCombination>,
    status: LeafStatus,
    activation: RangeActionActivation,
    flows: SystematicSensitivityResult,
    objective: ObjectiveFunctionResult,
    linear_status: Option<LinearOptimizationStatus>,
}

impl Leaf {
    /// Root leaf: forced actions only.
    pub fn root(input: &SearchTreeInput) -> Self {
        Self::with_actions(input.perimeter.forced_network_actions().to_vec(), None)
    }

    pub fn child(parent_actions: &[NetworkAction], combination: NetworkActionCombination) -> Self {
        let mut actions = parent_actions.to_vec();
        actions.extend(combination.actions().iter().cloned());
        Self::with_actions(actions, Some(combination))
    }

    fn with_actions(network_actions: Vec<NetworkAction>, combination: Option<NetworkActionCombination>) -> Self {
        Self {
            network_actions,
            combination,
            status: LeafStatus::Created,
            activation: RangeActionActivation::new(),
            flows: SystematicSensitivityResult::default(),
            objective: ObjectiveFunctionResult::default(),
            linear_status: None,
        }
    }

    /// Apply the leaf's network actions on `network` (a clone of the
    /// pre-perimeter network) and compute flows. No-op once evaluated.
    pub fn evaluate(&mut self, network: &mut Network, input: &SearchTreeInput) {
        if self.status != LeafStatus::Created {
            return;
        }
        for na in &self.network_actions {
            if let Err(err) = na.apply(network) {
                warn!(leaf = %self.id(), action = %na.id, %err, "Network action could not be applied");
                self.status = LeafStatus::Error;
                return;
            }
        }
        let range_actions = input.perimeter.range_actions();
        self.activation = match RangeActionActivation::from_network(range_actions, network) {
            Ok(activation) => activation,
            Err(err) => {
                warn!(leaf = %self.id(), %err, "Range action setpoints could not be read");
                self.status = LeafStatus::Error;
                return;
            }
        };
        self.flows = input
            .sensitivity_computer
            .compute(network, &input.sensitivity_request(range_actions));
        self.objective = input.objective_function.evaluate(&self.flows, &self.activation);
        if self.flows.status().is_failure() {
            warn!(leaf = %self.id(), "Sensitivity computation failed, leaf discarded");
            self.status = LeafStatus::Error;
            return;
        }
        self.status = LeafStatus::Evaluated;
        debug!(leaf = %self, "Leaf evaluated");
    }

    /// Optimise range actions on top of the evaluated leaf. `network` must be
    /// the one `evaluate` was called with.
    pub fn optimize(&mut self, network: &Network, input: &SearchTreeInput) {
        if self.status != LeafStatus::Evaluated {
            return;
        }
        let range_actions = self.optimizable_range_actions(input);
        if range_actions.is_empty() {
            self.status = LeafStatus::Optimized;
            return;
        }
        let perimeter = &input.perimeter;
        let linear_input = LinearOptimizerInput {
            network,
            cnecs: perimeter.cnecs(),
            contingencies: perimeter.contingencies(),
            range_actions: &range_actions,
            applied_remedial_actions: &input.applied_remedial_actions,
            initial_setpoints: &input.initial_setpoints,
            pre_perimeter_setpoints: &input.pre_perimeter_setpoints,
            initial_flows: &input.initial_flows,
            pre_perimeter_flows: &input.pre_perimeter_flows,
            starting_flows: &self.flows,
            starting_activation: &self.activation,
            objective_function: &input.objective_function,
            sensitivity_computer: &input.sensitivity_computer,
            solver: input.solver.as_ref(),
            parameters: &input.parameters,
        };
        match IteratingLinearOptimizer::optimize(&linear_input) {
            Ok(result) => {
                self.linear_status = Some(result.status);
                self.activation = result.activation;
                self.flows = result.flows;
                self.objective = result.objective;
            }
            Err(err) => {
                warn!(leaf = %self.id(), %err, "Linear optimization failed, keeping evaluated result");
                self.linear_status = Some(LinearOptimizationStatus::Abnormal);
            }
        }
        self.status = LeafStatus::Optimized;
        debug!(leaf = %self, "Leaf optimized");
    }

    /// Perimeter range actions the MILP may move for this leaf, after
    /// dropping out-of-range ones and applying usage limits.
    pub fn optimizable_range_actions(&self, input: &SearchTreeInput) -> Vec<RangeAction> {
        let mut candidates: Vec<&RangeAction> = input
            .perimeter
            .range_actions()
            .iter()
            .filter(|ra| is_within_range(ra, input))
            .collect();

        let limits = &input.tree_parameters.usage_limits;
        if limits.max_ra.is_none()
            && limits.max_tso.is_none()
            && limits.max_pst_per_tso.is_empty()
            && limits.max_ra_per_tso.is_empty()
        {
            return candidates.into_iter().cloned().collect();
        }

        let most_limiting = input.objective_function.most_limiting_elements(&self.flows, 1);
        let score = |ra: &RangeAction| -> f64 {
            most_limiting.first().map_or(0.0, |cnec| max_abs_sensitivity(&self.flows, ra, cnec))
        };
        candidates.sort_by(|a, b| score(b).total_cmp(&score(a)).then_with(|| a.id.cmp(&b.id)));

        let mut applied_per_tso: BTreeMap<&str, usize> = BTreeMap::new();
        for na in &self.network_actions {
            if let Some(op) = na.operator.as_deref() {
                *applied_per_tso.entry(op).or_default() += 1;
            }
        }
        let mut used_tsos: BTreeSet<&str> = applied_per_tso.keys().copied().collect();
        let mut remaining = limits
            .max_ra
            .map(|max| max.saturating_sub(self.network_actions.len()));
        let mut kept_per_tso: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut kept = Vec::new();

        for ra in candidates {
            if remaining == Some(0) {
                break;
            }
            if let Some(op) = ra.operator.as_deref() {
                let applied = applied_per_tso.get(op).copied().unwrap_or(0);
                let (all, psts) = kept_per_tso.get(op).copied().unwrap_or((0, 0));
                let ra_limit = limits.max_ra_per_tso.get(op).map(|m| m.saturating_sub(applied));
                if ra_limit.is_some_and(|limit| all >= limit) {
                    continue;
                }
                let is_pst = ra.category() == RangeActionCategory::Pst;
                if is_pst {
                    let pst_limit = match (limits.max_pst_per_tso.get(op), ra_limit) {
                        (Some(&pst), Some(all)) => Some(pst.min(all)),
                        (Some(&pst), None) => Some(pst),
                        (None, all) => all,
                    };
                    if pst_limit.is_some_and(|limit| psts >= limit) {
                        continue;
                    }
                }
                if !used_tsos.contains(op) {
                    if limits.max_tso.is_some_and(|max| used_tsos.len() >= max) {
                        continue;
                    }
                    used_tsos.insert(op);
                }
                kept_per_tso.insert(op, (all + 1, psts + usize::from(is_pst)));
            }
            remaining = remaining.map(|r| r - 1);
            kept.push(ra.clone());
        }
        debug!(leaf = %self.id(), kept = kept.len(), "Range actions filtered by usage limits");
        kept
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    /// Optimised without a MILP failure.
    pub fn is_fully_optimized(&self) -> bool {
        self.status == LeafStatus::Optimized
            && !matches!(
                self.linear_status,
                Some(LinearOptimizationStatus::Infeasible | LinearOptimizationStatus::Abnormal)
            )
    }

    pub fn linear_status(&self) -> Option<LinearOptimizationStatus> {
        self.linear_status
    }

    pub fn network_actions(&self) -> &[NetworkAction] {
        &self.network_actions
    }

    pub fn combination(&self) -> Option<&NetworkActionCombination> {
        self.combination.as_ref()
    }

    /// Canonical id of every applied network action, `root` if none.
    pub fn id(&self) -> String {
        if self.network_actions.is_empty() {
            return "root".to_string();
        }
        canonical_id(self.network_actions.iter().map(|na| na.id.as_str()))
    }

    /// Rank of the combination added at this leaf; 0 for the root.
    pub fn rank(&self) -> u64 {
        self.combination.as_ref().map_or(0, NetworkActionCombination::rank)
    }

    pub fn activation(&self) -> &RangeActionActivation {
        &self.activation
    }

    pub fn flows(&self) -> &SystematicSensitivityResult {
        &self.flows
    }

    pub fn objective(&self) -> &ObjectiveFunctionResult {
        &self.objective
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
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] cost {:.2} (functional {:.2}, virtual {:.2})",
            self.id(),
            self.status,
            self.cost(),
            self.functional_cost(),
            self.virtual_cost()
        )
    }
}

fn max_abs_sensitivity(flows: &SystematicSensitivityResult, ra: &RangeAction, cnec: &FlowCnec) -> f64 {
    cnec.sides
        .iter()
        .map(|&side| flows.sensitivity(&ra.id, &cnec.id, side).abs())
        .fold(0.0, f64::max)
}

/// A range action whose pre-perimeter setpoint lies outside its admissible
/// range cannot be optimised consistently.
fn is_within_range(ra: &RangeAction, input: &SearchTreeInput) -> bool {
    let Some(previous) = input.pre_perimeter_setpoints.setpoint(&ra.id) else {
        return true;
    };
    let initial = input.initial_setpoints.setpoint(&ra.id).unwrap_or(previous);
    match ra.admissible_range(initial, previous) {
        Ok((lo, hi)) if previous >= lo - SETPOINT_EPSILON && previous <= hi + SETPOINT_EPSILON => true,
        Ok((lo, hi)) => {
            warn!(action = %ra.id, setpoint = previous, min = lo, max = hi, "Range action outside its range, not optimized");
            false
        }
        Err(err) => {
            warn!(action = %ra.id, %err, "Range action has no admissible setpoint, not optimized");
            false
        }
    }
}
