//! Candidate generation for the next search depth.

use super::combination::{canonical_id, NetworkActionCombination};
use super::leaf::Leaf;
use super::parameters::TreeParameters;
use crate::activation::RangeActionActivation;
use crate::perimeter::OptimizationPerimeter;
use rao_core::{AreaGraph, FlowCnec, Network, NetworkAction, RangeAction, RangeActionCategory};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct Bloomer<'a> {
    perimeter: &'a OptimizationPerimeter,
    parameters: &'a TreeParameters,
    network: &'a Network,
    area_graph: Option<AreaGraph>,
}

impl<'a> Bloomer<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter, parameters: &'a TreeParameters, network: &'a Network) -> Self {
        let area_graph = parameters
            .skip_actions_far_from_most_limiting_element
            .then(|| network.area_graph());
        Self {
            perimeter,
            parameters,
            network,
            area_graph,
        }
    }

    /// Combinations to try on top of `leaf`, sorted by rank.
    ///
    /// `tried` holds the canonical ids of action sets already evaluated;
    /// `pre_perimeter` tells which range actions the leaf moved.
    pub fn bloom(
        &self,
        leaf: &Leaf,
        pre_perimeter: &RangeActionActivation,
        most_limiting: &[FlowCnec],
        tried: &BTreeSet<String>,
    ) -> Vec<NetworkActionCombination> {
        let applied: BTreeSet<&str> = leaf.network_actions().iter().map(|na| na.id.as_str()).collect();
        let mut candidates: BTreeMap<String, NetworkActionCombination> = BTreeMap::new();

        for predefined in &self.parameters.predefined_combinations {
            let pending: Vec<&str> = predefined
                .iter()
                .map(String::as_str)
                .filter(|id| !applied.contains(id))
                .collect();
            if pending.is_empty() {
                continue;
            }
            let actions: Option<Vec<NetworkAction>> = pending
                .iter()
                .map(|id| self.perimeter.network_action(id).cloned())
                .collect();
            if let Some(actions) = actions {
                let combination = NetworkActionCombination::new(actions, false);
                candidates.entry(combination.id()).or_insert(combination);
            }
        }
        for na in self.perimeter.network_actions() {
            if !applied.contains(na.id.as_str()) {
                let combination = NetworkActionCombination::single(na.clone());
                candidates.entry(combination.id()).or_insert(combination);
            }
        }
        let generated = candidates.len();

        let activated: Vec<&RangeAction> = {
            let moved: BTreeSet<&str> = leaf.activation().activated_against(pre_perimeter).collect();
            self.perimeter
                .range_actions()
                .iter()
                .filter(|ra| moved.contains(ra.id.as_str()))
                .collect()
        };
        let most_limiting_areas: BTreeSet<String> = most_limiting
            .iter()
            .flat_map(|cnec| self.network.areas_of(&cnec.element))
            .collect();

        let mut combinations: Vec<NetworkActionCombination> = candidates
            .into_values()
            .filter(|c| {
                let full = canonical_id(applied.iter().copied().chain(c.actions().iter().map(|na| na.id.as_str())));
                !tried.contains(&full)
            })
            .filter(|c| self.respects_max_ra(leaf, &activated, c))
            .filter(|c| self.respects_max_tso(leaf, &activated, c))
            .filter(|c| self.respects_max_topo_per_tso(leaf, &activated, c))
            .filter(|c| self.is_close_to(&most_limiting_areas, c))
            .collect();
        combinations.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.id().cmp(&b.id())));
        debug!(
            leaf = %leaf.id(),
            generated,
            kept = combinations.len(),
            "Network action combinations bloomed"
        );
        combinations
    }

    /// Applied network actions and activated range actions both count.
    fn respects_max_ra(&self, leaf: &Leaf, activated: &[&RangeAction], combination: &NetworkActionCombination) -> bool {
        self.parameters
            .usage_limits
            .max_ra
            .map_or(true, |max| leaf.network_actions().len() + activated.len() + combination.len() <= max)
    }

    fn respects_max_tso(&self, leaf: &Leaf, activated: &[&RangeAction], combination: &NetworkActionCombination) -> bool {
        let Some(max) = self.parameters.usage_limits.max_tso else {
            return true;
        };
        let tsos: BTreeSet<&str> = leaf
            .network_actions()
            .iter()
            .filter_map(|na| na.operator.as_deref())
            .chain(activated.iter().filter_map(|ra| ra.operator.as_deref()))
            .chain(combination.operators())
            .collect();
        tsos.len() <= max
    }

    fn respects_max_topo_per_tso(
        &self,
        leaf: &Leaf,
        activated: &[&RangeAction],
        combination: &NetworkActionCombination,
    ) -> bool {
        let limits = &self.parameters.usage_limits;
        combination.operators().into_iter().all(|op| {
            let activated_psts = activated
                .iter()
                .filter(|ra| ra.operator.as_deref() == Some(op) && ra.category() == RangeActionCategory::Pst)
                .count();
            let topo = limits.max_topo_per_tso.get(op).copied();
            let all = limits
                .max_ra_per_tso
                .get(op)
                .map(|max| max.saturating_sub(activated_psts));
            let limit = match (topo, all) {
                (Some(t), Some(a)) => t.min(a),
                (Some(t), None) => t,
                (None, Some(a)) => a,
                (None, None) => return true,
            };
            let count = leaf
                .network_actions()
                .iter()
                .chain(combination.actions())
                .filter(|na| na.operator.as_deref() == Some(op))
                .count();
            count <= limit
        })
    }

    /// Actions without a known area, or when no area is known for the most
    /// limiting elements, are always kept.
    fn is_close_to(&self, most_limiting_areas: &BTreeSet<String>, combination: &NetworkActionCombination) -> bool {
        let Some(graph) = &self.area_graph else {
            return true;
        };
        let areas = combination.areas(self.network);
        if areas.is_empty() || most_limiting_areas.is_empty() {
            return true;
        }
        let max = self.parameters.max_number_of_boundaries_for_skipping_actions;
        areas
            .iter()
            .any(|a| most_limiting_areas.iter().any(|b| graph.are_neighbors(a, b, max)))
    }
}
