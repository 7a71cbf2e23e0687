//! Optimisation perimeters and the split of states between them.

use crate::sensitivity::SystematicSensitivityResult;
use rao_core::{
    Contingency, Crac, FlowCnec, Instant, NetworkAction, RangeAction, RemedialActionInfo, State, Unit,
    UsageMethod,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Post-contingency stages of one contingency that get their own treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContingencyScenario {
    pub contingency: String,
    /// Auto state, present when automatons exist for the contingency.
    pub automaton_state: Option<State>,
    /// Curative state, present when curative actions exist.
    pub curative_state: Option<State>,
}

/// Which states are optimised in the preventive perimeter and which
/// contingencies get an automaton simulation or a curative search.
#[derive(Debug, Clone, Default)]
pub struct StateTree {
    preventive_states: BTreeSet<State>,
    scenarios: Vec<ContingencyScenario>,
}

impl StateTree {
    pub fn new(crac: &Crac) -> Self {
        let mut preventive_states = BTreeSet::from([State::preventive()]);
        let mut scenarios = Vec::new();
        let states = crac.states();

        for contingency in &crac.contingencies {
            let co = contingency.id.as_str();
            let outage = State::post_contingency(Instant::Outage, co);
            if states.contains(&outage) {
                preventive_states.insert(outage);
            }

            let auto = State::post_contingency(Instant::Auto, co);
            let automaton_state = crac
                .has_post_contingency_actions(co, Instant::Auto)
                .then(|| auto.clone());
            if automaton_state.is_none() && states.contains(&auto) {
                preventive_states.insert(auto);
            }

            let curative = State::post_contingency(Instant::Curative, co);
            let curative_state = (states.contains(&curative)
                && crac.has_post_contingency_actions(co, Instant::Curative))
            .then(|| curative.clone());
            if curative_state.is_none() && states.contains(&curative) {
                preventive_states.insert(curative);
            }

            if automaton_state.is_some() || curative_state.is_some() {
                scenarios.push(ContingencyScenario {
                    contingency: co.to_string(),
                    automaton_state,
                    curative_state,
                });
            }
        }
        debug!(
            preventive_states = preventive_states.len(),
            scenarios = scenarios.len(),
            "State tree built"
        );
        Self {
            preventive_states,
            scenarios,
        }
    }

    pub fn preventive_states(&self) -> &BTreeSet<State> {
        &self.preventive_states
    }

    pub fn scenarios(&self) -> &[ContingencyScenario] {
        &self.scenarios
    }

    pub fn has_curative_perimeters(&self) -> bool {
        self.scenarios.iter().any(|s| s.curative_state.is_some())
    }
}

/// Immutable view of the Cnecs and actions of one optimisation stage.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    main_state: State,
    states: BTreeSet<State>,
    cnecs: Vec<FlowCnec>,
    network_actions: Vec<NetworkAction>,
    forced_network_actions: Vec<NetworkAction>,
    range_actions: Vec<RangeAction>,
    contingencies: Vec<Contingency>,
}

impl OptimizationPerimeter {
    /// Perimeter of `main_state` covering the Cnecs of `states`.
    ///
    /// Actions are those usable at `main_state`; flow-constraint rules are
    /// resolved with the margins of `flows` (pre-perimeter situation).
    pub fn build(
        crac: &Crac,
        main_state: State,
        states: BTreeSet<State>,
        flows: &SystematicSensitivityResult,
        unit: Unit,
    ) -> Self {
        let cnecs: Vec<FlowCnec> = crac
            .cnecs
            .iter()
            .filter(|c| states.contains(&c.state))
            .cloned()
            .collect();
        let margin = |cnec: &FlowCnec| flows.margin(cnec, unit);

        let mut network_actions = Vec::new();
        let mut forced_network_actions = Vec::new();
        for na in crac.network_actions() {
            match crac.usage_method(na, &main_state) {
                UsageMethod::Forced => forced_network_actions.push(na.clone()),
                UsageMethod::Unavailable => {}
                _ if crac.is_available(na, &main_state, margin) => network_actions.push(na.clone()),
                _ => {}
            }
        }
        let range_actions: Vec<RangeAction> = crac
            .range_actions()
            .filter(|ra| crac.is_available(*ra, &main_state, margin))
            .cloned()
            .collect();

        let contingencies = crac
            .contingencies
            .iter()
            .filter(|c| states.iter().any(|s| s.contingency_id() == Some(c.id.as_str())))
            .cloned()
            .collect();

        debug!(
            state = %main_state,
            cnecs = cnecs.len(),
            network_actions = network_actions.len(),
            forced = forced_network_actions.len(),
            range_actions = range_actions.len(),
            "Perimeter built"
        );
        Self {
            main_state,
            states,
            cnecs,
            network_actions,
            forced_network_actions,
            range_actions,
            contingencies,
        }
    }

    pub fn preventive(crac: &Crac, tree: &StateTree, flows: &SystematicSensitivityResult, unit: Unit) -> Self {
        Self::build(crac, State::preventive(), tree.preventive_states().clone(), flows, unit)
    }

    pub fn curative(crac: &Crac, state: &State, flows: &SystematicSensitivityResult, unit: Unit) -> Self {
        Self::build(crac, state.clone(), BTreeSet::from([state.clone()]), flows, unit)
    }

    /// Copy without some range actions (second preventive exclusions).
    pub fn without_range_actions(&self, excluded: &BTreeSet<String>) -> Self {
        let mut perimeter = self.clone();
        perimeter.range_actions.retain(|ra| !excluded.contains(&ra.id));
        perimeter
    }

    pub fn main_state(&self) -> &State {
        &self.main_state
    }

    pub fn states(&self) -> &BTreeSet<State> {
        &self.states
    }

    pub fn cnecs(&self) -> &[FlowCnec] {
        &self.cnecs
    }

    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.cnecs.iter().filter(|c| c.optimized)
    }

    pub fn network_actions(&self) -> &[NetworkAction] {
        &self.network_actions
    }

    pub fn forced_network_actions(&self) -> &[NetworkAction] {
        &self.forced_network_actions
    }

    pub fn range_actions(&self) -> &[RangeAction] {
        &self.range_actions
    }

    pub fn contingencies(&self) -> &[Contingency] {
        &self.contingencies
    }

    /// No optimized Cnec: only virtual costs can be improved.
    pub fn is_purely_virtual(&self) -> bool {
        self.optimized_cnecs().next().is_none()
    }

    pub fn network_action(&self, id: &str) -> Option<&NetworkAction> {
        self.network_actions.iter().find(|na| na.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitivity::ComputationStatus;
    use rao_core::{ActionType, ElementaryAction, Side, Threshold, UsageRule};

    fn crac() -> Crac {
        let mut crac = Crac::new("crac");
        crac.add_contingency(Contingency::new("co1", vec!["l2".into()]));
        crac.add_contingency(Contingency::new("co2", vec!["l3".into()]));
        for (id, state) in [
            ("prev", State::preventive()),
            ("co1-out", State::post_contingency(Instant::Outage, "co1")),
            ("co1-cur", State::post_contingency(Instant::Curative, "co1")),
            ("co2-cur", State::post_contingency(Instant::Curative, "co2")),
        ] {
            crac.add_cnec(FlowCnec::new(id, "l1", state).with_threshold(Threshold::symmetric_mw(100.0)));
        }
        let open = |id: &str| {
            NetworkAction::new(
                id,
                vec![ElementaryAction::Topology {
                    element: "l4".into(),
                    action: ActionType::Open,
                }],
            )
        };
        crac.add_network_action(open("cra").with_usage_rule(UsageRule::OnContingencyState {
            instant: Instant::Curative,
            contingency: "co1".into(),
            method: UsageMethod::Available,
        }));
        crac.add_network_action(open("forced").with_usage_rule(UsageRule::OnInstant {
            instant: Instant::Preventive,
            method: UsageMethod::Forced,
        }));
        crac.add_network_action(open("guarded").with_usage_rule(UsageRule::OnFlowConstraint {
            instant: Instant::Preventive,
            cnec: "prev".into(),
        }));
        crac
    }

    #[test]
    fn test_state_tree_sends_states_without_curative_actions_to_preventive() {
        let crac = crac();
        let tree = StateTree::new(&crac);
        assert_eq!(tree.scenarios().len(), 1);
        assert_eq!(tree.scenarios()[0].contingency, "co1");
        assert!(tree.scenarios()[0].automaton_state.is_none());
        assert!(tree
            .preventive_states()
            .contains(&State::post_contingency(Instant::Curative, "co2")));
        assert!(!tree
            .preventive_states()
            .contains(&State::post_contingency(Instant::Curative, "co1")));
    }

    #[test]
    fn test_preventive_perimeter_resolves_forced_and_guarded_actions() {
        let crac = crac();
        let tree = StateTree::new(&crac);
        let mut flows = SystematicSensitivityResult::new(ComputationStatus::Default);
        flows.set_flow("prev", Side::One, 50.0);
        let perimeter = OptimizationPerimeter::preventive(&crac, &tree, &flows, Unit::Megawatt);
        assert_eq!(perimeter.forced_network_actions().len(), 1);
        assert!(perimeter.network_actions().is_empty(), "guarding cnec is secure");
        assert_eq!(perimeter.cnecs().len(), 3);
        assert_eq!(perimeter.contingencies().len(), 2);

        flows.set_flow("prev", Side::One, 150.0);
        let perimeter = OptimizationPerimeter::preventive(&crac, &tree, &flows, Unit::Megawatt);
        assert_eq!(perimeter.network_actions()[0].id, "guarded");
    }
}
