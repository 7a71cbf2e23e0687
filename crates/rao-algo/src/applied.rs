//! Post-contingency actions already decided by an earlier stage.
//!
//! The second preventive pass and automaton simulation must evaluate flows
//! with curative/automaton actions in place for their own contingency only,
//! so those actions are passed to the sensitivity oracle per [`State`]
//! instead of being applied to the shared network.

use rao_core::{CoreResult, Network, NetworkAction, RangeAction, State};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct AppliedActions {
    pub network_actions: Vec<NetworkAction>,
    pub range_actions: Vec<(RangeAction, f64)>,
}

impl AppliedActions {
    pub fn is_empty(&self) -> bool {
        self.network_actions.is_empty() && self.range_actions.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppliedRemedialActions {
    states: BTreeMap<State, AppliedActions>,
}

impl AppliedRemedialActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network_action(&mut self, state: &State, action: NetworkAction) {
        self.states
            .entry(state.clone())
            .or_default()
            .network_actions
            .push(action);
    }

    pub fn add_range_action(&mut self, state: &State, action: RangeAction, setpoint: f64) {
        let applied = self.states.entry(state.clone()).or_default();
        applied.range_actions.retain(|(ra, _)| ra.id != action.id);
        applied.range_actions.push((action, setpoint));
    }

    pub fn is_empty(&self) -> bool {
        self.states.values().all(AppliedActions::is_empty)
    }

    pub fn for_state(&self, state: &State) -> Option<&AppliedActions> {
        self.states.get(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&State, &AppliedActions)> {
        self.states.iter()
    }

    /// Apply on `network` every action of `state`'s contingency decided at an
    /// instant up to `state`'s. Preventive entries are ignored: those actions
    /// are already part of the network.
    pub fn apply_for(&self, network: &mut Network, state: &State) -> CoreResult<()> {
        if state.is_preventive() {
            return Ok(());
        }
        for (applied_state, actions) in &self.states {
            if applied_state.contingency != state.contingency || applied_state.instant > state.instant {
                continue;
            }
            for na in &actions.network_actions {
                if na.has_impact_on(network) {
                    na.apply(network)?;
                }
            }
            for (ra, setpoint) in &actions.range_actions {
                ra.apply(network, *setpoint)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{ActionType, ElementaryAction, Instant};

    #[test]
    fn test_actions_only_apply_to_their_contingency_and_later_instants() {
        let mut network = Network::new("n");
        network.add_branch("l1", "A", "A");
        let open = NetworkAction::new(
            "open",
            vec![ElementaryAction::Topology {
                element: "l1".into(),
                action: ActionType::Open,
            }],
        );
        let mut applied = AppliedRemedialActions::new();
        applied.add_network_action(&State::post_contingency(Instant::Auto, "co1"), open);

        let mut other = network.clone();
        applied
            .apply_for(&mut other, &State::post_contingency(Instant::Curative, "co2"))
            .unwrap();
        assert!(other.is_connected("l1").unwrap());

        let mut outage = network.clone();
        applied
            .apply_for(&mut outage, &State::post_contingency(Instant::Outage, "co1"))
            .unwrap();
        assert!(outage.is_connected("l1").unwrap(), "auto action not active at outage");

        let mut curative = network.clone();
        applied
            .apply_for(&mut curative, &State::post_contingency(Instant::Curative, "co1"))
            .unwrap();
        assert!(!curative.is_connected("l1").unwrap());
    }
}
