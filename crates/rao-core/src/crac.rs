//! Action catalog: contingencies, Cnecs and remedial actions of one study.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::cnec::FlowCnec;
use crate::error::{CoreResult, RaoError};
use crate::network::Network;
use crate::remedial_action::{
    NetworkAction, RangeAction, RemedialAction, RemedialActionInfo, UsageMethod, UsageRule,
};
use crate::state::{Contingency, Instant, State};

/// Contingency list, Cnecs and remedial actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crac {
    pub id: String,
    #[serde(default)]
    pub contingencies: Vec<Contingency>,
    #[serde(default)]
    pub cnecs: Vec<FlowCnec>,
    #[serde(default)]
    pub remedial_actions: Vec<RemedialAction>,
}

impl Crac {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn add_contingency(&mut self, contingency: Contingency) {
        self.contingencies.push(contingency);
    }

    pub fn add_cnec(&mut self, cnec: FlowCnec) {
        self.cnecs.push(cnec);
    }

    pub fn add_network_action(&mut self, action: NetworkAction) {
        self.remedial_actions.push(RemedialAction::Network(action));
    }

    pub fn add_range_action(&mut self, action: RangeAction) {
        self.remedial_actions.push(RemedialAction::Range(action));
    }

    pub fn contingency(&self, id: &str) -> Option<&Contingency> {
        self.contingencies.iter().find(|c| c.id == id)
    }

    pub fn cnec(&self, id: &str) -> Option<&FlowCnec> {
        self.cnecs.iter().find(|c| c.id == id)
    }

    pub fn network_actions(&self) -> impl Iterator<Item = &NetworkAction> {
        self.remedial_actions.iter().filter_map(RemedialAction::as_network_action)
    }

    pub fn range_actions(&self) -> impl Iterator<Item = &RangeAction> {
        self.remedial_actions.iter().filter_map(RemedialAction::as_range_action)
    }

    pub fn network_action(&self, id: &str) -> Option<&NetworkAction> {
        self.network_actions().find(|na| na.id == id)
    }

    pub fn range_action(&self, id: &str) -> Option<&RangeAction> {
        self.range_actions().find(|ra| ra.id == id)
    }

    /// Every state that carries at least one Cnec, plus the preventive state.
    pub fn states(&self) -> BTreeSet<State> {
        let mut states: BTreeSet<State> = self.cnecs.iter().map(|c| c.state.clone()).collect();
        states.insert(State::preventive());
        states
    }

    pub fn state(&self, instant: Instant, contingency: &str) -> Option<State> {
        let state = State::post_contingency(instant, contingency);
        self.states().contains(&state).then_some(state)
    }

    pub fn cnecs_at<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a FlowCnec> + 'a {
        self.cnecs.iter().filter(move |c| &c.state == state)
    }

    fn cnec_state(&self, id: &str) -> Option<&State> {
        self.cnec(id).map(|c| &c.state)
    }

    /// Usage method of an action at a state, flow rules reported as `ToBeEvaluated`.
    pub fn usage_method<A: RemedialActionInfo>(&self, action: &A, state: &State) -> UsageMethod {
        action.usage_method(state, |id| self.cnec_state(id))
    }

    /// Availability at `state`; `ToBeEvaluated` actions are available when
    /// one of their guarding Cnecs has a negative margin according to `margin`.
    pub fn is_available<A, M>(&self, action: &A, state: &State, margin: M) -> bool
    where
        A: RemedialActionInfo,
        M: Fn(&FlowCnec) -> f64,
    {
        match self.usage_method(action, state) {
            UsageMethod::Available | UsageMethod::Forced => true,
            UsageMethod::Unavailable => false,
            UsageMethod::ToBeEvaluated => action
                .guarding_cnecs(state, |id| self.cnec_state(id))
                .into_iter()
                .filter_map(|id| self.cnec(id))
                .any(|cnec| margin(cnec) < 0.0),
        }
    }

    /// Whether any auto or curative remedial action targets this contingency.
    pub fn has_post_contingency_actions(&self, contingency: &str, instant: Instant) -> bool {
        let state = State::post_contingency(instant, contingency);
        self.remedial_actions
            .iter()
            .any(|ra| self.usage_method(ra, &state) != UsageMethod::Unavailable)
    }

    /// Referential integrity check: unknown contingencies, Cnecs or elements.
    pub fn validate(&self, network: &Network) -> CoreResult<()> {
        let mut ids = HashSet::new();
        for ra in &self.remedial_actions {
            if !ids.insert(ra.id()) {
                return Err(RaoError::Validation(format!(
                    "duplicate remedial action id '{}'",
                    ra.id()
                )));
            }
        }
        let mut cnec_ids = HashSet::new();
        for cnec in &self.cnecs {
            if !cnec_ids.insert(cnec.id.as_str()) {
                return Err(RaoError::Validation(format!("duplicate cnec id '{}'", cnec.id)));
            }
            if let Some(co) = cnec.state.contingency_id() {
                if self.contingency(co).is_none() {
                    return Err(RaoError::Validation(format!(
                        "cnec '{}' refers to unknown contingency '{}'",
                        cnec.id, co
                    )));
                }
            } else if !cnec.state.instant.is_preventive() {
                return Err(RaoError::Validation(format!(
                    "cnec '{}' has a {} instant without contingency",
                    cnec.id, cnec.state.instant
                )));
            }
            if !network.branches.contains_key(&cnec.element) {
                return Err(RaoError::Validation(format!(
                    "cnec '{}' monitors unknown branch '{}'",
                    cnec.id, cnec.element
                )));
            }
        }
        for contingency in &self.contingencies {
            if let Some(missing) = contingency
                .elements
                .iter()
                .find(|e| !network.branches.contains_key(e.as_str()))
            {
                return Err(RaoError::Validation(format!(
                    "contingency '{}' trips unknown branch '{}'",
                    contingency.id, missing
                )));
            }
        }
        for ra in &self.remedial_actions {
            for rule in ra.usage_rules() {
                match rule {
                    UsageRule::OnFlowConstraint { cnec, .. } if self.cnec(cnec).is_none() => {
                        return Err(RaoError::Validation(format!(
                            "remedial action '{}' is guarded by unknown cnec '{}'",
                            ra.id(),
                            cnec
                        )));
                    }
                    UsageRule::OnContingencyState { contingency, .. }
                        if self.contingency(contingency).is_none() =>
                    {
                        return Err(RaoError::Validation(format!(
                            "remedial action '{}' refers to unknown contingency '{}'",
                            ra.id(),
                            contingency
                        )));
                    }
                    _ => {}
                }
            }
            if let RemedialAction::Range(range_action) = ra {
                if let Some(pst) = range_action.as_pst() {
                    if pst.tap_to_angle.is_empty() {
                        return Err(RaoError::Validation(format!(
                            "PST range action '{}' has an empty tap table",
                            range_action.id
                        )));
                    }
                    network.phase_shifter(&pst.element).map_err(|_| {
                        RaoError::Validation(format!(
                            "range action '{}' drives unknown PST '{}'",
                            range_action.id, pst.element
                        ))
                    })?;
                }
            }
        }
        debug!(
            crac = %self.id,
            contingencies = self.contingencies.len(),
            cnecs = self.cnecs.len(),
            remedial_actions = self.remedial_actions.len(),
            "Catalog validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnec::Threshold;
    use crate::remedial_action::{ActionType, ElementaryAction};

    fn setup() -> (Network, Crac) {
        let mut net = Network::new("n");
        net.add_branch("line", "FR", "BE");
        net.add_branch("other", "FR", "FR");
        let mut crac = Crac::new("crac");
        crac.add_contingency(Contingency::new("co1", vec!["other".into()]));
        crac.add_cnec(
            FlowCnec::new("prev", "line", State::preventive())
                .with_threshold(Threshold::symmetric_mw(100.0)),
        );
        crac.add_cnec(
            FlowCnec::new("cur", "line", State::post_contingency(Instant::Curative, "co1"))
                .with_threshold(Threshold::symmetric_mw(100.0)),
        );
        (net, crac)
    }

    #[test]
    fn test_states_include_preventive() {
        let (_, crac) = setup();
        let states = crac.states();
        assert_eq!(states.len(), 2);
        assert!(states.contains(&State::preventive()));
    }

    #[test]
    fn test_flow_rule_availability_depends_on_margin() {
        let (net, mut crac) = setup();
        crac.add_network_action(
            NetworkAction::new(
                "open",
                vec![ElementaryAction::Topology {
                    element: "other".into(),
                    action: ActionType::Open,
                }],
            )
            .with_usage_rule(UsageRule::OnFlowConstraint {
                instant: Instant::Curative,
                cnec: "cur".into(),
            }),
        );
        crac.validate(&net).unwrap();
        let na = crac.network_action("open").unwrap();
        let state = State::post_contingency(Instant::Curative, "co1");
        assert_eq!(crac.usage_method(na, &state), UsageMethod::ToBeEvaluated);
        assert!(crac.is_available(na, &state, |_| -5.0));
        assert!(!crac.is_available(na, &state, |_| 5.0));
        assert!(!crac.is_available(na, &State::preventive(), |_| -5.0));
    }

    #[test]
    fn test_validate_rejects_unknown_contingency() {
        let (net, mut crac) = setup();
        crac.add_cnec(FlowCnec::new(
            "bad",
            "line",
            State::post_contingency(Instant::Curative, "nope"),
        ));
        assert!(crac.validate(&net).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_action_ids() {
        let (net, mut crac) = setup();
        let na = NetworkAction::new("dup", vec![]);
        crac.add_network_action(na.clone());
        crac.add_network_action(na);
        assert!(crac.validate(&net).is_err());
    }
}
