use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::usage_rule::UsageRule;
use crate::error::{CoreResult, RaoError};
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Open,
    Close,
}

/// One discrete modification of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementaryAction {
    Topology { element: String, action: ActionType },
    InjectionSetpoint { element: String, setpoint: f64 },
    PstSetpoint { element: String, tap: i32 },
    SwitchPair { to_open: String, to_close: String },
}

impl ElementaryAction {
    pub fn apply(&self, network: &mut Network) -> CoreResult<()> {
        match self {
            ElementaryAction::Topology { element, action } => {
                network.set_connected(element, *action == ActionType::Close)
            }
            ElementaryAction::InjectionSetpoint { element, setpoint } => {
                network.set_setpoint(element, *setpoint);
                Ok(())
            }
            ElementaryAction::PstSetpoint { element, tap } => network.set_pst_tap(element, *tap),
            ElementaryAction::SwitchPair { to_open, to_close } => {
                network.set_connected(to_open, false)?;
                network.set_connected(to_close, true)
            }
        }
    }

    /// A switch pair is only applicable when the switch to close is open.
    pub fn can_apply(&self, network: &Network) -> bool {
        match self {
            ElementaryAction::SwitchPair { to_open, to_close } => {
                matches!(network.is_connected(to_open), Ok(true))
                    && matches!(network.is_connected(to_close), Ok(false))
            }
            ElementaryAction::Topology { element, .. } => network.branches.contains_key(element),
            ElementaryAction::PstSetpoint { element, tap } => network
                .phase_shifter(element)
                .map_or(false, |p| p.tap_to_angle.contains_key(tap)),
            ElementaryAction::InjectionSetpoint { .. } => true,
        }
    }

    /// Would applying this action change anything?
    pub fn has_impact_on(&self, network: &Network) -> bool {
        match self {
            ElementaryAction::Topology { element, action } => network
                .is_connected(element)
                .map_or(true, |c| c != (*action == ActionType::Close)),
            ElementaryAction::InjectionSetpoint { element, setpoint } => {
                (network.setpoint(element) - setpoint).abs() > 1e-6
            }
            ElementaryAction::PstSetpoint { element, tap } => {
                network.pst_tap(element).map_or(true, |t| t != *tap)
            }
            ElementaryAction::SwitchPair { to_open, to_close } => {
                !(matches!(network.is_connected(to_open), Ok(false))
                    && matches!(network.is_connected(to_close), Ok(true)))
            }
        }
    }

    pub fn elements(&self) -> Vec<&str> {
        match self {
            ElementaryAction::Topology { element, .. }
            | ElementaryAction::InjectionSetpoint { element, .. }
            | ElementaryAction::PstSetpoint { element, .. } => vec![element.as_str()],
            ElementaryAction::SwitchPair { to_open, to_close } => {
                vec![to_open.as_str(), to_close.as_str()]
            }
        }
    }
}

/// Discrete remedial action made of one or several elementary actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
    pub elementary_actions: Vec<ElementaryAction>,
}

impl NetworkAction {
    pub fn new(id: impl Into<String>, elementary_actions: Vec<ElementaryAction>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            operator: None,
            usage_rules: Vec::new(),
            elementary_actions,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    /// Apply every elementary action; fails on the first unknown element.
    pub fn apply(&self, network: &mut Network) -> CoreResult<()> {
        if !self.can_apply(network) {
            return Err(RaoError::Network(format!(
                "network action '{}' cannot be applied on network '{}'",
                self.id, network.name
            )));
        }
        for action in &self.elementary_actions {
            action.apply(network)?;
        }
        Ok(())
    }

    pub fn can_apply(&self, network: &Network) -> bool {
        self.elementary_actions.iter().all(|a| a.can_apply(network))
    }

    pub fn has_impact_on(&self, network: &Network) -> bool {
        self.elementary_actions.iter().any(|a| a.has_impact_on(network))
    }

    pub fn network_elements(&self) -> BTreeSet<&str> {
        self.elementary_actions
            .iter()
            .flat_map(|a| a.elements())
            .collect()
    }

    /// Areas touched by the action's elements.
    pub fn areas(&self, network: &Network) -> BTreeSet<String> {
        self.network_elements()
            .into_iter()
            .flat_map(|e| network.areas_of(e))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        let mut net = Network::new("n");
        net.add_branch("line", "FR", "FR");
        net.add_branch("sw1", "FR", "FR");
        net.add_branch("sw2", "FR", "FR");
        net.set_connected("sw2", false).unwrap();
        net
    }

    #[test]
    fn test_topology_open() {
        let mut net = network();
        let na = NetworkAction::new(
            "open-line",
            vec![ElementaryAction::Topology {
                element: "line".into(),
                action: ActionType::Open,
            }],
        );
        assert!(na.has_impact_on(&net));
        na.apply(&mut net).unwrap();
        assert!(!net.is_connected("line").unwrap());
        assert!(!na.has_impact_on(&net), "second application is a no-op");
    }

    #[test]
    fn test_switch_pair_requires_open_switch() {
        let mut net = network();
        let na = NetworkAction::new(
            "swap",
            vec![ElementaryAction::SwitchPair {
                to_open: "sw1".into(),
                to_close: "sw2".into(),
            }],
        );
        assert!(na.can_apply(&net));
        na.apply(&mut net).unwrap();
        assert!(!net.is_connected("sw1").unwrap());
        assert!(net.is_connected("sw2").unwrap());
        assert!(!na.can_apply(&net));
        assert!(na.apply(&mut net).is_err());
    }

    #[test]
    fn test_unknown_element_is_an_error() {
        let mut net = network();
        let na = NetworkAction::new(
            "bad",
            vec![ElementaryAction::Topology {
                element: "nope".into(),
                action: ActionType::Open,
            }],
        );
        assert!(na.apply(&mut net).is_err());
    }
}
