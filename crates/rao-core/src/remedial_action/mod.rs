//! Remedial actions as a closed sum type
//!
//! | Variant | Lever | Setpoint |
//! |---------|-------|----------|
//! | [`NetworkAction`] | topology, injection setpoint, PST tap, switch pair | discrete (applied or not) |
//! | [`RangeAction`] | PST, HVDC, injection distribution, counter trade | continuous / tap |
//!
//! Both variants carry [`UsageRule`]s; the shared capabilities live on the
//! [`RemedialActionInfo`] trait so that availability logic is written once.

mod network_action;
mod range_action;
mod usage_rule;

pub use network_action::{ActionType, ElementaryAction, NetworkAction};
pub use range_action::{
    PstRange, Range, RangeAction, RangeActionCategory, RangeActionKind, RangeType,
};
pub use usage_rule::{UsageMethod, UsageRule};

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Capabilities shared by every remedial action.
pub trait RemedialActionInfo {
    fn id(&self) -> &str;
    fn operator(&self) -> Option<&str>;
    fn usage_rules(&self) -> &[UsageRule];

    /// Strongest usage method of the rules that concern `state`.
    fn usage_method<'a, F>(&self, state: &State, cnec_state: F) -> UsageMethod
    where
        F: Fn(&str) -> Option<&'a State>,
    {
        UsageMethod::strongest(
            self.usage_rules()
                .iter()
                .filter_map(|rule| rule.method_at(state, &cnec_state)),
        )
    }

    /// Ids of the Cnecs guarding flow rules relevant at `state`.
    fn guarding_cnecs<'a, F>(&self, state: &State, cnec_state: F) -> Vec<&str>
    where
        F: Fn(&str) -> Option<&'a State>,
    {
        self.usage_rules()
            .iter()
            .filter(|rule| rule.method_at(state, &cnec_state) == Some(UsageMethod::ToBeEvaluated))
            .filter_map(UsageRule::guarding_cnec)
            .collect()
    }
}

impl RemedialActionInfo for NetworkAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn usage_rules(&self) -> &[UsageRule] {
        &self.usage_rules
    }
}

impl RemedialActionInfo for RangeAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn usage_rules(&self) -> &[UsageRule] {
        &self.usage_rules
    }
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemedialAction {
    Network(NetworkAction),
    Range(RangeAction),
}

impl RemedialAction {
    pub fn group_id(&self) -> Option<&str> {
        match self {
            RemedialAction::Network(_) => None,
            RemedialAction::Range(ra) => ra.group_id.as_deref(),
        }
    }

    pub fn as_network_action(&self) -> Option<&NetworkAction> {
        match self {
            RemedialAction::Network(na) => Some(na),
            RemedialAction::Range(_) => None,
        }
    }

    pub fn as_range_action(&self) -> Option<&RangeAction> {
        match self {
            RemedialAction::Network(_) => None,
            RemedialAction::Range(ra) => Some(ra),
        }
    }
}

impl RemedialActionInfo for RemedialAction {
    fn id(&self) -> &str {
        match self {
            RemedialAction::Network(na) => na.id(),
            RemedialAction::Range(ra) => ra.id(),
        }
    }

    fn operator(&self) -> Option<&str> {
        match self {
            RemedialAction::Network(na) => na.operator(),
            RemedialAction::Range(ra) => ra.operator(),
        }
    }

    fn usage_rules(&self) -> &[UsageRule] {
        match self {
            RemedialAction::Network(na) => na.usage_rules(),
            RemedialAction::Range(ra) => ra.usage_rules(),
        }
    }
}
