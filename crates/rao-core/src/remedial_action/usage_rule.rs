use serde::{Deserialize, Serialize};

use crate::state::{Instant, State};

/// How a remedial action may be used at a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMethod {
    Unavailable,
    /// Available only if the guarding Cnec is currently in violation.
    ToBeEvaluated,
    Available,
    Forced,
}

impl UsageMethod {
    fn strength(self) -> u8 {
        match self {
            UsageMethod::Unavailable => 3,
            UsageMethod::Forced => 2,
            UsageMethod::Available => 1,
            UsageMethod::ToBeEvaluated => 0,
        }
    }

    /// Combine methods from several matching rules: `Unavailable` wins, then
    /// `Forced`, `Available`, `ToBeEvaluated`. No rule means `Unavailable`.
    pub fn strongest<I: IntoIterator<Item = UsageMethod>>(methods: I) -> UsageMethod {
        methods
            .into_iter()
            .max_by_key(|m| m.strength())
            .unwrap_or(UsageMethod::Unavailable)
    }
}

/// When a remedial action may be used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageRule {
    /// Every state of the instant.
    OnInstant { instant: Instant, method: UsageMethod },
    /// One post-contingency state.
    OnContingencyState {
        instant: Instant,
        contingency: String,
        method: UsageMethod,
    },
    /// Guarded by a Cnec: usable at the instant when that Cnec is violated.
    OnFlowConstraint { instant: Instant, cnec: String },
}

impl UsageRule {
    pub fn instant(&self) -> Instant {
        match self {
            UsageRule::OnInstant { instant, .. }
            | UsageRule::OnContingencyState { instant, .. }
            | UsageRule::OnFlowConstraint { instant, .. } => *instant,
        }
    }

    /// Usage method at `state`, or `None` if the rule does not concern it.
    ///
    /// `cnec_state` resolves the state of the guarding Cnec for flow rules.
    pub fn method_at<'a, F>(&self, state: &State, cnec_state: F) -> Option<UsageMethod>
    where
        F: Fn(&str) -> Option<&'a State>,
    {
        if self.instant() != state.instant {
            return None;
        }
        match self {
            UsageRule::OnInstant { method, .. } => Some(*method),
            UsageRule::OnContingencyState {
                contingency, method, ..
            } => (state.contingency_id() == Some(contingency.as_str())).then_some(*method),
            UsageRule::OnFlowConstraint { cnec, .. } => {
                let guarded = cnec_state(cnec)?;
                let concerned = state.is_preventive() || guarded.contingency == state.contingency;
                concerned.then_some(UsageMethod::ToBeEvaluated)
            }
        }
    }

    /// Guarding Cnec of a flow rule.
    pub fn guarding_cnec(&self) -> Option<&str> {
        match self {
            UsageRule::OnFlowConstraint { cnec, .. } => Some(cnec.as_str()),
            _ => None,
        }
    }
}
