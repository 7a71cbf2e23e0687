//! Range action setpoints of one leaf or perimeter.

use rao_core::{CoreResult, Network, RangeAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance under which two setpoints are considered equal.
pub const SETPOINT_EPSILON: f64 = 1e-6;

/// Setpoint (degrees for PSTs, MW otherwise) per range action id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionActivation {
    setpoints: BTreeMap<String, f64>,
}

impl RangeActionActivation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current setpoints of `range_actions` from the network.
    pub fn from_network<'a, I>(range_actions: I, network: &Network) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a RangeAction>,
    {
        let mut setpoints = BTreeMap::new();
        for ra in range_actions {
            setpoints.insert(ra.id.clone(), ra.current_setpoint(network)?);
        }
        Ok(Self { setpoints })
    }

    pub fn setpoint(&self, id: &str) -> Option<f64> {
        self.setpoints.get(id).copied()
    }

    pub fn set(&mut self, id: impl Into<String>, setpoint: f64) {
        self.setpoints.insert(id.into(), setpoint);
    }

    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.setpoints.iter().map(|(id, v)| (id.as_str(), *v))
    }

    /// Tap of a PST range action's setpoint.
    pub fn tap(&self, ra: &RangeAction) -> Option<i32> {
        let pst = ra.as_pst()?;
        self.setpoint(&ra.id).map(|sp| pst.tap_of(sp))
    }

    /// Write the setpoints of `range_actions` on `network`.
    pub fn apply_on(&self, network: &mut Network, range_actions: &[RangeAction]) -> CoreResult<()> {
        for ra in range_actions {
            if let Some(sp) = self.setpoint(&ra.id) {
                ra.apply(network, sp)?;
            }
        }
        Ok(())
    }

    /// Whether any setpoint of `range_actions` differs from `other`.
    pub fn differs_from(&self, other: &RangeActionActivation, range_actions: &[RangeAction]) -> bool {
        range_actions.iter().any(|ra| {
            match (self.setpoint(&ra.id), other.setpoint(&ra.id)) {
                (Some(a), Some(b)) => (a - b).abs() > SETPOINT_EPSILON,
                (None, None) => false,
                _ => true,
            }
        })
    }

    /// Ids whose setpoint moved away from `reference`.
    pub fn activated_against<'a>(&'a self, reference: &'a RangeActionActivation) -> impl Iterator<Item = &'a str> + 'a {
        self.setpoints.iter().filter_map(move |(id, sp)| {
            let moved = reference
                .setpoint(id)
                .map_or(true, |r| (r - sp).abs() > SETPOINT_EPSILON);
            moved.then_some(id.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activated_against_reference() {
        let mut reference = RangeActionActivation::new();
        reference.set("a", 0.0);
        reference.set("b", 1.0);
        let mut current = reference.clone();
        current.set("b", 1.0 + 1e-8);
        assert_eq!(current.activated_against(&reference).count(), 0);
        current.set("a", 2.0);
        assert_eq!(current.activated_against(&reference).collect::<Vec<_>>(), vec!["a"]);
    }
}
