use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::usage_rule::UsageRule;
use crate::error::{CoreResult, RaoError};
use crate::network::Network;

/// Reference a range is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    #[default]
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

/// Allowed interval; taps for PSTs, MW otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "type", default)]
    pub kind: RangeType,
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn absolute(min: f64, max: f64) -> Self {
        Self {
            kind: RangeType::Absolute,
            min,
            max,
        }
    }

    fn interval(&self, initial: f64, previous: f64) -> (f64, f64) {
        match self.kind {
            RangeType::Absolute => (self.min, self.max),
            RangeType::RelativeToInitialNetwork => (initial + self.min, initial + self.max),
            RangeType::RelativeToPreviousInstant => (previous + self.min, previous + self.max),
        }
    }
}

/// Tap/angle table of a phase-shifting transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PstRange {
    pub element: String,
    pub tap_to_angle: BTreeMap<i32, f64>,
}

impl PstRange {
    pub fn min_tap(&self) -> i32 {
        self.tap_to_angle.keys().next().copied().unwrap_or(0)
    }

    pub fn max_tap(&self) -> i32 {
        self.tap_to_angle.keys().next_back().copied().unwrap_or(0)
    }

    pub fn angle(&self, tap: i32) -> CoreResult<f64> {
        self.tap_to_angle.get(&tap).copied().ok_or_else(|| {
            RaoError::Validation(format!(
                "tap {} is outside [{}, {}] for PST '{}'",
                tap,
                self.min_tap(),
                self.max_tap(),
                self.element
            ))
        })
    }

    /// Nearest tap of an angle; on an exact tie the lower tap wins.
    pub fn tap_of(&self, angle: f64) -> i32 {
        let mut best = self.min_tap();
        let mut best_distance = f64::INFINITY;
        for (&tap, &a) in &self.tap_to_angle {
            let distance = (a - angle).abs();
            if distance < best_distance - 1e-9 {
                best = tap;
                best_distance = distance;
            }
        }
        best
    }
}

/// Physical lever of a range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionKind {
    Pst(PstRange),
    Hvdc {
        element: String,
    },
    Injection {
        distribution_keys: BTreeMap<String, f64>,
    },
    /// Counter trading between two areas; the setpoint is stored under the action id.
    CounterTrade {
        exporting_area: String,
        importing_area: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionCategory {
    Pst,
    Hvdc,
    Injection,
    CounterTrade,
}

/// Remedial action with a continuous or tap-discretised setpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    /// Actions sharing a group always receive the same setpoint.
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
    #[serde(default)]
    pub ranges: Vec<Range>,
    pub kind: RangeActionKind,
}

impl RangeAction {
    pub fn new(id: impl Into<String>, kind: RangeActionKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            operator: None,
            group_id: None,
            usage_rules: Vec::new(),
            ranges: Vec::new(),
            kind,
        }
    }

    pub fn pst(id: impl Into<String>, element: impl Into<String>, tap_to_angle: BTreeMap<i32, f64>) -> Self {
        Self::new(
            id,
            RangeActionKind::Pst(PstRange {
                element: element.into(),
                tap_to_angle,
            }),
        )
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    pub fn category(&self) -> RangeActionCategory {
        match self.kind {
            RangeActionKind::Pst(_) => RangeActionCategory::Pst,
            RangeActionKind::Hvdc { .. } => RangeActionCategory::Hvdc,
            RangeActionKind::Injection { .. } => RangeActionCategory::Injection,
            RangeActionKind::CounterTrade { .. } => RangeActionCategory::CounterTrade,
        }
    }

    pub fn as_pst(&self) -> Option<&PstRange> {
        match &self.kind {
            RangeActionKind::Pst(pst) => Some(pst),
            _ => None,
        }
    }

    /// Network elements whose state the action drives.
    pub fn network_elements(&self) -> Vec<&str> {
        match &self.kind {
            RangeActionKind::Pst(pst) => vec![pst.element.as_str()],
            RangeActionKind::Hvdc { element } => vec![element.as_str()],
            RangeActionKind::Injection { distribution_keys } => {
                distribution_keys.keys().map(String::as_str).collect()
            }
            RangeActionKind::CounterTrade { .. } => vec![self.id.as_str()],
        }
    }

    pub fn areas(&self, network: &Network) -> BTreeSet<String> {
        match &self.kind {
            RangeActionKind::CounterTrade {
                exporting_area,
                importing_area,
            } => [exporting_area.clone(), importing_area.clone()].into(),
            _ => self
                .network_elements()
                .into_iter()
                .flat_map(|e| network.areas_of(e))
                .collect(),
        }
    }

    /// Setpoint currently applied on the network (degrees for PSTs, MW otherwise).
    pub fn current_setpoint(&self, network: &Network) -> CoreResult<f64> {
        match &self.kind {
            RangeActionKind::Pst(pst) => {
                let tap = network.pst_tap(&pst.element)?;
                pst.angle(tap)
            }
            RangeActionKind::Hvdc { element } => Ok(network.setpoint(element)),
            RangeActionKind::Injection { distribution_keys } => Ok(distribution_keys
                .iter()
                .find(|(_, key)| key.abs() > 1e-9)
                .map_or(0.0, |(element, key)| network.setpoint(element) / key)),
            RangeActionKind::CounterTrade { .. } => Ok(network.setpoint(&self.id)),
        }
    }

    /// Apply a setpoint; PST setpoints are rounded to the nearest tap.
    pub fn apply(&self, network: &mut Network, setpoint: f64) -> CoreResult<()> {
        match &self.kind {
            RangeActionKind::Pst(pst) => network.set_pst_tap(&pst.element, pst.tap_of(setpoint)),
            RangeActionKind::Hvdc { element } => {
                network.set_setpoint(element, setpoint);
                Ok(())
            }
            RangeActionKind::Injection { distribution_keys } => {
                for (element, key) in distribution_keys {
                    network.set_setpoint(element, setpoint * key);
                }
                Ok(())
            }
            RangeActionKind::CounterTrade { .. } => {
                network.set_setpoint(&self.id, setpoint);
                Ok(())
            }
        }
    }

    /// Intersection of every range and the physical limits, as a setpoint
    /// interval. `initial` and `previous` are setpoints on the initial network
    /// and at the end of the previous instant.
    pub fn admissible_range(&self, initial: f64, previous: f64) -> CoreResult<(f64, f64)> {
        match &self.kind {
            RangeActionKind::Pst(pst) => {
                let initial_tap = pst.tap_of(initial) as f64;
                let previous_tap = pst.tap_of(previous) as f64;
                let (lo, hi) = self.ranges.iter().fold(
                    (pst.min_tap() as f64, pst.max_tap() as f64),
                    |(lo, hi), r| {
                        let (min, max) = r.interval(initial_tap, previous_tap);
                        (lo.max(min), hi.min(max))
                    },
                );
                let (lo, hi) = (lo.ceil() as i32, hi.floor() as i32);
                if lo > hi {
                    return Err(self.empty_range());
                }
                let (a, b) = (pst.angle(lo)?, pst.angle(hi)?);
                Ok((a.min(b), a.max(b)))
            }
            _ => {
                let (lo, hi) = self
                    .ranges
                    .iter()
                    .fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), r| {
                        let (min, max) = r.interval(initial, previous);
                        (lo.max(min), hi.min(max))
                    });
                if lo > hi {
                    return Err(self.empty_range());
                }
                Ok((lo, hi))
            }
        }
    }

    fn empty_range(&self) -> RaoError {
        RaoError::Validation(format!("range action '{}' has an empty admissible range", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<i32, f64> {
        (-16..=16).map(|t| (t, t as f64 * 0.39)).collect()
    }

    #[test]
    fn test_tap_angle_round_trip() {
        let pst = PstRange {
            element: "pst".into(),
            tap_to_angle: table(),
        };
        for tap in pst.min_tap()..=pst.max_tap() {
            let angle = pst.angle(tap).unwrap();
            assert_eq!(pst.tap_of(angle), tap, "round trip failed for tap {tap}");
        }
        assert!(pst.angle(17).is_err());
    }

    #[test]
    fn test_nearest_tap_rounding() {
        let pst = PstRange {
            element: "pst".into(),
            tap_to_angle: table(),
        };
        assert_eq!(pst.tap_of(0.5), 1);
        assert_eq!(pst.tap_of(-0.7), -2);
        assert_eq!(pst.tap_of(100.0), 16);
    }

    #[test]
    fn test_pst_admissible_range_intersection() {
        let ra = RangeAction::pst("ra", "pst", table())
            .with_range(Range::absolute(-10.0, 10.0))
            .with_range(Range {
                kind: RangeType::RelativeToInitialNetwork,
                min: -3.0,
                max: 3.0,
            });
        let initial = 8.0 * 0.39;
        let (lo, hi) = ra.admissible_range(initial, initial).unwrap();
        assert!((lo - 5.0 * 0.39).abs() < 1e-9, "lo {lo}");
        assert!((hi - 10.0 * 0.39).abs() < 1e-9, "hi {hi}");
    }

    #[test]
    fn test_empty_range_is_an_error() {
        let ra = RangeAction::new("hvdc", RangeActionKind::Hvdc { element: "dc".into() })
            .with_range(Range::absolute(0.0, 100.0))
            .with_range(Range {
                kind: RangeType::RelativeToPreviousInstant,
                min: -10.0,
                max: 10.0,
            });
        assert!(ra.admissible_range(0.0, 500.0).is_err());
        assert_eq!(ra.admissible_range(0.0, 50.0).unwrap(), (40.0, 60.0));
    }

    #[test]
    fn test_injection_setpoint_uses_distribution_keys() {
        let keys: BTreeMap<String, f64> = [("g1".to_string(), 0.5), ("g2".to_string(), 0.5)].into();
        let ra = RangeAction::new("inj", RangeActionKind::Injection { distribution_keys: keys });
        let mut net = Network::new("n");
        ra.apply(&mut net, 200.0).unwrap();
        assert_eq!(net.setpoint("g1"), 100.0);
        assert_eq!(ra.current_setpoint(&net).unwrap(), 200.0);
    }
}
