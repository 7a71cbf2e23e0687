//! Critical network element & contingency (Cnec) definitions
//!
//! A [`FlowCnec`] monitors the active flow of one branch at one [`State`].
//! Thresholds may be expressed in MW or in A and per electrical side; the
//! reliability margin (MW) always tightens the admissible interval.
//!
//! ```text
//!        lower bound                      upper bound
//!   ----[=========== admissible ===========]----
//!        ^                                  ^
//!   min + reliability margin       max - reliability margin
//! ```
//!
//! The margin of a side is the distance from the flow to the closest bound,
//! and the margin of the Cnec is the worst one across its monitored sides.

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Electrical side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    One,
    Two,
}

/// Physical unit of a flow quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Megawatt,
    Ampere,
}

/// One bound pair of a Cnec. `side = None` applies to every monitored side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Threshold {
    pub fn symmetric_mw(limit: f64) -> Self {
        Self {
            unit: Unit::Megawatt,
            side: None,
            min: Some(-limit),
            max: Some(limit),
        }
    }

    fn applies_to(&self, side: Side) -> bool {
        self.side.map_or(true, |s| s == side)
    }
}

/// Loop-flow limit attached to a cross-border Cnec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFlowThreshold {
    pub value: f64,
    #[serde(default)]
    pub unit: Unit,
}

fn default_sides() -> Vec<Side> {
    vec![Side::One]
}

fn default_true() -> bool {
    true
}

fn default_nominal_voltage() -> f64 {
    400.0
}

/// Monitored branch flow at a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCnec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Monitored branch id.
    pub element: String,
    pub state: State,
    #[serde(default = "default_sides")]
    pub sides: Vec<Side>,
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
    /// Part of the objective function.
    #[serde(default = "default_true")]
    pub optimized: bool,
    /// MNEC: margin may not decrease beyond the acceptable diminution.
    #[serde(default)]
    pub monitored: bool,
    /// Reliability margin in MW.
    #[serde(default)]
    pub reliability_margin: f64,
    #[serde(default = "default_nominal_voltage")]
    pub nominal_voltage_kv: f64,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub loop_flow_threshold: Option<LoopFlowThreshold>,
}

impl FlowCnec {
    pub fn new(id: impl Into<String>, element: impl Into<String>, state: State) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            element: element.into(),
            state,
            sides: default_sides(),
            thresholds: Vec::new(),
            optimized: true,
            monitored: false,
            reliability_margin: 0.0,
            nominal_voltage_kv: default_nominal_voltage(),
            operator: None,
            loop_flow_threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn with_sides(mut self, sides: Vec<Side>) -> Self {
        self.sides = sides;
        self
    }

    pub fn monitored_only(mut self) -> Self {
        self.optimized = false;
        self.monitored = true;
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Megawatts per Ampere at the nominal voltage: U·√3/1000.
    pub fn mw_per_ampere(&self) -> f64 {
        self.nominal_voltage_kv * 3f64.sqrt() / 1000.0
    }

    /// Multiplier converting a value in `unit` to MW.
    pub fn unit_to_mw(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Megawatt => 1.0,
            Unit::Ampere => self.mw_per_ampere(),
        }
    }

    fn convert(&self, value_mw: f64, unit: Unit) -> f64 {
        value_mw / self.unit_to_mw(unit)
    }

    /// Tightest lower bound for a side, reliability margin applied.
    pub fn lower_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.applies_to(side))
            .filter_map(|t| t.min.map(|min| min * self.unit_to_mw(t.unit)))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .map(|mw| self.convert(mw + self.reliability_margin, unit))
    }

    /// Tightest upper bound for a side, reliability margin applied.
    pub fn upper_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.applies_to(side))
            .filter_map(|t| t.max.map(|max| max * self.unit_to_mw(t.unit)))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .map(|mw| self.convert(mw - self.reliability_margin, unit))
    }

    /// Margin of one side for a flow given in MW, expressed in `unit`.
    ///
    /// Infinite when the side has no bound at all.
    pub fn compute_margin(&self, flow_mw: f64, side: Side, unit: Unit) -> f64 {
        let flow = self.convert(flow_mw, unit);
        let from_min = self
            .lower_bound(side, unit)
            .map_or(f64::INFINITY, |lb| flow - lb);
        let from_max = self
            .upper_bound(side, unit)
            .map_or(f64::INFINITY, |ub| ub - flow);
        from_min.min(from_max)
    }

    /// Largest absolute bound in MW over all sides, used to scale big-M
    /// coefficients and as the cost fallback of empty perimeters.
    pub fn highest_threshold_mw(&self) -> f64 {
        self.sides
            .iter()
            .flat_map(|&side| {
                [
                    self.lower_bound(side, Unit::Megawatt),
                    self.upper_bound(side, Unit::Megawatt),
                ]
            })
            .flatten()
            .map(f64::abs)
            .fold(0.0, f64::max)
    }

    /// Loop-flow threshold in MW.
    pub fn loop_flow_threshold_mw(&self) -> Option<f64> {
        self.loop_flow_threshold
            .as_ref()
            .map(|t| t.value * self.unit_to_mw(t.unit))
    }
}
