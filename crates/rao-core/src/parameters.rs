//! RAO parameters.
//!
//! [`RaoParameters`] groups every tuning knob of the optimiser. All sections
//! use `#[serde(default)]`, so a TOML file only needs the values it changes:
//!
//! ```toml
//! [objective_function]
//! preventive_stop_criterion = "secure"
//!
//! [topo]
//! max_preventive_search_tree_depth = 3
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::cnec::Unit;
use crate::error::{CoreResult, RaoError};
use crate::remedial_action::RangeActionCategory;
use crate::state::Instant;

/// Top-level parameter tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaoParameters {
    pub objective_function: ObjectiveFunctionParameters,
    pub range_actions: RangeActionsOptimizationParameters,
    pub topo: TopoOptimizationParameters,
    pub multithreading: MultithreadingParameters,
    pub second_preventive: SecondPreventiveParameters,
    /// Usage limits keyed by instant name (`preventive`, `curative`).
    pub ra_usage_limits: BTreeMap<String, RaUsageLimits>,
    pub mnec: MnecParameters,
    pub relative_margins: RelativeMarginsParameters,
    pub loop_flow: LoopFlowParameters,
    pub sensitivity: SensitivityParameters,
}

impl Default for RaoParameters {
    fn default() -> Self {
        Self {
            objective_function: ObjectiveFunctionParameters::default(),
            range_actions: RangeActionsOptimizationParameters::default(),
            topo: TopoOptimizationParameters::default(),
            multithreading: MultithreadingParameters::default(),
            second_preventive: SecondPreventiveParameters::default(),
            ra_usage_limits: BTreeMap::new(),
            mnec: MnecParameters::default(),
            relative_margins: RelativeMarginsParameters::default(),
            loop_flow: LoopFlowParameters::default(),
            sensitivity: SensitivityParameters::default(),
        }
    }
}

impl RaoParameters {
    /// Load parameters from a TOML file; missing keys take their defaults.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        debug!(path = %path.display(), "Loading RAO parameters");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> CoreResult<Self> {
        let params: Self = toml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to(&self, path: &Path) -> CoreResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.relative_margins.ptdf_sum_lower_bound <= 0.0 {
            return Err(RaoError::Config(
                "relative_margins.ptdf_sum_lower_bound must be strictly positive".into(),
            ));
        }
        if self.multithreading.preventive_leaves_in_parallel == 0
            || self.multithreading.curative_leaves_in_parallel == 0
            || self.multithreading.contingency_scenarios_in_parallel == 0
        {
            return Err(RaoError::Config(
                "multithreading parameters must be at least 1".into(),
            ));
        }
        if self.topo.relative_min_impact_threshold < 0.0
            || self.topo.absolute_min_impact_threshold < 0.0
        {
            return Err(RaoError::Config("min impact thresholds must be non-negative".into()));
        }
        let improvement = self.range_actions.min_iteration_improvement;
        if improvement.is_nan() || improvement < 0.0 {
            return Err(RaoError::Config(
                "range_actions.min_iteration_improvement must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn usage_limits(&self, instant: Instant) -> RaUsageLimits {
        self.ra_usage_limits
            .get(instant.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the objective uses relative (PTDF-normalised) margins.
    pub fn relative_margins_enabled(&self) -> bool {
        self.objective_function.kind == ObjectiveFunctionKind::MaxMinRelativeMargin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveFunctionKind {
    #[default]
    MaxMinMargin,
    MaxMinRelativeMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreventiveStopCriterion {
    #[default]
    MinObjective,
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurativeStopCriterion {
    #[default]
    MinObjective,
    Secure,
    PreventiveObjective,
    PreventiveObjectiveAndSecure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveFunctionParameters {
    pub kind: ObjectiveFunctionKind,
    pub unit: Unit,
    pub preventive_stop_criterion: PreventiveStopCriterion,
    pub curative_stop_criterion: CurativeStopCriterion,
    /// Improvement (in objective units) a curative perimeter must reach over
    /// the preventive cost for `preventive_objective` stop criteria.
    pub curative_min_obj_improvement: f64,
    /// Fall back to the initial situation when the RAO made things worse.
    pub forbid_cost_increase: bool,
    pub sensitivity_failure_overcost: f64,
}

impl Default for ObjectiveFunctionParameters {
    fn default() -> Self {
        Self {
            kind: ObjectiveFunctionKind::MaxMinMargin,
            unit: Unit::Megawatt,
            preventive_stop_criterion: PreventiveStopCriterion::MinObjective,
            curative_stop_criterion: CurativeStopCriterion::MinObjective,
            curative_min_obj_improvement: 0.0,
            forbid_cost_increase: true,
            sensitivity_failure_overcost: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PstModel {
    #[default]
    Continuous,
    ApproximatedIntegers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    Microlp,
    Highs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionsOptimizationParameters {
    pub max_mip_iterations: usize,
    /// Cost decrease an MILP iteration must reach to be kept.
    pub min_iteration_improvement: f64,
    pub pst_penalty_cost: f64,
    pub pst_sensitivity_threshold: f64,
    pub hvdc_penalty_cost: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_penalty_cost: f64,
    pub injection_sensitivity_threshold: f64,
    pub pst_model: PstModel,
    pub solver: SolverKind,
    pub relative_mip_gap: f64,
}

impl Default for RangeActionsOptimizationParameters {
    fn default() -> Self {
        Self {
            max_mip_iterations: 10,
            min_iteration_improvement: 1e-6,
            pst_penalty_cost: 0.01,
            pst_sensitivity_threshold: 1e-6,
            hvdc_penalty_cost: 0.001,
            hvdc_sensitivity_threshold: 1e-6,
            injection_penalty_cost: 0.001,
            injection_sensitivity_threshold: 1e-6,
            pst_model: PstModel::Continuous,
            solver: SolverKind::Microlp,
            relative_mip_gap: 1e-4,
        }
    }
}

impl RangeActionsOptimizationParameters {
    pub fn penalty_cost(&self, category: RangeActionCategory) -> f64 {
        match category {
            RangeActionCategory::Pst => self.pst_penalty_cost,
            RangeActionCategory::Hvdc => self.hvdc_penalty_cost,
            RangeActionCategory::Injection | RangeActionCategory::CounterTrade => {
                self.injection_penalty_cost
            }
        }
    }

    pub fn sensitivity_threshold(&self, category: RangeActionCategory) -> f64 {
        match category {
            RangeActionCategory::Pst => self.pst_sensitivity_threshold,
            RangeActionCategory::Hvdc => self.hvdc_sensitivity_threshold,
            RangeActionCategory::Injection | RangeActionCategory::CounterTrade => {
                self.injection_sensitivity_threshold
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoOptimizationParameters {
    pub max_preventive_search_tree_depth: usize,
    pub max_curative_search_tree_depth: usize,
    pub relative_min_impact_threshold: f64,
    pub absolute_min_impact_threshold: f64,
    pub skip_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_actions: usize,
    /// Network action ids that are tried together in one leaf.
    pub predefined_combinations: Vec<Vec<String>>,
}

impl Default for TopoOptimizationParameters {
    fn default() -> Self {
        Self {
            max_preventive_search_tree_depth: 2,
            max_curative_search_tree_depth: 2,
            relative_min_impact_threshold: 0.0,
            absolute_min_impact_threshold: 0.0,
            skip_actions_far_from_most_limiting_element: false,
            max_number_of_boundaries_for_skipping_actions: 2,
            predefined_combinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultithreadingParameters {
    pub contingency_scenarios_in_parallel: usize,
    pub preventive_leaves_in_parallel: usize,
    pub curative_leaves_in_parallel: usize,
}

impl Default for MultithreadingParameters {
    fn default() -> Self {
        Self {
            contingency_scenarios_in_parallel: 1,
            preventive_leaves_in_parallel: 1,
            curative_leaves_in_parallel: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecondPreventiveExecutionCondition {
    #[default]
    Disabled,
    PossibleCurativeImprovement,
    CostIncrease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondPreventiveParameters {
    pub execution_condition: SecondPreventiveExecutionCondition,
    /// Let the second preventive pass re-optimise range actions that are
    /// also available in curative.
    pub re_optimize_curative_range_actions: bool,
    pub hint_from_first_preventive: bool,
    /// Wall-clock deadline; the pass is skipped if it cannot finish before.
    pub target_end_time: Option<DateTime<Utc>>,
}

impl Default for SecondPreventiveParameters {
    fn default() -> Self {
        Self {
            execution_condition: SecondPreventiveExecutionCondition::Disabled,
            re_optimize_curative_range_actions: false,
            hint_from_first_preventive: false,
            target_end_time: None,
        }
    }
}

/// Caps on the number of remedial actions used at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaUsageLimits {
    /// Unlimited when unset.
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    pub max_topo_per_tso: BTreeMap<String, usize>,
    pub max_pst_per_tso: BTreeMap<String, usize>,
    pub max_ra_per_tso: BTreeMap<String, usize>,
}

impl Default for RaUsageLimits {
    fn default() -> Self {
        Self {
            max_ra: None,
            max_tso: None,
            max_topo_per_tso: BTreeMap::new(),
            max_pst_per_tso: BTreeMap::new(),
            max_ra_per_tso: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    /// MW of margin an MNEC may lose relative to its initial margin.
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginsParameters {
    pub ptdf_sum_lower_bound: f64,
}

impl Default for RelativeMarginsParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    pub enabled: bool,
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityParameters {
    /// Retries with the fallback configuration after a failure.
    pub max_retries_with_fallback: usize,
}

impl Default for SensitivityParameters {
    fn default() -> Self {
        Self {
            max_retries_with_fallback: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_parameters() {
        let params = RaoParameters::default();
        assert_eq!(params.range_actions.max_mip_iterations, 10);
        assert!(params.objective_function.forbid_cost_increase);
        assert_eq!(params.usage_limits(Instant::Preventive), RaUsageLimits::default());
        params.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            [objective_function]
            preventive_stop_criterion = "secure"
            curative_stop_criterion = "preventive_objective_and_secure"

            [topo]
            max_preventive_search_tree_depth = 5

            [ra_usage_limits.curative]
            max_ra = 3
            max_topo_per_tso = { FR = 1 }
        "#;
        let params = RaoParameters::from_toml_str(toml).unwrap();
        assert_eq!(
            params.objective_function.preventive_stop_criterion,
            PreventiveStopCriterion::Secure
        );
        assert_eq!(
            params.objective_function.curative_stop_criterion,
            CurativeStopCriterion::PreventiveObjectiveAndSecure
        );
        assert_eq!(params.topo.max_preventive_search_tree_depth, 5);
        assert_eq!(params.topo.max_curative_search_tree_depth, 2, "untouched key keeps default");
        let limits = params.usage_limits(Instant::Curative);
        assert_eq!(limits.max_ra, Some(3));
        assert_eq!(limits.max_topo_per_tso.get("FR"), Some(&1));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let toml = r#"
            [relative_margins]
            ptdf_sum_lower_bound = 0.0
        "#;
        assert!(RaoParameters::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_negative_iteration_improvement_rejected() {
        let mut params = RaoParameters::default();
        params.range_actions.min_iteration_improvement = -1.0;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("min_iteration_improvement"), "got {err}");
    }

    #[test]
    fn test_round_trip_file() {
        let mut params = RaoParameters::default();
        params.mnec.violation_cost = 42.0;
        params.ra_usage_limits.insert(
            "preventive".into(),
            RaUsageLimits {
                max_ra: Some(2),
                ..RaUsageLimits::default()
            },
        );
        params.second_preventive.execution_condition =
            SecondPreventiveExecutionCondition::PossibleCurativeImprovement;
        let file = NamedTempFile::new().unwrap();
        params.save_to(file.path()).unwrap();
        let loaded = RaoParameters::load_from(file.path()).unwrap();
        assert_eq!(loaded.mnec.violation_cost, 42.0);
        assert_eq!(loaded.usage_limits(Instant::Preventive).max_ra, Some(2));
        assert_eq!(
            loaded.second_preventive.execution_condition,
            SecondPreventiveExecutionCondition::PossibleCurativeImprovement
        );
    }
}
