use rao_core::{
    CurativeStopCriterion, Instant, PreventiveStopCriterion, RaUsageLimits, RaoParameters,
};

/// Cost below which a purely virtual perimeter is considered solved.
pub const PURELY_VIRTUAL_COST_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCriterion {
    /// Search until depth or improvement limits, never stop early.
    MinObjective,
    /// Stop as soon as a leaf's cost is strictly below the target.
    AtTargetObjectiveValue(f64),
}

/// Search parameters of one stage, derived from [`RaoParameters`].
#[derive(Debug, Clone)]
pub struct TreeParameters {
    pub stop_criterion: StopCriterion,
    pub max_search_tree_depth: usize,
    pub leaves_in_parallel: usize,
    pub relative_min_impact_threshold: f64,
    pub absolute_min_impact_threshold: f64,
    pub skip_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_actions: usize,
    pub usage_limits: RaUsageLimits,
    pub predefined_combinations: Vec<Vec<String>>,
}

impl TreeParameters {
    fn with_stop(parameters: &RaoParameters, stop_criterion: StopCriterion, instant: Instant) -> Self {
        let topo = &parameters.topo;
        let threads = &parameters.multithreading;
        let (depth, leaves) = if instant.is_preventive() {
            (topo.max_preventive_search_tree_depth, threads.preventive_leaves_in_parallel)
        } else {
            (topo.max_curative_search_tree_depth, threads.curative_leaves_in_parallel)
        };
        Self {
            stop_criterion,
            max_search_tree_depth: depth,
            leaves_in_parallel: leaves.max(1),
            relative_min_impact_threshold: topo.relative_min_impact_threshold,
            absolute_min_impact_threshold: topo.absolute_min_impact_threshold,
            skip_actions_far_from_most_limiting_element: topo.skip_actions_far_from_most_limiting_element,
            max_number_of_boundaries_for_skipping_actions: topo.max_number_of_boundaries_for_skipping_actions,
            usage_limits: parameters.usage_limits(instant),
            predefined_combinations: topo.predefined_combinations.clone(),
        }
    }

    pub fn preventive(parameters: &RaoParameters) -> Self {
        let stop = match parameters.objective_function.preventive_stop_criterion {
            PreventiveStopCriterion::MinObjective => StopCriterion::MinObjective,
            PreventiveStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
        };
        Self::with_stop(parameters, stop, Instant::Preventive)
    }

    /// `preventive_cost` is the cost reached by the preventive perimeter.
    pub fn curative(parameters: &RaoParameters, preventive_cost: f64) -> Self {
        let objective = &parameters.objective_function;
        let preventive_target = preventive_cost - objective.curative_min_obj_improvement;
        let stop = match objective.curative_stop_criterion {
            CurativeStopCriterion::MinObjective => StopCriterion::MinObjective,
            CurativeStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
            CurativeStopCriterion::PreventiveObjective => StopCriterion::AtTargetObjectiveValue(preventive_target),
            CurativeStopCriterion::PreventiveObjectiveAndSecure => {
                StopCriterion::AtTargetObjectiveValue(preventive_target.min(0.0))
            }
        };
        Self::with_stop(parameters, stop, Instant::Curative)
    }

    pub fn second_preventive(parameters: &RaoParameters) -> Self {
        let objective = &parameters.objective_function;
        let stop = if objective.preventive_stop_criterion == PreventiveStopCriterion::Secure
            && objective.curative_stop_criterion != CurativeStopCriterion::MinObjective
        {
            StopCriterion::AtTargetObjectiveValue(0.0)
        } else {
            StopCriterion::MinObjective
        };
        Self::with_stop(parameters, stop, Instant::Preventive)
    }

    /// Whether `new_cost` beats `previous_cost` by both the absolute and
    /// the relative minimum impact.
    pub fn improved_enough(&self, previous_cost: f64, new_cost: f64) -> bool {
        previous_cost - self.absolute_min_impact_threshold > new_cost
            && (1.0 - previous_cost.signum() * self.relative_min_impact_threshold) * previous_cost > new_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curative_targets() {
        let mut parameters = RaoParameters::default();
        parameters.objective_function.curative_min_obj_improvement = 5.0;
        parameters.objective_function.curative_stop_criterion = CurativeStopCriterion::PreventiveObjective;
        assert_eq!(
            TreeParameters::curative(&parameters, 20.0).stop_criterion,
            StopCriterion::AtTargetObjectiveValue(15.0)
        );
        parameters.objective_function.curative_stop_criterion = CurativeStopCriterion::PreventiveObjectiveAndSecure;
        assert_eq!(
            TreeParameters::curative(&parameters, 20.0).stop_criterion,
            StopCriterion::AtTargetObjectiveValue(0.0)
        );
    }

    #[test]
    fn test_second_preventive_target() {
        let mut parameters = RaoParameters::default();
        assert_eq!(TreeParameters::second_preventive(&parameters).stop_criterion, StopCriterion::MinObjective);
        parameters.objective_function.preventive_stop_criterion = PreventiveStopCriterion::Secure;
        parameters.objective_function.curative_stop_criterion = CurativeStopCriterion::Secure;
        assert_eq!(
            TreeParameters::second_preventive(&parameters).stop_criterion,
            StopCriterion::AtTargetObjectiveValue(0.0)
        );
    }

    #[test]
    fn test_improved_enough_thresholds() {
        let mut tree = TreeParameters::preventive(&RaoParameters::default());
        tree.absolute_min_impact_threshold = 1.0;
        tree.relative_min_impact_threshold = 0.1;
        assert!(!tree.improved_enough(100.0, 99.5), "below absolute threshold");
        assert!(!tree.improved_enough(100.0, 95.0), "below relative threshold");
        assert!(tree.improved_enough(100.0, 89.0));
        assert!(tree.improved_enough(-100.0, -111.0));
        assert!(!tree.improved_enough(-100.0, -105.0));
    }
}
