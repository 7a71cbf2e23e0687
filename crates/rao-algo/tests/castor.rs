//! End-to-end optimisations on small cases driven by the linear flow model.

use rao_algo::{Castor, FailureMode, LinearFlowModel, OptimizationInstant, OptimizationStepsExecuted, RaoResult};
use rao_core::{
    ActionType, Contingency, Crac, CurativeStopCriterion, ElementaryAction, FlowCnec, Instant, LoopFlowThreshold,
    Network, NetworkAction, ObjectiveFunctionKind, PreventiveStopCriterion, PstModel, Range, RangeAction,
    RangeActionKind, RaoParameters, SecondPreventiveExecutionCondition, State, Threshold, Unit, UsageMethod,
    UsageRule,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn preventive_rule(method: UsageMethod) -> UsageRule {
    UsageRule::OnInstant {
        instant: Instant::Preventive,
        method,
    }
}

fn taps(range: std::ops::RangeInclusive<i32>) -> BTreeMap<i32, f64> {
    range.map(|t| (t, t as f64)).collect()
}

fn open(id: &str, branch: &str) -> NetworkAction {
    NetworkAction::new(
        id,
        vec![ElementaryAction::Topology {
            element: branch.into(),
            action: ActionType::Open,
        }],
    )
}

fn hvdc(id: &str, element: &str) -> RangeAction {
    RangeAction::new(id, RangeActionKind::Hvdc { element: element.into() })
        .with_range(Range::absolute(-30.0, 30.0))
        .with_usage_rule(preventive_rule(UsageMethod::Available))
}

fn network() -> Network {
    let mut network = Network::new("test-grid");
    for branch in ["line1", "line2", "line3", "line-a", "line-b"] {
        network.add_branch(branch, "FR", "BE");
    }
    network.add_phase_shifter("pst", 0, taps(-10..=10));
    network.add_phase_shifter("pst2", 0, taps(-10..=10));
    network
}

fn cnec(id: &str, branch: &str, state: State) -> FlowCnec {
    FlowCnec::new(id, branch, state).with_threshold(Threshold::symmetric_mw(100.0))
}

fn run(model: LinearFlowModel, crac: &Crac, parameters: RaoParameters) -> RaoResult {
    Castor::new(Arc::new(model), parameters)
        .run(&network(), crac)
        .expect("optimization runs")
}

fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|v| (v - expected).abs() < 1e-6)
}

#[test]
fn test_hvdc_setpoint_maximizes_margin() {
    let mut crac = Crac::new("hvdc");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_range_action(hvdc("hvdc-ra", "dc"));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 50.0)
        .with_sensitivity("dc", "c1", 2.0);

    let result = run(model, &crac, RaoParameters::default());

    let setpoint = result.setpoint(&State::preventive(), "hvdc-ra");
    assert!(approx(setpoint, -25.0), "flow 50 + 2 * S is centered at S = -25, got {setpoint:?}");
    assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 100.0));
    assert!(approx(result.cost(OptimizationInstant::Initial), -50.0));
    assert!((result.final_cost() + 100.0).abs() < 1e-6, "got {}", result.final_cost());
    assert_eq!(result.optimization_steps_executed, OptimizationStepsExecuted::FirstPreventiveOnly);
    assert!(result.is_secure());
}

#[test]
fn test_grouped_range_actions_share_setpoint() {
    let mut crac = Crac::new("group");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_range_action(hvdc("hvdc-a", "dc-a").with_group("g"));
    crac.add_range_action(hvdc("hvdc-b", "dc-b").with_group("g"));
    // Alone, hvdc-a at -30 would cancel the flow with the lowest variation.
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 60.0)
        .with_sensitivity("dc-a", "c1", 2.0)
        .with_sensitivity("dc-b", "c1", 1.0);

    let result = run(model, &crac, RaoParameters::default());

    let prev = State::preventive();
    let a = result.setpoint(&prev, "hvdc-a");
    let b = result.setpoint(&prev, "hvdc-b");
    assert_eq!(a, b, "group members must share one setpoint");
    assert!(approx(a, -20.0), "3 * S = -60, got {a:?}");
    assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 100.0));
}

#[test]
fn test_pst_balances_two_cnecs() {
    let mut crac = Crac::new("pst");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_cnec(cnec("c2", "line2", State::preventive()));
    crac.add_range_action(
        RangeAction::pst("pst-ra", "pst", taps(-10..=10)).with_usage_rule(preventive_rule(UsageMethod::Available)),
    );
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 120.0)
        .with_reference_flow("c2", 40.0)
        .with_sensitivity("pst", "c1", -10.0)
        .with_sensitivity("pst", "c2", 10.0);

    let result = run(model, &crac, RaoParameters::default());

    let prev = State::preventive();
    assert_eq!(result.tap(&prev, "pst-ra"), Some(4), "120 - 10a = 40 + 10a at a = 4");
    assert!(result.is_activated(&prev, "pst-ra"));
    for id in ["c1", "c2"] {
        let margin = result.margin(id, OptimizationInstant::AfterPra);
        assert!(approx(margin, 20.0), "{id} margin {margin:?}");
    }
    assert!(result.final_cost() <= 0.0);
    assert!(result.margin("c1", OptimizationInstant::Initial).is_some_and(|m| m < 0.0));
}

#[test]
fn test_worsening_network_action_is_not_kept() {
    let mut crac = Crac::new("worse");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_network_action(open("open-3", "line3").with_usage_rule(preventive_rule(UsageMethod::Available)));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 80.0)
        .with_outage_impact("line3", "c1", 50.0);

    let result = run(model, &crac, RaoParameters::default());

    assert!(result.activated_network_actions(&State::preventive()).is_empty());
    assert!((result.final_cost() + 20.0).abs() < 1e-6, "baseline kept, got {}", result.final_cost());
    assert_eq!(result.optimization_steps_executed, OptimizationStepsExecuted::FirstPreventiveOnly);
}

fn two_topology_case() -> (Crac, LinearFlowModel) {
    let mut crac = Crac::new("topo");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_network_action(open("open-a", "line-a").with_usage_rule(preventive_rule(UsageMethod::Available)));
    crac.add_network_action(open("open-b", "line-b").with_usage_rule(preventive_rule(UsageMethod::Available)));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 130.0)
        .with_outage_impact("line-a", "c1", -40.0)
        .with_outage_impact("line-b", "c1", -60.0);
    (crac, model)
}

#[test]
fn test_search_combines_network_actions() {
    let (crac, model) = two_topology_case();
    let result = run(model, &crac, RaoParameters::default());

    let mut activated = result.activated_network_actions(&State::preventive());
    activated.sort_unstable();
    assert_eq!(activated, vec!["open-a", "open-b"]);
    assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 70.0));
}

#[test]
fn test_secure_stop_picks_lowest_rank_deterministically() {
    let mut parameters = RaoParameters::default();
    parameters.objective_function.preventive_stop_criterion = PreventiveStopCriterion::Secure;
    parameters.multithreading.preventive_leaves_in_parallel = 2;

    // Both single actions secure the network; open-a has the lower rank,
    // open-b the lower cost.
    for _ in 0..5 {
        let (crac, model) = two_topology_case();
        let result = run(model, &crac, parameters.clone());
        assert_eq!(result.activated_network_actions(&State::preventive()), vec!["open-a"]);
        assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 10.0));
    }
}

#[test]
fn test_forced_action_increasing_cost_falls_back() {
    let mut crac = Crac::new("forced");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_network_action(open("open-3", "line3").with_usage_rule(preventive_rule(UsageMethod::Forced)));
    let model = || {
        LinearFlowModel::new()
            .with_reference_flow("c1", 50.0)
            .with_outage_impact("line3", "c1", 60.0)
    };

    let result = run(model(), &crac, RaoParameters::default());
    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation
    );
    assert_eq!(result.costs.len(), 1, "only the initial situation is reported");
    assert!((result.final_cost() + 50.0).abs() < 1e-6);
    assert!(result.activated_network_actions(&State::preventive()).is_empty());

    let mut parameters = RaoParameters::default();
    parameters.objective_function.forbid_cost_increase = false;
    let result = run(model(), &crac, parameters);
    assert_eq!(result.activated_network_actions(&State::preventive()), vec!["open-3"]);
    assert!((result.final_cost() - 10.0).abs() < 1e-6, "forced action kept, got {}", result.final_cost());
}

#[test]
fn test_initial_sensitivity_failure_returns_initial_situation() {
    let mut crac = Crac::new("failure");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 50.0)
        .with_failure_mode(FailureMode::Always);

    let result = run(model, &crac, RaoParameters::default());

    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::FirstPreventiveFellBackToInitialSituation
    );
    assert!(result.global_computation_status().is_failure());
    assert!(result.margin("c1", OptimizationInstant::Initial).is_none());
}

fn curative_case() -> (Crac, LinearFlowModel) {
    let co = "co-line2";
    let mut crac = Crac::new("curative");
    crac.add_contingency(Contingency::new(co, vec!["line2".into()]));
    crac.add_cnec(cnec("c-prev", "line1", State::preventive()));
    crac.add_cnec(cnec("c-cur", "line1", State::post_contingency(Instant::Curative, co)));
    crac.add_range_action(
        RangeAction::pst("pst-cur", "pst", taps(-10..=10)).with_usage_rule(UsageRule::OnContingencyState {
            instant: Instant::Curative,
            contingency: co.into(),
            method: UsageMethod::Available,
        }),
    );
    let model = LinearFlowModel::new()
        .with_reference_flow("c-prev", 50.0)
        .with_reference_flow("c-cur", 50.0)
        .with_outage_impact("line2", "c-cur", 100.0)
        .with_sensitivity("pst", "c-prev", -10.0)
        .with_sensitivity("pst", "c-cur", -10.0);
    (crac, model)
}

#[test]
fn test_curative_pst_relieves_post_contingency_overload() {
    let (crac, model) = curative_case();
    let result = run(model, &crac, RaoParameters::default());

    let curative = State::post_contingency(Instant::Curative, "co-line2");
    assert_eq!(result.tap(&curative, "pst-cur"), Some(10), "range limit reached");
    assert_eq!(result.tap(&State::preventive(), "pst-cur"), None);
    assert!(approx(result.margin("c-cur", OptimizationInstant::AfterPra), -50.0));
    assert!(approx(result.margin("c-cur", OptimizationInstant::AfterCra), 50.0));
    assert!(approx(result.margin("c-prev", OptimizationInstant::AfterCra), 50.0));
    assert!((result.final_cost() + 50.0).abs() < 1e-6, "got {}", result.final_cost());
    assert!(result.cost(OptimizationInstant::AfterAra).is_none(), "no automaton stage");
}

#[test]
fn test_second_preventive_without_gain_keeps_first_result() {
    let (crac, model) = curative_case();
    let mut parameters = RaoParameters::default();
    parameters.second_preventive.execution_condition = SecondPreventiveExecutionCondition::PossibleCurativeImprovement;

    let result = run(model, &crac, parameters);

    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::SecondPreventiveFellBackToFirstPreventiveSituation
    );
    let curative = State::post_contingency(Instant::Curative, "co-line2");
    assert_eq!(result.tap(&curative, "pst-cur"), Some(10));
    assert!((result.final_cost() + 50.0).abs() < 1e-6);
}

#[test]
fn test_flow_guarded_automaton_is_triggered() {
    let co = "co-line2";
    let auto = State::post_contingency(Instant::Auto, co);
    let mut crac = Crac::new("auto");
    crac.add_contingency(Contingency::new(co, vec!["line2".into()]));
    crac.add_cnec(cnec("c-prev", "line1", State::preventive()));
    crac.add_cnec(cnec("c-auto", "line1", auto.clone()));
    crac.add_network_action(open("auto-open-3", "line3").with_usage_rule(UsageRule::OnFlowConstraint {
        instant: Instant::Auto,
        cnec: "c-auto".into(),
    }));
    let model = LinearFlowModel::new()
        .with_reference_flow("c-prev", 50.0)
        .with_reference_flow("c-auto", 50.0)
        .with_outage_impact("line2", "c-auto", 100.0)
        .with_outage_impact("line3", "c-auto", -80.0);

    let result = run(model, &crac, RaoParameters::default());

    assert_eq!(result.activated_network_actions(&auto), vec!["auto-open-3"]);
    assert!(result.activated_network_actions(&State::preventive()).is_empty());
    assert!(approx(result.margin("c-auto", OptimizationInstant::AfterPra), -50.0));
    assert!(approx(result.margin("c-auto", OptimizationInstant::AfterAra), 30.0));
    assert!((result.final_cost() + 30.0).abs() < 1e-6, "got {}", result.final_cost());
}

#[test]
fn test_pst_limited_by_range_on_unbalanced_cnecs() {
    let mut crac = Crac::new("pst-limit");
    crac.add_cnec(cnec("a", "line1", State::preventive()));
    crac.add_cnec(cnec("b", "line2", State::preventive()));
    crac.add_range_action(
        RangeAction::pst("pst-ra", "pst", taps(-10..=10)).with_usage_rule(preventive_rule(UsageMethod::Available)),
    );
    let model = LinearFlowModel::new()
        .with_reference_flow("a", 120.0)
        .with_reference_flow("b", 30.0)
        .with_sensitivity("pst", "a", -5.0)
        .with_sensitivity("pst", "b", 1.0);

    let result = run(model, &crac, RaoParameters::default());

    // min(5t - 20, 70 - t) peaks at t = 15, beyond the last tap.
    assert_eq!(result.tap(&State::preventive(), "pst-ra"), Some(10));
    assert!(approx(result.margin("a", OptimizationInstant::AfterPra), 30.0));
    assert!(approx(result.margin("b", OptimizationInstant::AfterPra), 60.0));
    assert!((result.final_cost() + 30.0).abs() < 1e-6, "got {}", result.final_cost());
    assert!(result.final_cost() <= 0.0);
}

#[test]
fn test_approximated_integers_keep_grouped_taps_equal() {
    let mut crac = Crac::new("integer-group");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    for (id, element) in [("pst-1", "pst"), ("pst-2", "pst2")] {
        crac.add_range_action(
            RangeAction::pst(id, element, taps(-10..=10))
                .with_group("g")
                .with_usage_rule(preventive_rule(UsageMethod::Available)),
        );
    }
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 73.0)
        .with_sensitivity("pst", "c1", -5.0)
        .with_sensitivity("pst2", "c1", -5.0);
    let mut parameters = RaoParameters::default();
    parameters.range_actions.pst_model = PstModel::ApproximatedIntegers;

    let result = run(model, &crac, parameters);

    let prev = State::preventive();
    let (t1, t2) = (result.tap(&prev, "pst-1"), result.tap(&prev, "pst-2"));
    assert_eq!(t1, t2, "group members share one tap");
    assert_eq!(t1, Some(7), "73 - 10t is closest to 0 at t = 7");
    assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 97.0));
}

#[test]
fn test_relative_margin_objective() {
    let mut crac = Crac::new("relative");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_range_action(hvdc("hvdc-ra", "dc"));
    let mut model = LinearFlowModel::new()
        .with_reference_flow("c1", 50.0)
        .with_sensitivity("dc", "c1", 2.0);
    model.ptdf_sums.insert("c1".into(), 0.5);
    let mut parameters = RaoParameters::default();
    parameters.objective_function.kind = ObjectiveFunctionKind::MaxMinRelativeMargin;

    let result = run(model, &crac, parameters);

    let setpoint = result.setpoint(&State::preventive(), "hvdc-ra");
    assert!(approx(setpoint, -25.0), "got {setpoint:?}");
    assert!((result.final_cost() + 200.0).abs() < 1e-6, "margin 100 over a PTDF sum of 0.5, got {}", result.final_cost());
}

#[test]
fn test_mnec_limits_range_action() {
    let mut crac = Crac::new("mnec");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    crac.add_cnec(cnec("m1", "line2", State::preventive()).monitored_only());
    crac.add_range_action(hvdc("hvdc-ra", "dc"));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 50.0)
        .with_reference_flow("m1", 90.0)
        .with_sensitivity("dc", "c1", 2.0)
        .with_sensitivity("dc", "m1", -2.0);
    let mut parameters = RaoParameters::default();
    parameters.mnec.acceptable_margin_decrease = 0.0;

    let result = run(model, &crac, parameters);

    // Each MW below -5 gains 2 MW of margin but costs 2 MW of MNEC violation.
    let setpoint = result.setpoint(&State::preventive(), "hvdc-ra");
    assert!(approx(setpoint, -5.0), "got {setpoint:?}");
    assert!(approx(result.margin("m1", OptimizationInstant::AfterPra), 0.0));
    assert!((result.final_cost() + 60.0).abs() < 1e-6, "got {}", result.final_cost());
    let costs = &result.costs[&OptimizationInstant::AfterPra];
    assert!(costs.virtual_cost().abs() < 1e-6, "no MNEC violation, got {}", costs.virtual_cost());
}

#[test]
fn test_loop_flow_limits_range_action() {
    let mut crac = Crac::new("loop-flow");
    crac.add_cnec(cnec("c1", "line1", State::preventive()));
    let mut loop_flow_cnec = FlowCnec::new("lf", "line2", State::preventive());
    loop_flow_cnec.optimized = false;
    loop_flow_cnec.loop_flow_threshold = Some(LoopFlowThreshold {
        value: 30.0,
        unit: Unit::Megawatt,
    });
    crac.add_cnec(loop_flow_cnec);
    crac.add_range_action(hvdc("hvdc-ra", "dc"));
    let model = LinearFlowModel::new()
        .with_reference_flow("c1", 50.0)
        .with_sensitivity("dc", "c1", 2.0)
        .with_sensitivity("dc", "lf", -2.0);
    let mut parameters = RaoParameters::default();
    parameters.loop_flow.enabled = true;

    let result = run(model, &crac, parameters);

    // |2S| <= 30 caps the setpoint at -15.
    let setpoint = result.setpoint(&State::preventive(), "hvdc-ra");
    assert!(approx(setpoint, -15.0), "got {setpoint:?}");
    assert!(approx(result.margin("c1", OptimizationInstant::AfterPra), 80.0));
    assert!((result.final_cost() + 80.0).abs() < 1e-6, "got {}", result.final_cost());
}

/// PST usable in preventive and curative; only a preventive topology
/// relieves the contingency.
fn second_preventive_case() -> (Crac, LinearFlowModel) {
    let co = "co-line2";
    let mut crac = Crac::new("second-preventive");
    crac.add_contingency(Contingency::new(co, vec!["line2".into()]));
    crac.add_cnec(cnec("c-prev", "line1", State::preventive()));
    crac.add_cnec(cnec("c-cur", "line3", State::post_contingency(Instant::Curative, co)));
    crac.add_range_action(
        RangeAction::pst("pst-ra", "pst", taps(-10..=10))
            .with_usage_rule(preventive_rule(UsageMethod::Available))
            .with_usage_rule(UsageRule::OnContingencyState {
                instant: Instant::Curative,
                contingency: co.into(),
                method: UsageMethod::Available,
            }),
    );
    crac.add_network_action(open("open-a", "line-a").with_usage_rule(preventive_rule(UsageMethod::Available)));
    let model = LinearFlowModel::new()
        .with_reference_flow("c-prev", 150.0)
        .with_reference_flow("c-cur", 50.0)
        .with_sensitivity("pst", "c-prev", -10.0)
        .with_outage_impact("line2", "c-cur", 200.0)
        .with_outage_impact("line-a", "c-cur", -200.0);
    (crac, model)
}

#[test]
fn test_second_preventive_keeps_first_preventive_setpoints() {
    let (crac, model) = second_preventive_case();
    let mut parameters = RaoParameters::default();
    parameters.second_preventive.execution_condition = SecondPreventiveExecutionCondition::PossibleCurativeImprovement;

    let result = run(model, &crac, parameters);

    let prev = State::preventive();
    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::SecondPreventiveImprovedFirst
    );
    assert_eq!(result.activated_network_actions(&prev), vec!["open-a"]);
    assert_eq!(result.tap(&prev, "pst-ra"), Some(10), "first preventive tap must survive");
    assert!(result.is_activated(&prev, "pst-ra"));
    assert!(approx(result.margin("c-prev", OptimizationInstant::AfterCra), 50.0));
    assert!(approx(result.margin("c-cur", OptimizationInstant::AfterCra), 50.0));
    assert!((result.final_cost() + 50.0).abs() < 1e-6, "got {}", result.final_cost());
    assert!(result.is_secure());
}

#[test]
fn test_cost_increase_condition_respects_secure_curative_perimeters() {
    let co = "co-line2";
    let mut crac = Crac::new("cost-increase");
    crac.add_contingency(Contingency::new(co, vec!["line2".into()]));
    crac.add_cnec(cnec("c-prev", "line1", State::preventive()));
    crac.add_cnec(cnec("c-cur", "line3", State::post_contingency(Instant::Curative, co)));
    crac.add_network_action(open("open-b", "line-b").with_usage_rule(preventive_rule(UsageMethod::Forced)));
    crac.add_range_action(RangeAction::pst("pst-cur", "pst", taps(-10..=10)).with_usage_rule(
        UsageRule::OnContingencyState {
            instant: Instant::Curative,
            contingency: co.into(),
            method: UsageMethod::Available,
        },
    ));
    // The forced action worsens the curative Cnec, which stays secure.
    let model = LinearFlowModel::new()
        .with_reference_flow("c-cur", 20.0)
        .with_outage_impact("line-b", "c-cur", 70.0);
    let mut parameters = RaoParameters::default();
    parameters.objective_function.forbid_cost_increase = false;
    parameters.objective_function.curative_stop_criterion = CurativeStopCriterion::Secure;
    parameters.second_preventive.execution_condition = SecondPreventiveExecutionCondition::CostIncrease;

    let result = run(model, &crac, parameters.clone());

    assert!(approx(result.cost(OptimizationInstant::Initial), -80.0));
    assert!(approx(result.cost(OptimizationInstant::AfterCra), -10.0), "cost increased");
    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::FirstPreventiveOnly,
        "secure curative perimeters do not call for a second preventive"
    );

    parameters.objective_function.curative_stop_criterion = CurativeStopCriterion::MinObjective;
    let model = LinearFlowModel::new()
        .with_reference_flow("c-cur", 20.0)
        .with_outage_impact("line-b", "c-cur", 70.0);
    let result = run(model, &crac, parameters);
    assert_eq!(
        result.optimization_steps_executed,
        OptimizationStepsExecuted::SecondPreventiveFellBackToFirstPreventiveSituation
    );
}

#[test]
fn test_secure_preventive_at_zero_cost_still_optimizes_curative() {
    let (mut crac, _) = curative_case();
    crac.id = "zero-margin".into();
    let model = LinearFlowModel::new()
        .with_reference_flow("c-prev", 100.0)
        .with_reference_flow("c-cur", 50.0)
        .with_outage_impact("line2", "c-cur", 100.0)
        .with_sensitivity("pst", "c-cur", -10.0);
    let mut parameters = RaoParameters::default();
    parameters.objective_function.preventive_stop_criterion = PreventiveStopCriterion::Secure;

    let result = run(model, &crac, parameters);

    let curative = State::post_contingency(Instant::Curative, "co-line2");
    assert!(approx(result.margin("c-prev", OptimizationInstant::AfterPra), 0.0));
    assert_eq!(result.tap(&curative, "pst-cur"), Some(10), "a zero preventive cost must not skip curative optimization");
    assert!(approx(result.margin("c-cur", OptimizationInstant::AfterCra), 50.0));
    assert!(result.final_cost().abs() < 1e-6, "got {}", result.final_cost());
}
