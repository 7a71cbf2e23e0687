//! Catalog and network deserialisation from the JSON case format.

use rao_core::{
    Crac, ElementaryAction, Instant, Network, RangeActionCategory, RemedialActionInfo, State,
    UsageMethod,
};

const NETWORK: &str = r#"{
    "name": "two-areas",
    "branches": {
        "fr-be": { "from_area": "FR", "to_area": "BE" },
        "fr-int": { "from_area": "FR", "to_area": "FR" }
    },
    "phase_shifters": {
        "pst-fr": { "tap": 0, "tap_to_angle": { "-2": -1.0, "-1": -0.5, "0": 0.0, "1": 0.5, "2": 1.0 }, "area": "FR" }
    },
    "setpoints": { "gen-be": 100.0 },
    "element_areas": { "gen-be": "BE" }
}"#;

const CRAC: &str = r#"{
    "id": "crac",
    "contingencies": [ { "id": "co1", "elements": ["fr-int"] } ],
    "cnecs": [
        {
            "id": "fr-be-prev",
            "element": "fr-be",
            "state": { "instant": "preventive" },
            "thresholds": [ { "min": -500.0, "max": 500.0 } ]
        },
        {
            "id": "fr-be-cur",
            "element": "fr-be",
            "state": { "instant": "curative", "contingency": "co1" },
            "thresholds": [ { "unit": "ampere", "max": 1000.0 } ],
            "sides": ["one", "two"],
            "monitored": true
        }
    ],
    "remedial_actions": [
        { "network": {
            "id": "close-int",
            "operator": "FR",
            "usage_rules": [ { "type": "on_instant", "instant": "preventive", "method": "available" } ],
            "elementary_actions": [ { "type": "topology", "element": "fr-int", "action": "close" } ]
        } },
        { "range": {
            "id": "pst-ra",
            "operator": "FR",
            "usage_rules": [
                { "type": "on_instant", "instant": "preventive", "method": "available" },
                { "type": "on_contingency_state", "instant": "curative", "contingency": "co1", "method": "available" }
            ],
            "ranges": [ { "type": "absolute", "min": -2, "max": 2 } ],
            "kind": { "pst": { "element": "pst-fr", "tap_to_angle": { "-2": -1.0, "-1": -0.5, "0": 0.0, "1": 0.5, "2": 1.0 } } }
        } },
        { "range": {
            "id": "gen-ra",
            "kind": { "injection": { "distribution_keys": { "gen-be": 1.0 } } },
            "usage_rules": [ { "type": "on_flow_constraint", "instant": "curative", "cnec": "fr-be-cur" } ]
        } }
    ]
}"#;

#[test]
fn test_case_deserialises_and_validates() {
    let network: Network = serde_json::from_str(NETWORK).expect("network json");
    let crac: Crac = serde_json::from_str(CRAC).expect("crac json");
    crac.validate(&network).expect("consistent catalog");

    assert_eq!(crac.network_actions().count(), 1);
    assert_eq!(crac.range_actions().count(), 2);

    let pst = crac.range_action("pst-ra").unwrap();
    assert_eq!(pst.category(), RangeActionCategory::Pst);
    assert_eq!(pst.current_setpoint(&network).unwrap(), 0.0);

    let na = crac.network_action("close-int").unwrap();
    assert!(matches!(
        na.elementary_actions[0],
        ElementaryAction::Topology { .. }
    ));
    assert!(!na.has_impact_on(&network), "branch already closed");
}

#[test]
fn test_usage_methods_per_state() {
    let crac: Crac = serde_json::from_str(CRAC).unwrap();
    let cur = State::post_contingency(Instant::Curative, "co1");
    let pst = crac.range_action("pst-ra").unwrap();
    let gen = crac.range_action("gen-ra").unwrap();

    assert_eq!(crac.usage_method(pst, &State::preventive()), UsageMethod::Available);
    assert_eq!(crac.usage_method(pst, &cur), UsageMethod::Available);
    assert_eq!(crac.usage_method(gen, &cur), UsageMethod::ToBeEvaluated);
    assert_eq!(gen.guarding_cnecs(&cur, |id| crac.cnec(id).map(|c| &c.state)), vec!["fr-be-cur"]);
    assert!(crac.has_post_contingency_actions("co1", Instant::Curative));
    assert!(!crac.has_post_contingency_actions("co1", Instant::Auto));
}

#[test]
fn test_ampere_cnec_bounds() {
    let crac: Crac = serde_json::from_str(CRAC).unwrap();
    let cnec = crac.cnec("fr-be-cur").unwrap();
    assert!(cnec.monitored && cnec.optimized);
    let ub = cnec
        .upper_bound(rao_core::Side::Two, rao_core::Unit::Megawatt)
        .unwrap();
    assert!((ub - 400.0 * 3f64.sqrt()).abs() < 1e-9);
}
