use isorace::prelude::*;
use isorace::scenarios::{self, Scenario};

mod common;
use common::{assert_close, init_logging};

fn run(scenario: Scenario) -> SimulationReport {
    init_logging();
    let report = scenario.run().unwrap();
    log::debug!("{}:\n{}", scenario.name, report);
    report
}

#[test]
fn test_racy_increment_loses_no_update() {
    let report = run(scenarios::racy_increment());

    assert_close(report.value("ASCC_105").unwrap(), 29.3689);
    assert_eq!(report.outcome("UserA"), Some(SessionState::Committed));
    assert_eq!(report.outcome("UserB"), Some(SessionState::Committed));
    assert_close(report.read_values("UserA")[0], 27.3689);
    assert_close(report.read_values("UserB")[0], 28.3689);
}

#[test]
fn test_uncommitted_update_hidden_from_default_level() {
    let report = run(scenarios::uncommitted_update());

    assert_eq!(report.session("B").unwrap().isolation, IsolationLevel::RepeatableRead);
    assert_eq!(report.read_values("B"), vec![3.2]);
    assert_close(report.value("r50/1").unwrap(), 8.2);
    assert!(report.anomalies.is_empty());
}

#[test]
fn test_dirty_read_only_under_read_uncommitted() {
    let report = run(scenarios::dirty_read(IsolationLevel::ReadUncommitted));
    assert_close(report.read_values("B")[0], -2.5);
    assert_eq!(report.value("Vr/2"), Some(-12.5));
    let dirty = report.anomalies_of(AnomalyKind::DirtyRead);
    assert_eq!(dirty.len(), 1);
    assert!(dirty[0].saw_uncommitted_value());

    let report = run(scenarios::dirty_read(IsolationLevel::ReadCommitted));
    assert_eq!(report.read_values("B"), vec![-12.5]);
    assert!(report.anomalies.is_empty());
}

#[test]
fn test_non_repeatable_read_by_level() {
    let report = run(scenarios::non_repeatable_read(IsolationLevel::ReadCommitted));
    let reads = report.read_values("A");
    assert_close(reads[0], -0.2);
    assert_close(reads[1], -0.1);
    assert_eq!(report.anomalies_of(AnomalyKind::NonRepeatableRead).len(), 1);

    let report = run(scenarios::non_repeatable_read(IsolationLevel::RepeatableRead));
    assert_eq!(report.read_values("A"), vec![-0.2, -0.2]);
    assert!(report.anomalies.is_empty());
    assert_close(report.value("FeH/3").unwrap(), -0.1);

    // The serializable reader keeps its value and B's update is refused
    let report = run(scenarios::non_repeatable_read(IsolationLevel::Serializable));
    assert_eq!(report.read_values("A"), vec![-0.2, -0.2]);
    assert_eq!(report.outcome("B"), Some(SessionState::Aborted));
    assert_eq!(report.value("FeH/3"), Some(-0.2));
}

#[test]
fn test_phantom_read_depends_on_protection() {
    let report = run(scenarios::phantom_read(true));
    assert_eq!(report.count_values("A"), vec![3, 3]);
    assert!(report.anomalies.is_empty());

    let report = run(scenarios::phantom_read(false));
    assert_eq!(report.count_values("A"), vec![3, 4]);
    assert_eq!(
        report.anomalies,
        vec![Anomaly::PhantomRead {
            session: "A".to_string(),
            predicate: Predicate::GreaterThan(10.0),
            first: 3,
            second: 4,
        }]
    );
}

#[test]
fn test_serializable_insert_is_refused() {
    let report = run(scenarios::serializable_insert());

    assert_eq!(report.count_values("A"), vec![2]);
    assert_eq!(report.outcome("B"), Some(SessionState::Aborted));
    assert!(matches!(report.errors("B")[..], [SimError::Conflict(_)]));
    assert_eq!(report.outcome("A"), Some(SessionState::Committed));
    assert_eq!(report.value("FeH/9998"), None);
    assert_eq!(report.final_version, 0);
}

#[test]
fn test_walkthrough_runs_every_scenario() {
    let walkthrough = scenarios::walkthrough();
    assert_eq!(walkthrough.len(), 6);

    let mut names: Vec<&str> = walkthrough.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), walkthrough.len());

    for scenario in walkthrough {
        let report = run(scenario);
        assert!(report.stalled().next().is_none());
    }
}

#[test]
fn test_scenario_json_survives_serialization() {
    let original = scenarios::phantom_read(false);
    let json = original.to_json().unwrap();
    assert!(json.contains("\"op\": \"count\""));
    assert!(json.contains("\"phantom_protection\": false"));

    let parsed = Scenario::from_json(&json).unwrap();
    assert_eq!(parsed.name, original.name);
    assert_eq!(parsed.sessions, original.sessions);
    assert_eq!(parsed.events.len(), original.events.len());
    assert_eq!(run(parsed).count_values("A"), vec![3, 4]);
}

#[test]
fn test_scenario_from_json_applies_defaults() {
    let scenario = Scenario::from_json(
        r#"{
            "name": "lock-wait",
            "config": {"lock_policy": "fail"},
            "seed": [["k", 1.0]],
            "sessions": [
                {"name": "A", "isolation": "READ_COMMITTED"},
                {"name": "B", "lock_policy": "wait"}
            ],
            "events": [
                {"session": "A", "op": "write", "key": "k", "update": {"set": 5.0}},
                {"session": "B", "op": "read_for_update", "key": "k"},
                {"session": "A", "op": "commit"},
                {"session": "B", "op": "commit"}
            ]
        }"#,
    )
    .unwrap();

    assert_eq!(scenario.config.lock_policy, LockPolicy::Fail);
    assert!(scenario.config.phantom_protection);
    assert_eq!(scenario.sessions[1].isolation, None);

    // B overrides the policy and waits instead of failing
    let report = run(scenario);
    assert_eq!(report.session("B").unwrap().isolation, IsolationLevel::RepeatableRead);
    assert_eq!(report.read_values("B"), vec![5.0]);
    assert!(report.errors("B").is_empty());
}

#[test]
fn test_malformed_scenario_is_rejected() {
    assert!(matches!(
        Scenario::from_json(r#"{"name": "broken", "seed": []}"#),
        Err(SimError::Scenario(_))
    ));
    assert!(matches!(
        Scenario::from_json(
            r#"{"name": "x", "seed": [], "sessions": [],
                "events": [{"session": "A", "op": "fly"}]}"#
        ),
        Err(SimError::Scenario(_))
    ));
}
