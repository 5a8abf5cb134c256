use isorace::prelude::*;

mod common;
use common::{assert_close, init_logging, two_sessions};

fn increment_race() -> Vec<Event> {
    vec![
        Event::read_for_update("A", "ASCC_105"),
        Event::sleep("A"),
        Event::read_for_update("B", "ASCC_105"),
        Event::write("B", "ASCC_105", Update::Add(1.0)),
        Event::commit("B"),
        Event::write("A", "ASCC_105", Update::Add(1.0)),
        Event::commit("A"),
    ]
}

#[test]
fn test_waiting_session_resumes_after_lock_release() {
    let sim = two_sessions(
        &[("ASCC_105", 27.3689)],
        SimulatorConfig::default(),
        IsolationLevel::RepeatableRead,
        IsolationLevel::RepeatableRead,
    );
    let report = sim.run(increment_race()).unwrap();

    assert_close(report.value("ASCC_105").unwrap(), 29.3689);
    assert_eq!(report.final_version, 2);
    assert_eq!(report.outcome("A"), Some(SessionState::Committed));
    assert_eq!(report.outcome("B"), Some(SessionState::Committed));

    // B read the value A committed, never the original one
    let b_reads = report.read_values("B");
    assert_eq!(b_reads.len(), 1);
    assert_close(b_reads[0], 28.3689);

    // The blocked event is traced twice: once waiting, once when replayed
    let seqs: Vec<usize> = report.steps.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 5, 6, 2, 3, 4]);
    assert_eq!(
        report.steps[2].result,
        StepResult::Waiting {
            key: "ASCC_105".to_string(),
            holder: "A".to_string(),
        }
    );
    assert!(report.stalled().next().is_none());
}

#[test]
fn test_fail_policy_reports_conflict_and_keeps_session_alive() {
    let sim = two_sessions(
        &[("ASCC_105", 27.3689)],
        SimulatorConfig::default().with_lock_policy(LockPolicy::Fail),
        IsolationLevel::RepeatableRead,
        IsolationLevel::RepeatableRead,
    );
    let report = sim.run(increment_race()).unwrap();

    let errors = report.errors("B");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, SimError::Conflict(_))));
    // B stayed usable and committed, with nothing to write
    assert_eq!(report.outcome("B"), Some(SessionState::Committed));
    assert_eq!(
        report.steps[4].result.observation(),
        Some(&Observation::Committed { version: None })
    );
    assert_close(report.value("ASCC_105").unwrap(), 28.3689);
    assert_eq!(report.final_version, 1);
}

#[test]
fn test_abort_policy_rolls_back_contending_session() {
    let sim = two_sessions(
        &[("ASCC_105", 27.3689)],
        SimulatorConfig::default().with_lock_policy(LockPolicy::Abort),
        IsolationLevel::RepeatableRead,
        IsolationLevel::RepeatableRead,
    );
    let report = sim.run(increment_race()).unwrap();

    assert_eq!(report.outcome("B"), Some(SessionState::Aborted));
    let errors = report.errors("B");
    assert!(matches!(errors[0], SimError::Conflict(_)));
    assert_eq!(errors[1], &SimError::SessionClosed("B".to_string()));
    assert_eq!(errors[2], &SimError::SessionClosed("B".to_string()));
    assert_close(report.value("ASCC_105").unwrap(), 28.3689);
}

#[test]
fn test_session_level_lock_policy_overrides_default() {
    init_logging();
    let mut sim = Simulator::new(
        RecordStore::seeded([("ASCC_105", 27.3689)]),
        SimulatorConfig::default(),
    );
    sim.session("A", IsolationLevel::RepeatableRead).session_with(
        SessionSpec::new("B", IsolationLevel::RepeatableRead).lock_policy(LockPolicy::Fail),
    );
    let report = sim.run(increment_race()).unwrap();

    assert_eq!(report.errors("B").len(), 2);
    assert!(report.steps.iter().all(|s| !matches!(s.result, StepResult::Waiting { .. })));
}

#[test]
fn test_lock_cycle_stalls_both_sessions() {
    let sim = two_sessions(
        &[("x", 1.0), ("y", 2.0)],
        SimulatorConfig::default(),
        IsolationLevel::ReadCommitted,
        IsolationLevel::ReadCommitted,
    );
    let report = sim
        .run(vec![
            Event::write("A", "x", Update::Add(1.0)),
            Event::write("B", "y", Update::Add(1.0)),
            Event::write("A", "y", Update::Add(1.0)),
            Event::write("B", "x", Update::Add(1.0)),
            Event::commit("A"),
            Event::commit("B"),
        ])
        .unwrap();

    let stalled: Vec<(usize, &str)> = report
        .stalled()
        .map(|s| (s.seq, s.event.session.as_str()))
        .collect();
    assert_eq!(stalled, vec![(2, "A"), (4, "A"), (3, "B"), (5, "B")]);
    assert_eq!(
        report.steps.last().map(|s| &s.result),
        Some(&StepResult::Stalled {
            key: "x".to_string(),
            holder: Some("A".to_string()),
        })
    );
    assert_eq!(report.outcome("A"), Some(SessionState::Active));
    assert_eq!(report.outcome("B"), Some(SessionState::Active));
    assert_eq!(report.value("x"), Some(1.0));
    assert_eq!(report.value("y"), Some(2.0));
    assert_eq!(report.final_version, 0);
}

#[test]
fn test_waiters_resume_in_arrival_order() {
    init_logging();
    let mut sim = Simulator::new(RecordStore::seeded([("k", 1.0)]), SimulatorConfig::default());
    sim.session("A", IsolationLevel::ReadCommitted)
        .session("B", IsolationLevel::ReadCommitted)
        .session("C", IsolationLevel::ReadCommitted);

    let report = sim
        .run(vec![
            Event::write("A", "k", Update::Add(1.0)),
            Event::write("B", "k", Update::Add(10.0)),
            Event::write("C", "k", Update::Add(100.0)),
            Event::commit("A"),
            Event::commit("B"),
            Event::commit("C"),
        ])
        .unwrap();

    let writers: Vec<&str> = report
        .steps
        .iter()
        .filter(|s| matches!(s.result.observation(), Some(Observation::Wrote { .. })))
        .map(|s| s.event.session.as_str())
        .collect();
    assert_eq!(writers, vec!["A", "B", "C"]);
    assert_eq!(report.value("k"), Some(112.0));
    assert_eq!(report.final_version, 3);
}

#[test]
fn test_waiter_resumes_when_holder_aborts() {
    let sim = two_sessions(
        &[("k", 5.0)],
        SimulatorConfig::default(),
        IsolationLevel::ReadCommitted,
        IsolationLevel::ReadCommitted,
    );
    let report = sim
        .run(vec![
            Event::write("A", "k", Update::Set(50.0)),
            Event::write("B", "k", Update::Add(1.0)),
            Event::abort("A"),
            Event::commit("B"),
        ])
        .unwrap();

    assert_eq!(report.value("k"), Some(6.0));
    assert_eq!(report.outcome("A"), Some(SessionState::Aborted));
    assert_eq!(report.outcome("B"), Some(SessionState::Committed));
}

#[test]
fn test_sleep_succeeds_for_closed_session() {
    let sim = two_sessions(
        &[("k", 1.0)],
        SimulatorConfig::default(),
        IsolationLevel::ReadCommitted,
        IsolationLevel::ReadCommitted,
    );
    let report = sim
        .run(vec![Event::abort("A"), Event::sleep("A")])
        .unwrap();

    assert!(report.errors("A").is_empty());
}
