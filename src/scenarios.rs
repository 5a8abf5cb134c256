//! Ready-made schedules for the classic isolation walkthrough.
//!
//! Each scenario mirrors one two-session console demonstration: a locked
//! read-modify-write race on a cluster record, then one schedule per read
//! phenomenon. Keys follow a `<column>/<id>` layout so several columns of the
//! same cluster row can live side by side in the store.

use serde::{Deserialize, Serialize};

use crate::config::{SessionSpec, SimulatorConfig};
use crate::data_store::record_store::RecordStore;
use crate::errors::{Result, SimError};
use crate::isolation::IsolationLevel;
use crate::report::SimulationReport;
use crate::schedule::{Event, Predicate, Update};
use crate::simulator::Simulator;

/// A self-contained simulation: seed data, sessions, settings and schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: SimulatorConfig,
    pub seed: Vec<(String, f64)>,
    pub sessions: Vec<SessionSpec>,
    pub events: Vec<Event>,
}

impl Scenario {
    /// Parses a scenario from JSON.
    ///
    /// ```
    /// use isorace::scenarios::Scenario;
    ///
    /// let scenario = Scenario::from_json(r#"{
    ///     "name": "increment",
    ///     "seed": [["ASCC_105", 27.3689]],
    ///     "sessions": [{"name": "A"}],
    ///     "events": [
    ///         {"session": "A", "op": "write", "key": "ASCC_105", "update": {"add": 1.0}},
    ///         {"session": "A", "op": "commit"}
    ///     ]
    /// }"#).unwrap();
    /// let report = scenario.run().unwrap();
    /// assert!((report.value("ASCC_105").unwrap() - 28.3689).abs() < 1e-9);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SimError::Scenario(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Scenario(e.to_string()))
    }

    pub fn run(&self) -> Result<SimulationReport> {
        let store = RecordStore::seeded(self.seed.iter().map(|(k, v)| (k.clone(), *v)));
        let mut simulator = Simulator::new(store, self.config);
        for spec in &self.sessions {
            simulator.session_with(spec.clone());
        }
        simulator.run(self.events.clone())
    }
}

fn seed(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Two users bump `DE_ICRS` of `ASCC_105` by one with `SELECT ... FOR UPDATE`.
///
/// User A locks first and sleeps; user B blocks on the lock and only reads
/// once A has committed, so no update is lost and the value ends at
/// `29.3689`.
pub fn racy_increment() -> Scenario {
    let key = "ASCC_105";
    Scenario {
        name: "racy-increment".to_string(),
        config: SimulatorConfig::default(),
        seed: seed(&[(key, 27.3689)]),
        sessions: vec![
            SessionSpec::with_default_isolation("UserA"),
            SessionSpec::with_default_isolation("UserB"),
        ],
        events: vec![
            Event::read_for_update("UserA", key),
            Event::sleep("UserA"),
            Event::read_for_update("UserB", key),
            Event::write("UserB", key, Update::Add(1.0)),
            Event::commit("UserB"),
            Event::write("UserA", key, Update::Add(1.0)),
            Event::commit("UserA"),
        ],
    }
}

/// A updates `r50` of cluster 1 and holds the change uncommitted while B,
/// at the default level, reads it.
pub fn uncommitted_update() -> Scenario {
    let key = "r50/1";
    Scenario {
        name: "uncommitted-update".to_string(),
        config: SimulatorConfig::default(),
        seed: seed(&[(key, 3.2)]),
        sessions: vec![
            SessionSpec::with_default_isolation("A"),
            SessionSpec::with_default_isolation("B"),
        ],
        events: vec![
            Event::write("A", key, Update::Add(5.0)),
            Event::read("B", key),
            Event::commit("A"),
            Event::commit("B"),
        ],
    }
}

/// A adds 10 to `Vr` of cluster 2 and rolls back after B has read it.
pub fn dirty_read(reader: IsolationLevel) -> Scenario {
    let key = "Vr/2";
    Scenario {
        name: format!("dirty-read-{}", reader.as_sql().to_lowercase().replace(' ', "-")),
        config: SimulatorConfig::default(),
        seed: seed(&[(key, -12.5)]),
        sessions: vec![
            SessionSpec::new("A", IsolationLevel::ReadUncommitted),
            SessionSpec::new("B", reader),
        ],
        events: vec![
            Event::write("A", key, Update::Add(10.0)),
            Event::read("B", key),
            Event::abort("A"),
            Event::commit("B"),
        ],
    }
}

/// A reads `FeH` of cluster 3 twice; B commits `+0.1` in between.
pub fn non_repeatable_read(reader: IsolationLevel) -> Scenario {
    let key = "FeH/3";
    Scenario {
        name: format!(
            "non-repeatable-read-{}",
            reader.as_sql().to_lowercase().replace(' ', "-")
        ),
        config: SimulatorConfig::default(),
        seed: seed(&[(key, -0.2)]),
        sessions: vec![
            SessionSpec::new("A", reader),
            SessionSpec::with_default_isolation("B"),
        ],
        events: vec![
            Event::read("A", key),
            Event::write("B", key, Update::Add(0.1)),
            Event::commit("B"),
            Event::read("A", key),
            Event::commit("A"),
        ],
    }
}

fn diameters() -> Vec<(String, f64)> {
    seed(&[
        ("Diam_pc/1", 4.1),
        ("Diam_pc/2", 11.7),
        ("Diam_pc/3", 15.2),
        ("Diam_pc/4", 9.9),
        ("Diam_pc/5", 23.0),
    ])
}

/// A counts clusters wider than 10 pc under `REPEATABLE READ` twice; B inserts
/// a 12 pc cluster and commits in between.
pub fn phantom_read(phantom_protection: bool) -> Scenario {
    let wide = Predicate::GreaterThan(10.0);
    Scenario {
        name: if phantom_protection {
            "phantom-read-next-key-locking".to_string()
        } else {
            "phantom-read-sql-standard".to_string()
        },
        config: SimulatorConfig::default().with_phantom_protection(phantom_protection),
        seed: diameters(),
        sessions: vec![
            SessionSpec::new("A", IsolationLevel::RepeatableRead),
            SessionSpec::with_default_isolation("B"),
        ],
        events: vec![
            Event::count("A", wide),
            Event::insert("B", "Diam_pc/9999", 12.0),
            Event::commit("B"),
            Event::count("A", wide),
            Event::commit("A"),
        ],
    }
}

/// A selects metal-poor clusters under `SERIALIZABLE`; B tries to insert
/// another one before A commits and is refused.
pub fn serializable_insert() -> Scenario {
    Scenario {
        name: "serializable-insert".to_string(),
        config: SimulatorConfig::default(),
        seed: seed(&[("FeH/1", -0.4), ("FeH/2", 0.1), ("FeH/3", -0.2)]),
        sessions: vec![
            SessionSpec::new("A", IsolationLevel::Serializable),
            SessionSpec::with_default_isolation("B"),
        ],
        events: vec![
            Event::count("A", Predicate::LessThan(0.0)),
            Event::insert("B", "FeH/9998", -0.3),
            Event::commit("B"),
            Event::commit("A"),
        ],
    }
}

/// The full walkthrough, in order.
pub fn walkthrough() -> Vec<Scenario> {
    vec![
        racy_increment(),
        uncommitted_update(),
        dirty_read(IsolationLevel::ReadUncommitted),
        non_repeatable_read(IsolationLevel::ReadCommitted),
        phantom_read(true),
        serializable_insert(),
    ]
}
