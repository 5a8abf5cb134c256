//! Common utilities for isorace integration tests.
#![allow(dead_code)]

use isorace::{
    errors::Result,
    storage::{Storage, StorageMutation},
    IsolationLevel, RecordStore, Simulator, SimulatorConfig,
};
use std::sync::Mutex;

// --- MockStorage ---

/// A mock implementation of the `Storage` trait for testing purposes.
/// Keeps every committed batch in memory.
#[derive(Debug, Default)]
pub struct MockStorage {
    batches: Mutex<Vec<Vec<StorageMutation>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed batches, oldest first.
    pub fn batches(&self) -> Vec<Vec<StorageMutation>> {
        self.batches.lock().unwrap().clone()
    }
}

impl Storage for MockStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        self.batches.lock().unwrap().push(mutations);
        Ok(())
    }
}

// --- Helper Functions ---

/// Installs a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a simulator over `seed` with sessions `A` and `B` at the given levels.
pub fn two_sessions(
    seed: &[(&str, f64)],
    config: SimulatorConfig,
    a: IsolationLevel,
    b: IsolationLevel,
) -> Simulator {
    init_logging();
    let store = RecordStore::seeded(seed.iter().map(|(k, v)| (k.to_string(), *v)));
    let mut sim = Simulator::new(store, config);
    sim.session("A", a).session("B", b);
    sim
}

/// Float comparison for values produced by repeated additions.
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
