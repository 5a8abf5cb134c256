use serde::{Deserialize, Serialize};

use crate::conflict::resolution::LockPolicy;
use crate::isolation::IsolationLevel;

/// Simulator-wide settings.
///
/// The defaults model a stock MySQL server: `REPEATABLE READ`, next-key
/// locking against phantoms, and lock waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Level given to sessions declared without one.
    pub default_isolation: IsolationLevel,
    /// Lock contention policy for sessions that do not override it.
    pub lock_policy: LockPolicy,
    /// Hide rows committed after a `REPEATABLE READ` snapshot.
    pub phantom_protection: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::RepeatableRead,
            lock_policy: LockPolicy::Wait,
            phantom_protection: true,
        }
    }
}

impl SimulatorConfig {
    pub fn with_phantom_protection(mut self, enabled: bool) -> Self {
        self.phantom_protection = enabled;
        self
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn with_default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }
}

/// Declaration of one session taking part in a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub name: String,
    #[serde(default)]
    pub isolation: Option<IsolationLevel>,
    #[serde(default)]
    pub lock_policy: Option<LockPolicy>,
}

impl SessionSpec {
    pub fn new(name: impl Into<String>, isolation: IsolationLevel) -> Self {
        Self {
            name: name.into(),
            isolation: Some(isolation),
            lock_policy: None,
        }
    }

    /// A session running at the simulator's default level.
    pub fn with_default_isolation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolation: None,
            lock_policy: None,
        }
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = Some(policy);
        self
    }

    pub(crate) fn resolve(&self, config: &SimulatorConfig) -> (IsolationLevel, LockPolicy) {
        (
            self.isolation.unwrap_or(config.default_isolation),
            self.lock_policy.unwrap_or(config.lock_policy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_spec_falls_back_to_simulator_defaults() {
        let config = SimulatorConfig::default().with_lock_policy(LockPolicy::Fail);
        let spec = SessionSpec::with_default_isolation("A");
        assert_eq!(
            spec.resolve(&config),
            (IsolationLevel::RepeatableRead, LockPolicy::Fail)
        );

        let spec =
            SessionSpec::new("B", IsolationLevel::Serializable).lock_policy(LockPolicy::Abort);
        assert_eq!(
            spec.resolve(&config),
            (IsolationLevel::Serializable, LockPolicy::Abort)
        );
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: SimulatorConfig =
            serde_json::from_str(r#"{"phantom_protection": false}"#).unwrap();
        assert!(!config.phantom_protection);
        assert_eq!(config.lock_policy, LockPolicy::Wait);
        assert_eq!(config.default_isolation, IsolationLevel::RepeatableRead);
    }
}
