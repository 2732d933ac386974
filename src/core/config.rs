use crate::coord::types::{HookType, Priority};
use crate::core::errors::{LatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration.
///
/// Constructed by the embedding application (CLI flag and config-file parsing
/// happen outside the engine) and passed to
/// [`HookEngineBuilder`](crate::engine::HookEngineBuilder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of process slots in the execution pool
    pub pool_size: usize,
    /// Timeout applied to requests that do not override it
    pub default_timeout: Duration,
    /// Priority applied to requests that do not override it
    pub default_priority: Priority,
    /// Buffer size of the scheduler command channel (admission backpressure)
    pub queue_capacity: usize,
    /// How long a timed-out or force-terminated process gets to exit before
    /// its slot is reclaimed without reap confirmation
    pub kill_grace: Duration,
    /// Hook-pairing rules that generate must-complete-before edges
    pub pairing: PairingRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            default_timeout: Duration::from_secs(30),
            default_priority: Priority::Medium,
            queue_capacity: 256,
            kill_grace: Duration::from_millis(200),
            pairing: PairingRules::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(LatchError::configuration_field(
                "pool_size must be greater than 0",
                "pool_size",
            ));
        }
        if self.pool_size > 64 {
            return Err(LatchError::configuration_field(
                "pool_size must not exceed 64",
                "pool_size",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(LatchError::configuration_field(
                "queue_capacity must be greater than 0",
                "queue_capacity",
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(LatchError::configuration_field(
                "default_timeout must be greater than 0",
                "default_timeout",
            ));
        }
        if self.kill_grace.is_zero() {
            return Err(LatchError::configuration_field(
                "kill_grace must be greater than 0",
                "kill_grace",
            ));
        }
        Ok(())
    }

    /// Conservative settings for tests and constrained environments
    pub fn conservative() -> Self {
        Self {
            pool_size: 2,
            default_timeout: Duration::from_secs(5),
            default_priority: Priority::Medium,
            queue_capacity: 64,
            kill_grace: Duration::from_millis(100),
            pairing: PairingRules::default(),
        }
    }
}

/// Scope of a pairing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairScope {
    /// Predecessor and successor must share at least one resource key
    SharedKey,
    /// Any live predecessor of the matching type creates an edge
    Any,
}

/// One must-complete-before rule between two hook types.
///
/// At admission time the scheduler matches the incoming request against every
/// rule in both roles: edges are drawn from live predecessors to the new
/// request, and from the new request to still-queued successors. An admission
/// whose combined edges would close a cycle is rejected atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRule {
    pub predecessor: HookType,
    pub successor: HookType,
    pub scope: PairScope,
}

impl PairingRule {
    pub fn new(predecessor: HookType, successor: HookType, scope: PairScope) -> Self {
        Self {
            predecessor,
            successor,
            scope,
        }
    }
}

/// The configurable rule table mapping hook-type pairs to dependency edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRules {
    rules: Vec<PairingRule>,
}

impl Default for PairingRules {
    /// Default pairing: pre-edit precedes post-edit on the same file,
    /// pre-task precedes post-task on the same task, and edit hooks issued
    /// while any pre-task is live wait for it.
    fn default() -> Self {
        Self {
            rules: vec![
                PairingRule::new(HookType::PreEdit, HookType::PostEdit, PairScope::SharedKey),
                PairingRule::new(HookType::PreTask, HookType::PostTask, PairScope::SharedKey),
                PairingRule::new(HookType::PreTask, HookType::PreEdit, PairScope::Any),
                PairingRule::new(HookType::PreTask, HookType::PostEdit, PairScope::Any),
            ],
        }
    }
}

impl PairingRules {
    /// An empty rule table (no implied ordering between hook types)
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: PairingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &PairingRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::conservative().validate().is_ok());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let mut config = EngineConfig::default();
        config.pool_size = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_oversized_pool_rejected() {
        let mut config = EngineConfig::default();
        config.pool_size = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = EngineConfig::default();
        config.default_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_pairing_covers_edit_and_task() {
        let rules = PairingRules::default();
        assert!(rules.iter().any(|r| r.predecessor == HookType::PreEdit
            && r.successor == HookType::PostEdit
            && r.scope == PairScope::SharedKey));
        assert!(rules.iter().any(|r| r.predecessor == HookType::PreTask
            && r.successor == HookType::PostTask
            && r.scope == PairScope::SharedKey));
    }

    #[test]
    fn test_custom_rules() {
        let rules = PairingRules::none().with_rule(PairingRule::new(
            HookType::SessionStart,
            HookType::SessionEnd,
            PairScope::SharedKey,
        ));
        assert_eq!(rules.len(), 1);
    }
}
