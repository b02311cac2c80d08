//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Round coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Solver passes allowed per round before reporting non-convergence
    #[serde(rename = "max-solver-passes", default = "default_max_solver_passes")]
    pub max_solver_passes: usize,

    /// How long a full barrier may sit after a round released nobody
    /// (None = wait forever)
    #[serde(rename = "stall-timeout-ms", default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: Option<u64>,

    /// Wall-clock limit for a partially filled barrier (None = wait forever)
    #[serde(rename = "barrier-timeout-ms", default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: Option<u64>,

    /// Rounds a single proposal may stay pending (None = unlimited)
    #[serde(rename = "max-wait-rounds", default)]
    pub max_wait_rounds: Option<u64>,

    /// Stop after this many rounds (None = run until shutdown)
    #[serde(rename = "max-rounds", default)]
    pub max_rounds: Option<u64>,

    /// Registrations required before the barrier is armed
    #[serde(rename = "expected-actors", default)]
    pub expected_actors: usize,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_max_solver_passes() -> usize {
    debug!("default_max_solver_passes: called");
    64
}

fn default_stall_timeout_ms() -> Option<u64> {
    debug!("default_stall_timeout_ms: called");
    Some(30_000)
}

fn default_barrier_timeout_ms() -> Option<u64> {
    debug!("default_barrier_timeout_ms: called");
    Some(30_000)
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            max_solver_passes: 64,
            stall_timeout_ms: Some(30_000),
            barrier_timeout_ms: Some(30_000),
            max_wait_rounds: None,
            max_rounds: None,
            expected_actors: 0,
            channel_buffer: 1000,
        }
    }
}

impl CoordinatorConfig {
    /// Barrier timeout as a Duration
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }

    /// Stall window as a Duration
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> eyre::Result<()> {
        if self.max_solver_passes == 0 {
            return Err(eyre::eyre!("max-solver-passes must be at least 1"));
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(eyre::eyre!("stall-timeout-ms must be at least 1"));
        }
        if self.channel_buffer == 0 {
            return Err(eyre::eyre!("channel-buffer must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_solver_passes, 64);
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.barrier_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_wait_rounds, None);
        assert_eq!(config.max_rounds, None);
        assert_eq!(config.expected_actors, 0);
        assert_eq!(config.channel_buffer, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("max-rounds: 12\nexpected-actors: 3\n").unwrap();
        assert_eq!(config.max_rounds, Some(12));
        assert_eq!(config.expected_actors, 3);
        assert_eq!(config.max_solver_passes, 64);
        assert_eq!(config.barrier_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_barrier_timeout_can_be_disabled() {
        let config: CoordinatorConfig = serde_yaml::from_str("barrier-timeout-ms: null\n").unwrap();
        assert_eq!(config.barrier_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_passes() {
        let config = CoordinatorConfig {
            max_solver_passes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
