//! Coordinator fault types

use std::time::Duration;
use thiserror::Error;

/// Structural faults surfaced by the round coordinator
///
/// All variants except [`CoordinatorError::Closed`] and
/// [`CoordinatorError::UnknownActor`] end the coordinator; every suspended actor
/// receives a copy of the fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Solver '{solver}' did not reach a fixed point within {passes} passes in round {round}")]
    NonConvergence { solver: String, passes: usize, round: u64 },

    #[error("Barrier incomplete after {timeout:?}: {suspended} of {live} actors suspended")]
    BarrierTimeout {
        timeout: Duration,
        suspended: usize,
        live: usize,
    },

    #[error("No actor released within {timeout:?} of a round that admitted nobody (waiting: {waiting:?})")]
    Stalled { timeout: Duration, waiting: Vec<String> },

    #[error("Proposal of '{actor}' still pending after {rounds} rounds")]
    Starved { actor: String, rounds: u64 },

    #[error("Actor '{0}' is not registered")]
    UnknownActor(String),

    #[error("Coordinator channel closed")]
    Closed,
}

impl CoordinatorError {
    /// Liveness faults: some actor can never make progress
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            Self::BarrierTimeout { .. } | Self::Stalled { .. } | Self::Starved { .. }
        )
    }

    /// Faults raised while resolving constraints
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_classification() {
        assert!(
            CoordinatorError::Stalled {
                timeout: Duration::from_millis(10),
                waiting: vec!["a".to_string()]
            }
            .is_liveness()
        );
        assert!(
            CoordinatorError::BarrierTimeout {
                timeout: Duration::from_millis(10),
                suspended: 1,
                live: 2
            }
            .is_liveness()
        );
        assert!(!CoordinatorError::Closed.is_liveness());
        assert!(!CoordinatorError::UnknownActor("x".to_string()).is_liveness());
    }

    #[test]
    fn test_convergence_classification() {
        let err = CoordinatorError::NonConvergence {
            solver: "main".to_string(),
            passes: 64,
            round: 2,
        };
        assert!(err.is_convergence());
        assert!(!err.is_liveness());
        assert!(err.to_string().contains("main"));
    }
}
