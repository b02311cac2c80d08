//! Message types for the Coordinator

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::event::Event;

use super::error::CoordinatorError;

/// Identity of a registered actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reply sent when a suspended actor is resumed
///
/// `Ok(true)` - resumed by a round, `Ok(false)` - released by shutdown.
pub type ResumeReply = Result<bool, CoordinatorError>;

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Register a new actor (live count + 1)
    Register { actor_id: ActorId },

    /// End of process (live count - 1)
    Deregister { actor_id: ActorId },

    /// Offer an event and suspend until it is admitted
    Propose {
        actor_id: ActorId,
        event: Event,
        reply_tx: oneshot::Sender<ResumeReply>,
    },

    /// Suspend without proposing; resumed after the next round
    Wait {
        actor_id: ActorId,
        reply_tx: oneshot::Sender<ResumeReply>,
    },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Release every suspended actor and stop
    Shutdown,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorMetrics {
    pub live_actors: usize,
    pub registered_total: usize,
    pub suspended: usize,
    pub rounds: u64,
    pub solver_passes: u64,
    pub max_passes_in_round: usize,
    pub proposals: u64,
    pub admitted: u64,
    pub idle_releases: u64,
    pub scheduler_rejections: u64,
}
