//! Annotator and scheduler boundary
//!
//! Annotators and schedulers are registered with the coordinator and run once
//! per round, after the constraint solvers have reached their fixed point.
//! Annotators only observe; schedulers narrow the set of admitted events.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::ActorId;
use crate::event::{Event, EventId};

/// What the coordinator shows annotators each round
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    /// 1-based round number
    pub round: u64,

    /// Pending events the constraints left `Proposed`
    pub proposed: &'a [Event],

    /// Pending events that were not admitted by the constraints
    pub waiting: &'a [Event],

    /// Solver passes this round took, summed over all solvers
    pub solver_passes: usize,
}

/// Side-effect-only observer run once per round
pub trait Annotator: Send {
    fn name(&self) -> &str;

    fn apply(&mut self, ctx: &RoundContext<'_>);
}

/// Whether a scheduler needs end-of-process notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    #[default]
    Plain,
    ProcessAware,
}

/// Final admission decision among constraint-admitted events
pub trait Scheduler: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Plain
    }

    /// Return the ids of the events to admit; ids outside `proposed` are ignored
    fn select(&mut self, proposed: &[Event]) -> Vec<EventId>;

    /// Called for process-aware schedulers when an actor deregisters
    fn notify_process_end(&mut self, _actor: &ActorId) {}
}

impl fmt::Debug for dyn Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Annotator({})", self.name())
    }
}

impl fmt::Debug for dyn Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scheduler({}, {:?})", self.name(), self.kind())
    }
}

/// Logs a one-line summary of every round
#[derive(Debug, Default)]
pub struct RoundTraceAnnotator {
    rounds: u64,
    proposed: u64,
    waiting: u64,
}

impl RoundTraceAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Total proposed / waiting events seen across rounds
    pub fn totals(&self) -> (u64, u64) {
        (self.proposed, self.waiting)
    }
}

impl Annotator for RoundTraceAnnotator {
    fn name(&self) -> &str {
        "round-trace"
    }

    fn apply(&mut self, ctx: &RoundContext<'_>) {
        self.rounds += 1;
        self.proposed += ctx.proposed.len() as u64;
        self.waiting += ctx.waiting.len() as u64;

        let proposed: Vec<&str> = ctx.proposed.iter().map(Event::name).collect();
        let waiting: Vec<&str> = ctx.waiting.iter().map(Event::name).collect();
        info!(
            round = ctx.round,
            passes = ctx.solver_passes,
            ?proposed,
            ?waiting,
            "round resolved"
        );
    }
}
