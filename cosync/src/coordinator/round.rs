//! Round body: solvers to a fixed point, then annotators, then schedulers

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::constraint::ConstraintSolver;
use crate::event::{Event, EventId, EventStatus};
use crate::hooks::{Annotator, RoundContext, Scheduler, SchedulerKind};

use super::error::CoordinatorError;
use super::messages::ActorId;

/// What a resolved round admitted
#[derive(Debug, Default)]
pub(crate) struct RoundOutcome {
    pub admitted: HashSet<EventId>,
    pub solver_passes: usize,
    pub max_passes: usize,
    pub scheduler_rejections: usize,
}

/// Owns every solver, annotator and scheduler; runs one round at a time
#[derive(Debug)]
pub(crate) struct RoundEngine {
    solvers: Vec<ConstraintSolver>,
    annotators: Vec<Box<dyn Annotator>>,
    schedulers: Vec<Box<dyn Scheduler>>,
    /// Events referenced by at least one constraint
    constrained: HashSet<EventId>,
    max_solver_passes: usize,
}

impl RoundEngine {
    pub fn new(
        solvers: Vec<ConstraintSolver>,
        annotators: Vec<Box<dyn Annotator>>,
        schedulers: Vec<Box<dyn Scheduler>>,
        max_solver_passes: usize,
    ) -> Self {
        let constrained = solvers
            .iter()
            .flat_map(|s| s.constraints())
            .flat_map(|c| c.events())
            .map(Event::id)
            .collect();
        Self {
            solvers,
            annotators,
            schedulers,
            constrained,
            max_solver_passes,
        }
    }

    /// Resolve one round over the pending events
    pub fn resolve(&mut self, round: u64, pending: &[Event]) -> Result<RoundOutcome, CoordinatorError> {
        debug!(round, pending = pending.len(), "RoundEngine::resolve: called");
        let mut outcome = RoundOutcome::default();

        // No constraint can re-offer an unconstrained event, so the round does
        for event in pending {
            if event.status() == Some(EventStatus::Waiting) && !self.constrained.contains(&event.id()) {
                event.set_status(Some(EventStatus::Proposed));
            }
        }

        for solver in &mut self.solvers {
            let passes = Self::drive_to_fixed_point(solver, self.max_solver_passes, round)?;
            solver.post_resolve();
            outcome.solver_passes += passes;
            outcome.max_passes = outcome.max_passes.max(passes);
        }

        let (proposed, waiting): (Vec<Event>, Vec<Event>) = pending
            .iter()
            .cloned()
            .partition(|e| e.status() == Some(EventStatus::Proposed));

        let ctx = RoundContext {
            round,
            proposed: &proposed,
            waiting: &waiting,
            solver_passes: outcome.solver_passes,
        };
        for annotator in &mut self.annotators {
            trace!(annotator = %annotator.name(), "RoundEngine::resolve: annotating");
            annotator.apply(&ctx);
        }

        let mut candidates = proposed;
        for scheduler in &mut self.schedulers {
            let selected: HashSet<EventId> = scheduler.select(&candidates).into_iter().collect();
            let before = candidates.len();
            candidates.retain(|e| selected.contains(&e.id()));
            outcome.scheduler_rejections += before - candidates.len();
            trace!(scheduler = %scheduler.name(), kept = candidates.len(), before, "RoundEngine::resolve: scheduled");
        }

        outcome.admitted = candidates.iter().map(Event::id).collect();
        debug!(round, admitted = outcome.admitted.len(), passes = outcome.solver_passes, "RoundEngine::resolve: done");
        Ok(outcome)
    }

    /// Tell process-aware schedulers an actor has ended
    pub fn notify_process_end(&mut self, actor_id: &ActorId) {
        for scheduler in self
            .schedulers
            .iter_mut()
            .filter(|s| s.kind() == SchedulerKind::ProcessAware)
        {
            debug!(scheduler = %scheduler.name(), %actor_id, "RoundEngine::notify_process_end");
            scheduler.notify_process_end(actor_id);
        }
    }

    fn drive_to_fixed_point(
        solver: &mut ConstraintSolver,
        max_passes: usize,
        round: u64,
    ) -> Result<usize, CoordinatorError> {
        let mut passes = 0;
        loop {
            solver.resolve();
            passes += 1;
            if solver.is_stable() {
                trace!(solver = %solver.name(), passes, "fixed point reached");
                return Ok(passes);
            }
            if passes >= max_passes {
                return Err(CoordinatorError::NonConvergence {
                    solver: solver.name().to_string(),
                    passes,
                    round,
                });
            }
        }
    }
}
