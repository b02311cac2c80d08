//! Main Coordinator task implementation

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::constraint::ConstraintSolver;
use crate::event::{Event, EventStatus};
use crate::hooks::{Annotator, Scheduler};

use super::config::CoordinatorConfig;
use super::error::CoordinatorError;
use super::handle::CoordinatorHandle;
use super::messages::{ActorId, CoordRequest, CoordinatorMetrics, ResumeReply};
use super::round::RoundEngine;

/// Actor suspended on a proposal
struct PendingProposal {
    actor_id: ActorId,
    event: Event,
    reply_tx: oneshot::Sender<ResumeReply>,
    /// First round this proposal took part in
    since_round: u64,
}

/// Actor suspended without a proposal
struct PendingWait {
    actor_id: ActorId,
    reply_tx: oneshot::Sender<ResumeReply>,
}

/// Why suspended actors are being held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    /// Some live actors have not reached their suspension point
    Partial,
    /// Everyone is suspended but the last round released nobody
    Settled,
}

/// Liveness deadline for the current hold
#[derive(Debug, Clone, Copy)]
struct Watch {
    hold: Hold,
    timeout: Duration,
    deadline: Instant,
}

/// Barrier bookkeeping
struct Barrier {
    live: HashSet<ActorId>,
    registered_total: usize,
    expected: usize,
    proposals: Vec<PendingProposal>,
    waits: Vec<PendingWait>,
    /// Set by every request that alters the barrier; a round needs one
    changed: bool,
    /// Kept across unrelated requests until a round runs or the hold changes
    watch: Option<Watch>,
}

impl Barrier {
    fn new(expected: usize) -> Self {
        Self {
            live: HashSet::new(),
            registered_total: 0,
            expected,
            proposals: Vec::new(),
            waits: Vec::new(),
            changed: false,
            watch: None,
        }
    }

    fn suspended(&self) -> usize {
        self.proposals.len() + self.waits.len()
    }

    /// Every live actor has reached its suspension point
    fn reached(&self) -> bool {
        !self.live.is_empty() && self.registered_total >= self.expected && self.suspended() == self.live.len()
    }

    /// Only meaningful between rounds: a reached barrier there has already
    /// been resolved without releasing anyone
    fn hold(&self) -> Option<Hold> {
        match self.suspended() {
            0 => None,
            _ if self.reached() => Some(Hold::Settled),
            _ => Some(Hold::Partial),
        }
    }

    /// Release whatever `actor_id` is suspended on, without admission
    fn withdraw(&mut self, actor_id: &ActorId) {
        let (gone, kept): (Vec<_>, Vec<_>) = self.proposals.drain(..).partition(|p| &p.actor_id == actor_id);
        self.proposals = kept;
        for pending in gone {
            debug!(%actor_id, event = %pending.event.name(), "Withdrawing proposal");
            pending.event.set_status(None);
            let _ = pending.reply_tx.send(Ok(false));
        }

        let (gone, kept): (Vec<_>, Vec<_>) = self.waits.drain(..).partition(|w| &w.actor_id == actor_id);
        self.waits = kept;
        for pending in gone {
            let _ = pending.reply_tx.send(Ok(false));
        }
    }

    fn release_all(&mut self, reply: ResumeReply) {
        for pending in self.proposals.drain(..) {
            if pending.event.status().is_some() {
                pending.event.set_status(Some(EventStatus::Waiting));
            }
            let _ = pending.reply_tx.send(reply.clone());
        }
        for pending in self.waits.drain(..) {
            let _ = pending.reply_tx.send(reply.clone());
        }
    }
}

/// Whether the request loop keeps going after a round
enum Flow {
    Continue,
    Stop,
}

/// The round coordinator
///
/// Solvers, annotators and schedulers are registered before [`Coordinator::run`]
/// consumes the coordinator; actors reach it through [`CoordinatorHandle`]s.
pub struct Coordinator {
    config: CoordinatorConfig,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    solvers: Vec<ConstraintSolver>,
    annotators: Vec<Box<dyn Annotator>>,
    schedulers: Vec<Box<dyn Scheduler>>,
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!(?config, "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self {
            config,
            tx,
            rx,
            solvers: Vec::new(),
            annotators: Vec::new(),
            schedulers: Vec::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Get a sender for raw requests
    pub fn sender(&self) -> mpsc::Sender<CoordRequest> {
        self.tx.clone()
    }

    /// Solvers resolve in registration order
    pub fn add_constraint_solver(&mut self, solver: ConstraintSolver) {
        debug!(solver = %solver.name(), constraints = solver.len(), "Coordinator::add_constraint_solver: called");
        self.solvers.push(solver);
    }

    pub fn add_annotator(&mut self, annotator: impl Annotator + 'static) {
        debug!(annotator = %annotator.name(), "Coordinator::add_annotator: called");
        self.annotators.push(Box::new(annotator));
    }

    pub fn add_scheduler(&mut self, scheduler: impl Scheduler + 'static) {
        debug!(scheduler = %scheduler.name(), kind = ?scheduler.kind(), "Coordinator::add_scheduler: called");
        self.schedulers.push(Box::new(scheduler));
    }

    /// Hold the barrier until at least `count` actors have registered
    pub fn expect_actors(&mut self, count: usize) {
        debug!(count, "Coordinator::expect_actors: called");
        self.config.expected_actors = self.config.expected_actors.max(count);
    }

    /// Register an actor and return its handle
    ///
    /// Registrations are queued on the request channel, so every actor must be
    /// registered before it is started to keep the barrier sized correctly.
    pub async fn register(&self, name: &str) -> Result<CoordinatorHandle, CoordinatorError> {
        self.control_handle().register_actor(name).await
    }

    /// Handle for the wiring layer; not counted as an actor
    pub fn control_handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), ActorId::new("control"))
    }

    /// Run the Coordinator task
    ///
    /// Runs until shutdown is requested, the round budget is spent, or every
    /// handle is dropped. Each barrier trip runs at most one round; a barrier
    /// that stays full after a round waits for a deregistration to change it.
    /// Structural faults end the run with an error that is also delivered to
    /// each suspended actor.
    pub async fn run(self) -> Result<CoordinatorMetrics, CoordinatorError> {
        let Coordinator {
            config,
            tx,
            mut rx,
            solvers,
            annotators,
            schedulers,
        } = self;
        // Only handles keep the request channel open from here on
        drop(tx);

        let mut task = CoordinatorTask {
            engine: RoundEngine::new(solvers, annotators, schedulers, config.max_solver_passes),
            barrier: Barrier::new(config.expected_actors),
            metrics: CoordinatorMetrics::default(),
            config,
        };

        info!("Coordinator started");

        let result = loop {
            let req = match next_request(&mut rx, task.barrier.watch).await {
                Ok(Some(req)) => req,
                Ok(None) => {
                    info!("All coordinator handles dropped");
                    break Ok(());
                }
                Err(watch) => break Err(task.liveness_fault(watch)),
            };

            if matches!(req, CoordRequest::Shutdown) {
                info!("Coordinator shutting down");
                break Ok(());
            }
            task.handle_request(req);

            match task.run_ready_round() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    info!(rounds = task.metrics.rounds, "Round budget spent");
                    break Ok(());
                }
                Err(fault) => break Err(fault),
            }
            task.rearm(Instant::now());
        };

        match result {
            Ok(()) => {
                task.barrier.release_all(Ok(false));
                info!(rounds = task.metrics.rounds, "Coordinator stopped");
                Ok(task.snapshot())
            }
            Err(fault) => {
                error!(%fault, "Coordinator stopped on fault");
                task.barrier.release_all(Err(fault.clone()));
                Err(fault)
            }
        }
    }
}

/// Next request, bounded by the watch deadline when one is set
async fn next_request(
    rx: &mut mpsc::Receiver<CoordRequest>,
    watch: Option<Watch>,
) -> Result<Option<CoordRequest>, Watch> {
    match watch {
        Some(watch) => tokio::time::timeout_at(watch.deadline, rx.recv())
            .await
            .map_err(|_| watch),
        None => Ok(rx.recv().await),
    }
}

/// State owned by the running coordinator
struct CoordinatorTask {
    config: CoordinatorConfig,
    engine: RoundEngine,
    barrier: Barrier,
    metrics: CoordinatorMetrics,
}

impl CoordinatorTask {
    /// Start a deadline when the hold changes; an unchanged hold keeps its deadline
    fn rearm(&mut self, now: Instant) {
        let hold = self.barrier.hold();
        if self.barrier.watch.map(|w| w.hold) == hold {
            return;
        }
        self.barrier.watch = hold.and_then(|hold| {
            let timeout = match hold {
                Hold::Partial => self.config.barrier_timeout(),
                Hold::Settled => self.config.stall_timeout(),
            }?;
            debug!(?hold, ?timeout, "Liveness deadline armed");
            Some(Watch {
                hold,
                timeout,
                deadline: now + timeout,
            })
        });
    }

    fn liveness_fault(&self, watch: Watch) -> CoordinatorError {
        match watch.hold {
            Hold::Partial => CoordinatorError::BarrierTimeout {
                timeout: watch.timeout,
                suspended: self.barrier.suspended(),
                live: self.barrier.live.len(),
            },
            Hold::Settled => CoordinatorError::Stalled {
                timeout: watch.timeout,
                waiting: self.barrier.proposals.iter().map(|p| p.actor_id.to_string()).collect(),
            },
        }
    }

    fn handle_request(&mut self, req: CoordRequest) {
        match req {
            CoordRequest::Register { actor_id } => {
                debug!(%actor_id, "Registering actor");
                if !self.barrier.live.insert(actor_id.clone()) {
                    warn!(%actor_id, "Actor registered twice, ignoring");
                    return;
                }
                self.barrier.registered_total += 1;
                self.barrier.changed = true;
            }

            CoordRequest::Deregister { actor_id } => {
                debug!(%actor_id, "Deregistering actor");
                if !self.barrier.live.remove(&actor_id) {
                    warn!(%actor_id, "Deregistering unknown actor");
                    return;
                }
                self.barrier.withdraw(&actor_id);
                self.barrier.changed = true;
                self.engine.notify_process_end(&actor_id);
            }

            CoordRequest::Propose {
                actor_id,
                event,
                reply_tx,
            } => {
                if !self.barrier.live.contains(&actor_id) {
                    warn!(%actor_id, "Proposal from unregistered actor");
                    let _ = reply_tx.send(Err(CoordinatorError::UnknownActor(actor_id.to_string())));
                    return;
                }
                debug!(%actor_id, event = %event.name(), "Actor proposed");
                event.set_status(Some(EventStatus::Proposed));
                self.metrics.proposals += 1;
                self.barrier.proposals.push(PendingProposal {
                    actor_id,
                    event,
                    reply_tx,
                    since_round: self.metrics.rounds + 1,
                });
                self.barrier.changed = true;
            }

            CoordRequest::Wait { actor_id, reply_tx } => {
                if !self.barrier.live.contains(&actor_id) {
                    warn!(%actor_id, "Wait from unregistered actor");
                    let _ = reply_tx.send(Err(CoordinatorError::UnknownActor(actor_id.to_string())));
                    return;
                }
                debug!(%actor_id, "Actor waiting");
                self.barrier.waits.push(PendingWait { actor_id, reply_tx });
                self.barrier.changed = true;
            }

            CoordRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }

            // Handled by the run loop
            CoordRequest::Shutdown => {}
        }
    }

    /// Run one round if the barrier is full and changed since the last one
    fn run_ready_round(&mut self) -> Result<Flow, CoordinatorError> {
        if !self.barrier.changed || !self.barrier.reached() {
            return Ok(Flow::Continue);
        }
        self.barrier.changed = false;
        self.run_round()?;
        if self.config.max_rounds.is_some_and(|max| self.metrics.rounds >= max) {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn run_round(&mut self) -> Result<(), CoordinatorError> {
        self.metrics.rounds += 1;
        let round = self.metrics.rounds;
        self.barrier.watch = None;
        let pending: Vec<Event> = self.barrier.proposals.iter().map(|p| p.event.clone()).collect();

        let outcome = self.engine.resolve(round, &pending)?;
        self.metrics.solver_passes += outcome.solver_passes as u64;
        self.metrics.max_passes_in_round = self.metrics.max_passes_in_round.max(outcome.max_passes);
        self.metrics.scheduler_rejections += outcome.scheduler_rejections as u64;

        let (admitted, still_pending): (Vec<_>, Vec<_>) = self
            .barrier
            .proposals
            .drain(..)
            .partition(|p| outcome.admitted.contains(&p.event.id()));

        let mut released = 0;
        for pending in admitted {
            debug!(round, actor_id = %pending.actor_id, event = %pending.event.name(), "Admitted");
            pending.event.set_status(None);
            if pending.reply_tx.send(Ok(true)).is_ok() {
                released += 1;
            }
            self.metrics.admitted += 1;
        }

        for pending in &still_pending {
            if pending.event.status() == Some(EventStatus::Proposed) {
                pending.event.set_status(Some(EventStatus::Waiting));
            }
        }

        for pending in self.barrier.waits.drain(..) {
            if pending.reply_tx.send(Ok(true)).is_ok() {
                released += 1;
            }
            self.metrics.idle_releases += 1;
        }

        self.barrier.proposals = still_pending;
        if released == 0 {
            debug!(round, waiting = self.barrier.proposals.len(), "Round released nobody");
        } else {
            debug!(round, released, waiting = self.barrier.proposals.len(), "Round complete");
        }
        self.check_starvation(round)
    }

    fn check_starvation(&self, round: u64) -> Result<(), CoordinatorError> {
        if let Some(max_wait) = self.config.max_wait_rounds
            && let Some(starved) = self
                .barrier
                .proposals
                .iter()
                .find(|p| round + 1 - p.since_round > max_wait)
        {
            return Err(CoordinatorError::Starved {
                actor: starved.actor_id.to_string(),
                rounds: round + 1 - starved.since_round,
            });
        }

        Ok(())
    }

    fn snapshot(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            live_actors: self.barrier.live.len(),
            registered_total: self.barrier.registered_total,
            suspended: self.barrier.suspended(),
            ..self.metrics.clone()
        }
    }
}
