//! cosync - constraint-resolved round synchronization
//!
//! cosync coordinates logically concurrent actors through synchronization
//! events. Each step every actor proposes one event and suspends; once all live
//! actors are suspended, the coordinator drives the registered constraints to a
//! fixed point and resumes the actors whose events were admitted.
//!
//! # Core Concepts
//!
//! - **Events**: shared tokens that are proposed, waiting, or disabled within a round
//! - **Constraints**: rendezvous and mapping relations rewritten to a fixed point
//! - **Rounds**: one barrier trip, one resolution, one set of admissions
//! - **Adaptors**: actors that move event-info records between timing domains
//!
//! # Modules
//!
//! - [`event`] - Events, statuses, values and event-info records
//! - [`constraint`] - Rendezvous, mapping and the constraint solver
//! - [`coordinator`] - The round coordinator task and its handle
//! - [`hooks`] - Annotator and scheduler traits
//! - [`channel`] - Bounded FIFO channels of event-info records
//! - [`adaptor`] - Channel-domain translation actors
//! - [`component`] - Component trait and scripted actors
//! - [`simulation`] - Spawning components against a coordinator
//! - [`scenario`] - YAML scenario files
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod adaptor;
pub mod channel;
pub mod cli;
pub mod component;
pub mod config;
pub mod constraint;
pub mod coordinator;
pub mod event;
pub mod hooks;
pub mod scenario;
pub mod simulation;

// Re-export commonly used types
pub use adaptor::{Adaptor, AdaptorError, AdaptorKind, CopyTransform, EventTransform, PassthroughTransform, TagInjector};
pub use channel::{AdaptorChannel, ChannelReader, ChannelStats, ChannelWriter, WriteOutcome};
pub use component::{Component, ComponentSummary, ScriptedActor};
pub use config::Config;
pub use constraint::{Constraint, ConstraintKind, ConstraintSolver, MappingConstraint, RendezvousConstraint};
pub use coordinator::{
    ActorId, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, CoordinatorMetrics,
};
pub use event::{Event, EventId, EventInfo, EventStatus, EventValue};
pub use hooks::{Annotator, RoundContext, RoundTraceAnnotator, Scheduler, SchedulerKind};
pub use scenario::{Scenario, ScenarioError};
pub use simulation::{Simulation, SimulationReport};
