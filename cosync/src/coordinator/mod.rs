//! Round coordinator
//!
//! A single tokio task owns every registered solver, annotator and scheduler.
//! Actors talk to it through [`CoordinatorHandle`]s: each actor proposes one
//! event (or idles) and suspends. Once every live actor is suspended the
//! coordinator runs a round: solvers are driven to a fixed point, annotators
//! observe, schedulers pick, and admitted actors are resumed.

mod config;
mod core;
mod error;
mod handle;
mod messages;
mod round;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use error::CoordinatorError;
pub use handle::CoordinatorHandle;
pub use messages::{ActorId, CoordRequest, CoordinatorMetrics, ResumeReply};
