//! Constraints over synchronization events
//!
//! A constraint inspects the events it references and rewrites their status
//! until the pass no longer changes anything. Two kinds ship with the crate:
//! - **Rendezvous:** every referenced event must be offered at once
//! - **Mapping:** a two-party rendezvous that also propagates a value

mod mapping;
mod rendezvous;
mod solver;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Event;

pub use mapping::MappingConstraint;
pub use rendezvous::RendezvousConstraint;
pub use solver::ConstraintSolver;

/// Built-in constraint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Rendezvous,
    Mapping,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rendezvous => write!(f, "rendezvous"),
            Self::Mapping => write!(f, "mapping"),
        }
    }
}

impl std::str::FromStr for ConstraintKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rendezvous" | "rendez" => Ok(Self::Rendezvous),
            "mapping" | "map" => Ok(Self::Mapping),
            _ => Err(format!("Unknown constraint kind: {}", s)),
        }
    }
}

/// Predicate plus resolver over a fixed set of events
///
/// Implementations must only touch the events returned by [`Constraint::events`]
/// and must leave none of them `Disabled` after [`Constraint::post_resolve`].
pub trait Constraint: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> ConstraintKind;

    /// Events this constraint references
    fn events(&self) -> &[Event];

    /// Whether the constraint can currently be met
    fn is_satisfied(&self) -> bool;

    /// Run one resolution pass, updating the stability flag
    fn solve(&mut self);

    /// True if the most recent pass changed no status
    fn is_stable(&self) -> bool;

    /// Finish the round after the fixed point has been reached
    fn post_resolve(&mut self);
}
