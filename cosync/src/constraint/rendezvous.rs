//! Rendezvous constraint

use tracing::{debug, trace};

use crate::event::{Event, EventStatus};

use super::{Constraint, ConstraintKind};

/// Strict handshake: either every referenced event proceeds or none does
#[derive(Debug)]
pub struct RendezvousConstraint {
    name: String,
    events: Vec<Event>,
    stable: bool,
}

impl RendezvousConstraint {
    /// Two-party rendezvous
    pub fn new(name: impl Into<String>, first: Event, second: Event) -> Self {
        Self::n_way(name, vec![first, second])
    }

    /// Rendezvous over any number of events
    pub fn n_way(name: impl Into<String>, events: Vec<Event>) -> Self {
        let name = name.into();
        debug!(%name, count = events.len(), "RendezvousConstraint::n_way: called");
        Self {
            name,
            events,
            stable: true,
        }
    }

    /// Return every disabled event to waiting
    pub(super) fn restore_disabled(&self) {
        for event in &self.events {
            if event.status() == Some(EventStatus::Disabled) {
                event.set_status(Some(EventStatus::Waiting));
            }
        }
    }
}

impl Constraint for RendezvousConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Rendezvous
    }

    fn events(&self) -> &[Event] {
        &self.events
    }

    fn is_satisfied(&self) -> bool {
        let satisfied = self.events.iter().all(Event::is_offered);
        trace!(constraint = %self.name, satisfied, "RendezvousConstraint::is_satisfied");
        satisfied
    }

    fn solve(&mut self) {
        let before: Vec<_> = self.events.iter().map(Event::status).collect();

        if self.is_satisfied() {
            for event in &self.events {
                event.set_status(Some(EventStatus::Proposed));
            }
        } else {
            // Veto every side that is still offering
            for event in self.events.iter().filter(|e| e.is_offered()) {
                event.set_status(Some(EventStatus::Disabled));
            }
        }

        self.stable = self.events.iter().map(Event::status).eq(before);
        trace!(constraint = %self.name, stable = self.stable, "RendezvousConstraint::solve: pass done");
    }

    fn is_stable(&self) -> bool {
        self.stable
    }

    fn post_resolve(&mut self) {
        self.restore_disabled();
    }
}
