//! Mapping constraint: rendezvous with value propagation

use tracing::debug;

use crate::event::{Event, EventStatus, EventValue};

use super::{Constraint, ConstraintKind, RendezvousConstraint};

/// Two-party rendezvous that copies a concrete value into an unresolved slot
///
/// Propagation only happens when the rendezvous succeeded and exactly one side
/// is `Nondet`. Two differing concrete values, or two `Nondet` slots, are left
/// untouched.
#[derive(Debug)]
pub struct MappingConstraint {
    rendezvous: RendezvousConstraint,
}

impl MappingConstraint {
    pub fn new(name: impl Into<String>, first: Event, second: Event) -> Self {
        Self {
            rendezvous: RendezvousConstraint::new(name, first, second),
        }
    }

    fn propagate(&self) {
        let [first, second] = self.rendezvous.events() else {
            return;
        };

        let both_proposed = first.status() == Some(EventStatus::Proposed)
            && second.status() == Some(EventStatus::Proposed);
        if !both_proposed {
            return;
        }

        match (first.value(), second.value()) {
            (EventValue::Nondet, value @ EventValue::Concrete(_)) => {
                debug!(constraint = %self.name(), from = %second.name(), to = %first.name(), %value, "MappingConstraint: propagating");
                first.set_value(value);
            }
            (value @ EventValue::Concrete(_), EventValue::Nondet) => {
                debug!(constraint = %self.name(), from = %first.name(), to = %second.name(), %value, "MappingConstraint: propagating");
                second.set_value(value);
            }
            (EventValue::Concrete(a), EventValue::Concrete(b)) if a != b => {
                debug!(constraint = %self.name(), a, b, "MappingConstraint: ambiguous values left unresolved");
            }
            _ => {}
        }
    }
}

impl Constraint for MappingConstraint {
    fn name(&self) -> &str {
        self.rendezvous.name()
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Mapping
    }

    fn events(&self) -> &[Event] {
        self.rendezvous.events()
    }

    fn is_satisfied(&self) -> bool {
        self.rendezvous.is_satisfied()
    }

    fn solve(&mut self) {
        self.rendezvous.solve();
    }

    fn is_stable(&self) -> bool {
        self.rendezvous.is_stable()
    }

    fn post_resolve(&mut self) {
        self.rendezvous.restore_disabled();
        self.propagate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposed(name: &str, value: EventValue) -> Event {
        let e = Event::new(name);
        e.set_status(Some(EventStatus::Proposed));
        e.set_value(value);
        e
    }

    fn resolve(c: &mut MappingConstraint) {
        c.solve();
        while !c.is_stable() {
            c.solve();
        }
        c.post_resolve();
    }

    #[test]
    fn test_nondet_side_receives_value() {
        let a = proposed("a", EventValue::Nondet);
        let b = proposed("b", EventValue::Concrete(7));
        let mut c = MappingConstraint::new("map", a.clone(), b.clone());

        resolve(&mut c);
        assert_eq!(a.value(), EventValue::Concrete(7));
        assert_eq!(b.value(), EventValue::Concrete(7));
    }

    #[test]
    fn test_propagates_in_either_direction() {
        let a = proposed("a", EventValue::Concrete(-3));
        let b = proposed("b", EventValue::Nondet);
        let mut c = MappingConstraint::new("map", a.clone(), b.clone());

        resolve(&mut c);
        assert_eq!(b.value(), EventValue::Concrete(-3));
    }

    #[test]
    fn test_both_concrete_left_alone() {
        let a = proposed("a", EventValue::Concrete(1));
        let b = proposed("b", EventValue::Concrete(2));
        let mut c = MappingConstraint::new("map", a.clone(), b.clone());

        resolve(&mut c);
        assert_eq!(a.value(), EventValue::Concrete(1));
        assert_eq!(b.value(), EventValue::Concrete(2));
    }

    #[test]
    fn test_both_nondet_left_alone() {
        let a = proposed("a", EventValue::Nondet);
        let b = proposed("b", EventValue::Nondet);
        let mut c = MappingConstraint::new("map", a.clone(), b.clone());

        resolve(&mut c);
        assert!(a.value().is_nondet());
        assert!(b.value().is_nondet());
    }

    #[test]
    fn test_no_propagation_without_rendezvous() {
        let a = proposed("a", EventValue::Nondet);
        let b = Event::new("b");
        b.set_value(5);
        let mut c = MappingConstraint::new("map", a.clone(), b.clone());

        resolve(&mut c);
        assert_eq!(a.status(), Some(EventStatus::Waiting));
        assert!(a.value().is_nondet());
    }

    #[test]
    fn test_kind_is_mapping() {
        let c = MappingConstraint::new("map", Event::new("a"), Event::new("b"));
        assert_eq!(c.kind(), ConstraintKind::Mapping);
        assert_eq!(c.name(), "map");
    }
}
