//! Constraint solver: one ordered pass at a time

use tracing::debug;

use super::Constraint;

/// Ordered collection of constraints driven to a fixed point by the caller
///
/// Registration order is resolution order. Later constraints see the status
/// changes made by earlier ones in the same pass.
#[derive(Debug)]
pub struct ConstraintSolver {
    name: String,
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConstraintSolver {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "ConstraintSolver::new: called");
        Self {
            name,
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a constraint; duplicates are not detected
    pub fn add_constraint(&mut self, constraint: impl Constraint + 'static) {
        debug!(solver = %self.name, constraint = %constraint.name(), kind = %constraint.kind(), "ConstraintSolver::add_constraint: called");
        self.constraints.push(Box::new(constraint));
    }

    /// Builder-style variant of [`add_constraint`](Self::add_constraint)
    pub fn with_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.add_constraint(constraint);
        self
    }

    /// One pass over every constraint in registration order
    pub fn resolve(&mut self) {
        for constraint in &mut self.constraints {
            constraint.solve();
        }
    }

    /// True iff every constraint was stable on its most recent pass
    pub fn is_stable(&self) -> bool {
        self.constraints.iter().all(|c| c.is_stable())
    }

    /// Finish the round; call once after `resolve` reached a fixed point
    pub fn post_resolve(&mut self) {
        for constraint in &mut self.constraints {
            constraint.post_resolve();
        }
    }

    pub fn constraints(&self) -> impl Iterator<Item = &dyn Constraint> {
        self.constraints.iter().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
