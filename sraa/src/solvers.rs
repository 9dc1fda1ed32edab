use std::collections::VecDeque;

use fixedbitset::FixedBitSet;
use log::trace;

use super::constraints::{Constraint, ConstraintId, RelationStore};
use super::program::Module;

/// Fixed-point driver over a set of constraints. Constraints are processed
/// in FIFO order, a constraint is queued at most once at any time. When a
/// resolve changes some variables, every other constraint mentioning them
/// is queued again.
///
/// Termination: relation sets only grow and are bounded by the number of
/// variables.
#[derive(Clone, Debug, Default)]
pub struct WorkList {
    constraints: Vec<Constraint>,
    queue: VecDeque<ConstraintId>,
    queued: FixedBitSet,
}

impl WorkList {
    /// Register a new constraint with the variables it mentions and queue it.
    pub fn add(&mut self, constraint: Constraint, store: &mut RelationStore) -> ConstraintId {
        let id = ConstraintId(self.constraints.len());
        for var in constraint.variables() {
            store.attach(var, id);
        }
        self.constraints.push(constraint);
        self.queued.grow(self.constraints.len());
        self.enqueue(id);
        id
    }

    /// Queue a known constraint unless it is already waiting.
    pub fn enqueue(&mut self, id: ConstraintId) {
        if !self.queued.put(id.0) {
            self.queue.push_back(id);
        }
    }

    /// Queue every registered constraint, in insertion order.
    pub fn enqueue_all(&mut self) {
        for id in 0..self.constraints.len() {
            self.enqueue(ConstraintId(id));
        }
    }

    /// Drain the queue. Returns the number of resolves performed.
    pub fn solve(&mut self, store: &mut RelationStore) -> usize {
        let mut resolves = 0;
        while let Some(current) = self.queue.pop_front() {
            self.queued.set(current.0, false);
            let changed = self.constraints[current.0].resolve(store);
            resolves += 1;
            trace!(
                "resolved constraint #{} ({} variables changed)",
                current.0,
                changed.len()
            );
            for var in changed {
                let dependents = store.var(var).constraints.clone();
                for dependent in dependents {
                    if dependent != current {
                        self.enqueue(dependent);
                    }
                }
            }
        }
        resolves
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Reorder the pending queue. Useful to check that the fixed point does
    /// not depend on processing order.
    pub fn shuffle_queue(&mut self, mut order: impl FnMut(&mut [ConstraintId])) {
        order(self.queue.make_contiguous());
    }

    /// One line per constraint, in insertion order.
    pub fn print_constraints(&self, store: &RelationStore, module: &Module) -> String {
        let mut output = "Constraints:\n".to_owned();
        output.push_str("-------------------------------------------------\n");
        for constraint in &self.constraints {
            output.push_str(&constraint.print(store, module));
            output.push('\n');
        }
        output.push_str("-------------------------------------------------\n");
        output
    }
}
