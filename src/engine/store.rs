use super::constraint::{Constraint, Lifetime, LinearConstraint};

/// Stable reference to a constraint slot in the store's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(usize);

struct Slot {
    constraint: Constraint,
    lifetime: Lifetime,
    alive: bool,
}

/// Owns all constraints of one engine in a slot arena and keeps the Static
/// and Cycle lists in insertion order. Removed slots are tombstoned, never
/// reused, so a stale handle can be detected instead of aliasing a newer
/// constraint.
#[derive(Default)]
pub struct ConstraintStore {
    slots: Vec<Slot>,
    static_order: Vec<usize>,
    cycle_order: Vec<usize>,
}

impl ConstraintStore {
    pub fn add(&mut self, lifetime: Lifetime, constraint: Constraint) -> ConstraintHandle {
        let index = self.slots.len();
        self.slots.push(Slot {
            constraint,
            lifetime,
            alive: true,
        });
        match lifetime {
            Lifetime::Static => self.static_order.push(index),
            Lifetime::Cycle => self.cycle_order.push(index),
        }
        ConstraintHandle(index)
    }

    pub fn get(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.slots
            .get(handle.0)
            .filter(|slot| slot.alive)
            .map(|slot| &slot.constraint)
    }

    pub fn get_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.slots
            .get_mut(handle.0)
            .filter(|slot| slot.alive)
            .map(|slot| &mut slot.constraint)
    }

    /// Removes a constraint. Returns false if the handle is stale.
    pub fn remove(&mut self, handle: ConstraintHandle) -> bool {
        match self.slots.get_mut(handle.0) {
            Some(slot) if slot.alive => {
                slot.alive = false;
                let order = match slot.lifetime {
                    Lifetime::Static => &mut self.static_order,
                    Lifetime::Cycle => &mut self.cycle_order,
                };
                order.retain(|&index| index != handle.0);
                true
            }
            _ => false,
        }
    }

    /// Empties the Cycle list; Static constraints are untouched.
    pub fn clear_cycle(&mut self) {
        for &index in &self.cycle_order {
            self.slots[index].alive = false;
        }
        self.cycle_order.clear();
    }

    /// Merges Static and Cycle constraints, in insertion order, into their
    /// linear form.
    pub fn merged_linear(&self, num_coefficients: usize) -> Vec<LinearConstraint> {
        self.static_order
            .iter()
            .chain(self.cycle_order.iter())
            .flat_map(|&index| self.slots[index].constraint.linearize(num_coefficients))
            .collect()
    }

    pub fn static_len(&self) -> usize {
        self.static_order.len()
    }

    pub fn cycle_len(&self) -> usize {
        self.cycle_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::constraint::Relationship;

    fn sum_constraint(value: f64) -> Constraint {
        Constraint::CoefficientOne {
            indices: vec![0],
            relationship: Relationship::Eq,
            value,
        }
    }

    #[test]
    fn clear_cycle_keeps_static() {
        let mut store = ConstraintStore::default();
        let kept = store.add(Lifetime::Static, sum_constraint(1.0));
        let dropped = store.add(Lifetime::Cycle, sum_constraint(2.0));

        assert_eq!(store.static_len(), 1);
        assert_eq!(store.cycle_len(), 1);
        assert_eq!(store.merged_linear(1).len(), 2);

        store.clear_cycle();

        assert_eq!(store.static_len(), 1);
        assert_eq!(store.cycle_len(), 0);
        assert_eq!(store.merged_linear(1).len(), 1);
        assert!(store.get(kept).is_some());
        assert!(store.get(dropped).is_none());
    }

    #[test]
    fn removed_handle_is_stale() {
        let mut store = ConstraintStore::default();
        let handle = store.add(Lifetime::Static, sum_constraint(1.0));
        assert!(store.remove(handle));
        assert!(!store.remove(handle));
        assert!(store.get(handle).is_none());
        assert!(store.get_mut(handle).is_none());
        assert_eq!(store.merged_linear(1).len(), 0);
    }

    #[test]
    fn handles_are_never_reused() {
        let mut store = ConstraintStore::default();
        let first = store.add(Lifetime::Cycle, sum_constraint(1.0));
        store.clear_cycle();
        let second = store.add(Lifetime::Cycle, sum_constraint(2.0));
        assert_ne!(first, second);
        assert!(store.get(first).is_none());
        assert!(store.get(second).is_some());
    }

    #[test]
    fn merged_preserves_insertion_order() {
        let mut store = ConstraintStore::default();
        store.add(Lifetime::Cycle, sum_constraint(2.0));
        store.add(Lifetime::Static, sum_constraint(1.0));
        let merged = store.merged_linear(1);
        // Static list first, then Cycle.
        assert_eq!(merged[0].value, 1.0);
        assert_eq!(merged[1].value, 2.0);
    }
}
