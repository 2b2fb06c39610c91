use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ManagedUnit, UnitKind};

/// Index layout of one unit inside the shared unknown vector.
#[derive(Debug, Clone, Copy)]
pub struct UnitLayout {
    pub base: usize,
    pub kind: UnitKind,
}

impl UnitLayout {
    /// (P, Q) index pairs: one for a symmetric unit, three for an asymmetric
    /// unit (phases L1, L2, L3 in order).
    pub fn pq_pairs(&self) -> Vec<(usize, usize)> {
        match self.kind {
            UnitKind::Symmetric => vec![(self.base, self.base + 1)],
            UnitKind::Asymmetric => (0..3)
                .map(|phase| (self.base + 2 * phase, self.base + 2 * phase + 1))
                .collect(),
        }
    }
}

/// Fixed mapping from each registered unit (and, for asymmetric units, each
/// phase) to its slice of the shared unknown vector.
///
/// Built once from the ordered unit list at engine construction. Index
/// assignment is stable for the engine's lifetime and never overlaps between
/// units; changing the fleet requires constructing a new engine.
pub struct CoefficientSpace {
    layouts: Vec<UnitLayout>,
    positions: HashMap<String, usize>,
    num_coefficients: usize,
    p_indices: Vec<usize>,
    q_indices: Vec<usize>,
}

impl CoefficientSpace {
    pub fn new(units: &[Arc<dyn ManagedUnit>]) -> Self {
        let mut layouts = Vec::with_capacity(units.len());
        let mut positions = HashMap::new();
        let mut p_indices = Vec::new();
        let mut q_indices = Vec::new();
        let mut base = 0;
        for (position, unit) in units.iter().enumerate() {
            let layout = UnitLayout {
                base,
                kind: unit.kind(),
            };
            for (p, q) in layout.pq_pairs() {
                p_indices.push(p);
                q_indices.push(q);
            }
            positions.insert(unit.id().to_string(), position);
            base += unit.kind().num_coefficients();
            layouts.push(layout);
        }
        Self {
            layouts,
            positions,
            num_coefficients: base,
            p_indices,
            q_indices,
        }
    }

    /// Total unknown count `N`: 2 per symmetric unit, 6 per asymmetric unit.
    pub fn num_coefficients(&self) -> usize {
        self.num_coefficients
    }

    /// Indices of every active-power unknown, across all units and phases.
    pub fn p_indices(&self) -> &[usize] {
        &self.p_indices
    }

    /// Indices of every reactive-power unknown, across all units and phases.
    pub fn q_indices(&self) -> &[usize] {
        &self.q_indices
    }

    /// Position of a unit in the ordered fleet, or None if not registered.
    pub fn position(&self, unit_id: &str) -> Option<usize> {
        self.positions.get(unit_id).copied()
    }

    pub fn layout(&self, position: usize) -> UnitLayout {
        self.layouts[position]
    }

    pub fn layouts(&self) -> &[UnitLayout] {
        &self.layouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimulatedUnit;

    fn fleet(kinds: &[(&str, UnitKind)]) -> Vec<Arc<dyn ManagedUnit>> {
        kinds
            .iter()
            .map(|(id, kind)| Arc::new(SimulatedUnit::new(*id, *kind)) as Arc<dyn ManagedUnit>)
            .collect()
    }

    #[test]
    fn mixed_fleet_layout_is_stable_and_disjoint() {
        let units = fleet(&[
            ("ess0", UnitKind::Symmetric),
            ("ess1", UnitKind::Asymmetric),
            ("ess2", UnitKind::Symmetric),
        ]);
        let space = CoefficientSpace::new(&units);

        assert_eq!(space.num_coefficients(), 10);
        assert_eq!(space.layout(0).base, 0);
        assert_eq!(space.layout(1).base, 2);
        assert_eq!(space.layout(2).base, 8);
        assert_eq!(space.p_indices(), &[0, 2, 4, 6, 8]);
        assert_eq!(space.q_indices(), &[1, 3, 5, 7, 9]);
    }

    #[test]
    fn asymmetric_unit_has_three_pq_pairs() {
        let units = fleet(&[("ess0", UnitKind::Asymmetric)]);
        let space = CoefficientSpace::new(&units);
        assert_eq!(space.layout(0).pq_pairs(), vec![(0, 1), (2, 3), (4, 5)]);
    }

    #[test]
    fn position_lookup_by_id() {
        let units = fleet(&[("a", UnitKind::Symmetric), ("b", UnitKind::Symmetric)]);
        let space = CoefficientSpace::new(&units);
        assert_eq!(space.position("b"), Some(1));
        assert_eq!(space.position("nope"), None);
    }
}
