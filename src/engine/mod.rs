//! Power Distribution Engine
//!
//! Computes, once per control cycle, a feasible active/reactive power
//! set-point for every managed energy-storage unit under the currently
//! registered constraints, and distributes it to the units. Constraints are
//! validated eagerly when added, so a controller requesting an impossible
//! limit learns immediately instead of at the cycle boundary.

pub mod constraint;
mod solver;
pub mod space;
pub mod store;

use std::sync::Arc;

use minilp::OptimizationDirection;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ManagedUnit, PhasePower, Setpoint, UnitKind};
pub use constraint::{Constraint, Lifetime, LinearConstraint, Relationship};
pub use space::{CoefficientSpace, UnitLayout};
pub use store::{ConstraintHandle, ConstraintStore};

/// Errors surfaced by the engine's setters. `apply_power` never returns an
/// error: cycle-boundary failures are absorbed and logged.
#[derive(Debug, Error)]
pub enum PowerError {
    /// Caller referenced a unit that is not registered in this engine.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    /// The constraint set admits no solution; carries a description of the
    /// rejected constraint for diagnostics.
    #[error("no feasible solution, rejected constraint: {0}")]
    NoFeasibleSolution(String),
    /// The referenced constraint was removed or cleared.
    #[error("constraint handle {0:?} is no longer valid")]
    StaleConstraint(ConstraintHandle),
    /// Per-phase requests only make sense on asymmetric units.
    #[error("unit '{0}' is symmetric and has no per-phase set-points")]
    PhaseOnSymmetricUnit(String),
    /// The operation applies to a different constraint variant.
    #[error("operation does not apply to constraint: {0}")]
    WrongConstraintKind(String),
}

/// Phase selector for per-phase requests on asymmetric units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    fn index(self) -> usize {
        match self {
            Phase::L1 => 0,
            Phase::L2 => 1,
            Phase::L3 => 2,
        }
    }
}

/// Which units and phases a power request applies to.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Sum over every registered unit (and phase).
    AllUnits,
    /// Sum over all phases of one unit.
    Unit(&'a str),
    /// One phase of one asymmetric unit.
    UnitPhase(&'a str, Phase),
}

#[derive(Debug, Clone, Copy)]
enum Pwr {
    Active,
    Reactive,
}

/// Per-aggregate façade over the coefficient space, the constraint store and
/// the solver.
///
/// Exactly one instance exists per aggregate of co-managed units. All
/// mutating operations serialize on one mutex held for the full critical
/// section (append *and* validation solve, or solve *and* device writes), so
/// concurrent controllers and the cycle dispatcher never observe a torn
/// constraint set.
pub struct PowerEngine {
    units: Vec<Arc<dyn ManagedUnit>>,
    space: CoefficientSpace,
    sections_per_quadrant: usize,
    store: Mutex<ConstraintStore>,
}

impl PowerEngine {
    /// Default tangent sections per quadrant for apparent-power circles.
    pub const DEFAULT_SECTIONS_PER_QUADRANT: usize = 1;

    /// Builds an engine for an ordered, immutable fleet. Adding or removing
    /// units requires constructing a new engine.
    pub fn new(units: Vec<Arc<dyn ManagedUnit>>, sections_per_quadrant: usize) -> Self {
        let space = CoefficientSpace::new(&units);
        Self {
            units,
            space,
            sections_per_quadrant,
            store: Mutex::new(ConstraintStore::default()),
        }
    }

    pub fn space(&self) -> &CoefficientSpace {
        &self.space
    }

    /// Registers an active-power constraint for the given scope and
    /// validates it immediately. Returns a handle through which the bound
    /// can later be adjusted in place.
    pub fn set_active_power(
        &self,
        lifetime: Lifetime,
        scope: Scope<'_>,
        relationship: Relationship,
        value: f64,
    ) -> Result<ConstraintHandle, PowerError> {
        self.set_power(Pwr::Active, lifetime, scope, relationship, value)
    }

    /// Same contract as [`set_active_power`](Self::set_active_power), for
    /// reactive power.
    pub fn set_reactive_power(
        &self,
        lifetime: Lifetime,
        scope: Scope<'_>,
        relationship: Relationship,
        value: f64,
    ) -> Result<ConstraintHandle, PowerError> {
        self.set_power(Pwr::Reactive, lifetime, scope, relationship, value)
    }

    fn set_power(
        &self,
        pwr: Pwr,
        lifetime: Lifetime,
        scope: Scope<'_>,
        relationship: Relationship,
        value: f64,
    ) -> Result<ConstraintHandle, PowerError> {
        let indices = self.scope_indices(pwr, scope)?;
        let constraint = Constraint::CoefficientOne {
            indices,
            relationship,
            value,
        };
        self.add_and_validate(lifetime, constraint)
    }

    /// Limits the apparent power of one unit: one circle constraint for a
    /// symmetric unit, three (one per phase) for an asymmetric unit. Always
    /// Static. Validated as a group, so either all are kept or none.
    pub fn set_max_apparent_power(
        &self,
        unit_id: &str,
        radius: f64,
    ) -> Result<Vec<ConstraintHandle>, PowerError> {
        let layout = self.layout_for(unit_id)?;
        let mut store = self.store.lock();
        let mut handles = Vec::new();
        let mut descriptions = Vec::new();
        for (p_index, q_index) in layout.pq_pairs() {
            let constraint = Constraint::Circle {
                p_index,
                q_index,
                sections_per_quadrant: self.sections_per_quadrant,
                radius: Some(radius),
            };
            descriptions.push(constraint.to_string());
            handles.push(store.add(Lifetime::Static, constraint));
        }
        let merged = store.merged_linear(self.space.num_coefficients());
        match solver::solve_feasible(&merged, self.space.num_coefficients()) {
            Ok(_) => Ok(handles),
            Err(_) => {
                for handle in handles {
                    store.remove(handle);
                }
                Err(PowerError::NoFeasibleSolution(descriptions.join("; ")))
            }
        }
    }

    /// Updates a constraint's bound in place: the target value of a power
    /// constraint, or the radius of an apparent-power circle. No
    /// re-validation happens here; the next solve picks up the new bound.
    pub fn update_bound(&self, handle: ConstraintHandle, bound: f64) -> Result<(), PowerError> {
        let mut store = self.store.lock();
        let constraint = store
            .get_mut(handle)
            .ok_or(PowerError::StaleConstraint(handle))?;
        constraint.set_bound(bound);
        Ok(())
    }

    /// Unsets the radius of an apparent-power circle so the unit is no
    /// longer limited.
    pub fn clear_radius(&self, handle: ConstraintHandle) -> Result<(), PowerError> {
        let mut store = self.store.lock();
        let constraint = store
            .get_mut(handle)
            .ok_or(PowerError::StaleConstraint(handle))?;
        if !constraint.clear_radius() {
            return Err(PowerError::WrongConstraintKind(constraint.to_string()));
        }
        Ok(())
    }

    pub fn remove_constraint(&self, handle: ConstraintHandle) -> Result<(), PowerError> {
        let mut store = self.store.lock();
        if store.remove(handle) {
            Ok(())
        } else {
            Err(PowerError::StaleConstraint(handle))
        }
    }

    /// Whether the current Static + Cycle set admits any solution.
    pub fn is_solvable(&self) -> bool {
        let store = self.store.lock();
        let merged = store.merged_linear(self.space.num_coefficients());
        solver::solve_feasible(&merged, self.space.num_coefficients()).is_ok()
    }

    /// Cycle-boundary commit: solves the merged Static + Cycle set and
    /// distributes the solution to every unit in its native shape. On solver
    /// failure every unit receives zero power for this cycle; the failure is
    /// logged, never propagated, so the control loop always proceeds. Clears
    /// the Cycle list as its final step.
    pub fn apply_power(&self) {
        let mut store = self.store.lock();
        let num_coefficients = self.space.num_coefficients();
        let merged = store.merged_linear(num_coefficients);
        let solution = match solver::solve_feasible(&merged, num_coefficients) {
            Ok(solution) => solution,
            Err(error) => {
                warn!(
                    %error,
                    static_constraints = store.static_len(),
                    cycle_constraints = store.cycle_len(),
                    "no feasible power distribution, commanding zero power"
                );
                vec![0.0; num_coefficients]
            }
        };
        for (unit, layout) in self.units.iter().zip(self.space.layouts()) {
            let setpoint = match layout.kind {
                UnitKind::Symmetric => Setpoint::Symmetric {
                    p: solution[layout.base],
                    q: solution[layout.base + 1],
                },
                UnitKind::Asymmetric => {
                    let mut phases = [PhasePower::default(); 3];
                    for (phase, (p, q)) in layout.pq_pairs().into_iter().enumerate() {
                        phases[phase] = PhasePower {
                            p: solution[p],
                            q: solution[q],
                        };
                    }
                    Setpoint::Asymmetric { phases }
                }
            };
            unit.apply_power(setpoint);
        }
        store.clear_cycle();
        debug!(
            units = self.units.len(),
            static_constraints = store.static_len(),
            "applied power"
        );
    }

    /// Clears the Cycle constraint list, keeping Static constraints for the
    /// next cycle. Called by the cycle dispatcher after device writes;
    /// idempotent.
    pub fn clear_cycle_constraints(&self) {
        self.store.lock().clear_cycle();
    }

    /// Maximum possible total active power under the current constraints,
    /// or 0 when no extremum exists.
    pub fn max_active_power(&self) -> f64 {
        self.active_power_extremum(OptimizationDirection::Maximize)
    }

    /// Minimum possible total active power under the current constraints,
    /// or 0 when no extremum exists.
    pub fn min_active_power(&self) -> f64 {
        self.active_power_extremum(OptimizationDirection::Minimize)
    }

    fn active_power_extremum(&self, direction: OptimizationDirection) -> f64 {
        let goal = match direction {
            OptimizationDirection::Maximize => "maximize",
            OptimizationDirection::Minimize => "minimize",
        };
        let store = self.store.lock();
        let merged = store.merged_linear(self.space.num_coefficients());
        match solver::extremum(
            &merged,
            self.space.num_coefficients(),
            self.space.p_indices(),
            direction,
        ) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, goal, "unable to find active power extremum, returning 0");
                0.0
            }
        }
    }

    /// Appends the constraint and immediately re-solves the merged set. If
    /// the set becomes infeasible the constraint is removed again and the
    /// error names it; the store is left exactly as before the call.
    fn add_and_validate(
        &self,
        lifetime: Lifetime,
        constraint: Constraint,
    ) -> Result<ConstraintHandle, PowerError> {
        let mut store = self.store.lock();
        let description = constraint.to_string();
        let handle = store.add(lifetime, constraint);
        let merged = store.merged_linear(self.space.num_coefficients());
        match solver::solve_feasible(&merged, self.space.num_coefficients()) {
            // The probe solution is discarded: only feasibility matters here,
            // the authoritative solve happens at apply_power().
            Ok(_) => Ok(handle),
            Err(_) => {
                store.remove(handle);
                Err(PowerError::NoFeasibleSolution(description))
            }
        }
    }

    fn scope_indices(&self, pwr: Pwr, scope: Scope<'_>) -> Result<Vec<usize>, PowerError> {
        match scope {
            Scope::AllUnits => Ok(match pwr {
                Pwr::Active => self.space.p_indices().to_vec(),
                Pwr::Reactive => self.space.q_indices().to_vec(),
            }),
            Scope::Unit(unit_id) => {
                let layout = self.layout_for(unit_id)?;
                Ok(layout
                    .pq_pairs()
                    .into_iter()
                    .map(|(p, q)| match pwr {
                        Pwr::Active => p,
                        Pwr::Reactive => q,
                    })
                    .collect())
            }
            Scope::UnitPhase(unit_id, phase) => {
                let layout = self.layout_for(unit_id)?;
                if layout.kind != UnitKind::Asymmetric {
                    return Err(PowerError::PhaseOnSymmetricUnit(unit_id.to_string()));
                }
                let (p, q) = layout.pq_pairs()[phase.index()];
                Ok(vec![match pwr {
                    Pwr::Active => p,
                    Pwr::Reactive => q,
                }])
            }
        }
    }

    fn layout_for(&self, unit_id: &str) -> Result<UnitLayout, PowerError> {
        self.space
            .position(unit_id)
            .map(|position| self.space.layout(position))
            .ok_or_else(|| PowerError::UnknownUnit(unit_id.to_string()))
    }
}
