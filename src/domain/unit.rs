use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Shape of a managed unit: a symmetric unit exposes a single (P, Q) pair,
/// an asymmetric unit exposes an independent (P, Q) pair per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UnitKind {
    Symmetric,
    Asymmetric,
}

impl UnitKind {
    /// Number of unknowns this unit contributes to the solution vector.
    pub fn num_coefficients(&self) -> usize {
        match self {
            UnitKind::Symmetric => 2,
            UnitKind::Asymmetric => 6,
        }
    }
}

/// Active/reactive power pair for a single phase, in W / var.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhasePower {
    pub p: f64,
    pub q: f64,
}

/// A power command in the unit's native shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    Symmetric { p: f64, q: f64 },
    Asymmetric { phases: [PhasePower; 3] },
}

impl Setpoint {
    pub fn zero(kind: UnitKind) -> Self {
        match kind {
            UnitKind::Symmetric => Setpoint::Symmetric { p: 0.0, q: 0.0 },
            UnitKind::Asymmetric => Setpoint::Asymmetric {
                phases: [PhasePower::default(); 3],
            },
        }
    }

    /// Total active power across all phases.
    pub fn active_power(&self) -> f64 {
        match self {
            Setpoint::Symmetric { p, .. } => *p,
            Setpoint::Asymmetric { phases } => phases.iter().map(|ph| ph.p).sum(),
        }
    }

    /// Total reactive power across all phases.
    pub fn reactive_power(&self) -> f64 {
        match self {
            Setpoint::Symmetric { q, .. } => *q,
            Setpoint::Asymmetric { phases } => phases.iter().map(|ph| ph.q).sum(),
        }
    }
}

/// A power-electronics device (e.g. a battery inverter) managed by one
/// `PowerEngine` instance.
///
/// `apply_power` is a fire-and-forget command: the engine treats it as always
/// succeeding. Device-level failure handling belongs to the driver layer.
pub trait ManagedUnit: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> UnitKind;
    fn apply_power(&self, setpoint: Setpoint);
}

/// In-memory unit for the demo binary and tests. Records the last applied
/// set-point and counts apply calls.
pub struct SimulatedUnit {
    id: String,
    kind: UnitKind,
    last_setpoint: RwLock<Option<Setpoint>>,
    apply_count: AtomicU64,
}

impl SimulatedUnit {
    pub fn new(id: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            id: id.into(),
            kind,
            last_setpoint: RwLock::new(None),
            apply_count: AtomicU64::new(0),
        }
    }

    pub fn last_setpoint(&self) -> Option<Setpoint> {
        *self.last_setpoint.read()
    }

    pub fn apply_count(&self) -> u64 {
        self.apply_count.load(Ordering::Relaxed)
    }
}

impl ManagedUnit for SimulatedUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        self.kind
    }

    fn apply_power(&self, setpoint: Setpoint) {
        *self.last_setpoint.write() = Some(setpoint);
        self.apply_count.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            unit = %self.id,
            p = setpoint.active_power(),
            q = setpoint.reactive_power(),
            "applied set-point"
        );
    }
}
