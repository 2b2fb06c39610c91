pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod telemetry;

pub use dispatcher::CycleDispatcher;
pub use domain::{ManagedUnit, PhasePower, Setpoint, SimulatedUnit, UnitKind};
pub use engine::{ConstraintHandle, Lifetime, Phase, PowerEngine, PowerError, Relationship, Scope};
