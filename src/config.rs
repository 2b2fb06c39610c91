use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

use crate::domain::UnitKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub dispatcher: DispatcherConfig,
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tangent sections per quadrant for apparent-power circles. Higher
    /// values approximate the circle more tightly at the cost of more
    /// constraints per unit.
    pub sections_per_quadrant: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    pub cycle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub id: String,
    pub kind: UnitKind,
    /// Static apparent-power limit in VA, applied per phase for asymmetric
    /// units. Unset means unlimited.
    pub max_apparent_power: Option<f64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("OPE__").split("__"));
        Ok(figment.extract()?)
    }
}
