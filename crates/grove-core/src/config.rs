use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_gravity() -> [f32; 3] {
    [0.0, -9.8, 0.0]
}
const fn default_solver_iterations() -> i32 {
    1
}
const fn default_update_rate_hz() -> i32 {
    120
}
const fn default_true() -> bool {
    true
}
const fn default_max_substeps() -> u32 {
    16
}

// ---------------------------------------------------------------------------
// BroadPhaseKind
// ---------------------------------------------------------------------------

/// Broad-phase selector forwarded to the simulation backend.
///
/// Backends that only implement one broad phase accept both values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadPhaseKind {
    #[default]
    Default,
    Persistent,
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Simulation world configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct WorldConfig {
    /// Gravity vector [x, y, z] in m/s^2.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],

    /// Solver worker threads. 0 lets the backend decide.
    #[serde(default)]
    pub thread_count: i32,

    /// Solver iterations per sub-step (>= 1).
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: i32,

    #[serde(default)]
    pub broad_phase: BroadPhaseKind,

    /// Fixed sub-step rate in Hz. The sub-step length is `1 / update_rate_hz`.
    #[serde(default = "default_update_rate_hz")]
    pub update_rate_hz: i32,

    /// Interpolate read-back transforms between the last two sub-steps.
    #[serde(default = "default_true")]
    pub async_update: bool,

    /// Maximum sub-steps run by a single `step` call. Surplus time carries over.
    #[serde(default = "default_max_substeps")]
    pub max_substeps: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            thread_count: 0,
            solver_iterations: default_solver_iterations(),
            broad_phase: BroadPhaseKind::Default,
            update_rate_hz: default_update_rate_hz(),
            async_update: true,
            max_substeps: default_max_substeps(),
        }
    }
}

impl WorldConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_rate_hz <= 0 {
            return Err(ConfigError::InvalidUpdateRate(self.update_rate_hz));
        }
        if self.solver_iterations < 1 {
            return Err(ConfigError::InvalidSolverIterations(self.solver_iterations));
        }
        if self.thread_count < 0 {
            return Err(ConfigError::InvalidThreadCount(self.thread_count));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::ZeroMaxSubsteps);
        }
        Ok(())
    }

    /// Fixed sub-step length in seconds.
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn timestep(&self) -> f64 {
        1.0 / f64::from(self.update_rate_hz.max(1))
    }

    /// Load from a TOML file and validate.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
