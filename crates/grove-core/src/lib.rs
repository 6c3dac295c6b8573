// grove-core: Configuration, errors and the simulation clock for Grove.

pub mod config;
pub mod error;
pub mod time;

pub use config::{BroadPhaseKind, WorldConfig};
pub use error::{AllocationError, ConfigError, GroveError, ResourceError};
