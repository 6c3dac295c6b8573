//! Raw `rapier3d` simulation backend.
//!
//! [`RapierBackend`] implements [`SimulationBackend`](crate::backend::SimulationBackend)
//! on the `rapier3d` crate directly (not `bevy_rapier3d`). We own the
//! [`PhysicsPipeline`](rapier3d::pipeline::PhysicsPipeline) and call `step()`
//! ourselves, once per fixed sub-step.

pub mod backend;
pub mod bridge;
pub mod context;

pub use backend::RapierBackend;
pub use context::RapierContext;
