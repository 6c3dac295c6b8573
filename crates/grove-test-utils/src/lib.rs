//! Shared test fixtures and utilities for Grove crates.
//!
//! Provides an in-memory recording backend, scene builders and a Bevy test
//! app builder with manually driven time.

pub mod app;
pub mod mocks;
pub mod scenes;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use app::physics_test_app;
pub use mocks::{AppliedLoad, BackendCall, RecordingBackend, StepRecord};
pub use scenes::{add_collider, body_grid, compound_body, falling_sphere, pendulum, spawn_body};
