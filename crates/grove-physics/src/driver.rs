//! Per-frame entry points.
//!
//! Hosts either call [`on_frame`] themselves or let the Bevy systems below
//! pull the frame delta from [`Time`].

use bevy::log::error;
use bevy::prelude::{Res, ResMut, Time};

use grove_core::WorldConfig;

use crate::backend::SimulationBackend;
use crate::scene::{Scene, SceneGraph};
use crate::world::PhysicsWorld;

/// Forward one frame of `delta_secs` to the world. Returns the sub-steps
/// taken.
pub fn on_frame<B: SimulationBackend>(
    world: &mut PhysicsWorld<B>,
    scene: &mut dyn SceneGraph,
    delta_secs: f64,
) -> u32 {
    world.step(scene, delta_secs)
}

/// Start the world on the scene present at startup, using the app's
/// [`WorldConfig`] resource when there is one.
pub fn start_world_system<B: SimulationBackend>(
    mut world: ResMut<PhysicsWorld<B>>,
    scene: Res<Scene>,
    config: Option<Res<WorldConfig>>,
) {
    if world.is_started() {
        return;
    }
    if let Some(config) = config {
        world.set_config(WorldConfig::clone(&config));
    }
    if let Err(e) = world.initialize(&*scene) {
        error!("Failed to start physics world: {e}");
    }
}

/// Step the world by the frame delta and write poses back into the scene.
pub fn step_world_system<B: SimulationBackend>(
    time: Res<Time>,
    mut world: ResMut<PhysicsWorld<B>>,
    mut scene: ResMut<Scene>,
) {
    on_frame(&mut world, &mut *scene, time.delta_secs_f64());
}
