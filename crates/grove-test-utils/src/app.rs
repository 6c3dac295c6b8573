//! Bevy test app builders.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::{TimePlugin, TimeUpdateStrategy};

use grove_core::WorldConfig;
use grove_physics::backend::SimulationBackend;
use grove_physics::plugin::GrovePhysicsPlugin;
use grove_physics::scene::Scene;

/// App with time, the physics plugin for backend `B` and `scene`.
///
/// Every `app.update()` advances time by exactly `frame`, so stepping is
/// deterministic.
pub fn physics_test_app<B: SimulationBackend + Default>(
    config: WorldConfig,
    scene: Scene,
    frame: Duration,
) -> App {
    let mut app = App::new();
    app.add_plugins(TimePlugin);
    app.insert_resource(TimeUpdateStrategy::ManualDuration(frame));
    app.insert_resource(scene);
    app.add_plugins(GrovePhysicsPlugin::<B>::new(config));
    app.finish();
    app.cleanup();
    app
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingBackend;
    use crate::scenes::falling_sphere;
    use grove_physics::world::PhysicsWorld;

    #[test]
    fn app_starts_world_on_first_update() {
        let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
        let mut app = physics_test_app::<RecordingBackend>(
            WorldConfig::default(),
            scene,
            Duration::from_millis(10),
        );
        app.update();
        let world = app.world().resource::<PhysicsWorld<RecordingBackend>>();
        assert!(world.is_started());
        assert_eq!(world.registry().len(), 1);
    }

    #[test]
    fn world_starts_with_the_app_config() {
        let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
        let mut app = physics_test_app::<RecordingBackend>(
            WorldConfig::default(),
            scene,
            Duration::from_millis(10),
        );
        app.world_mut().resource_mut::<WorldConfig>().update_rate_hz = 50;
        app.update();
        let world = app.world().resource::<PhysicsWorld<RecordingBackend>>();
        assert!(world.is_started());
        assert_eq!(world.config().update_rate_hz, 50);
        assert!((world.clock().timestep() - 0.02).abs() < 1e-6);
    }
}
