// grove-physics: Rigid-body simulation synchronized with a Grove scene graph.
//
// A `PhysicsWorld` discovers rigid bodies, colliders and joints in a scene,
// mirrors them into a `SimulationBackend`, advances the simulation on a fixed
// sub-step clock and writes the resulting poses back into the scene. The
// bundled backend drives raw rapier3d; tests use an in-memory recorder.

pub mod backend;
pub mod body;
pub mod components;
pub mod debug;
pub mod driver;
pub mod geometry;
pub mod plugin;
pub mod rapier;
pub mod registry;
pub mod scene;
pub mod shape;
pub mod world;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        backend::SimulationBackend,
        body::{Body, BodyId, BodyMut, Pose},
        components::{
            AngleLimits, ColliderDesc, JointDesc, JointKind, LinearLimits, RigidBodyDesc,
            SpringDamper,
        },
        geometry::ShapeGeometry,
        plugin::{GrovePhysicsPlugin, PhysicsSet},
        rapier::RapierBackend,
        scene::{LocalTransform, NodeId, Scene, SceneGraph},
        world::PhysicsWorld,
    };
    pub use grove_core::{GroveError, WorldConfig};
}

// Re-export the most used types at crate root for convenience.
pub use plugin::GrovePhysicsPlugin;
pub use world::PhysicsWorld;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the prelude re-exports compile.
    #[test]
    fn prelude_exports() {
        use prelude::*;

        fn _accepts_backend(_: &dyn SimulationBackend) {}
        fn _accepts_scene(_: &dyn SceneGraph) {}

        let _plugin = GrovePhysicsPlugin::<RapierBackend>::default();
        let _body = RigidBodyDesc::dynamic(1.0);
        let _collider = ColliderDesc::new(ShapeGeometry::sphere(0.5));
        let _config = WorldConfig::default();
        let _pose = Pose::IDENTITY;
    }
}
