//! Scene builders shared by physics tests.

use bevy::math::Vec3;

use grove_physics::components::{ColliderDesc, JointDesc, RigidBodyDesc};
use grove_physics::geometry::ShapeGeometry;
use grove_physics::scene::{LocalTransform, NodeId, Scene};

/// A single dynamic unit sphere of `mass` at `position`.
pub fn falling_sphere(mass: f32, position: Vec3) -> (Scene, NodeId) {
    let mut scene = Scene::new();
    let node = spawn_body(
        &mut scene,
        None,
        "sphere",
        position,
        RigidBodyDesc::dynamic(mass).with_damping(0.0, 0.0),
        Some(ShapeGeometry::sphere(0.5)),
    );
    (scene, node)
}

/// `count` dynamic boxes side by side along X.
pub fn body_grid(count: u32) -> Scene {
    let mut scene = Scene::new();
    for i in 0..count {
        spawn_body(
            &mut scene,
            None,
            format!("box{i}"),
            Vec3::new(i as f32 * 2.0, 0.0, 0.0),
            RigidBodyDesc::dynamic(1.0),
            Some(ShapeGeometry::cuboid(Vec3::ONE)),
        );
    }
    scene
}

/// A dynamic body with a collider-only child offset along Y.
///
/// Returns the scene, the body node and the child node.
pub fn compound_body() -> (Scene, NodeId, NodeId) {
    let mut scene = Scene::new();
    let body = spawn_body(
        &mut scene,
        None,
        "body",
        Vec3::ZERO,
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::cuboid(Vec3::ONE)),
    );
    let child = scene
        .spawn_child(body, "handle", LocalTransform::from_translation(Vec3::Y))
        .unwrap_or_else(|e| panic!("cannot spawn handle under {body:?}: {e}"));
    add_collider(&mut scene, child, ShapeGeometry::sphere(0.25));
    (scene, body, child)
}

/// A static anchor and a dynamic bob hanging below it on a hinge.
///
/// Returns the scene, the anchor node and the bob node.
pub fn pendulum() -> (Scene, NodeId, NodeId) {
    let mut scene = Scene::new();
    let anchor = spawn_body(
        &mut scene,
        None,
        "anchor",
        Vec3::new(0.0, 2.0, 0.0),
        RigidBodyDesc::fixed(),
        Some(ShapeGeometry::cuboid(Vec3::splat(0.2))),
    );
    let bob = spawn_body(
        &mut scene,
        None,
        "bob",
        Vec3::new(0.0, 1.0, 0.0),
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::sphere(0.1)),
    );
    scene
        .add_joint(
            bob,
            JointDesc::hinge()
                .connected_to(anchor)
                .with_pivot(Vec3::Y)
                .with_pin(Vec3::Z),
        )
        .unwrap_or_else(|e| panic!("cannot hinge {bob:?}: {e}"));
    (scene, anchor, bob)
}

/// Spawn a node carrying a rigid body and, optionally, its own collider.
pub fn spawn_body(
    scene: &mut Scene,
    parent: Option<NodeId>,
    name: impl Into<String>,
    translation: Vec3,
    body: RigidBodyDesc,
    geometry: Option<ShapeGeometry>,
) -> NodeId {
    let transform = LocalTransform::from_translation(translation);
    let node = match parent {
        Some(p) => scene
            .spawn_child(p, name, transform)
            .unwrap_or_else(|_| panic!("parent {p:?} does not exist")),
        None => scene.spawn(name, transform),
    };
    scene
        .insert_rigid_body(node, body)
        .unwrap_or_else(|e| panic!("cannot add a body to {node:?}: {e}"));
    if let Some(geometry) = geometry {
        add_collider(scene, node, geometry);
    }
    node
}

/// Append a collider to `node` and return its index.
pub fn add_collider(scene: &mut Scene, node: NodeId, geometry: ShapeGeometry) -> usize {
    scene
        .add_collider(node, ColliderDesc::new(geometry))
        .unwrap_or_else(|e| panic!("cannot add a collider to {node:?}: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use grove_physics::scene::{ComponentKind, SceneGraph};

    #[test]
    fn compound_child_has_no_body() {
        let (scene, body, child) = compound_body();
        assert!(scene.has_component(body, ComponentKind::RigidBody));
        assert!(!scene.has_component(child, ComponentKind::RigidBody));
        assert_eq!(scene.nearest_with(child, ComponentKind::RigidBody), Some(body));
    }

    #[test]
    #[should_panic(expected = "cannot add a collider")]
    fn collider_on_a_removed_node_fails_loudly() {
        let (mut scene, _, child) = compound_body();
        scene.remove(child);
        add_collider(&mut scene, child, ShapeGeometry::sphere(0.1));
    }

    #[test]
    fn spawned_body_carries_its_collider() {
        let mut scene = Scene::new();
        let node = spawn_body(
            &mut scene,
            None,
            "box",
            Vec3::ZERO,
            RigidBodyDesc::dynamic(1.0),
            Some(ShapeGeometry::cuboid(Vec3::ONE)),
        );
        assert_eq!(add_collider(&mut scene, node, ShapeGeometry::sphere(0.1)), 1);
        assert_eq!(scene.colliders(node).len(), 2);
    }

    #[test]
    fn grid_has_requested_roots() {
        assert_eq!(body_grid(5).roots().len(), 5);
    }

    #[test]
    fn pendulum_joint_targets_anchor() {
        let (scene, anchor, bob) = pendulum();
        assert_eq!(scene.joints(bob)[0].connected, Some(anchor));
    }
}
