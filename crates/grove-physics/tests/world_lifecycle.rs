//! Integration tests: world start-up, body registration and teardown against
//! the recording backend.

use bevy::math::Vec3;

use grove_core::{AllocationError, ConfigError, GroveError, ResourceError, WorldConfig};
use grove_physics::backend::SimulationBackend;
use grove_physics::components::{ColliderDesc, JointDesc, RigidBodyDesc};
use grove_physics::geometry::ShapeGeometry;
use grove_physics::registry::INITIAL_CAPACITY;
use grove_physics::scene::{LocalTransform, Scene, SceneGraph};
use grove_physics::world::PhysicsWorld;
use grove_test_utils::{
    BackendCall, RecordingBackend, body_grid, compound_body, falling_sphere, pendulum, spawn_body,
};

fn world() -> PhysicsWorld<RecordingBackend> {
    PhysicsWorld::new(WorldConfig::default(), RecordingBackend::new())
}

#[test]
fn teardown_releases_every_native_resource() {
    let (scene, _, _) = pendulum();
    let mut world = world();
    world.initialize(&scene).unwrap();
    let counts = world.backend().live_counts();
    assert_eq!((counts.contexts, counts.bodies, counts.joints), (1, 2, 1));

    world.teardown();
    assert!(!world.is_started());
    assert!(world.backend().live_counts().is_empty());
    assert!(world.tokens().is_empty());
    assert_eq!(
        world.backend().calls().last(),
        Some(&BackendCall::DestroyContext)
    );
}

#[test]
fn second_initialize_is_ignored() {
    let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
    let mut world = world();
    world.initialize(&scene).unwrap();
    world.initialize(&scene).unwrap();
    assert_eq!(world.backend().live_counts().bodies, 1);
}

#[test]
fn invalid_config_fails_before_any_native_call() {
    let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
    let config = WorldConfig {
        update_rate_hz: 0,
        ..WorldConfig::default()
    };
    let mut world = PhysicsWorld::new(config, RecordingBackend::new());
    let err = world.initialize(&scene).unwrap_err();
    assert!(matches!(
        err,
        GroveError::Config(ConfigError::InvalidUpdateRate(0))
    ));
    assert!(world.backend().calls().is_empty());
    assert!(!world.is_started());
}

#[test]
fn body_allocation_failure_aborts_initialization() {
    let scene = body_grid(3);
    let mut world = world();
    world.backend_mut().fail_next_body = true;
    let err = world.initialize(&scene).unwrap_err();
    assert!(matches!(err, GroveError::Allocation(AllocationError::Body)));
    assert!(!world.is_started());
    assert!(world.backend().live_counts().is_empty());
    assert!(world.registry().is_empty());
}

#[test]
fn context_allocation_failure_is_reported() {
    let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
    let mut world = world();
    world.backend_mut().fail_next_context = true;
    assert!(matches!(
        world.initialize(&scene),
        Err(GroveError::Allocation(AllocationError::Context))
    ));
    assert!(!world.is_started());
}

#[test]
fn registry_grows_once_past_initial_capacity() {
    let count = u32::try_from(INITIAL_CAPACITY).unwrap() + 1;
    let scene = body_grid(count);
    let mut world = world();
    world.initialize(&scene).unwrap();
    assert_eq!(world.registry().len(), INITIAL_CAPACITY + 1);
    assert_eq!(world.registry().reallocations(), 1);
    assert!(world.registry().capacity() >= INITIAL_CAPACITY * 2);
}

#[test]
fn bodies_register_parents_before_children() {
    let mut scene = Scene::new();
    let parent = spawn_body(
        &mut scene,
        None,
        "parent",
        Vec3::ZERO,
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::cuboid(Vec3::ONE)),
    );
    let child = spawn_body(
        &mut scene,
        Some(parent),
        "child",
        Vec3::X,
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::sphere(0.2)),
    );
    let mut world = world();
    world.initialize(&scene).unwrap();
    let order: Vec<_> = world.registry().iter().map(|h| h.node()).collect();
    assert_eq!(order, vec![parent, child]);
}

#[test]
fn native_handles_map_back_to_bodies() {
    let scene = body_grid(4);
    let mut world = world();
    world.initialize(&scene).unwrap();
    for body in world.bodies() {
        let native = body.handle().native().unwrap();
        assert_eq!(world.body_for_native(native), Some(body.id()));
    }
}

#[test]
fn destroy_releases_shape_then_body() {
    let (scene, node) = falling_sphere(1.0, Vec3::ZERO);
    let mut world = world();
    world.initialize(&scene).unwrap();
    let id = world.body_id(node).unwrap();
    let handle = world.registry().get(id).unwrap();
    let (native, shape) = (handle.native().unwrap(), handle.shape().unwrap());
    world.backend_mut().clear_calls();

    assert!(world.destroy_body(id));
    assert!(!world.destroy_body(id));
    assert_eq!(
        world.backend().calls(),
        &[BackendCall::DestroyShape(shape), BackendCall::DestroyBody(native)]
    );
    assert!(world.tokens().is_empty());
    assert!(world.body(id).is_none());
}

#[test]
fn destroying_a_body_removes_its_joints() {
    let (scene, anchor, _) = pendulum();
    let mut world = world();
    world.initialize(&scene).unwrap();
    assert_eq!(world.joint_count(), 1);
    let id = world.body_id(anchor).unwrap();
    world.destroy_body(id);
    assert_eq!(world.joint_count(), 0);
    assert_eq!(world.backend().live_counts().joints, 0);
}

#[test]
fn compound_child_collider_attaches_to_ancestor_body() {
    let (scene, body, child) = compound_body();
    let mut world = world();
    world.initialize(&scene).unwrap();

    let native = world.body_for_node(body).unwrap().handle().native().unwrap();
    let shape = world.shapes().cached(grove_physics::shape::ColliderKey::new(child, 0));
    assert!(shape.is_some());
    assert_eq!(world.backend().shapes_of(native).len(), 2);

    let placed = world.backend().shape(shape.unwrap()).unwrap();
    assert_eq!(placed.matrix.w_axis.truncate(), Vec3::Y);
}

#[test]
fn collider_without_body_resolves_once_body_is_added() {
    let mut scene = Scene::new();
    let holder = scene.spawn("holder", LocalTransform::IDENTITY);
    let child = scene
        .spawn_child(holder, "collider", LocalTransform::from_translation(Vec3::Y))
        .unwrap();
    scene
        .add_collider(child, ColliderDesc::new(ShapeGeometry::sphere(0.5)))
        .unwrap();

    let mut world = world();
    world.initialize(&scene).unwrap();
    assert!(world.resolve_collider(&scene, child, 0).unwrap().is_none());
    assert_eq!(world.backend().live_counts().shapes, 0);

    scene
        .insert_rigid_body(holder, RigidBodyDesc::dynamic(2.0))
        .unwrap();
    let id = world.add_body(&scene, holder).unwrap();
    assert_eq!(world.body_id(holder), Some(id));
    assert!(world.resolve_collider(&scene, child, 0).unwrap().is_some());
    // Own null shape plus the child's sphere.
    assert_eq!(world.backend().live_counts().shapes, 2);
}

#[test]
fn add_body_validates_its_node() {
    let (mut scene, node) = falling_sphere(1.0, Vec3::ZERO);
    let plain = scene.spawn("plain", LocalTransform::IDENTITY);
    let mut world = world();
    assert!(matches!(
        world.add_body(&scene, node),
        Err(GroveError::Resource(ResourceError::ContextNotLive))
    ));
    world.initialize(&scene).unwrap();
    assert!(matches!(
        world.add_body(&scene, node),
        Err(GroveError::Resource(ResourceError::AlreadyRegistered(_)))
    ));
    assert!(matches!(
        world.add_body(&scene, plain),
        Err(GroveError::Resource(ResourceError::NotABody(_)))
    ));
    let removed = scene.remove(plain);
    assert_eq!(removed, vec![plain]);
    assert!(matches!(
        world.add_body(&scene, plain),
        Err(GroveError::Resource(ResourceError::NodeNotFound(_)))
    ));
}

#[test]
fn joint_waiting_for_its_connected_body_is_created_later() {
    let mut scene = Scene::new();
    let bob = spawn_body(
        &mut scene,
        None,
        "bob",
        Vec3::ZERO,
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::sphere(0.1)),
    );
    let anchor = scene.spawn("anchor", LocalTransform::from_translation(Vec3::Y));
    scene
        .add_joint(bob, JointDesc::ball().connected_to(anchor).with_pivot(Vec3::Y))
        .unwrap();

    let mut world = world();
    world.initialize(&scene).unwrap();
    assert_eq!(world.joint_count(), 0);

    scene.insert_rigid_body(anchor, RigidBodyDesc::fixed()).unwrap();
    world.add_body(&scene, anchor).unwrap();
    assert_eq!(world.joint_count(), 1);
    let spec = world.backend().joints().next().unwrap();
    assert_eq!(spec.frame1.anchor, [0.0, 0.0, 0.0]);
}

#[test]
fn world_anchored_joint_has_no_second_body() {
    let mut scene = Scene::new();
    let body = spawn_body(
        &mut scene,
        None,
        "door",
        Vec3::new(1.0, 0.0, 0.0),
        RigidBodyDesc::dynamic(1.0),
        Some(ShapeGeometry::cuboid(Vec3::ONE)),
    );
    scene
        .add_joint(body, JointDesc::hinge().with_pin(Vec3::Y).with_pivot(-Vec3::X))
        .unwrap();
    let mut world = world();
    world.initialize(&scene).unwrap();
    let spec = world.backend().joints().next().unwrap();
    assert!(spec.body1.is_none());
    assert_eq!(spec.frame1.anchor, [0.0, 0.0, 0.0]);
}

#[test]
fn despawn_releases_subtree_resources() {
    let (mut scene, body, child) = compound_body();
    let mut world = world();
    world.initialize(&scene).unwrap();
    let removed = world.despawn(&mut scene, body);
    assert_eq!(removed.len(), 2);
    assert!(removed.contains(&child));
    assert!(world.registry().is_empty());
    assert!(world.shapes().is_empty());
    let counts = world.backend().live_counts();
    assert_eq!((counts.bodies, counts.shapes), (0, 0));
    assert!(!scene.contains(body));
}

#[test]
fn recreating_a_child_shape_replaces_it() {
    let (mut scene, _, child) = compound_body();
    let mut world = world();
    world.initialize(&scene).unwrap();
    let before = world.resolve_collider(&scene, child, 0).unwrap().unwrap();

    scene.collider_mut(child, 0).unwrap().geometry = ShapeGeometry::cuboid(Vec3::splat(0.3));
    let after = world.recreate_shape(&scene, child, 0).unwrap().unwrap();
    assert_ne!(before, after);
    assert!(world.backend().shape(before).is_none());
    assert!(matches!(
        world.backend().shape(after).unwrap().geometry,
        ShapeGeometry::Box { .. }
    ));
}

#[test]
fn recreating_a_body_shape_swaps_it_into_the_body() {
    let (mut scene, node) = falling_sphere(1.0, Vec3::new(0.0, 5.0, 0.0));
    let mut world = world();
    world.initialize(&scene).unwrap();
    let native = world.body_for_node(node).unwrap().handle().native().unwrap();
    let before = world.registry().by_node(node).unwrap().shape().unwrap();

    scene.collider_mut(node, 0).unwrap().geometry = ShapeGeometry::cuboid(Vec3::splat(3.0));
    let after = world.recreate_shape(&scene, node, 0).unwrap().unwrap();
    assert_ne!(before, after);
    assert_eq!(world.registry().by_node(node).unwrap().shape(), Some(after));
    assert!(world.backend().shape(before).is_none());

    let backend = world.backend();
    assert_eq!(backend.body(native).unwrap().shape, after);
    assert_eq!(backend.shapes_of(native), vec![after]);
    let shape = backend.shape(after).unwrap();
    assert!(matches!(shape.geometry, ShapeGeometry::Box { size } if size == Vec3::splat(3.0)));
    assert_eq!(shape.scale, Vec3::ONE);
    assert_eq!(backend.live_counts().shapes, 1);

    let mut faces = 0;
    world.debug_draw(&mut |_, _| faces += 1);
    assert_eq!(faces, 6);
    assert!(world.shapes().is_empty());

    world.teardown();
    assert!(world.backend().live_counts().is_empty());
}

#[test]
fn drop_tears_the_world_down() {
    let (scene, _) = falling_sphere(1.0, Vec3::ZERO);
    let mut world = world();
    world.initialize(&scene).unwrap();
    drop(world);
}
