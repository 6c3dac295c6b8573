//! The physics world: native context, body registry and the step protocol.
//!
//! [`PhysicsWorld`] discovers bodies, colliders and joints in a
//! [`SceneGraph`], drives fixed sub-steps from frame time and writes the
//! simulated poses back into the scene.
//!
//! ```ignore
//! let mut world = PhysicsWorld::new(WorldConfig::default(), RapierBackend::default());
//! world.initialize(&scene)?;
//! loop {
//!     world.step(&mut scene, frame_delta);
//! }
//! ```

use bevy::log::{debug, info, warn};
use bevy::math::{Affine3A, Quat};
use bevy::prelude::Resource;

use grove_core::time::{Clock, SimTime};
use grove_core::{GroveError, ResourceError, WorldConfig};

use crate::backend::{
    JointFrame, NativeBody, NativeJoint, NativeJointSpec, NativeShape, SimulationBackend,
};
use crate::body::{Body, BodyHandle, BodyId, BodyMut, CorrelationTable, Pose, quat_to_native};
use crate::components::JointDesc;
use crate::debug::transform_face;
use crate::geometry::ShapeGeometry;
use crate::registry::BodyRegistry;
use crate::scene::{ComponentKind, LocalTransform, NodeId, Scene, SceneGraph};
use crate::shape::{ColliderKey, ShapeResolver};

/// Per-body callback run before every sub-step, ahead of the body's
/// accumulated forces being applied. Receives the body and the sub-step
/// length in seconds.
pub type ForceHook = Box<dyn FnMut(&mut BodyMut<'_>, f32) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct JointRecord {
    node: NodeId,
    index: usize,
    native: NativeJoint,
    owner: BodyId,
    connected: Option<BodyId>,
}

impl JointRecord {
    fn involves(&self, id: BodyId) -> bool {
        self.owner == id || self.connected == Some(id)
    }
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

#[derive(Resource)]
pub struct PhysicsWorld<B: SimulationBackend> {
    config: WorldConfig,
    backend: B,
    started: bool,
    clock: Clock,
    registry: BodyRegistry,
    tokens: CorrelationTable,
    shapes: ShapeResolver,
    joints: Vec<JointRecord>,
    force_hook: Option<ForceHook>,
}

impl<B: SimulationBackend> PhysicsWorld<B> {
    pub fn new(config: WorldConfig, backend: B) -> Self {
        let clock = Clock::from_config(&config);
        Self {
            config,
            backend,
            started: false,
            clock,
            registry: BodyRegistry::new(),
            tokens: CorrelationTable::new(),
            shapes: ShapeResolver::new(),
            joints: Vec::new(),
            force_hook: None,
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create the native context and discover `scene`.
    ///
    /// Bodies are registered depth first, parents before children, and
    /// body-less colliders are resolved onto their nearest registered
    /// ancestor. Joints are created in a second pass. Any failure tears the
    /// world down again before returning.
    pub fn initialize(&mut self, scene: &dyn SceneGraph) -> Result<(), GroveError> {
        if self.started {
            warn!("Physics world already started; ignoring initialize");
            return Ok(());
        }
        self.config.validate()?;
        self.backend.create_context(&self.config)?;
        self.started = true;
        self.clock = Clock::from_config(&self.config);

        if let Err(e) = self.discover(scene) {
            self.teardown();
            return Err(e);
        }
        info!(
            "Physics world started on {} ({} bodies, {} joints, {} Hz, {})",
            self.backend.name(),
            self.registry.len(),
            self.joints.len(),
            self.config.update_rate_hz,
            if self.config.async_update {
                "interpolated"
            } else {
                "exact"
            }
        );
        Ok(())
    }

    fn discover(&mut self, scene: &dyn SceneGraph) -> Result<(), GroveError> {
        let order = scene.depth_first();
        for &node in &order {
            if scene.rigid_body(node).is_some() {
                self.spawn_body(scene, node)?;
            }
            self.resolve_node_colliders(scene, node)?;
        }
        for &node in &order {
            for index in 0..scene.joints(node).len() {
                self.create_joint(scene, node, index)?;
            }
        }
        Ok(())
    }

    /// Destroy every joint, then every body, then the native context.
    ///
    /// No-op when the world was never started.
    pub fn teardown(&mut self) {
        if !self.started {
            return;
        }
        for joint in self.joints.drain(..) {
            self.backend.destroy_joint(joint.native);
        }
        let ids: Vec<BodyId> = self.registry.iter().map(BodyHandle::id).collect();
        for id in ids {
            self.shapes.release_owned_by(&mut self.backend, id);
            if let Some(mut handle) = self.registry.unregister(id) {
                handle.destroy(&mut self.backend, &mut self.tokens);
            }
        }
        debug_assert!(
            self.shapes.is_empty(),
            "collider shapes outlived their bodies"
        );
        debug_assert_eq!(
            self.backend.live_counts().bodies,
            0,
            "bodies still live when releasing the simulation context"
        );
        self.backend.destroy_context();
        self.started = false;
        self.clock.reset();
        info!("Physics world torn down");
    }

    pub const fn is_started(&self) -> bool {
        self.started
    }

    // -- bodies -------------------------------------------------------------

    /// Register the body on `node` in a running world, resolve the colliders
    /// of its subtree and create any joints that can now be built.
    pub fn add_body(&mut self, scene: &dyn SceneGraph, node: NodeId) -> Result<BodyId, GroveError> {
        if !self.started {
            return Err(ResourceError::ContextNotLive.into());
        }
        if !scene.contains(node) {
            return Err(ResourceError::NodeNotFound(node.0).into());
        }
        if scene.rigid_body(node).is_none() {
            return Err(ResourceError::NotABody(node.0).into());
        }
        if self.registry.id_of(node).is_some() {
            return Err(ResourceError::AlreadyRegistered(node.0).into());
        }
        let id = self.spawn_body(scene, node)?;
        for n in scene.subtree(node) {
            self.resolve_node_colliders(scene, n)?;
        }
        // Joints skipped earlier may have been waiting for this body.
        for n in scene.depth_first() {
            for index in 0..scene.joints(n).len() {
                self.create_joint(scene, n, index)?;
            }
        }
        Ok(id)
    }

    fn spawn_body(&mut self, scene: &dyn SceneGraph, node: NodeId) -> Result<BodyId, GroveError> {
        let desc = scene
            .rigid_body(node)
            .ok_or(ResourceError::NotABody(node.0))?
            .clone();
        let geometry = scene
            .colliders(node)
            .first()
            .map_or(ShapeGeometry::Null, |c| c.geometry.clone());
        let world = scene.world_transform(node);
        let pose = Pose::new(world.translation.into(), scene.world_rotation(node));

        let id = self.registry.next_id();
        let handle = BodyHandle::create(
            &mut self.backend,
            &mut self.tokens,
            node,
            id,
            &desc,
            &geometry,
            pose,
        )?;
        self.registry.register(handle);
        self.shapes.sync_placement(
            scene,
            &self.registry,
            &mut self.backend,
            ColliderKey::new(node, 0),
        )?;
        Ok(id)
    }

    fn resolve_node_colliders(
        &mut self,
        scene: &dyn SceneGraph,
        node: NodeId,
    ) -> Result<(), GroveError> {
        for index in 0..scene.colliders(node).len() {
            let key = ColliderKey::new(node, index);
            if self
                .shapes
                .resolve(scene, &self.registry, &mut self.backend, key)?
                .is_none()
            {
                debug!("Collider {:?} has no body yet", key);
            }
        }
        Ok(())
    }

    /// Destroy a body, its joints and the shapes attached on its behalf.
    ///
    /// The scene node is left alone. Returns `false` for unknown ids.
    pub fn destroy_body(&mut self, id: BodyId) -> bool {
        let Some(mut handle) = self.registry.unregister(id) else {
            return false;
        };
        let backend = &mut self.backend;
        self.joints.retain(|j| {
            if j.involves(id) {
                backend.destroy_joint(j.native);
                false
            } else {
                true
            }
        });
        self.shapes.release_owned_by(&mut self.backend, id);
        handle.destroy(&mut self.backend, &mut self.tokens);
        debug!("Destroyed body {:?} of node {:?}", id, handle.node());
        true
    }

    /// Release every native resource tied to `node` and its descendants.
    pub fn release_subtree(&mut self, scene: &dyn SceneGraph, node: NodeId) {
        for n in scene.subtree(node).into_iter().rev() {
            let backend = &mut self.backend;
            self.joints.retain(|j| {
                if j.node == n {
                    backend.destroy_joint(j.native);
                    false
                } else {
                    true
                }
            });
            for index in 0..scene.colliders(n).len() {
                self.shapes
                    .release(&mut self.backend, ColliderKey::new(n, index));
            }
            if let Some(id) = self.registry.id_of(n) {
                self.destroy_body(id);
            }
        }
    }

    /// Release the subtree's native resources, then remove it from `scene`.
    pub fn despawn(&mut self, scene: &mut Scene, node: NodeId) -> Vec<NodeId> {
        self.release_subtree(&*scene, node);
        scene.remove(node)
    }

    // -- shapes -------------------------------------------------------------

    /// Resolve a collider, creating its shape if an owning body exists.
    pub fn resolve_collider(
        &mut self,
        scene: &dyn SceneGraph,
        node: NodeId,
        index: usize,
    ) -> Result<Option<NativeShape>, GroveError> {
        self.shapes.resolve(
            scene,
            &self.registry,
            &mut self.backend,
            ColliderKey::new(node, index),
        )
    }

    /// Push a collider's placement again after its descriptor or an
    /// ancestor transform changed.
    pub fn sync_collider(
        &mut self,
        scene: &dyn SceneGraph,
        node: NodeId,
        index: usize,
    ) -> Result<(), ResourceError> {
        self.shapes.sync_placement(
            scene,
            &self.registry,
            &mut self.backend,
            ColliderKey::new(node, index),
        )
    }

    /// Push the placement of every collider in the subtree of `node`.
    pub fn sync_subtree(&mut self, scene: &dyn SceneGraph, node: NodeId) -> Result<(), ResourceError> {
        for n in scene.subtree(node) {
            for index in 0..scene.colliders(n).len() {
                self.sync_collider(scene, n, index)?;
            }
        }
        Ok(())
    }

    /// Rebuild a collider's shape from its current descriptor, e.g. after
    /// its geometry changed.
    ///
    /// The first collider of a body node is swapped into the body in place,
    /// which also rederives the body's mass distribution. Any other collider
    /// is released and resolved again.
    pub fn recreate_shape(
        &mut self,
        scene: &dyn SceneGraph,
        node: NodeId,
        index: usize,
    ) -> Result<Option<NativeShape>, GroveError> {
        let key = ColliderKey::new(node, index);
        let own = self.registry.id_of(node).filter(|_| key.is_own_shape_of(node));
        let Some(id) = own else {
            return self
                .shapes
                .recreate(scene, &self.registry, &mut self.backend, key);
        };
        let geometry = scene
            .colliders(node)
            .first()
            .map_or(ShapeGeometry::Null, |c| c.geometry.clone());
        let shape = match self.registry.get_mut(id) {
            Some(handle) => handle.replace_shape(&mut self.backend, &geometry)?,
            None => None,
        };
        self.shapes
            .sync_placement(scene, &self.registry, &mut self.backend, key)?;
        Ok(shape)
    }

    pub fn release_collider(&mut self, node: NodeId, index: usize) -> bool {
        self.shapes
            .release(&mut self.backend, ColliderKey::new(node, index))
    }

    pub const fn shapes(&self) -> &ShapeResolver {
        &self.shapes
    }

    // -- joints -------------------------------------------------------------

    fn create_joint(
        &mut self,
        scene: &dyn SceneGraph,
        node: NodeId,
        index: usize,
    ) -> Result<bool, GroveError> {
        if self.joints.iter().any(|j| j.node == node && j.index == index) {
            return Ok(false);
        }
        let Some(desc) = scene.joints(node).get(index) else {
            return Ok(false);
        };
        let Some((owner, owner_native, owner_pose)) = self.live_body_above(scene, node) else {
            warn!(
                "Skipping {} joint on node {:?}: no body at or above it",
                desc.kind.name(),
                node
            );
            return Ok(false);
        };
        let connected = match desc.connected {
            None => None,
            Some(other) => match self.live_body_above(scene, other) {
                Some(found) if found.0 != owner => Some(found),
                _ => {
                    warn!(
                        "Skipping {} joint on node {:?}: connected node {:?} has no other body",
                        desc.kind.name(),
                        node,
                        other
                    );
                    return Ok(false);
                }
            },
        };

        let spec = joint_spec(desc, owner_native, owner_pose, connected.map(|c| (c.1, c.2)));
        let native = self.backend.create_joint(&spec)?;
        self.joints.push(JointRecord {
            node,
            index,
            native,
            owner,
            connected: connected.map(|c| c.0),
        });
        debug!("Created {} joint on node {:?}", desc.kind.name(), node);
        Ok(true)
    }

    fn live_body_above(
        &self,
        scene: &dyn SceneGraph,
        node: NodeId,
    ) -> Option<(BodyId, NativeBody, Pose)> {
        let owner = scene.nearest_with(node, ComponentKind::RigidBody)?;
        let handle = self.registry.by_node(owner)?;
        Some((handle.id(), handle.native()?, handle.pose()))
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // -- stepping -----------------------------------------------------------

    /// Advance the simulation by `elapsed_secs` of frame time and write the
    /// resulting poses back into `scene`. Returns the sub-steps taken.
    ///
    /// Does nothing until the world is started.
    pub fn step(&mut self, scene: &mut dyn SceneGraph, elapsed_secs: f64) -> u32 {
        if !self.started {
            return 0;
        }
        self.clock.tick(SimTime::from_secs(elapsed_secs));
        let dt = self.clock.timestep();
        let mut steps = 0;
        while self.clock.should_step() {
            self.substep(dt);
            self.clock.advance();
            steps += 1;
        }
        self.write_back(scene);
        steps
    }

    fn substep(&mut self, dt: f32) {
        let backend: &mut dyn SimulationBackend = &mut self.backend;
        for handle in self.registry.iter_live_mut() {
            if let Some(hook) = self.force_hook.as_mut() {
                hook(&mut BodyMut::new(handle, backend), dt);
            }
            handle.apply_accumulators(backend);
        }
        backend.step(dt);
        for handle in self.registry.iter_live_mut() {
            handle.capture_pose(backend);
        }
    }

    /// Write body poses into their nodes' local transforms.
    ///
    /// Interpolated between the last two sub-steps in async mode, exact
    /// otherwise. Static bodies are left alone.
    fn write_back(&self, scene: &mut dyn SceneGraph) {
        let alpha = self.clock.alpha();
        for handle in self.registry.iter_live() {
            if handle.is_static() {
                continue;
            }
            let pose = if self.config.async_update {
                handle.interpolated_pose(alpha)
            } else {
                handle.pose()
            };
            let node = handle.node();
            let Some(local) = scene.local_transform(node) else {
                continue;
            };
            let (parent_affine, parent_rotation) = match scene.parent(node) {
                Some(p) => (scene.world_transform(p), scene.world_rotation(p)),
                None => (Affine3A::IDENTITY, Quat::IDENTITY),
            };
            let translation = parent_affine.inverse().transform_point3(pose.translation);
            let rotation = (parent_rotation.inverse() * pose.rotation).normalize();
            scene.set_local_transform(
                node,
                LocalTransform {
                    translation,
                    rotation,
                    scale: local.scale,
                },
            );
        }
    }

    /// Install the per-step force hook, replacing any previous one.
    pub fn set_force_hook(
        &mut self,
        hook: impl FnMut(&mut BodyMut<'_>, f32) + Send + Sync + 'static,
    ) {
        self.force_hook = Some(Box::new(hook));
    }

    pub fn clear_force_hook(&mut self) {
        self.force_hook = None;
    }

    // -- access -------------------------------------------------------------

    pub fn body(&self, id: BodyId) -> Option<Body<'_>> {
        self.registry
            .get(id)
            .map(|handle| Body::new(handle, &self.backend))
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<BodyMut<'_>> {
        let backend: &mut dyn SimulationBackend = &mut self.backend;
        self.registry
            .get_mut(id)
            .map(|handle| BodyMut::new(handle, backend))
    }

    pub fn body_id(&self, node: NodeId) -> Option<BodyId> {
        self.registry.id_of(node)
    }

    pub fn body_for_node(&self, node: NodeId) -> Option<Body<'_>> {
        self.body(self.registry.id_of(node)?)
    }

    pub fn body_for_node_mut(&mut self, node: NodeId) -> Option<BodyMut<'_>> {
        let id = self.registry.id_of(node)?;
        self.body_mut(id)
    }

    /// Registry index of the body behind a native handle, via its
    /// correlation token.
    pub fn body_for_native(&self, native: NativeBody) -> Option<BodyId> {
        let token = self.backend.user_data(native).ok()?;
        self.tokens.lookup(token)
    }

    pub fn bodies(&self) -> impl Iterator<Item = Body<'_>> {
        self.registry
            .iter_live()
            .map(|handle| Body::new(handle, &self.backend))
    }

    pub const fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub const fn tokens(&self) -> &CorrelationTable {
        &self.tokens
    }

    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect at the next `initialize`.
    pub fn set_config(&mut self, config: WorldConfig) {
        self.config = config;
    }

    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // -- debug --------------------------------------------------------------

    /// Emit every shape's outline in world space as convex faces.
    pub fn debug_draw(&self, draw: &mut dyn FnMut(&[f32], usize)) {
        let mut buffer = Vec::new();
        for handle in self.registry.iter_live() {
            let pose = Pose::new(
                handle.position(&self.backend),
                handle.rotation(&self.backend),
            );
            let shapes = handle
                .shape()
                .into_iter()
                .chain(self.shapes.owned_by(handle.id()));
            for shape in shapes {
                let outlined = self.backend.shape_debug_faces(shape, &mut |face, count| {
                    transform_face(&pose, face, count, &mut buffer);
                    draw(&buffer, count);
                });
                if let Err(e) = outlined {
                    debug!("Skipping outline of shape {:?}: {}", shape, e);
                }
            }
        }
    }
}

impl<B: SimulationBackend> Drop for PhysicsWorld<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Native joint description for `desc`, owned by a body at `owner_pose`.
fn joint_spec(
    desc: &JointDesc,
    owner: NativeBody,
    owner_pose: Pose,
    connected: Option<(NativeBody, Pose)>,
) -> NativeJointSpec {
    let frame_rotation = desc.frame_rotation();
    let frame0 = JointFrame {
        anchor: desc.pivot.to_array(),
        rotation: quat_to_native(frame_rotation),
    };
    let world_anchor = owner_pose.transform_point(desc.pivot);
    let world_rotation = owner_pose.rotation * frame_rotation;
    let frame1 = match connected {
        Some((_, pose)) => {
            let inv = pose.rotation.inverse();
            JointFrame {
                anchor: (inv * (world_anchor - pose.translation)).to_array(),
                rotation: quat_to_native((inv * world_rotation).normalize()),
            }
        }
        None => JointFrame {
            anchor: world_anchor.to_array(),
            rotation: quat_to_native(world_rotation.normalize()),
        },
    };
    NativeJointSpec {
        kind: desc.kind.clone(),
        body0: owner,
        body1: connected.map(|c| c.0),
        frame0,
        frame1,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bevy::math::Vec3;

    fn frame_anchor(frame: &JointFrame) -> Vec3 {
        Vec3::from_array(frame.anchor)
    }

    #[test]
    fn world_anchored_joint_frame_is_in_world_space() {
        let desc = JointDesc::hinge().with_pivot(Vec3::Y).with_pin(Vec3::Z);
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
        let spec = joint_spec(&desc, NativeBody(7), pose, None);
        assert_eq!(spec.body0, NativeBody(7));
        assert!(spec.body1.is_none());
        assert_eq!(frame_anchor(&spec.frame0), Vec3::Y);
        let anchor = frame_anchor(&spec.frame1);
        assert_relative_eq!(anchor.y, 3.0);
    }

    #[test]
    fn connected_joint_frames_coincide_in_world_space() {
        let desc = JointDesc::ball().with_pivot(Vec3::X);
        let owner = Pose::new(Vec3::ZERO, Quat::from_rotation_y(0.7));
        let other = Pose::new(Vec3::new(0.0, 0.0, 2.0), Quat::from_rotation_x(-0.4));
        let spec = joint_spec(&desc, NativeBody(1), owner, Some((NativeBody(2), other)));

        let world0 = owner.transform_point(frame_anchor(&spec.frame0));
        let world1 = other.transform_point(frame_anchor(&spec.frame1));
        assert_relative_eq!(world0.x, world1.x, epsilon = 1e-5);
        assert_relative_eq!(world0.y, world1.y, epsilon = 1e-5);
        assert_relative_eq!(world0.z, world1.z, epsilon = 1e-5);

        let r0 = owner.rotation * crate::body::quat_from_native(spec.frame0.rotation);
        let r1 = other.rotation * crate::body::quat_from_native(spec.frame1.rotation);
        assert!(r0.angle_between(r1) < 1e-4);
    }

    #[test]
    fn joint_record_involvement() {
        let record = JointRecord {
            node: NodeId(0),
            index: 0,
            native: NativeJoint(0),
            owner: BodyId(1),
            connected: Some(BodyId(2)),
        };
        assert!(record.involves(BodyId(1)));
        assert!(record.involves(BodyId(2)));
        assert!(!record.involves(BodyId(3)));
    }
}
