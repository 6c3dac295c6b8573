//! Body handles: one native rigid body tied to one scene node.
//!
//! A [`BodyHandle`] owns the native body, its own shape and its correlation
//! token, and carries the force and torque accumulators the world drains
//! every sub-step. Property accessors degrade gracefully when the native body
//! is gone: getters return neutral values and setters do nothing.

use std::collections::HashMap;

use bevy::log::debug;
use bevy::math::{Quat, Vec3, Vec4};

use grove_core::{GroveError, ResourceError};

use crate::backend::{NativeBody, NativeShape, SimulationBackend};
use crate::components::RigidBodyDesc;
use crate::geometry::ShapeGeometry;
use crate::scene::NodeId;

// ---------------------------------------------------------------------------
// Ids and correlation tokens
// ---------------------------------------------------------------------------

/// Registry index of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

/// Maps the tokens stored as native user data back to registry indices.
///
/// Token 0 is never issued, so a zeroed user-data slot never resolves.
#[derive(Debug, Clone)]
pub struct CorrelationTable {
    next: u64,
    entries: HashMap<u64, BodyId>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, id: BodyId) -> u64 {
        let token = self.next;
        self.next += 1;
        self.entries.insert(token, id);
        token
    }

    pub fn free(&mut self, token: u64) -> Option<BodyId> {
        self.entries.remove(&token)
    }

    pub fn lookup(&self, token: u64) -> Option<BodyId> {
        self.entries.get(&token).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Orientation permutation
// ---------------------------------------------------------------------------

/// Scalar-first `[w, x, y, z]` to a scene quaternion.
pub fn quat_from_native(q: [f32; 4]) -> Quat {
    let [w, x, y, z] = q;
    Quat::from_xyzw(x, y, z, w)
}

/// Scene quaternion to scalar-first `[w, x, y, z]`.
pub fn quat_to_native(q: Quat) -> [f32; 4] {
    [q.w, q.x, q.y, q.z]
}

/// World-space position and orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub const fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.translation + self.rotation * p
    }
}

// ---------------------------------------------------------------------------
// BodyHandle
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BodyHandle {
    node: NodeId,
    id: BodyId,
    native: Option<NativeBody>,
    shape: Option<NativeShape>,
    token: Option<u64>,
    is_static: bool,
    force: Vec3,
    torque: Vec3,
    linear_damping: f32,
    angular_damping: f32,
    show_gizmo: bool,
    gizmo_scale: f32,
    /// Pose after the second most recent sub-step.
    pose0: Pose,
    /// Pose after the most recent sub-step.
    pose1: Pose,
}

impl BodyHandle {
    /// A handle with no native resources behind it.
    pub fn offline(node: NodeId, id: BodyId, desc: &RigidBodyDesc) -> Self {
        Self {
            node,
            id,
            native: None,
            shape: None,
            token: None,
            is_static: desc.is_static(),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            linear_damping: desc.linear_damping,
            angular_damping: desc.angular_damping,
            show_gizmo: desc.show_gizmo,
            gizmo_scale: desc.gizmo_scale,
            pose0: Pose::IDENTITY,
            pose1: Pose::IDENTITY,
        }
    }

    /// Allocate the body's own shape, the native body and its correlation
    /// token, then apply the descriptor's damping and mass distribution.
    pub fn create(
        backend: &mut dyn SimulationBackend,
        tokens: &mut CorrelationTable,
        node: NodeId,
        id: BodyId,
        desc: &RigidBodyDesc,
        geometry: &ShapeGeometry,
        pose: Pose,
    ) -> Result<Self, GroveError> {
        if !backend.is_live() {
            return Err(ResourceError::ContextNotLive.into());
        }
        let shape = backend.create_shape(geometry)?;
        let native = match backend.create_body(
            shape,
            pose.translation.to_array(),
            quat_to_native(pose.rotation),
            desc.mass,
        ) {
            Ok(native) => native,
            Err(e) => {
                backend.destroy_shape(shape);
                return Err(e);
            }
        };
        let token = tokens.alloc(id);

        let mut handle = Self::offline(node, id, desc);
        handle.native = Some(native);
        handle.shape = Some(shape);
        handle.token = Some(token);
        handle.pose0 = pose;
        handle.pose1 = pose;

        if let Err(e) = Self::configure(backend, native, token, desc) {
            handle.destroy(backend, tokens);
            return Err(e.into());
        }
        debug!(
            "Created body {:?} for node {:?} ({}, mass {})",
            id,
            node,
            geometry.kind_name(),
            desc.mass
        );
        Ok(handle)
    }

    fn configure(
        backend: &mut dyn SimulationBackend,
        native: NativeBody,
        token: u64,
        desc: &RigidBodyDesc,
    ) -> Result<(), ResourceError> {
        backend.set_user_data(native, token)?;
        backend.set_linear_damping(native, desc.linear_damping)?;
        backend.set_angular_damping(native, desc.angular_damping)?;
        if !desc.is_static() && (!desc.auto_inertia || desc.center_of_mass != Vec3::ZERO) {
            let inertia = (!desc.auto_inertia).then(|| desc.inertia.to_array());
            backend.set_center_of_mass(native, desc.center_of_mass.to_array(), inertia)?;
        }
        Ok(())
    }

    /// Release the own shape, then the native body, then the token.
    /// Idempotent.
    pub fn destroy(&mut self, backend: &mut dyn SimulationBackend, tokens: &mut CorrelationTable) {
        if let Some(shape) = self.shape.take() {
            backend.destroy_shape(shape);
        }
        if let Some(native) = self.native.take() {
            backend.destroy_body(native);
        }
        if let Some(token) = self.token.take() {
            tokens.free(token);
        }
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Build a new own shape from `geometry`, hand it to the native body and
    /// destroy the previous one. `Ok(None)` while the body is not live.
    pub fn replace_shape(
        &mut self,
        backend: &mut dyn SimulationBackend,
        geometry: &ShapeGeometry,
    ) -> Result<Option<NativeShape>, GroveError> {
        let Some(native) = self.native else {
            return Ok(None);
        };
        let shape = backend.create_shape(geometry)?;
        if let Err(e) = backend.set_body_shape(native, shape) {
            backend.destroy_shape(shape);
            return Err(e.into());
        }
        if let Some(old) = self.shape.replace(shape) {
            backend.destroy_shape(old);
        }
        debug!(
            "Replaced own shape of body {:?} with {}",
            self.id,
            geometry.kind_name()
        );
        Ok(Some(shape))
    }

    pub const fn node(&self) -> NodeId {
        self.node
    }

    pub const fn id(&self) -> BodyId {
        self.id
    }

    pub const fn native(&self) -> Option<NativeBody> {
        self.native
    }

    /// The body's own shape.
    pub const fn shape(&self) -> Option<NativeShape> {
        self.shape
    }

    pub const fn token(&self) -> Option<u64> {
        self.token
    }

    pub const fn is_live(&self) -> bool {
        self.native.is_some()
    }

    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    pub const fn show_gizmo(&self) -> bool {
        self.show_gizmo
    }

    pub const fn gizmo_scale(&self) -> f32 {
        self.gizmo_scale
    }

    // -- properties ---------------------------------------------------------

    pub fn position(&self, backend: &dyn SimulationBackend) -> Vec3 {
        self.native
            .and_then(|b| backend.body_position(b).ok())
            .map_or(Vec3::ZERO, Vec3::from_array)
    }

    /// Teleport the body. The pose history restarts at the new pose.
    pub fn set_position(&mut self, backend: &mut dyn SimulationBackend, position: Vec3) {
        if let Some(b) = self.native {
            let _ = backend.set_body_position(b, position.to_array());
            self.reset_pose(backend);
        }
    }

    pub fn rotation(&self, backend: &dyn SimulationBackend) -> Quat {
        self.native
            .and_then(|b| backend.body_rotation(b).ok())
            .map_or(Quat::IDENTITY, quat_from_native)
    }

    pub fn set_rotation(&mut self, backend: &mut dyn SimulationBackend, rotation: Quat) {
        if let Some(b) = self.native {
            let _ = backend.set_body_rotation(b, quat_to_native(rotation));
            self.reset_pose(backend);
        }
    }

    pub fn velocity(&self, backend: &dyn SimulationBackend) -> Vec3 {
        self.native
            .and_then(|b| backend.body_velocity(b).ok())
            .map_or(Vec3::ZERO, Vec3::from_array)
    }

    pub fn set_velocity(&self, backend: &mut dyn SimulationBackend, velocity: Vec3) {
        if let Some(b) = self.native {
            let _ = backend.set_body_velocity(b, velocity.to_array());
        }
    }

    pub fn omega(&self, backend: &dyn SimulationBackend) -> Vec3 {
        self.native
            .and_then(|b| backend.body_omega(b).ok())
            .map_or(Vec3::ZERO, Vec3::from_array)
    }

    pub fn set_omega(&self, backend: &mut dyn SimulationBackend, omega: Vec3) {
        if let Some(b) = self.native {
            let _ = backend.set_body_omega(b, omega.to_array());
        }
    }

    pub fn center_of_mass(&self, backend: &dyn SimulationBackend) -> Vec3 {
        self.native
            .and_then(|b| backend.center_of_mass(b).ok())
            .map_or(Vec3::ZERO, Vec3::from_array)
    }

    /// Move the center of mass. `None` derives inertia from the own shape.
    pub fn set_center_of_mass(
        &self,
        backend: &mut dyn SimulationBackend,
        center: Vec3,
        inertia: Option<Vec3>,
    ) {
        if let Some(b) = self.native {
            let _ = backend.set_center_of_mass(b, center.to_array(), inertia.map(|v| v.to_array()));
        }
    }

    pub fn linear_damping(&self, backend: &dyn SimulationBackend) -> f32 {
        self.native
            .and_then(|b| backend.linear_damping(b).ok())
            .unwrap_or(self.linear_damping)
    }

    pub fn set_linear_damping(&mut self, backend: &mut dyn SimulationBackend, damping: f32) {
        self.linear_damping = damping;
        if let Some(b) = self.native {
            let _ = backend.set_linear_damping(b, damping);
        }
    }

    pub fn angular_damping(&self, backend: &dyn SimulationBackend) -> f32 {
        self.native
            .and_then(|b| backend.angular_damping(b).ok())
            .unwrap_or(self.angular_damping)
    }

    pub fn set_angular_damping(&mut self, backend: &mut dyn SimulationBackend, damping: f32) {
        self.angular_damping = damping;
        if let Some(b) = self.native {
            let _ = backend.set_angular_damping(b, damping);
        }
    }

    pub fn is_sleeping(&self, backend: &dyn SimulationBackend) -> bool {
        self.native
            .and_then(|b| backend.is_sleeping(b).ok())
            .unwrap_or(false)
    }

    pub fn set_sleeping(&self, backend: &mut dyn SimulationBackend, sleeping: bool) {
        if let Some(b) = self.native {
            let _ = backend.set_sleeping(b, sleeping);
        }
    }

    /// Buoyant force and torque from a fluid below `plane`. Zero when the
    /// body is not live.
    pub fn buoyancy(&self, backend: &dyn SimulationBackend, plane: Vec4, density: f32) -> (Vec3, Vec3) {
        self.native
            .and_then(|b| backend.buoyancy(b, plane.to_array(), density).ok())
            .map_or((Vec3::ZERO, Vec3::ZERO), |(f, t)| {
                (Vec3::from_array(f), Vec3::from_array(t))
            })
    }

    // -- accumulators -------------------------------------------------------

    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub const fn force(&self) -> Vec3 {
        self.force
    }

    pub const fn torque(&self) -> Vec3 {
        self.torque
    }

    /// Push the accumulated force and torque to the native body and zero
    /// both accumulators.
    pub fn apply_accumulators(&mut self, backend: &mut dyn SimulationBackend) {
        if let Some(b) = self.native {
            if self.force != Vec3::ZERO {
                let _ = backend.add_force(b, self.force.to_array());
            }
            if self.torque != Vec3::ZERO {
                let _ = backend.add_torque(b, self.torque.to_array());
            }
        }
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    // -- poses --------------------------------------------------------------

    /// Shift the pose history after a sub-step.
    pub fn capture_pose(&mut self, backend: &dyn SimulationBackend) {
        if self.native.is_none() {
            return;
        }
        self.pose0 = self.pose1;
        self.pose1 = Pose::new(self.position(backend), self.rotation(backend));
    }

    /// Forget the pose history, e.g. after teleporting the body.
    pub fn reset_pose(&mut self, backend: &dyn SimulationBackend) {
        let pose = Pose::new(self.position(backend), self.rotation(backend));
        self.pose0 = pose;
        self.pose1 = pose;
    }

    /// Pose after the most recent sub-step.
    pub const fn pose(&self) -> Pose {
        self.pose1
    }

    /// Blend between the last two sub-step poses.
    pub fn interpolated_pose(&self, alpha: f32) -> Pose {
        self.pose0.lerp(&self.pose1, alpha.clamp(0.0, 1.0))
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only view pairing a handle with its backend.
#[derive(Clone, Copy)]
pub struct Body<'w> {
    handle: &'w BodyHandle,
    backend: &'w dyn SimulationBackend,
}

impl<'w> Body<'w> {
    pub fn new(handle: &'w BodyHandle, backend: &'w dyn SimulationBackend) -> Self {
        Self { handle, backend }
    }

    pub const fn handle(&self) -> &BodyHandle {
        self.handle
    }

    pub const fn id(&self) -> BodyId {
        self.handle.id
    }

    pub const fn node(&self) -> NodeId {
        self.handle.node
    }

    pub const fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    pub fn position(&self) -> Vec3 {
        self.handle.position(self.backend)
    }

    pub fn rotation(&self) -> Quat {
        self.handle.rotation(self.backend)
    }

    pub fn velocity(&self) -> Vec3 {
        self.handle.velocity(self.backend)
    }

    pub fn omega(&self) -> Vec3 {
        self.handle.omega(self.backend)
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.handle.center_of_mass(self.backend)
    }

    pub fn linear_damping(&self) -> f32 {
        self.handle.linear_damping(self.backend)
    }

    pub fn angular_damping(&self) -> f32 {
        self.handle.angular_damping(self.backend)
    }

    pub fn is_sleeping(&self) -> bool {
        self.handle.is_sleeping(self.backend)
    }

    pub fn buoyancy(&self, plane: Vec4, density: f32) -> (Vec3, Vec3) {
        self.handle.buoyancy(self.backend, plane, density)
    }
}

/// Mutable view pairing a handle with its backend.
///
/// Handed to the per-step force hook. It can change body state and queue
/// forces but cannot destroy the body.
pub struct BodyMut<'w> {
    handle: &'w mut BodyHandle,
    backend: &'w mut dyn SimulationBackend,
}

impl<'w> BodyMut<'w> {
    pub fn new(handle: &'w mut BodyHandle, backend: &'w mut dyn SimulationBackend) -> Self {
        Self { handle, backend }
    }

    pub fn as_body(&self) -> Body<'_> {
        Body::new(&*self.handle, &*self.backend)
    }

    pub const fn id(&self) -> BodyId {
        self.handle.id
    }

    pub const fn node(&self) -> NodeId {
        self.handle.node
    }

    pub fn position(&self) -> Vec3 {
        self.handle.position(self.backend)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.handle.set_position(self.backend, position);
    }

    pub fn rotation(&self) -> Quat {
        self.handle.rotation(self.backend)
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.handle.set_rotation(self.backend, rotation);
    }

    pub fn velocity(&self) -> Vec3 {
        self.handle.velocity(self.backend)
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.handle.set_velocity(self.backend, velocity);
    }

    pub fn omega(&self) -> Vec3 {
        self.handle.omega(self.backend)
    }

    pub fn set_omega(&mut self, omega: Vec3) {
        self.handle.set_omega(self.backend, omega);
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.handle.center_of_mass(self.backend)
    }

    pub fn set_center_of_mass(&mut self, center: Vec3, inertia: Option<Vec3>) {
        self.handle.set_center_of_mass(self.backend, center, inertia);
    }

    pub fn linear_damping(&self) -> f32 {
        self.handle.linear_damping(self.backend)
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.handle.set_linear_damping(self.backend, damping);
    }

    pub fn angular_damping(&self) -> f32 {
        self.handle.angular_damping(self.backend)
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.handle.set_angular_damping(self.backend, damping);
    }

    pub fn is_sleeping(&self) -> bool {
        self.handle.is_sleeping(self.backend)
    }

    pub fn set_sleeping(&mut self, sleeping: bool) {
        self.handle.set_sleeping(self.backend, sleeping);
    }

    pub fn add_force(&mut self, force: Vec3) {
        self.handle.add_force(force);
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.handle.add_torque(torque);
    }

    pub fn buoyancy(&self, plane: Vec4, density: f32) -> (Vec3, Vec3) {
        self.handle.buoyancy(self.backend, plane, density)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
