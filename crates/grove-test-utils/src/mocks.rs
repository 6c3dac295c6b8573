//! In-memory simulation backend for tests.
//!
//! [`RecordingBackend`] keeps every native resource in plain maps, logs each
//! lifecycle call in order and integrates bodies with semi-implicit Euler so
//! that world-level behavior can be checked without a real engine.

use std::collections::BTreeMap;

use bevy::math::{Affine3A, Mat4, Quat, Vec3, Vec4};

use grove_core::{AllocationError, GroveError, ResourceError, WorldConfig};
use grove_physics::backend::{
    LiveCounts, NativeBody, NativeJoint, NativeJointSpec, NativeShape, SimulationBackend,
};
use grove_physics::body::{quat_from_native, quat_to_native};
use grove_physics::geometry::ShapeGeometry;

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

/// One recorded backend call that changes resource lifetimes or consumes
/// forces.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateContext,
    DestroyContext,
    CreateShape(NativeShape),
    DestroyShape(NativeShape),
    AttachShape(NativeShape, NativeBody),
    CreateBody(NativeBody),
    DestroyBody(NativeBody),
    CreateJoint(NativeJoint),
    DestroyJoint(NativeJoint),
    Step,
}

/// Forces and torques consumed by one body during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedLoad {
    pub body: NativeBody,
    pub force: Vec3,
    pub torque: Vec3,
}

/// Everything consumed by one call to `step`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRecord {
    pub dt: f32,
    pub loads: Vec<AppliedLoad>,
}

impl StepRecord {
    pub fn load_on(&self, body: NativeBody) -> Option<&AppliedLoad> {
        self.loads.iter().find(|l| l.body == body)
    }
}

// ---------------------------------------------------------------------------
// Mock resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockShape {
    pub geometry: ShapeGeometry,
    pub matrix: Mat4,
    pub scale: Vec3,
    pub body: Option<NativeBody>,
}

#[derive(Debug, Clone)]
pub struct MockBody {
    pub shape: NativeShape,
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub omega: Vec3,
    pub center_of_mass: Vec3,
    pub inertia: Option<Vec3>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub sleeping: bool,
    pub user_data: u64,
    pub force: Vec3,
    pub torque: Vec3,
}

impl MockBody {
    fn is_dynamic(&self) -> bool {
        self.mass > 0.0
    }
}

// ---------------------------------------------------------------------------
// RecordingBackend
// ---------------------------------------------------------------------------

/// Deterministic in-memory [`SimulationBackend`].
///
/// Damping is stored but not integrated so that free-fall results stay
/// analytic.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    live: bool,
    gravity: Vec3,
    solver_iterations: i32,
    next_id: u64,
    bodies: BTreeMap<NativeBody, MockBody>,
    shapes: BTreeMap<NativeShape, MockShape>,
    joints: BTreeMap<NativeJoint, NativeJointSpec>,
    calls: Vec<BackendCall>,
    steps: Vec<StepRecord>,
    /// Fail the next `create_body` with an allocation error.
    pub fail_next_body: bool,
    /// Fail the next `create_context` with an allocation error.
    pub fail_next_context: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn body(&self, body: NativeBody) -> Option<&MockBody> {
        self.bodies.get(&body)
    }

    pub fn shape(&self, shape: NativeShape) -> Option<&MockShape> {
        self.shapes.get(&shape)
    }

    pub fn joint(&self, joint: NativeJoint) -> Option<&NativeJointSpec> {
        self.joints.get(&joint)
    }

    pub fn joints(&self) -> impl Iterator<Item = &NativeJointSpec> {
        self.joints.values()
    }

    /// Shapes attached to `body`, its own shape included.
    pub fn shapes_of(&self, body: NativeBody) -> Vec<NativeShape> {
        self.shapes
            .iter()
            .filter(|(_, s)| s.body == Some(body))
            .map(|(id, _)| *id)
            .collect()
    }

    pub const fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub const fn solver_iterations(&self) -> i32 {
        self.solver_iterations
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn get(&self, body: NativeBody) -> Result<&MockBody, ResourceError> {
        self.bodies.get(&body).ok_or(ResourceError::BodyNotLive(body.0))
    }

    fn get_mut(&mut self, body: NativeBody) -> Result<&mut MockBody, ResourceError> {
        self.bodies
            .get_mut(&body)
            .ok_or(ResourceError::BodyNotLive(body.0))
    }

    fn shape_mut(&mut self, shape: NativeShape) -> Result<&mut MockShape, ResourceError> {
        self.shapes
            .get_mut(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))
    }
}

impl SimulationBackend for RecordingBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "recording"
    }

    fn create_context(&mut self, config: &WorldConfig) -> Result<(), GroveError> {
        if std::mem::take(&mut self.fail_next_context) {
            return Err(AllocationError::Context.into());
        }
        self.live = true;
        self.gravity = Vec3::from_array(config.gravity);
        self.solver_iterations = config.solver_iterations;
        self.calls.push(BackendCall::CreateContext);
        Ok(())
    }

    fn destroy_context(&mut self) {
        if self.live {
            self.live = false;
            self.calls.push(BackendCall::DestroyContext);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn step(&mut self, dt: f32) {
        if !self.live {
            return;
        }
        let gravity = self.gravity;
        let mut record = StepRecord {
            dt,
            loads: Vec::new(),
        };
        for (id, body) in &mut self.bodies {
            let force = std::mem::take(&mut body.force);
            let torque = std::mem::take(&mut body.torque);
            if force != Vec3::ZERO || torque != Vec3::ZERO {
                record.loads.push(AppliedLoad {
                    body: *id,
                    force,
                    torque,
                });
            }
            if !body.is_dynamic() || body.sleeping {
                continue;
            }
            body.velocity += (gravity + force / body.mass) * dt;
            let inertia = body.inertia.unwrap_or(Vec3::splat(body.mass));
            body.omega += torque / inertia.max(Vec3::splat(f32::EPSILON)) * dt;
            body.position += body.velocity * dt;
            body.rotation = (Quat::from_scaled_axis(body.omega * dt) * body.rotation).normalize();
        }
        self.steps.push(record);
        self.calls.push(BackendCall::Step);
    }

    fn create_shape(&mut self, geometry: &ShapeGeometry) -> Result<NativeShape, GroveError> {
        if !self.live {
            return Err(ResourceError::ContextNotLive.into());
        }
        let id = NativeShape(self.next());
        self.shapes.insert(
            id,
            MockShape {
                geometry: geometry.clone(),
                matrix: Mat4::IDENTITY,
                scale: Vec3::ONE,
                body: None,
            },
        );
        self.calls.push(BackendCall::CreateShape(id));
        Ok(id)
    }

    fn destroy_shape(&mut self, shape: NativeShape) {
        if self.shapes.remove(&shape).is_some() {
            self.calls.push(BackendCall::DestroyShape(shape));
        }
    }

    fn set_shape_matrix(
        &mut self,
        shape: NativeShape,
        matrix: &[f32; 16],
    ) -> Result<(), ResourceError> {
        self.shape_mut(shape)?.matrix = Mat4::from_cols_array(matrix);
        Ok(())
    }

    fn set_shape_scale(
        &mut self,
        shape: NativeShape,
        scale: [f32; 3],
    ) -> Result<(), ResourceError> {
        self.shape_mut(shape)?.scale = Vec3::from_array(scale);
        Ok(())
    }

    fn attach_shape(&mut self, shape: NativeShape, body: NativeBody) -> Result<(), ResourceError> {
        self.get(body)?;
        self.shape_mut(shape)?.body = Some(body);
        self.calls.push(BackendCall::AttachShape(shape, body));
        Ok(())
    }

    fn shape_debug_faces(
        &self,
        shape: NativeShape,
        face: &mut dyn FnMut(&[f32], usize),
    ) -> Result<(), ResourceError> {
        let s = self
            .shapes
            .get(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))?;
        s.geometry
            .placed_faces(&Affine3A::from_mat4(s.matrix), s.scale, face);
        Ok(())
    }

    fn create_body(
        &mut self,
        shape: NativeShape,
        position: [f32; 3],
        rotation: [f32; 4],
        mass: f32,
    ) -> Result<NativeBody, GroveError> {
        if !self.live {
            return Err(ResourceError::ContextNotLive.into());
        }
        if !self.shapes.contains_key(&shape) {
            return Err(ResourceError::ShapeNotLive(shape.0).into());
        }
        if std::mem::take(&mut self.fail_next_body) {
            return Err(AllocationError::Body.into());
        }
        let id = NativeBody(self.next());
        self.shape_mut(shape)?.body = Some(id);
        self.bodies.insert(
            id,
            MockBody {
                shape,
                mass,
                position: Vec3::from_array(position),
                rotation: quat_from_native(rotation),
                velocity: Vec3::ZERO,
                omega: Vec3::ZERO,
                center_of_mass: Vec3::ZERO,
                inertia: None,
                linear_damping: 0.0,
                angular_damping: 0.0,
                sleeping: false,
                user_data: 0,
                force: Vec3::ZERO,
                torque: Vec3::ZERO,
            },
        );
        self.calls.push(BackendCall::CreateBody(id));
        Ok(id)
    }

    fn destroy_body(&mut self, body: NativeBody) {
        if self.bodies.remove(&body).is_some() {
            self.calls.push(BackendCall::DestroyBody(body));
        }
    }

    fn set_body_shape(
        &mut self,
        body: NativeBody,
        shape: NativeShape,
    ) -> Result<(), ResourceError> {
        self.get(body)?;
        self.shape_mut(shape)?.body = Some(body);
        let previous = std::mem::replace(&mut self.get_mut(body)?.shape, shape);
        if previous != shape {
            if let Some(old) = self.shapes.get_mut(&previous) {
                old.body = None;
            }
        }
        self.calls.push(BackendCall::AttachShape(shape, body));
        Ok(())
    }

    fn body_position(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        Ok(self.get(body)?.position.to_array())
    }

    fn set_body_position(
        &mut self,
        body: NativeBody,
        position: [f32; 3],
    ) -> Result<(), ResourceError> {
        self.get_mut(body)?.position = Vec3::from_array(position);
        Ok(())
    }

    fn body_rotation(&self, body: NativeBody) -> Result<[f32; 4], ResourceError> {
        Ok(quat_to_native(self.get(body)?.rotation))
    }

    fn set_body_rotation(
        &mut self,
        body: NativeBody,
        rotation: [f32; 4],
    ) -> Result<(), ResourceError> {
        self.get_mut(body)?.rotation = quat_from_native(rotation);
        Ok(())
    }

    fn body_velocity(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        Ok(self.get(body)?.velocity.to_array())
    }

    fn set_body_velocity(
        &mut self,
        body: NativeBody,
        velocity: [f32; 3],
    ) -> Result<(), ResourceError> {
        self.get_mut(body)?.velocity = Vec3::from_array(velocity);
        Ok(())
    }

    fn body_omega(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        Ok(self.get(body)?.omega.to_array())
    }

    fn set_body_omega(&mut self, body: NativeBody, omega: [f32; 3]) -> Result<(), ResourceError> {
        self.get_mut(body)?.omega = Vec3::from_array(omega);
        Ok(())
    }

    fn center_of_mass(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        Ok(self.get(body)?.center_of_mass.to_array())
    }

    fn set_center_of_mass(
        &mut self,
        body: NativeBody,
        center: [f32; 3],
        inertia: Option<[f32; 3]>,
    ) -> Result<(), ResourceError> {
        let b = self.get_mut(body)?;
        b.center_of_mass = Vec3::from_array(center);
        b.inertia = inertia.map(Vec3::from_array);
        Ok(())
    }

    fn linear_damping(&self, body: NativeBody) -> Result<f32, ResourceError> {
        Ok(self.get(body)?.linear_damping)
    }

    fn set_linear_damping(&mut self, body: NativeBody, damping: f32) -> Result<(), ResourceError> {
        self.get_mut(body)?.linear_damping = damping;
        Ok(())
    }

    fn angular_damping(&self, body: NativeBody) -> Result<f32, ResourceError> {
        Ok(self.get(body)?.angular_damping)
    }

    fn set_angular_damping(
        &mut self,
        body: NativeBody,
        damping: f32,
    ) -> Result<(), ResourceError> {
        self.get_mut(body)?.angular_damping = damping;
        Ok(())
    }

    fn is_sleeping(&self, body: NativeBody) -> Result<bool, ResourceError> {
        Ok(self.get(body)?.sleeping)
    }

    fn set_sleeping(&mut self, body: NativeBody, sleeping: bool) -> Result<(), ResourceError> {
        self.get_mut(body)?.sleeping = sleeping;
        Ok(())
    }

    fn add_force(&mut self, body: NativeBody, force: [f32; 3]) -> Result<(), ResourceError> {
        self.get_mut(body)?.force += Vec3::from_array(force);
        Ok(())
    }

    fn add_torque(&mut self, body: NativeBody, torque: [f32; 3]) -> Result<(), ResourceError> {
        self.get_mut(body)?.torque += Vec3::from_array(torque);
        Ok(())
    }

    fn user_data(&self, body: NativeBody) -> Result<u64, ResourceError> {
        Ok(self.get(body)?.user_data)
    }

    fn set_user_data(&mut self, body: NativeBody, data: u64) -> Result<(), ResourceError> {
        self.get_mut(body)?.user_data = data;
        Ok(())
    }

    fn buoyancy(
        &self,
        body: NativeBody,
        plane: [f32; 4],
        density: f32,
    ) -> Result<([f32; 3], [f32; 3]), ResourceError> {
        let b = self.get(body)?;
        let shape = self
            .shapes
            .get(&b.shape)
            .ok_or(ResourceError::ShapeNotLive(b.shape.0))?;
        let body_to_world = Affine3A::from_rotation_translation(b.rotation, b.position);
        let to_world = body_to_world * Affine3A::from_mat4(shape.matrix);
        let (force, torque) = shape.geometry.scaled(shape.scale).buoyancy(
            &to_world,
            Vec4::from_array(plane),
            density,
            self.gravity,
            body_to_world.transform_point3(b.center_of_mass),
        );
        Ok((force.to_array(), torque.to_array()))
    }

    fn create_joint(&mut self, spec: &NativeJointSpec) -> Result<NativeJoint, GroveError> {
        self.get(spec.body0)?;
        if let Some(other) = spec.body1 {
            self.get(other)?;
        }
        let id = NativeJoint(self.next());
        self.joints.insert(id, spec.clone());
        self.calls.push(BackendCall::CreateJoint(id));
        Ok(id)
    }

    fn destroy_joint(&mut self, joint: NativeJoint) {
        if self.joints.remove(&joint).is_some() {
            self.calls.push(BackendCall::DestroyJoint(joint));
        }
    }

    fn live_counts(&self) -> LiveCounts {
        LiveCounts {
            contexts: usize::from(self.live),
            bodies: self.bodies.len(),
            shapes: self.shapes.len(),
            joints: self.joints.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn live_backend() -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        backend.create_context(&WorldConfig::default()).unwrap();
        backend
    }

    #[test]
    fn rejects_resources_without_context() {
        let mut backend = RecordingBackend::new();
        assert!(backend.create_shape(&ShapeGeometry::Null).is_err());
        assert!(backend.live_counts().is_empty());
    }

    #[test]
    fn counts_live_resources() {
        let mut backend = live_backend();
        let shape = backend.create_shape(&ShapeGeometry::sphere(1.0)).unwrap();
        let body = backend
            .create_body(shape, [0.0; 3], [1.0, 0.0, 0.0, 0.0], 1.0)
            .unwrap();
        let counts = backend.live_counts();
        assert_eq!((counts.contexts, counts.bodies, counts.shapes), (1, 1, 1));

        backend.destroy_shape(shape);
        backend.destroy_body(body);
        backend.destroy_body(body);
        backend.destroy_context();
        assert!(backend.live_counts().is_empty());
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::DestroyContext)
        );
    }

    #[test]
    fn step_consumes_forces_once() {
        let mut backend = live_backend();
        let shape = backend.create_shape(&ShapeGeometry::Null).unwrap();
        let body = backend
            .create_body(shape, [0.0; 3], [1.0, 0.0, 0.0, 0.0], 2.0)
            .unwrap();
        backend.add_force(body, [4.0, 0.0, 0.0]).unwrap();
        backend.step(0.5);
        backend.step(0.5);
        assert_eq!(backend.steps()[0].load_on(body).map(|l| l.force), Some(Vec3::X * 4.0));
        assert!(backend.steps()[1].load_on(body).is_none());
        let v = backend.body_velocity(body).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn static_bodies_do_not_move() {
        let mut backend = live_backend();
        let shape = backend.create_shape(&ShapeGeometry::Null).unwrap();
        let body = backend
            .create_body(shape, [0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0], 0.0)
            .unwrap();
        backend.step(1.0);
        assert_eq!(backend.body_position(body).unwrap(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn body_shape_swap_detaches_the_old_shape() {
        let mut backend = live_backend();
        let old = backend.create_shape(&ShapeGeometry::sphere(1.0)).unwrap();
        let body = backend
            .create_body(old, [0.0; 3], [1.0, 0.0, 0.0, 0.0], 1.0)
            .unwrap();
        let new = backend.create_shape(&ShapeGeometry::cuboid(Vec3::ONE)).unwrap();
        backend.set_body_shape(body, new).unwrap();
        assert_eq!(backend.body(body).unwrap().shape, new);
        assert_eq!(backend.shapes_of(body), vec![new]);
        assert!(backend.shape(old).unwrap().body.is_none());
        assert!(backend.set_body_shape(NativeBody(99), new).is_err());
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut backend = live_backend();
        backend.fail_next_body = true;
        let shape = backend.create_shape(&ShapeGeometry::Null).unwrap();
        let err = backend
            .create_body(shape, [0.0; 3], [1.0, 0.0, 0.0, 0.0], 1.0)
            .unwrap_err();
        assert!(matches!(err, GroveError::Allocation(AllocationError::Body)));
        assert!(!backend.fail_next_body);
    }
}
