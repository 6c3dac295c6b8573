//! [`RapierBackend`]: [`SimulationBackend`] on raw `rapier3d`.

use std::collections::HashMap;

use bevy::log::{debug, warn};
use bevy::math::{Affine3A, Mat4, Quat, Vec3, Vec4};
use rapier3d::parry::query::PointQuery;
use rapier3d::prelude::{
    ColliderBuilder, ColliderHandle, ImpulseJointHandle, MassProperties, RigidBody,
    RigidBodyBuilder, RigidBodyHandle, SharedShape,
};

use grove_core::{BroadPhaseKind, GroveError, ResourceError, WorldConfig};

use crate::backend::{
    LiveCounts, NativeBody, NativeJoint, NativeJointSpec, NativeShape, SimulationBackend,
};
use crate::body::{quat_from_native, quat_to_native};
use crate::components::JointKind;
use crate::geometry::{BUOYANCY_RESOLUTION, ShapeGeometry, sample_submersion};

use super::bridge;
use super::context::RapierContext;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct ShapeRecord {
    geometry: ShapeGeometry,
    matrix: Mat4,
    scale: Vec3,
    body: Option<NativeBody>,
    /// Rapier collider while attached. Null geometry never has one.
    collider: Option<ColliderHandle>,
}

impl ShapeRecord {
    /// Parry shape with the record's scale baked in.
    fn shared(&self) -> Result<Option<SharedShape>, ResourceError> {
        bridge::shared_shape(&self.geometry.scaled(self.scale))
    }
}

struct BodyRecord {
    handle: RigidBodyHandle,
    shape: NativeShape,
    mass: f32,
    center_of_mass: Vec3,
    /// Explicit principal inertia. `None` derives it from the own shape.
    inertia: Option<Vec3>,
}

impl BodyRecord {
    fn is_dynamic(&self) -> bool {
        self.mass > 0.0
    }
}

// ---------------------------------------------------------------------------
// RapierBackend
// ---------------------------------------------------------------------------

/// Raw rapier3d simulation backend.
///
/// Grove shapes are kept as records and turned into rapier colliders when
/// attached to a body. Changing a shape's placement or scale rebuilds its
/// collider. Colliders carry no density; body mass comes from the body
/// descriptor alone and parry distributes it over the own shape.
#[derive(Default)]
pub struct RapierBackend {
    context: Option<RapierContext>,
    next_id: u64,
    shapes: HashMap<NativeShape, ShapeRecord>,
    bodies: HashMap<NativeBody, BodyRecord>,
    joints: HashMap<NativeJoint, ImpulseJointHandle>,
}

impl RapierBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying rapier state, while a context is live.
    pub fn context(&self) -> Option<&RapierContext> {
        self.context.as_ref()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_context(&mut self) -> Result<&mut RapierContext, ResourceError> {
        self.context.as_mut().ok_or(ResourceError::ContextNotLive)
    }

    fn record(&self, body: NativeBody) -> Result<&BodyRecord, ResourceError> {
        self.bodies
            .get(&body)
            .ok_or(ResourceError::BodyNotLive(body.0))
    }

    fn shape_record(&self, shape: NativeShape) -> Result<&ShapeRecord, ResourceError> {
        self.shapes
            .get(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))
    }

    fn rigid_body(&self, body: NativeBody) -> Result<&RigidBody, ResourceError> {
        let handle = self.record(body)?.handle;
        self.context
            .as_ref()
            .and_then(|c| c.rigid_body_set.get(handle))
            .ok_or(ResourceError::BodyNotLive(body.0))
    }

    fn rigid_body_mut(&mut self, body: NativeBody) -> Result<&mut RigidBody, ResourceError> {
        let handle = self.record(body)?.handle;
        self.context
            .as_mut()
            .and_then(|c| c.rigid_body_set.get_mut(handle))
            .ok_or(ResourceError::BodyNotLive(body.0))
    }

    /// Drop the shape's collider, if any, and insert a fresh one for its
    /// current geometry, placement and scale under its body.
    fn rebuild_collider(&mut self, shape: NativeShape) -> Result<(), ResourceError> {
        let record = self
            .shapes
            .get(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))?;
        let Some(body) = record.body else {
            return Ok(());
        };
        let parent = self.record(body)?.handle;
        let collider = record.shared()?.map(|shared| {
            let (translation, rotation) = bridge::collider_offset(&record.matrix);
            ColliderBuilder::new(shared)
                .translation(translation)
                .rotation(rotation.to_scaled_axis())
                .density(0.0)
                .build()
        });
        let stale = record.collider;

        let context = self.context.as_mut().ok_or(ResourceError::ContextNotLive)?;
        if let Some(handle) = stale {
            context.remove_collider(handle);
        }
        let handle = collider.map(|c| context.insert_collider(c, parent));
        if let Some(record) = self.shapes.get_mut(&shape) {
            record.collider = handle;
        }
        Ok(())
    }

    /// Explicit inertia verbatim, otherwise parry's unit-density inertia of
    /// the placed own shape rescaled to the body mass.
    fn mass_properties(&self, body: NativeBody) -> Result<MassProperties, ResourceError> {
        let record = self.record(body)?;
        if let Some(inertia) = record.inertia {
            return Ok(MassProperties::new(record.center_of_mass, record.mass, inertia));
        }
        let own = self.shape_record(record.shape)?;
        let unit = own.shared()?.map(|shape| shape.mass_properties(1.0));
        let props = match unit {
            Some(unit) if unit.mass() > f32::EPSILON => {
                let (_, offset) = bridge::collider_offset(&own.matrix);
                MassProperties::with_principal_inertia_frame(
                    record.center_of_mass,
                    record.mass,
                    unit.principal_inertia() * (record.mass / unit.mass()),
                    offset * unit.principal_inertia_local_frame,
                )
            }
            // Null geometry has no parry shape; spread the mass over a unit cube.
            _ => MassProperties::new(
                record.center_of_mass,
                record.mass,
                ShapeGeometry::Null.unit_inertia() * record.mass,
            ),
        };
        Ok(props)
    }

    /// Push recomputed mass properties to a dynamic body.
    fn refresh_mass(&mut self, body: NativeBody) -> Result<(), ResourceError> {
        if !self.record(body)?.is_dynamic() {
            return Ok(());
        }
        let props = self.mass_properties(body)?;
        self.rigid_body_mut(body)?
            .set_additional_mass_properties(props, true);
        Ok(())
    }

    fn body_to_world(&self, body: NativeBody) -> Result<Affine3A, ResourceError> {
        let rb = self.rigid_body(body)?;
        let (r, t) = (rb.rotation(), rb.translation());
        Ok(Affine3A::from_rotation_translation(
            Quat::from_xyzw(r.x, r.y, r.z, r.w),
            Vec3::new(t.x, t.y, t.z),
        ))
    }
}

impl SimulationBackend for RapierBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "rapier3d"
    }

    // -- context ------------------------------------------------------------

    fn create_context(&mut self, config: &WorldConfig) -> Result<(), GroveError> {
        if self.context.is_some() {
            warn!("rapier context already live, replacing it");
            self.destroy_context();
        }
        if config.thread_count > 0 {
            warn!(
                "rapier backend runs single-threaded, ignoring thread_count = {}",
                config.thread_count
            );
        }
        if config.broad_phase == BroadPhaseKind::Persistent {
            debug!("rapier has a single broad phase, using it for 'persistent'");
        }
        let iterations = usize::try_from(config.solver_iterations.max(1)).unwrap_or(1);
        self.context = Some(RapierContext::new(
            Vec3::from_array(config.gravity),
            iterations,
        ));
        Ok(())
    }

    fn destroy_context(&mut self) {
        if !(self.bodies.is_empty() && self.shapes.is_empty() && self.joints.is_empty()) {
            warn!(
                "destroying rapier context with live resources: {:?}",
                self.live_counts()
            );
        }
        self.joints.clear();
        self.bodies.clear();
        self.shapes.clear();
        self.context = None;
    }

    fn is_live(&self) -> bool {
        self.context.is_some()
    }

    fn step(&mut self, dt: f32) {
        if let Some(context) = self.context.as_mut() {
            context.step(dt);
        }
    }

    // -- shapes -------------------------------------------------------------

    fn create_shape(&mut self, geometry: &ShapeGeometry) -> Result<NativeShape, GroveError> {
        self.live_context()?;
        // Reject degenerate geometry now rather than on attach.
        bridge::shared_shape(geometry)?;
        let id = NativeShape(self.next());
        self.shapes.insert(
            id,
            ShapeRecord {
                geometry: geometry.clone(),
                matrix: Mat4::IDENTITY,
                scale: Vec3::ONE,
                body: None,
                collider: None,
            },
        );
        Ok(id)
    }

    fn destroy_shape(&mut self, shape: NativeShape) {
        let Some(record) = self.shapes.remove(&shape) else {
            return;
        };
        if let (Some(handle), Some(context)) = (record.collider, self.context.as_mut()) {
            context.remove_collider(handle);
        }
    }

    fn set_shape_matrix(
        &mut self,
        shape: NativeShape,
        matrix: &[f32; 16],
    ) -> Result<(), ResourceError> {
        self.shapes
            .get_mut(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))?
            .matrix = Mat4::from_cols_array(matrix);
        self.rebuild_collider(shape)
    }

    fn set_shape_scale(
        &mut self,
        shape: NativeShape,
        scale: [f32; 3],
    ) -> Result<(), ResourceError> {
        let record = self
            .shapes
            .get_mut(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))?;
        record.scale = Vec3::from_array(scale);
        let owner = record.body;
        self.rebuild_collider(shape)?;
        if let Some(body) = owner {
            if self.record(body)?.shape == shape {
                self.refresh_mass(body)?;
            }
        }
        Ok(())
    }

    fn attach_shape(&mut self, shape: NativeShape, body: NativeBody) -> Result<(), ResourceError> {
        self.record(body)?;
        let record = self
            .shapes
            .get_mut(&shape)
            .ok_or(ResourceError::ShapeNotLive(shape.0))?;
        record.body = Some(body);
        self.rebuild_collider(shape)
    }

    fn shape_debug_faces(
        &self,
        shape: NativeShape,
        face: &mut dyn FnMut(&[f32], usize),
    ) -> Result<(), ResourceError> {
        let record = self.shape_record(shape)?;
        let placement = Affine3A::from_mat4(record.matrix);
        // Hull outlines come from parry's own polyhedron topology.
        if let ShapeGeometry::ConvexHull { .. } = record.geometry {
            if let Some(shared) = record.shared()? {
                if let Some(poly) = shared.as_convex_polyhedron() {
                    let (points, adjacent) = (poly.points(), poly.vertices_adj_to_face());
                    let mut buffer = Vec::new();
                    for f in poly.faces() {
                        let start = f.first_vertex_or_edge as usize;
                        let count = f.num_vertices_or_edges as usize;
                        buffer.clear();
                        for &v in &adjacent[start..start + count] {
                            let p = placement.transform_point3(points[v as usize]);
                            buffer.extend_from_slice(&p.to_array());
                        }
                        face(&buffer, count);
                    }
                    return Ok(());
                }
            }
        }
        record.geometry.placed_faces(&placement, record.scale, face);
        Ok(())
    }

    // -- bodies -------------------------------------------------------------

    fn create_body(
        &mut self,
        shape: NativeShape,
        position: [f32; 3],
        rotation: [f32; 4],
        mass: f32,
    ) -> Result<NativeBody, GroveError> {
        self.live_context()?;
        self.shape_record(shape)?;
        let id = NativeBody(self.next());

        let builder = if mass > 0.0 {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let mut rb = builder
            .translation(Vec3::from_array(position))
            .can_sleep(true)
            .build();
        rb.set_rotation(quat_from_native(rotation), false);

        let context = self.live_context()?;
        let handle = context.insert_body(rb);
        self.bodies.insert(
            id,
            BodyRecord {
                handle,
                shape,
                mass,
                center_of_mass: Vec3::ZERO,
                inertia: None,
            },
        );
        if let Some(record) = self.shapes.get_mut(&shape) {
            record.body = Some(id);
        }
        self.rebuild_collider(shape)?;
        self.refresh_mass(id)?;
        Ok(id)
    }

    fn destroy_body(&mut self, body: NativeBody) {
        let Some(record) = self.bodies.remove(&body) else {
            return;
        };
        // Rapier drops attached colliders with the body.
        for shape in self.shapes.values_mut() {
            if shape.body == Some(body) {
                shape.body = None;
                shape.collider = None;
            }
        }
        if let Some(context) = self.context.as_mut() {
            context.remove_body(record.handle);
        }
    }

    fn set_body_shape(
        &mut self,
        body: NativeBody,
        shape: NativeShape,
    ) -> Result<(), ResourceError> {
        self.shape_record(shape)?;
        let record = self
            .bodies
            .get_mut(&body)
            .ok_or(ResourceError::BodyNotLive(body.0))?;
        let previous = std::mem::replace(&mut record.shape, shape);
        if previous != shape {
            if let Some(old) = self.shapes.get_mut(&previous) {
                if let (Some(handle), Some(context)) = (old.collider.take(), self.context.as_mut()) {
                    context.remove_collider(handle);
                }
                old.body = None;
            }
        }
        if let Some(record) = self.shapes.get_mut(&shape) {
            record.body = Some(body);
        }
        self.rebuild_collider(shape)?;
        self.refresh_mass(body)
    }

    fn body_position(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        let t = self.rigid_body(body)?.translation();
        Ok([t.x, t.y, t.z])
    }

    fn set_body_position(
        &mut self,
        body: NativeBody,
        position: [f32; 3],
    ) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .set_translation(Vec3::from_array(position), true);
        Ok(())
    }

    fn body_rotation(&self, body: NativeBody) -> Result<[f32; 4], ResourceError> {
        let r = self.rigid_body(body)?.rotation();
        Ok(quat_to_native(Quat::from_xyzw(r.x, r.y, r.z, r.w)))
    }

    fn set_body_rotation(
        &mut self,
        body: NativeBody,
        rotation: [f32; 4],
    ) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .set_rotation(quat_from_native(rotation), true);
        Ok(())
    }

    fn body_velocity(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        let v = self.rigid_body(body)?.linvel();
        Ok([v.x, v.y, v.z])
    }

    fn set_body_velocity(
        &mut self,
        body: NativeBody,
        velocity: [f32; 3],
    ) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .set_linvel(Vec3::from_array(velocity), true);
        Ok(())
    }

    fn body_omega(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        let w = self.rigid_body(body)?.angvel();
        Ok([w.x, w.y, w.z])
    }

    fn set_body_omega(&mut self, body: NativeBody, omega: [f32; 3]) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .set_angvel(Vec3::from_array(omega), true);
        Ok(())
    }

    fn center_of_mass(&self, body: NativeBody) -> Result<[f32; 3], ResourceError> {
        Ok(self.record(body)?.center_of_mass.to_array())
    }

    fn set_center_of_mass(
        &mut self,
        body: NativeBody,
        center: [f32; 3],
        inertia: Option<[f32; 3]>,
    ) -> Result<(), ResourceError> {
        let record = self
            .bodies
            .get_mut(&body)
            .ok_or(ResourceError::BodyNotLive(body.0))?;
        record.center_of_mass = Vec3::from_array(center);
        record.inertia = inertia.map(Vec3::from_array);
        self.refresh_mass(body)
    }

    fn linear_damping(&self, body: NativeBody) -> Result<f32, ResourceError> {
        Ok(self.rigid_body(body)?.linear_damping())
    }

    fn set_linear_damping(&mut self, body: NativeBody, damping: f32) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?.set_linear_damping(damping);
        Ok(())
    }

    fn angular_damping(&self, body: NativeBody) -> Result<f32, ResourceError> {
        Ok(self.rigid_body(body)?.angular_damping())
    }

    fn set_angular_damping(
        &mut self,
        body: NativeBody,
        damping: f32,
    ) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?.set_angular_damping(damping);
        Ok(())
    }

    fn is_sleeping(&self, body: NativeBody) -> Result<bool, ResourceError> {
        Ok(self.rigid_body(body)?.is_sleeping())
    }

    fn set_sleeping(&mut self, body: NativeBody, sleeping: bool) -> Result<(), ResourceError> {
        let rb = self.rigid_body_mut(body)?;
        if sleeping {
            rb.sleep();
        } else {
            rb.wake_up(true);
        }
        Ok(())
    }

    fn add_force(&mut self, body: NativeBody, force: [f32; 3]) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .add_force(Vec3::from_array(force), true);
        Ok(())
    }

    fn add_torque(&mut self, body: NativeBody, torque: [f32; 3]) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?
            .add_torque(Vec3::from_array(torque), true);
        Ok(())
    }

    fn user_data(&self, body: NativeBody) -> Result<u64, ResourceError> {
        Ok(u64::try_from(self.rigid_body(body)?.user_data).unwrap_or_default())
    }

    fn set_user_data(&mut self, body: NativeBody, data: u64) -> Result<(), ResourceError> {
        self.rigid_body_mut(body)?.user_data = u128::from(data);
        Ok(())
    }

    fn buoyancy(
        &self,
        body: NativeBody,
        plane: [f32; 4],
        density: f32,
    ) -> Result<([f32; 3], [f32; 3]), ResourceError> {
        let record = self.record(body)?;
        let shape = self.shape_record(record.shape)?;
        let gravity = self
            .context
            .as_ref()
            .map_or(Vec3::ZERO, |c| c.gravity);
        let Some(shared) = shape.shared()? else {
            return Ok(([0.0; 3], [0.0; 3]));
        };
        let body_to_world = self.body_to_world(body)?;
        let to_world = body_to_world * Affine3A::from_mat4(shape.matrix);
        let aabb = shared.compute_local_aabb();
        let submerged = sample_submersion(
            (aabb.mins, aabb.maxs),
            shared.mass_properties(1.0).mass(),
            &|p| shared.contains_local_point(p),
            &to_world,
            Vec4::from_array(plane),
            BUOYANCY_RESOLUTION,
        );
        let (force, torque) = submerged.buoyancy(
            density,
            gravity,
            body_to_world.transform_point3(record.center_of_mass),
        );
        Ok((force.to_array(), torque.to_array()))
    }

    // -- joints -------------------------------------------------------------

    fn create_joint(&mut self, spec: &NativeJointSpec) -> Result<NativeJoint, GroveError> {
        let body0 = self.record(spec.body0)?.handle;
        let body1 = match spec.body1 {
            Some(other) => Some(self.record(other)?.handle),
            None => None,
        };
        if let JointKind::Hinge {
            spring: Some(spring),
            ..
        } = &spec.kind
        {
            debug!(
                "rapier has no force mixing, dropping {} on hinge drive",
                spring.force_mixing
            );
        }
        let joint = bridge::generic_joint(spec);
        let handle = self.live_context()?.insert_joint(body0, body1, joint);
        let id = NativeJoint(self.next());
        self.joints.insert(id, handle);
        Ok(id)
    }

    fn destroy_joint(&mut self, joint: NativeJoint) {
        if let (Some(handle), Some(context)) = (self.joints.remove(&joint), self.context.as_mut()) {
            context.remove_joint(handle);
        }
    }

    // -- accounting ---------------------------------------------------------

    fn live_counts(&self) -> LiveCounts {
        LiveCounts {
            contexts: usize::from(self.context.is_some()),
            bodies: self.bodies.len(),
            shapes: self.shapes.len(),
            joints: self.joints.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
