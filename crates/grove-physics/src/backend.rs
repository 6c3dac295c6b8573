//! Engine-agnostic simulation backend trait.
//!
//! The world never talks to a physics engine directly. Everything it needs
//! (contexts, bodies, shapes, joints, stepping) goes through
//! [`SimulationBackend`], which keeps plain arrays at the boundary so that an
//! engine with its own math types can implement it without leaking them.
//!
//! Rotations crossing this boundary are scalar-first `[w, x, y, z]`.

use grove_core::{GroveError, ResourceError, WorldConfig};

use crate::components::JointKind;
use crate::geometry::ShapeGeometry;

// ---------------------------------------------------------------------------
// Native handles
// ---------------------------------------------------------------------------

/// Opaque id of a native rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeBody(pub u64);

/// Opaque id of a native collision shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeShape(pub u64);

/// Opaque id of a native joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeJoint(pub u64);

/// Number of live native resources, per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveCounts {
    pub contexts: usize,
    pub bodies: usize,
    pub shapes: usize,
    pub joints: usize,
}

impl LiveCounts {
    pub const fn is_empty(&self) -> bool {
        self.contexts == 0 && self.bodies == 0 && self.shapes == 0 && self.joints == 0
    }
}

/// Anchor and orientation of a joint frame in a body's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrame {
    pub anchor: [f32; 3],
    /// Scalar-first `[w, x, y, z]`.
    pub rotation: [f32; 4],
}

impl JointFrame {
    pub const IDENTITY: Self = Self {
        anchor: [0.0; 3],
        rotation: [1.0, 0.0, 0.0, 0.0],
    };
}

/// Everything a backend needs to build one joint.
///
/// Frame X is the primary axis (hinge pin, slider direction); frame Y is the
/// secondary axis of a universal joint. Limits inside `kind` are still in
/// descriptor units; backends normalize them with
/// [`AngleLimits::to_radians`](crate::components::AngleLimits::to_radians),
/// [`LinearLimits::normalized`](crate::components::LinearLimits::normalized)
/// and [`SpringDamper::normalized`](crate::components::SpringDamper::normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct NativeJointSpec {
    pub kind: JointKind,
    pub body0: NativeBody,
    /// `None` anchors the joint to the world.
    pub body1: Option<NativeBody>,
    /// Joint frame in `body0` space.
    pub frame0: JointFrame,
    /// Joint frame in `body1` space, or in world space when `body1` is `None`.
    pub frame1: JointFrame,
}

// ---------------------------------------------------------------------------
// SimulationBackend
// ---------------------------------------------------------------------------

/// Trait that concrete physics engines must implement.
///
/// A backend owns at most one simulation context at a time. Operations on
/// handles that are not live return [`ResourceError`]; destroy operations on
/// unknown handles are no-ops.
pub trait SimulationBackend: Send + Sync + 'static {
    /// Human-readable engine name (e.g., "rapier3d").
    fn name(&self) -> &str;

    // -- context ------------------------------------------------------------

    /// Create the simulation context and apply `config`.
    fn create_context(&mut self, config: &WorldConfig) -> Result<(), GroveError>;

    /// Release the context. Bodies, shapes and joints must already be gone.
    fn destroy_context(&mut self);

    fn is_live(&self) -> bool;

    /// Advance the simulation by `dt` seconds, consuming queued forces.
    fn step(&mut self, dt: f32);

    // -- shapes -------------------------------------------------------------

    fn create_shape(&mut self, geometry: &ShapeGeometry) -> Result<NativeShape, GroveError>;

    fn destroy_shape(&mut self, shape: NativeShape);

    /// Placement of the shape in its body's frame, column-major,
    /// translation and rotation only.
    fn set_shape_matrix(
        &mut self,
        shape: NativeShape,
        matrix: &[f32; 16],
    ) -> Result<(), ResourceError>;

    /// Per-axis scale, applied in the shape's own frame before the matrix.
    fn set_shape_scale(&mut self, shape: NativeShape, scale: [f32; 3])
    -> Result<(), ResourceError>;

    /// Attach an additional shape to `body`.
    fn attach_shape(&mut self, shape: NativeShape, body: NativeBody) -> Result<(), ResourceError>;

    /// Emit the placed shape's outline in body space as convex faces. The
    /// callback receives a flat `[x, y, z, x, y, z, ...]` buffer and its vertex
    /// count.
    fn shape_debug_faces(
        &self,
        shape: NativeShape,
        face: &mut dyn FnMut(&[f32], usize),
    ) -> Result<(), ResourceError>;

    // -- bodies -------------------------------------------------------------

    /// Create a body owning `shape`. A mass of zero or less creates an
    /// immovable body.
    fn create_body(
        &mut self,
        shape: NativeShape,
        position: [f32; 3],
        rotation: [f32; 4],
        mass: f32,
    ) -> Result<NativeBody, GroveError>;

    fn destroy_body(&mut self, body: NativeBody);

    /// Make `shape` the body's own shape and rederive its mass distribution.
    /// The previous own shape is detached but stays allocated.
    fn set_body_shape(&mut self, body: NativeBody, shape: NativeShape)
    -> Result<(), ResourceError>;

    fn body_position(&self, body: NativeBody) -> Result<[f32; 3], ResourceError>;
    fn set_body_position(&mut self, body: NativeBody, position: [f32; 3])
    -> Result<(), ResourceError>;

    fn body_rotation(&self, body: NativeBody) -> Result<[f32; 4], ResourceError>;
    fn set_body_rotation(&mut self, body: NativeBody, rotation: [f32; 4])
    -> Result<(), ResourceError>;

    fn body_velocity(&self, body: NativeBody) -> Result<[f32; 3], ResourceError>;
    fn set_body_velocity(&mut self, body: NativeBody, velocity: [f32; 3])
    -> Result<(), ResourceError>;

    fn body_omega(&self, body: NativeBody) -> Result<[f32; 3], ResourceError>;
    fn set_body_omega(&mut self, body: NativeBody, omega: [f32; 3]) -> Result<(), ResourceError>;

    fn center_of_mass(&self, body: NativeBody) -> Result<[f32; 3], ResourceError>;

    /// Move the center of mass. `None` derives the inertia from the body's
    /// own shape; `Some` uses the principal moments verbatim.
    fn set_center_of_mass(
        &mut self,
        body: NativeBody,
        center: [f32; 3],
        inertia: Option<[f32; 3]>,
    ) -> Result<(), ResourceError>;

    fn linear_damping(&self, body: NativeBody) -> Result<f32, ResourceError>;
    fn set_linear_damping(&mut self, body: NativeBody, damping: f32) -> Result<(), ResourceError>;

    fn angular_damping(&self, body: NativeBody) -> Result<f32, ResourceError>;
    fn set_angular_damping(&mut self, body: NativeBody, damping: f32)
    -> Result<(), ResourceError>;

    fn is_sleeping(&self, body: NativeBody) -> Result<bool, ResourceError>;
    fn set_sleeping(&mut self, body: NativeBody, sleeping: bool) -> Result<(), ResourceError>;

    /// Queue a world-space force for the next step.
    fn add_force(&mut self, body: NativeBody, force: [f32; 3]) -> Result<(), ResourceError>;

    /// Queue a world-space torque for the next step.
    fn add_torque(&mut self, body: NativeBody, torque: [f32; 3]) -> Result<(), ResourceError>;

    fn user_data(&self, body: NativeBody) -> Result<u64, ResourceError>;
    fn set_user_data(&mut self, body: NativeBody, data: u64) -> Result<(), ResourceError>;

    /// Buoyant force and torque on the body's own shape from a fluid of
    /// `density` below `plane` (`n · p + w < 0` is submerged). The torque is
    /// taken about the body's center of mass.
    fn buoyancy(
        &self,
        body: NativeBody,
        plane: [f32; 4],
        density: f32,
    ) -> Result<([f32; 3], [f32; 3]), ResourceError>;

    // -- joints -------------------------------------------------------------

    fn create_joint(&mut self, spec: &NativeJointSpec) -> Result<NativeJoint, GroveError>;

    fn destroy_joint(&mut self, joint: NativeJoint);

    // -- accounting ---------------------------------------------------------

    fn live_counts(&self) -> LiveCounts;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn SimulationBackend`).
    #[test]
    fn trait_is_object_safe() {
        fn _accepts_boxed(_: Box<dyn SimulationBackend>) {}
        fn _accepts_ref(_: &mut dyn SimulationBackend) {}
    }

    /// Verify the trait bound includes Send + Sync.
    #[test]
    fn trait_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Box<dyn SimulationBackend>>();
    }

    #[test]
    fn live_counts_empty() {
        assert!(LiveCounts::default().is_empty());
        let counts = LiveCounts {
            shapes: 1,
            ..LiveCounts::default()
        };
        assert!(!counts.is_empty());
    }

    #[test]
    fn identity_frame_is_scalar_first() {
        assert_eq!(JointFrame::IDENTITY.rotation[0], 1.0);
        assert_eq!(JointFrame::IDENTITY.anchor, [0.0; 3]);
    }
}
