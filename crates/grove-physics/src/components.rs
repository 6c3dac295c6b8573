//! Physics descriptors attached to scene nodes.
//!
//! Descriptors are plain data. The world reads them when it discovers the
//! scene and turns them into native bodies, shapes and joints.

use bevy::math::{EulerRot, Mat4, Quat, Vec3};

use crate::geometry::ShapeGeometry;
use crate::scene::NodeId;

/// Damping applied to new bodies unless the descriptor overrides it.
pub const DEFAULT_DAMPING: f32 = 0.1;

// ---------------------------------------------------------------------------
// RigidBodyDesc
// ---------------------------------------------------------------------------

/// Marks a scene node as a simulated rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyDesc {
    /// Mass in kg. Zero or negative creates an immovable body.
    pub mass: f32,
    /// Center of mass in body space.
    pub center_of_mass: Vec3,
    /// Principal inertia (Ixx, Iyy, Izz). Ignored when `auto_inertia` is set.
    pub inertia: Vec3,
    /// Derive inertia from the body's own shape.
    pub auto_inertia: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Draw the body axes at the center of mass in debug views.
    pub show_gizmo: bool,
    pub gizmo_scale: f32,
}

impl Default for RigidBodyDesc {
    fn default() -> Self {
        Self {
            mass: 0.0,
            center_of_mass: Vec3::ZERO,
            inertia: Vec3::ZERO,
            auto_inertia: true,
            linear_damping: DEFAULT_DAMPING,
            angular_damping: DEFAULT_DAMPING,
            show_gizmo: false,
            gizmo_scale: 1.0,
        }
    }
}

impl RigidBodyDesc {
    /// A movable body of the given mass with shape-derived inertia.
    pub fn dynamic(mass: f32) -> Self {
        Self {
            mass,
            ..Self::default()
        }
    }

    /// An immovable body.
    pub fn fixed() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Use explicit principal inertia instead of deriving it from the shape.
    #[must_use]
    pub const fn with_inertia(mut self, center_of_mass: Vec3, inertia: Vec3) -> Self {
        self.center_of_mass = center_of_mass;
        self.inertia = inertia;
        self.auto_inertia = false;
        self
    }

    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }
}

// ---------------------------------------------------------------------------
// ColliderDesc
// ---------------------------------------------------------------------------

/// Collision geometry attached to a scene node, with its own offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderDesc {
    pub geometry: ShapeGeometry,
    /// Offset from the node origin.
    pub position: Vec3,
    /// Euler angles in degrees, applied Z first, then X, then Y.
    pub rotation_deg: Vec3,
    /// Per-axis scale, multiplied with the inherited node scale.
    pub scale: Vec3,
}

impl ColliderDesc {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self {
            geometry,
            position: Vec3::ZERO,
            rotation_deg: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_rotation_deg(mut self, rotation_deg: Vec3) -> Self {
        self.rotation_deg = rotation_deg;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Offset rotation as a quaternion.
    pub fn offset_rotation(&self) -> Quat {
        let r = self.rotation_deg;
        Quat::from_euler(
            EulerRot::YXZ,
            r.y.to_radians(),
            r.x.to_radians(),
            r.z.to_radians(),
        )
    }

    /// Offset as a rigid transform. Scale is carried separately.
    pub fn offset_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.offset_rotation(), self.position)
    }
}

// ---------------------------------------------------------------------------
// Joints
// ---------------------------------------------------------------------------

/// Angular limits in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleLimits {
    pub min_deg: f32,
    pub max_deg: f32,
}

impl AngleLimits {
    pub const fn new(min_deg: f32, max_deg: f32) -> Self {
        Self { min_deg, max_deg }
    }

    /// `[min, max]` in radians with `min <= 0 <= max`.
    pub fn to_radians(self) -> [f32; 2] {
        [
            self.min_deg.min(0.0).to_radians(),
            self.max_deg.max(0.0).to_radians(),
        ]
    }
}

/// Linear limits in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearLimits {
    pub min: f32,
    pub max: f32,
}

impl LinearLimits {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// `[min, max]` with `min <= 0 <= max`.
    pub fn normalized(self) -> [f32; 2] {
        [self.min.min(0.0), self.max.max(0.0)]
    }
}

/// Spring-damper drive around a hinge rest angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringDamper {
    pub spring: f32,
    pub damper: f32,
    /// Blend between the spring and the rigid constraint, in `[0.7, 0.99]`.
    pub force_mixing: f32,
}

impl SpringDamper {
    pub const MIN_FORCE_MIXING: f32 = 0.7;
    pub const MAX_FORCE_MIXING: f32 = 0.99;

    pub const fn new(spring: f32, damper: f32, force_mixing: f32) -> Self {
        Self {
            spring,
            damper,
            force_mixing,
        }
    }

    /// Absolute constants and clamped force mixing.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            spring: self.spring.abs(),
            damper: self.damper.abs(),
            force_mixing: self
                .force_mixing
                .clamp(Self::MIN_FORCE_MIXING, Self::MAX_FORCE_MIXING),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    /// One rotational degree of freedom around the pin.
    Hinge {
        limits: Option<AngleLimits>,
        spring: Option<SpringDamper>,
    },
    /// Rotation around the pin and around `secondary_pin`.
    Universal {
        secondary_pin: Vec3,
        limits0: Option<AngleLimits>,
        limits1: Option<AngleLimits>,
    },
    /// Free rotation around the pivot.
    Ball,
    /// Translation along the pin.
    Slider { limits: Option<LinearLimits> },
    /// No relative motion.
    Fixed,
}

impl JointKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hinge { .. } => "hinge",
            Self::Universal { .. } => "universal",
            Self::Ball => "ball",
            Self::Slider { .. } => "slider",
            Self::Fixed => "fixed",
        }
    }
}

/// A constraint between the body owning this node and a second body.
///
/// `pivot` and `pin` are expressed in the owning body's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDesc {
    pub kind: JointKind,
    /// Node of the second body. `None` attaches to the world.
    pub connected: Option<NodeId>,
    pub pivot: Vec3,
    pub pin: Vec3,
}

impl JointDesc {
    pub const fn new(kind: JointKind) -> Self {
        Self {
            kind,
            connected: None,
            pivot: Vec3::ZERO,
            pin: Vec3::X,
        }
    }

    pub const fn hinge() -> Self {
        Self::new(JointKind::Hinge {
            limits: None,
            spring: None,
        })
    }

    pub const fn ball() -> Self {
        Self::new(JointKind::Ball)
    }

    pub const fn fixed() -> Self {
        Self::new(JointKind::Fixed)
    }

    pub const fn slider(limits: Option<LinearLimits>) -> Self {
        Self::new(JointKind::Slider { limits })
    }

    pub const fn universal(secondary_pin: Vec3) -> Self {
        Self::new(JointKind::Universal {
            secondary_pin,
            limits0: None,
            limits1: None,
        })
    }

    #[must_use]
    pub const fn connected_to(mut self, node: NodeId) -> Self {
        self.connected = Some(node);
        self
    }

    #[must_use]
    pub const fn with_pivot(mut self, pivot: Vec3) -> Self {
        self.pivot = pivot;
        self
    }

    #[must_use]
    pub const fn with_pin(mut self, pin: Vec3) -> Self {
        self.pin = pin;
        self
    }

    /// Joint frame in the owning body's space: X along the pin, Y along the
    /// secondary axis.
    pub fn frame_rotation(&self) -> Quat {
        let x = self.pin.try_normalize().unwrap_or(Vec3::X);
        let hint = match &self.kind {
            JointKind::Universal { secondary_pin, .. } => *secondary_pin,
            _ => x.any_orthonormal_vector(),
        };
        let z = x.cross(hint).try_normalize().unwrap_or_else(|| {
            x.cross(x.any_orthonormal_vector()).normalize()
        });
        let y = z.cross(x);
        Quat::from_mat3(&bevy::math::Mat3::from_cols(x, y, z))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
