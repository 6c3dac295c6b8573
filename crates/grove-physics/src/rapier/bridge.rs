//! Grove geometry and joint descriptions to rapier shapes and joints.

use std::f32::consts::TAU;

use bevy::math::{Mat4, Quat, Vec3};
use rapier3d::math::Pose;
use rapier3d::prelude::{
    GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis, MotorModel, SharedShape,
};

use grove_core::ResourceError;

use crate::backend::{JointFrame, NativeJointSpec};
use crate::body::quat_from_native;
use crate::components::JointKind;
use crate::geometry::ShapeGeometry;

/// Points per ring when a truncated cone is approximated by a hull.
const FRUSTUM_SEGMENTS: usize = 16;

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Rapier shape for `geometry` with scale already baked in.
///
/// Null geometry has no collider and maps to `None`.
pub fn shared_shape(geometry: &ShapeGeometry) -> Result<Option<SharedShape>, ResourceError> {
    let shape = match geometry {
        ShapeGeometry::Null => return Ok(None),
        ShapeGeometry::Box { size } => {
            let h = *size * 0.5;
            SharedShape::cuboid(h.x, h.y, h.z)
        }
        ShapeGeometry::Sphere { radius } => SharedShape::ball(*radius),
        ShapeGeometry::Cylinder {
            radius0,
            radius1,
            height,
            chamfered,
        } => {
            let hh = 0.5 * height;
            if (radius0 - radius1).abs() > f32::EPSILON {
                SharedShape::convex_hull(&frustum_points(*radius0, *radius1, *height))
                    .ok_or(ResourceError::DegenerateShape("cylinder"))?
            } else if *chamfered {
                // Rounded rim of radius h/4 around a core of half-height h/4.
                let border = 0.5 * hh;
                SharedShape::round_cylinder(hh - border, (radius0 - border).max(0.0), border)
            } else {
                SharedShape::cylinder(hh, *radius0)
            }
        }
        ShapeGeometry::Capsule { radius, height } => SharedShape::capsule_y(0.5 * height, *radius),
        ShapeGeometry::Cone { radius, height } => SharedShape::cone(0.5 * height, *radius),
        ShapeGeometry::ConvexHull { points } if points.len() < 4 => {
            return Err(ResourceError::DegenerateShape("convex hull"));
        }
        ShapeGeometry::ConvexHull { points } => SharedShape::convex_hull(points)
            .ok_or(ResourceError::DegenerateShape("convex hull"))?,
    };
    Ok(Some(shape))
}

fn frustum_points(radius0: f32, radius1: f32, height: f32) -> Vec<Vec3> {
    let hh = 0.5 * height;
    let mut points = Vec::with_capacity(2 * FRUSTUM_SEGMENTS);
    for (radius, y) in [(radius0, -hh), (radius1, hh)] {
        if radius <= f32::EPSILON {
            points.push(Vec3::new(0.0, y, 0.0));
            continue;
        }
        for i in 0..FRUSTUM_SEGMENTS {
            let a = TAU * i as f32 / FRUSTUM_SEGMENTS as f32;
            points.push(Vec3::new(radius * a.cos(), y, radius * a.sin()));
        }
    }
    points
}

/// Rigid part of a placement matrix as `(translation, rotation)`.
pub fn collider_offset(matrix: &Mat4) -> (Vec3, Quat) {
    let (_, rotation, translation) = matrix.to_scale_rotation_translation();
    (translation, rotation)
}

// ---------------------------------------------------------------------------
// Joints
// ---------------------------------------------------------------------------

fn joint_frame(frame: &JointFrame) -> Pose {
    Pose::from_parts(
        Vec3::from_array(frame.anchor),
        quat_from_native(frame.rotation),
    )
}

/// Rapier joint for `spec`. Frame X is the primary axis.
///
/// The hinge spring-damper maps to a force-based position motor. Rapier has
/// no force-mixing parameter, so that factor is dropped.
pub fn generic_joint(spec: &NativeJointSpec) -> GenericJoint {
    let mask = match &spec.kind {
        JointKind::Hinge { .. } => JointAxesMask::LOCKED_REVOLUTE_AXES,
        JointKind::Universal { .. } => JointAxesMask::LIN_AXES | JointAxesMask::ANG_Z,
        JointKind::Ball => JointAxesMask::LIN_AXES,
        JointKind::Slider { .. } => JointAxesMask::LOCKED_PRISMATIC_AXES,
        JointKind::Fixed => JointAxesMask::LOCKED_FIXED_AXES,
    };
    let mut joint = GenericJointBuilder::new(mask)
        .local_frame1(joint_frame(&spec.frame0))
        .local_frame2(joint_frame(&spec.frame1))
        .build();

    match &spec.kind {
        JointKind::Hinge { limits, spring } => {
            if let Some(limits) = limits {
                joint.set_limits(JointAxis::AngX, limits.to_radians());
            }
            if let Some(spring) = spring {
                let s = spring.normalized();
                joint.set_motor_model(JointAxis::AngX, MotorModel::ForceBased);
                joint.set_motor(JointAxis::AngX, 0.0, 0.0, s.spring, s.damper);
            }
        }
        JointKind::Universal {
            limits0, limits1, ..
        } => {
            if let Some(limits) = limits0 {
                joint.set_limits(JointAxis::AngX, limits.to_radians());
            }
            if let Some(limits) = limits1 {
                joint.set_limits(JointAxis::AngY, limits.to_radians());
            }
        }
        JointKind::Slider {
            limits: Some(limits),
        } => {
            joint.set_limits(JointAxis::LinX, limits.normalized());
        }
        JointKind::Slider { limits: None } | JointKind::Ball | JointKind::Fixed => {}
    }
    joint
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBody;
    use crate::components::{AngleLimits, LinearLimits, SpringDamper};
    use approx::assert_relative_eq;

    #[test]
    fn null_geometry_has_no_shape() {
        assert!(shared_shape(&ShapeGeometry::Null).unwrap().is_none());
    }

    #[test]
    fn primitive_shapes_build() {
        for geometry in [
            ShapeGeometry::cuboid(Vec3::ONE),
            ShapeGeometry::sphere(0.5),
            ShapeGeometry::cylinder(0.5, 1.0),
            ShapeGeometry::capsule(0.25, 1.0),
            ShapeGeometry::cone(0.5, 1.0),
            ShapeGeometry::Cylinder {
                radius0: 0.5,
                radius1: 0.25,
                height: 1.0,
                chamfered: false,
            },
            ShapeGeometry::Cylinder {
                radius0: 0.5,
                radius1: 0.5,
                height: 0.2,
                chamfered: true,
            },
        ] {
            assert!(shared_shape(&geometry).unwrap().is_some(), "{geometry:?}");
        }
    }

    #[test]
    fn hull_with_too_few_points_is_rejected() {
        let triangle = ShapeGeometry::convex_hull(vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert!(matches!(
            shared_shape(&triangle),
            Err(ResourceError::DegenerateShape(_))
        ));
        assert!(matches!(
            shared_shape(&ShapeGeometry::convex_hull(Vec::new())),
            Err(ResourceError::DegenerateShape(_))
        ));
    }

    #[test]
    fn box_half_extents() {
        let shape = shared_shape(&ShapeGeometry::cuboid(Vec3::new(2.0, 4.0, 6.0)))
            .unwrap()
            .unwrap();
        let cuboid = shape.as_cuboid().unwrap();
        assert_relative_eq!(cuboid.half_extents.y, 2.0);
    }

    #[test]
    fn frustum_hull_has_two_rings() {
        assert_eq!(frustum_points(1.0, 0.5, 1.0).len(), 2 * FRUSTUM_SEGMENTS);
        assert_eq!(frustum_points(1.0, 0.0, 1.0).len(), FRUSTUM_SEGMENTS + 1);
    }

    #[test]
    fn collider_offset_drops_scale() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(3.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let (translation, rotation) = collider_offset(&m);
        assert_relative_eq!(translation.z, 3.0, epsilon = 1e-5);
        assert!(rotation.angle_between(Quat::from_rotation_y(0.5)) < 1e-4);
    }

    fn spec(kind: JointKind) -> NativeJointSpec {
        NativeJointSpec {
            kind,
            body0: NativeBody(1),
            body1: None,
            frame0: JointFrame::IDENTITY,
            frame1: JointFrame {
                anchor: [0.0, 1.0, 0.0],
                rotation: [1.0, 0.0, 0.0, 0.0],
            },
        }
    }

    #[test]
    fn hinge_locks_all_but_primary_rotation() {
        let joint = generic_joint(&spec(JointKind::Hinge {
            limits: Some(AngleLimits::new(-90.0, 45.0)),
            spring: Some(SpringDamper::new(-10.0, 1.0, 0.5)),
        }));
        assert_eq!(joint.locked_axes, JointAxesMask::LOCKED_REVOLUTE_AXES);
        let limits = joint.limits(JointAxis::AngX).unwrap();
        assert_relative_eq!(limits.min, -std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(limits.max, std::f32::consts::FRAC_PI_4, epsilon = 1e-6);
        let motor = joint.motor(JointAxis::AngX).unwrap();
        assert_relative_eq!(motor.stiffness, 10.0);
        assert_relative_eq!(joint.local_anchor2().y, 1.0);
    }

    #[test]
    fn joint_frames_keep_anchor_and_rotation() {
        let q = Quat::from_rotation_z(0.5);
        let mut native = spec(JointKind::Ball);
        native.frame0 = JointFrame {
            anchor: [0.25, 0.0, 0.0],
            rotation: [q.w, q.x, q.y, q.z],
        };
        let joint = generic_joint(&native);
        assert_relative_eq!(joint.local_frame1.translation.x, 0.25);
        assert!(joint.local_frame1.rotation.angle_between(q) < 1e-5);
        assert_relative_eq!(joint.local_frame2.translation.y, 1.0);
        assert!(joint.local_frame2.rotation.angle_between(Quat::IDENTITY) < 1e-5);
    }

    #[test]
    fn slider_and_universal_limits() {
        let slider = generic_joint(&spec(JointKind::Slider {
            limits: Some(LinearLimits::new(0.5, 2.0)),
        }));
        let limits = slider.limits(JointAxis::LinX).unwrap();
        assert_relative_eq!(limits.min, 0.0);
        assert_relative_eq!(limits.max, 2.0);

        let universal = generic_joint(&spec(JointKind::Universal {
            secondary_pin: Vec3::Y,
            limits0: None,
            limits1: Some(AngleLimits::new(-30.0, 30.0)),
        }));
        assert!(universal.limits(JointAxis::AngX).is_none());
        assert!(universal.limits(JointAxis::AngY).is_some());
        assert!(universal.locked_axes.contains(JointAxesMask::ANG_Z));
        assert!(!universal.locked_axes.contains(JointAxesMask::ANG_X));
    }
}
