//! Collision geometry shared by every backend.
//!
//! [`ShapeGeometry`] is the construction data of a collider. Besides the
//! parameters handed to the native layer it carries a closed-form model of
//! volume, inertia, containment, submerged volume and debug outlines for
//! backends without a shape library of their own. Backends that have one
//! answer those questions natively and only reuse [`sample_submersion`].

use std::f32::consts::{PI, TAU};

use bevy::math::{Affine3A, Vec3, Vec4};

/// Smallest magnitude a native scale component may take.
pub const MIN_SCALE: f32 = 0.01;

/// Segments used to outline round shapes.
const ROUND_SEGMENTS: usize = 16;
const SPHERE_RINGS: usize = 8;

/// Grid resolution per axis when sampling submerged volume.
pub const BUOYANCY_RESOLUTION: u32 = 16;

/// Scale pushed to the native layer: `max(MIN_SCALE, |s|)` per axis.
pub fn clamp_scale(scale: Vec3) -> Vec3 {
    scale.abs().max(Vec3::splat(MIN_SCALE))
}

// ---------------------------------------------------------------------------
// ShapeGeometry
// ---------------------------------------------------------------------------

/// Construction data for one collision shape, centered on its local origin.
///
/// Round shapes are aligned with the local Y axis.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    /// No collision. Bodies without a collider carry this.
    Null,
    /// Box with full edge lengths `size`.
    Box { size: Vec3 },
    Sphere { radius: f32 },
    /// Truncated cone from `radius0` at `-height/2` to `radius1` at `+height/2`.
    /// A chamfered cylinder uses `radius0` and rounds its rim with a radius of
    /// a quarter of `height`.
    Cylinder {
        radius0: f32,
        radius1: f32,
        height: f32,
        chamfered: bool,
    },
    /// `height` is the length of the straight segment between the caps.
    Capsule { radius: f32, height: f32 },
    /// Apex at `+height/2`.
    Cone { radius: f32, height: f32 },
    ConvexHull { points: Vec<Vec3> },
}

impl ShapeGeometry {
    pub const fn cuboid(size: Vec3) -> Self {
        Self::Box { size }
    }

    pub const fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    pub const fn cylinder(radius: f32, height: f32) -> Self {
        Self::Cylinder {
            radius0: radius,
            radius1: radius,
            height,
            chamfered: false,
        }
    }

    pub const fn capsule(radius: f32, height: f32) -> Self {
        Self::Capsule { radius, height }
    }

    pub const fn cone(radius: f32, height: f32) -> Self {
        Self::Cone { radius, height }
    }

    pub fn convex_hull(points: impl Into<Vec<Vec3>>) -> Self {
        Self::ConvexHull {
            points: points.into(),
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Cylinder { .. } => "cylinder",
            Self::Capsule { .. } => "capsule",
            Self::Cone { .. } => "cone",
            Self::ConvexHull { .. } => "convex_hull",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Geometry with `scale` baked into its parameters.
    ///
    /// Round cross sections take the larger of the X and Z factors.
    #[must_use]
    pub fn scaled(&self, scale: Vec3) -> Self {
        let radial = scale.x.abs().max(scale.z.abs());
        let axial = scale.y.abs();
        match self {
            Self::Null => Self::Null,
            Self::Box { size } => Self::Box {
                size: *size * scale.abs(),
            },
            Self::Sphere { radius } => Self::Sphere {
                radius: radius * scale.abs().max_element(),
            },
            Self::Cylinder {
                radius0,
                radius1,
                height,
                chamfered,
            } => Self::Cylinder {
                radius0: radius0 * radial,
                radius1: radius1 * radial,
                height: height * axial,
                chamfered: *chamfered,
            },
            Self::Capsule { radius, height } => Self::Capsule {
                radius: radius * radial,
                height: height * axial,
            },
            Self::Cone { radius, height } => Self::Cone {
                radius: radius * radial,
                height: height * axial,
            },
            Self::ConvexHull { points } => Self::ConvexHull {
                points: points.iter().map(|p| *p * scale).collect(),
            },
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            Self::Null => 0.0,
            Self::Box { size } => size.x * size.y * size.z,
            Self::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Self::Cylinder {
                radius0,
                radius1,
                height,
                ..
            } => PI * height * (radius0 * radius0 + radius0 * radius1 + radius1 * radius1) / 3.0,
            Self::Capsule { radius, height } => {
                PI * radius * radius * height + 4.0 / 3.0 * PI * radius.powi(3)
            }
            Self::Cone { radius, height } => PI * radius * radius * height / 3.0,
            Self::ConvexHull { points } => hull_volume(points),
        }
    }

    /// Principal inertia per unit mass about the local origin axes.
    ///
    /// Hulls use their bounding box. Null geometry reports a unit cube so a
    /// shapeless body still rotates.
    pub fn unit_inertia(&self) -> Vec3 {
        match self {
            Self::Null => Vec3::splat(1.0 / 6.0),
            Self::Box { size } => box_inertia(*size),
            Self::Sphere { radius } => Vec3::splat(0.4 * radius * radius),
            Self::Cylinder {
                radius0,
                radius1,
                height,
                ..
            } => {
                let r = 0.5 * (radius0 + radius1);
                let side = (3.0 * r * r + height * height) / 12.0;
                Vec3::new(side, 0.5 * r * r, side)
            }
            Self::Capsule { radius, height } => {
                let length = height + 2.0 * radius;
                let side = (3.0 * radius * radius + length * length) / 12.0;
                Vec3::new(side, 0.5 * radius * radius, side)
            }
            Self::Cone { radius, height } => {
                let side = 3.0 / 20.0 * radius * radius + 3.0 / 80.0 * height * height;
                Vec3::new(side, 0.3 * radius * radius, side)
            }
            Self::ConvexHull { .. } => match self.local_aabb() {
                Some((min, max)) => box_inertia(max - min),
                None => Vec3::splat(1.0 / 6.0),
            },
        }
    }

    /// Local bounding box as `(min, max)`. `None` for null geometry and
    /// empty hulls.
    pub fn local_aabb(&self) -> Option<(Vec3, Vec3)> {
        let half = match self {
            Self::Null => return None,
            Self::Box { size } => *size * 0.5,
            Self::Sphere { radius } => Vec3::splat(*radius),
            Self::Cylinder {
                radius0,
                radius1,
                height,
                ..
            } => {
                let r = radius0.max(*radius1);
                Vec3::new(r, 0.5 * height, r)
            }
            Self::Capsule { radius, height } => Vec3::new(*radius, 0.5 * height + radius, *radius),
            Self::Cone { radius, height } => Vec3::new(*radius, 0.5 * height, *radius),
            Self::ConvexHull { points } => {
                if points.is_empty() {
                    return None;
                }
                return Some(points_aabb(points));
            }
        };
        Some((-half, half))
    }

    /// Point-in-shape test in local space.
    pub fn contains_local_point(&self, p: Vec3) -> bool {
        self.containment()(p)
    }

    fn containment(&self) -> Box<dyn Fn(Vec3) -> bool + '_> {
        match self {
            Self::Null => Box::new(|_| false),
            Self::Box { size } => {
                let half = *size * 0.5;
                Box::new(move |p: Vec3| p.abs().cmple(half).all())
            }
            Self::Sphere { radius } => Box::new(move |p: Vec3| p.length_squared() <= radius * radius),
            Self::Cylinder {
                radius0,
                radius1,
                height,
                ..
            } => Box::new(move |p: Vec3| {
                let h = 0.5 * height;
                if p.y.abs() > h {
                    return false;
                }
                let t = if *height > 0.0 { (p.y + h) / height } else { 0.5 };
                let r = radius0 + (radius1 - radius0) * t;
                p.x * p.x + p.z * p.z <= r * r
            }),
            Self::Capsule { radius, height } => Box::new(move |p: Vec3| {
                let h = 0.5 * height;
                let axis_point = Vec3::new(0.0, p.y.clamp(-h, h), 0.0);
                p.distance_squared(axis_point) <= radius * radius
            }),
            Self::Cone { radius, height } => Box::new(move |p: Vec3| {
                let h = 0.5 * height;
                if p.y.abs() > h {
                    return false;
                }
                let r = if *height > 0.0 { radius * (h - p.y) / height } else { 0.0 };
                p.x * p.x + p.z * p.z <= r * r
            }),
            Self::ConvexHull { points } => {
                let faces = hull_faces(points);
                let eps = hull_epsilon(points);
                Box::new(move |p: Vec3| {
                    !faces.is_empty() && faces.iter().all(|f| f.normal.dot(p) - f.offset <= eps)
                })
            }
        }
    }

    /// Volume and centroid of the part of the shape below `plane`.
    ///
    /// `to_world` places the shape. A point `p` is submerged when
    /// `plane.xyz · p + plane.w < 0`. The shape is sampled on a
    /// `resolution³` grid over its bounding box and the samples are weighted
    /// so that the full shape integrates to its exact volume.
    pub fn submersion(&self, to_world: &Affine3A, plane: Vec4, resolution: u32) -> Submersion {
        let Some(aabb) = self.local_aabb() else {
            return Submersion::default();
        };
        sample_submersion(aabb, self.volume(), &*self.containment(), to_world, plane, resolution)
    }

    /// Buoyant force and torque about `center` from a fluid of `density`
    /// below `plane`, under `gravity`. Both are zero when nothing is
    /// submerged.
    pub fn buoyancy(
        &self,
        to_world: &Affine3A,
        plane: Vec4,
        density: f32,
        gravity: Vec3,
        center: Vec3,
    ) -> (Vec3, Vec3) {
        self.submersion(to_world, plane, BUOYANCY_RESOLUTION)
            .buoyancy(density, gravity, center)
    }

    /// [`debug_faces`](Self::debug_faces) after scaling by `scale` and
    /// placing by `placement`, as flat `[x, y, z, ...]` buffers.
    pub fn placed_faces(
        &self,
        placement: &Affine3A,
        scale: Vec3,
        face: &mut dyn FnMut(&[f32], usize),
    ) {
        let mut buffer = Vec::new();
        self.scaled(scale).debug_faces(&mut |vertices| {
            buffer.clear();
            for v in vertices {
                buffer.extend_from_slice(&placement.transform_point3(*v).to_array());
            }
            face(&buffer, vertices.len());
        });
    }

    /// Outline polygons in local space, each a convex fan of at least three
    /// vertices.
    pub fn debug_faces(&self, face: &mut dyn FnMut(&[Vec3])) {
        match self {
            Self::Null => {}
            Self::Box { size } => {
                let h = *size * 0.5;
                let c = |x: f32, y: f32, z: f32| Vec3::new(x * h.x, y * h.y, z * h.z);
                face(&[c(1., -1., -1.), c(1., 1., -1.), c(1., 1., 1.), c(1., -1., 1.)]);
                face(&[c(-1., -1., 1.), c(-1., 1., 1.), c(-1., 1., -1.), c(-1., -1., -1.)]);
                face(&[c(-1., 1., -1.), c(-1., 1., 1.), c(1., 1., 1.), c(1., 1., -1.)]);
                face(&[c(1., -1., -1.), c(1., -1., 1.), c(-1., -1., 1.), c(-1., -1., -1.)]);
                face(&[c(-1., -1., 1.), c(1., -1., 1.), c(1., 1., 1.), c(-1., 1., 1.)]);
                face(&[c(-1., 1., -1.), c(1., 1., -1.), c(1., -1., -1.), c(-1., -1., -1.)]);
            }
            Self::Sphere { radius } => {
                revolve(face, SPHERE_RINGS, |t| {
                    let a = PI * (t - 0.5);
                    (radius * a.cos(), radius * a.sin())
                });
            }
            Self::Cylinder {
                radius0,
                radius1,
                height,
                ..
            } => {
                let h = 0.5 * height;
                revolve(face, 1, |t| {
                    (radius0 + (radius1 - radius0) * t, -h + height * t)
                });
                cap(face, *radius0, -h, false);
                cap(face, *radius1, h, true);
            }
            Self::Capsule { radius, height } => {
                let h = 0.5 * height;
                let rings = SPHERE_RINGS / 2;
                revolve(face, rings, |t| {
                    let a = 0.5 * PI * (t - 1.0);
                    (radius * a.cos(), -h + radius * a.sin())
                });
                revolve(face, 1, |t| (*radius, -h + height * t));
                revolve(face, rings, |t| {
                    let a = 0.5 * PI * t;
                    (radius * a.cos(), h + radius * a.sin())
                });
            }
            Self::Cone { radius, height } => {
                let h = 0.5 * height;
                revolve(face, 1, |t| (radius * (1.0 - t), -h + height * t));
                cap(face, *radius, -h, false);
            }
            Self::ConvexHull { points } => {
                for f in hull_faces(points) {
                    face(&f.vertices);
                }
            }
        }
    }
}

/// Result of [`ShapeGeometry::submersion`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Submersion {
    pub volume: f32,
    pub centroid: Vec3,
}

impl Submersion {
    /// Force and torque about `center` of a fluid of `density` displaced by
    /// this volume under `gravity`.
    pub fn buoyancy(&self, density: f32, gravity: Vec3, center: Vec3) -> (Vec3, Vec3) {
        if self.volume <= 0.0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        let force = -gravity * density * self.volume;
        (force, (self.centroid - center).cross(force))
    }
}

/// Submerged volume and centroid of any solid given its local bounding box,
/// its exact volume and a point-in-solid test.
///
/// `to_world` places the solid. A point `p` is submerged when
/// `plane.xyz · p + plane.w < 0`. The box is sampled on a `resolution³`
/// grid and the samples are weighted so that the whole solid integrates to
/// `volume`.
pub fn sample_submersion(
    (min, max): (Vec3, Vec3),
    volume: f32,
    inside: &dyn Fn(Vec3) -> bool,
    to_world: &Affine3A,
    plane: Vec4,
    resolution: u32,
) -> Submersion {
    let n = resolution.max(1);
    let cell = (max - min) / n as f32;
    let normal = plane.truncate();

    let mut inside_count = 0u32;
    let mut submerged_count = 0u32;
    let mut centroid = Vec3::ZERO;
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let local = min + cell * Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5);
                if !inside(local) {
                    continue;
                }
                inside_count += 1;
                let world = to_world.transform_point3(local);
                if normal.dot(world) + plane.w < 0.0 {
                    submerged_count += 1;
                    centroid += world;
                }
            }
        }
    }
    if inside_count == 0 || submerged_count == 0 {
        return Submersion::default();
    }
    Submersion {
        volume: volume / inside_count as f32 * submerged_count as f32,
        centroid: centroid / submerged_count as f32,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn box_inertia(size: Vec3) -> Vec3 {
    let s = size * size;
    Vec3::new(s.y + s.z, s.x + s.z, s.x + s.y) / 12.0
}

fn points_aabb(points: &[Vec3]) -> (Vec3, Vec3) {
    points.iter().fold(
        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
        |(lo, hi), p| (lo.min(*p), hi.max(*p)),
    )
}

/// Surface of revolution around Y. `profile(t)` returns `(radius, y)` for
/// `t` in `[0, 1]`, sampled at `bands + 1` points.
fn revolve(face: &mut dyn FnMut(&[Vec3]), bands: usize, profile: impl Fn(f32) -> (f32, f32)) {
    let ring = |r: f32, y: f32, s: usize| {
        let a = TAU * s as f32 / ROUND_SEGMENTS as f32;
        Vec3::new(r * a.cos(), y, r * a.sin())
    };
    for b in 0..bands {
        let (r0, y0) = profile(b as f32 / bands as f32);
        let (r1, y1) = profile((b + 1) as f32 / bands as f32);
        for s in 0..ROUND_SEGMENTS {
            let quad = [
                ring(r0, y0, s),
                ring(r0, y0, s + 1),
                ring(r1, y1, s + 1),
                ring(r1, y1, s),
            ];
            // Collapse degenerate edges at poles and apexes.
            if r0 <= f32::EPSILON {
                face(&[quad[0], quad[2], quad[3]]);
            } else if r1 <= f32::EPSILON {
                face(&quad[..3]);
            } else {
                face(&quad);
            }
        }
    }
}

fn cap(face: &mut dyn FnMut(&[Vec3]), radius: f32, y: f32, facing_up: bool) {
    if radius <= f32::EPSILON {
        return;
    }
    let mut polygon: Vec<Vec3> = (0..ROUND_SEGMENTS)
        .map(|s| {
            let a = TAU * s as f32 / ROUND_SEGMENTS as f32;
            Vec3::new(radius * a.cos(), y, radius * a.sin())
        })
        .collect();
    if facing_up {
        polygon.reverse();
    }
    face(&polygon);
}

// ---------------------------------------------------------------------------
// Convex hull faces
// ---------------------------------------------------------------------------

struct HullFace {
    normal: Vec3,
    offset: f32,
    /// Counter-clockwise around `normal`.
    vertices: Vec<Vec3>,
}

fn hull_epsilon(points: &[Vec3]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let (min, max) = points_aabb(points);
    1e-5 * (max - min).max_element().max(1e-3)
}

/// Planar faces of the convex hull of `points`.
///
/// Brute force over point triples. Intended for the small hulls used as
/// colliders.
fn hull_faces(points: &[Vec3]) -> Vec<HullFace> {
    let eps = hull_epsilon(points);
    let mut faces: Vec<HullFace> = Vec::new();
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let Some(normal) = (b - a).cross(c - a).try_normalize() else {
                    continue;
                };
                let offset = normal.dot(a);
                let (mut above, mut below) = (false, false);
                for p in points {
                    let s = normal.dot(*p) - offset;
                    above |= s > eps;
                    below |= s < -eps;
                    if above && below {
                        break;
                    }
                }
                if above && below {
                    continue;
                }
                let (normal, offset) = if above {
                    (-normal, -offset)
                } else {
                    (normal, offset)
                };
                if faces
                    .iter()
                    .any(|f| f.normal.dot(normal) > 1.0 - 1e-4 && (f.offset - offset).abs() <= eps)
                {
                    continue;
                }
                faces.push(HullFace {
                    normal,
                    offset,
                    vertices: face_polygon(points, normal, offset, eps),
                });
            }
        }
    }
    faces
}

fn face_polygon(points: &[Vec3], normal: Vec3, offset: f32, eps: f32) -> Vec<Vec3> {
    let mut verts: Vec<Vec3> = Vec::new();
    for p in points {
        if (normal.dot(*p) - offset).abs() <= eps && !verts.iter().any(|v| v.distance(*p) <= eps) {
            verts.push(*p);
        }
    }
    let center = verts.iter().copied().sum::<Vec3>() / verts.len().max(1) as f32;
    let u = (verts[0] - center).try_normalize().unwrap_or(normal.any_orthonormal_vector());
    let v = normal.cross(u);
    verts.sort_by(|a, b| {
        let da = *a - center;
        let db = *b - center;
        let ta = da.dot(v).atan2(da.dot(u));
        let tb = db.dot(v).atan2(db.dot(u));
        ta.total_cmp(&tb)
    });
    verts
}

fn hull_volume(points: &[Vec3]) -> f32 {
    let faces = hull_faces(points);
    if faces.is_empty() {
        return 0.0;
    }
    let inner = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    faces
        .iter()
        .map(|f| {
            let v = &f.vertices;
            let area: f32 = (1..v.len().saturating_sub(1))
                .map(|i| 0.5 * (v[i] - v[0]).cross(v[i + 1] - v[0]).dot(f.normal))
                .sum();
            area * (f.offset - f.normal.dot(inner)) / 3.0
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube_points() -> Vec<Vec3> {
        let mut points = Vec::new();
        for x in [-0.5, 0.5] {
            for y in [-0.5, 0.5] {
                for z in [-0.5, 0.5] {
                    points.push(Vec3::new(x, y, z));
                }
            }
        }
        points
    }

    #[test]
    fn clamp_scale_uses_magnitude_with_floor() {
        let s = clamp_scale(Vec3::new(-2.0, 0.0, 0.001));
        assert_eq!(s, Vec3::new(2.0, MIN_SCALE, MIN_SCALE));
    }

    #[test]
    fn analytic_volumes() {
        assert_relative_eq!(ShapeGeometry::cuboid(Vec3::new(1.0, 2.0, 3.0)).volume(), 6.0);
        assert_relative_eq!(
            ShapeGeometry::sphere(1.0).volume(),
            4.0 / 3.0 * PI,
            epsilon = 1e-5
        );
        assert_relative_eq!(
            ShapeGeometry::cylinder(1.0, 2.0).volume(),
            2.0 * PI,
            epsilon = 1e-5
        );
        assert_relative_eq!(ShapeGeometry::cone(1.0, 3.0).volume(), PI, epsilon = 1e-5);
        assert_eq!(ShapeGeometry::Null.volume(), 0.0);
    }

    #[test]
    fn hull_of_cube_has_six_faces_and_unit_volume() {
        let hull = ShapeGeometry::convex_hull(unit_cube_points());
        let mut faces = 0;
        hull.debug_faces(&mut |f| {
            assert_eq!(f.len(), 4);
            faces += 1;
        });
        assert_eq!(faces, 6);
        assert_relative_eq!(hull.volume(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn hull_containment() {
        let hull = ShapeGeometry::convex_hull(unit_cube_points());
        assert!(hull.contains_local_point(Vec3::ZERO));
        assert!(hull.contains_local_point(Vec3::new(0.49, -0.49, 0.0)));
        assert!(!hull.contains_local_point(Vec3::new(0.6, 0.0, 0.0)));
    }

    #[test]
    fn degenerate_hull_is_empty() {
        let flat = ShapeGeometry::convex_hull(vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
        // A single triangle encloses no volume.
        assert_relative_eq!(flat.volume(), 0.0, epsilon = 1e-6);
        assert!(ShapeGeometry::convex_hull(Vec::new()).local_aabb().is_none());
    }

    #[test]
    fn scaled_box_and_sphere() {
        let b = ShapeGeometry::cuboid(Vec3::ONE).scaled(Vec3::new(2.0, -3.0, 4.0));
        assert_eq!(b, ShapeGeometry::cuboid(Vec3::new(2.0, 3.0, 4.0)));
        let s = ShapeGeometry::sphere(1.0).scaled(Vec3::new(1.0, 2.0, 0.5));
        assert_eq!(s, ShapeGeometry::sphere(2.0));
    }

    #[test]
    fn box_unit_inertia() {
        let i = ShapeGeometry::cuboid(Vec3::new(1.0, 2.0, 3.0)).unit_inertia();
        assert_relative_eq!(i.x, 13.0 / 12.0, epsilon = 1e-6);
        assert_relative_eq!(i.y, 10.0 / 12.0, epsilon = 1e-6);
        assert_relative_eq!(i.z, 5.0 / 12.0, epsilon = 1e-6);
    }

    #[test]
    fn cone_containment_narrows_towards_apex() {
        let cone = ShapeGeometry::cone(1.0, 2.0);
        assert!(cone.contains_local_point(Vec3::new(0.9, -0.99, 0.0)));
        assert!(!cone.contains_local_point(Vec3::new(0.9, 0.9, 0.0)));
    }

    #[test]
    fn half_submerged_box() {
        let b = ShapeGeometry::cuboid(Vec3::splat(2.0));
        // Water surface at y = 0.
        let sub = b.submersion(&Affine3A::IDENTITY, Vec4::new(0.0, 1.0, 0.0, 0.0), 8);
        assert_relative_eq!(sub.volume, 4.0, epsilon = 1e-4);
        assert_relative_eq!(sub.centroid.y, -0.5, epsilon = 1e-4);
    }

    #[test]
    fn submersion_follows_placement() {
        let b = ShapeGeometry::cuboid(Vec3::splat(2.0));
        let above = Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let sub = b.submersion(&above, Vec4::new(0.0, 1.0, 0.0, 0.0), 8);
        assert_eq!(sub, Submersion::default());
    }

    #[test]
    fn round_shapes_emit_faces() {
        for shape in [
            ShapeGeometry::sphere(1.0),
            ShapeGeometry::cylinder(1.0, 1.0),
            ShapeGeometry::capsule(0.5, 1.0),
            ShapeGeometry::cone(1.0, 1.0),
        ] {
            let mut count = 0;
            shape.debug_faces(&mut |f| {
                assert!(f.len() >= 3);
                count += 1;
            });
            assert!(count > 0, "{} produced no faces", shape.kind_name());
        }
        let mut none = true;
        ShapeGeometry::Null.debug_faces(&mut |_| none = false);
        assert!(none);
    }

    #[test]
    fn buoyancy_of_half_submerged_cube() {
        let cube = ShapeGeometry::cuboid(Vec3::ONE);
        let gravity = Vec3::new(0.0, -9.8, 0.0);
        // Water surface at y = 0, cube centered on it.
        let (force, torque) = cube.buoyancy(
            &Affine3A::IDENTITY,
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            1000.0,
            gravity,
            Vec3::ZERO,
        );
        assert_relative_eq!(force.y, 4900.0, max_relative = 0.02);
        assert_relative_eq!(torque.length(), 0.0, epsilon = 1.0);

        let (force, _) = cube.buoyancy(
            &Affine3A::from_translation(Vec3::Y * 5.0),
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            1000.0,
            gravity,
            Vec3::ZERO,
        );
        assert_eq!(force, Vec3::ZERO);
    }

    #[test]
    fn placed_faces_are_flat_and_moved() {
        let cube = ShapeGeometry::cuboid(Vec3::ONE);
        let mut faces = 0;
        let mut max_x = f32::MIN;
        cube.placed_faces(
            &Affine3A::from_translation(Vec3::X * 10.0),
            Vec3::ONE,
            &mut |buffer, count| {
                assert_eq!(buffer.len(), count * 3);
                faces += 1;
                for v in buffer.chunks_exact(3) {
                    max_x = max_x.max(v[0]);
                }
            },
        );
        assert_eq!(faces, 6);
        assert_relative_eq!(max_x, 10.5);
    }
}
