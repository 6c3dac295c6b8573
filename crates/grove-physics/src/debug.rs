//! Debug geometry extraction.
//!
//! Nothing here draws. Faces come out of the backend as flat vertex buffers;
//! these helpers move them into world space and turn them into line segments
//! a renderer can consume.

use bevy::math::Vec3;

use crate::backend::SimulationBackend;
use crate::body::{BodyHandle, Pose};

/// Faces with more vertices than this are truncated.
pub const MAX_FACE_VERTICES: usize = 64;

/// Rewrite a flat `[x, y, z, ...]` face through `pose` into `out`.
pub fn transform_face(pose: &Pose, face: &[f32], count: usize, out: &mut Vec<f32>) {
    out.clear();
    for v in face.chunks_exact(3).take(count.min(MAX_FACE_VERTICES)) {
        let p = pose.transform_point(Vec3::new(v[0], v[1], v[2]));
        out.extend_from_slice(&p.to_array());
    }
}

/// Closed outline of a face: one segment per edge, starting with the edge
/// from the last vertex back to the first.
pub fn face_edges(face: &[f32], count: usize) -> Vec<[Vec3; 2]> {
    let vertices: Vec<Vec3> = face
        .chunks_exact(3)
        .take(count.min(MAX_FACE_VERTICES))
        .map(|v| Vec3::new(v[0], v[1], v[2]))
        .collect();
    if vertices.len() < 2 {
        return Vec::new();
    }
    let mut edges = Vec::with_capacity(vertices.len());
    let mut i0 = vertices.len() - 1;
    for (i1, &p1) in vertices.iter().enumerate() {
        edges.push([vertices[i0], p1]);
        i0 = i1;
    }
    edges
}

/// World-space axes of a body, drawn from its center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GizmoAxes {
    pub origin: Vec3,
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

/// Axes for `handle`, or `None` when the body is not live or its
/// descriptor did not ask for a gizmo.
pub fn body_gizmo_axes(handle: &BodyHandle, backend: &dyn SimulationBackend) -> Option<GizmoAxes> {
    if !handle.is_live() || !handle.show_gizmo() {
        return None;
    }
    let pose = Pose::new(handle.position(backend), handle.rotation(backend));
    let origin = pose.transform_point(handle.center_of_mass(backend));
    let scale = handle.gizmo_scale();
    Some(GizmoAxes {
        origin,
        x: origin + pose.rotation * Vec3::X * scale,
        y: origin + pose.rotation * Vec3::Y * scale,
        z: origin + pose.rotation * Vec3::Z * scale,
    })
}

/// Accumulates world-space line segments from face callbacks.
#[derive(Debug, Default, Clone)]
pub struct DebugLines {
    pub segments: Vec<[Vec3; 2]>,
    pub faces: usize,
}

impl DebugLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_face(&mut self, face: &[f32], count: usize) {
        self.segments.extend(face_edges(face, count));
        self.faces += 1;
    }

    pub fn push_gizmo(&mut self, axes: &GizmoAxes) {
        self.segments.push([axes.origin, axes.x]);
        self.segments.push([axes.origin, axes.y]);
        self.segments.push([axes.origin, axes.z]);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;

    const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    #[test]
    fn face_edges_close_the_loop() {
        let edges = face_edges(&TRIANGLE, 3);
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0], [Vec3::Y, Vec3::ZERO]);
        assert_eq!(edges[1], [Vec3::ZERO, Vec3::X]);
        assert_eq!(edges[2], [Vec3::X, Vec3::Y]);
    }

    #[test]
    fn face_edges_respects_count() {
        assert_eq!(face_edges(&TRIANGLE, 2).len(), 2);
        assert!(face_edges(&TRIANGLE, 1).is_empty());
        assert!(face_edges(&[], 0).is_empty());
    }

    #[test]
    fn transform_face_applies_pose() {
        let pose = Pose::new(Vec3::Z, Quat::from_rotation_z(std::f32::consts::PI));
        let mut out = Vec::new();
        transform_face(&pose, &TRIANGLE, 3, &mut out);
        assert_eq!(out.len(), 9);
        assert!((out[3] + 1.0).abs() < 1e-6);
        assert!((out[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn debug_lines_collects_faces() {
        let mut lines = DebugLines::new();
        lines.push_face(&TRIANGLE, 3);
        lines.push_gizmo(&GizmoAxes {
            origin: Vec3::ZERO,
            x: Vec3::X,
            y: Vec3::Y,
            z: Vec3::Z,
        });
        assert_eq!(lines.faces, 1);
        assert_eq!(lines.segments.len(), 6);
    }
}
