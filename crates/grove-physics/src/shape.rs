//! Lazy resolution of collider descriptors into native shapes.
//!
//! A collider on a node without its own rigid body belongs to the nearest
//! ancestor body. Its shape is created on that body's behalf, attached to it
//! and cached here until released. The first collider of a body node is the
//! body's own shape and is never cached.

use std::collections::HashMap;

use bevy::log::debug;
use bevy::math::{Affine3A, Mat4, Quat, Vec3};

use grove_core::{GroveError, ResourceError};

use crate::backend::{NativeShape, SimulationBackend};
use crate::body::BodyId;
use crate::geometry::clamp_scale;
use crate::registry::BodyRegistry;
use crate::scene::{ComponentKind, NodeId, SceneGraph};

/// One collider descriptor: the node and its index in the node's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderKey {
    pub node: NodeId,
    pub index: usize,
}

impl ColliderKey {
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }

    /// Whether this is the own shape of a body living on `owner`.
    pub fn is_own_shape_of(&self, owner: NodeId) -> bool {
        self.node == owner && self.index == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedShape {
    native: NativeShape,
    owner: BodyId,
}

/// Placement of a shape in its owning body's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Translation and rotation only.
    pub matrix: Mat4,
    /// Collider scale times inherited node scale, clamped away from zero.
    pub scale: Vec3,
}

/// Placement of the collider `key` relative to the body on `owner`.
///
/// Node transforms are composed from the collider node up to, but not
/// including, the owner, then the owner's own scale is applied on top.
/// Returns `None` when the descriptor does not exist or `owner` is not an
/// ancestor of (or equal to) the collider node.
pub fn collider_placement(
    scene: &dyn SceneGraph,
    owner: NodeId,
    key: ColliderKey,
) -> Option<Placement> {
    let desc = scene.colliders(key.node).get(key.index)?;

    let mut affine = Affine3A::IDENTITY;
    let mut rotation = Quat::IDENTITY;
    let mut scale = desc.scale;
    let mut current = key.node;
    while current != owner {
        let local = scene.local_transform(current)?;
        affine = local.to_affine() * affine;
        rotation = local.rotation * rotation;
        scale *= local.scale;
        current = scene.parent(current)?;
    }
    let owner_scale = scene.local_transform(owner)?.scale;
    affine = Affine3A::from_scale(owner_scale) * affine;
    scale *= owner_scale;

    let translation = affine.transform_point3(desc.position);
    let rotation = (rotation * desc.offset_rotation()).normalize();
    Some(Placement {
        matrix: Mat4::from_rotation_translation(rotation, translation),
        scale: clamp_scale(scale),
    })
}

// ---------------------------------------------------------------------------
// ShapeResolver
// ---------------------------------------------------------------------------

/// Cache of shapes created on behalf of ancestor bodies.
#[derive(Debug, Default)]
pub struct ShapeResolver {
    cache: HashMap<ColliderKey, CachedShape>,
}

impl ShapeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The native shape for `key`, creating it if needed.
    ///
    /// `Ok(None)` means "not yet available": the descriptor has no live
    /// ancestor body yet. Call again once one exists.
    pub fn resolve(
        &mut self,
        scene: &dyn SceneGraph,
        registry: &BodyRegistry,
        backend: &mut dyn SimulationBackend,
        key: ColliderKey,
    ) -> Result<Option<NativeShape>, GroveError> {
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached.native));
        }
        let Some(desc) = scene.colliders(key.node).get(key.index) else {
            return Ok(None);
        };
        let Some(owner_node) = scene.nearest_with(key.node, ComponentKind::RigidBody) else {
            return Ok(None);
        };
        let Some(owner) = registry.by_node(owner_node) else {
            return Ok(None);
        };
        let Some(body) = owner.native() else {
            return Ok(None);
        };

        if key.is_own_shape_of(owner_node) {
            return Ok(owner.shape());
        }

        let shape = backend.create_shape(&desc.geometry)?;
        if let Err(e) = backend.attach_shape(shape, body) {
            backend.destroy_shape(shape);
            return Err(e.into());
        }
        self.cache.insert(
            key,
            CachedShape {
                native: shape,
                owner: owner.id(),
            },
        );
        Self::push_placement(scene, backend, shape, owner_node, key)?;
        debug!(
            "Resolved {} collider {:?} onto body {:?}",
            desc.geometry.kind_name(),
            key,
            owner.id()
        );
        Ok(Some(shape))
    }

    /// Recompute the placement of `key` and push it to its native shape.
    ///
    /// Does nothing for colliders that are not resolved.
    pub fn sync_placement(
        &self,
        scene: &dyn SceneGraph,
        registry: &BodyRegistry,
        backend: &mut dyn SimulationBackend,
        key: ColliderKey,
    ) -> Result<(), ResourceError> {
        let Some(owner_node) = scene.nearest_with(key.node, ComponentKind::RigidBody) else {
            return Ok(());
        };
        let shape = if key.is_own_shape_of(owner_node) {
            registry.by_node(owner_node).and_then(|h| h.shape())
        } else {
            self.cached(key)
        };
        match shape {
            Some(shape) => Self::push_placement(scene, backend, shape, owner_node, key),
            None => Ok(()),
        }
    }

    fn push_placement(
        scene: &dyn SceneGraph,
        backend: &mut dyn SimulationBackend,
        shape: NativeShape,
        owner: NodeId,
        key: ColliderKey,
    ) -> Result<(), ResourceError> {
        let Some(placement) = collider_placement(scene, owner, key) else {
            return Ok(());
        };
        backend.set_shape_matrix(shape, &placement.matrix.to_cols_array())?;
        backend.set_shape_scale(shape, placement.scale.to_array())
    }

    /// Destroy the cached shape of `key`, if any. Idempotent.
    pub fn release(&mut self, backend: &mut dyn SimulationBackend, key: ColliderKey) -> bool {
        match self.cache.remove(&key) {
            Some(cached) => {
                backend.destroy_shape(cached.native);
                true
            }
            None => false,
        }
    }

    /// Destroy every cached shape attached to `owner`.
    pub fn release_owned_by(&mut self, backend: &mut dyn SimulationBackend, owner: BodyId) {
        self.cache.retain(|_, cached| {
            if cached.owner == owner {
                backend.destroy_shape(cached.native);
                false
            } else {
                true
            }
        });
    }

    /// Release, resolve again and push the placement.
    pub fn recreate(
        &mut self,
        scene: &dyn SceneGraph,
        registry: &BodyRegistry,
        backend: &mut dyn SimulationBackend,
        key: ColliderKey,
    ) -> Result<Option<NativeShape>, GroveError> {
        self.release(backend, key);
        self.resolve(scene, registry, backend, key)
    }

    pub fn cached(&self, key: ColliderKey) -> Option<NativeShape> {
        self.cache.get(&key).map(|c| c.native)
    }

    /// Cached shapes attached to `owner`, in key order.
    pub fn owned_by(&self, owner: BodyId) -> Vec<NativeShape> {
        let mut owned: Vec<_> = self
            .cache
            .iter()
            .filter(|(_, c)| c.owner == owner)
            .map(|(k, c)| (*k, c.native))
            .collect();
        owned.sort_by_key(|(k, _)| *k);
        owned.into_iter().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ColliderDesc, RigidBodyDesc};
    use crate::geometry::ShapeGeometry;
    use crate::scene::{LocalTransform, Scene};
    use approx::assert_relative_eq;

    fn body_with_child_collider(
        child: LocalTransform,
        desc: ColliderDesc,
    ) -> (Scene, NodeId, NodeId) {
        let mut scene = Scene::new();
        let body = scene.spawn(
            "body",
            LocalTransform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
        );
        scene.insert_rigid_body(body, RigidBodyDesc::dynamic(1.0)).unwrap();
        let child = scene.spawn_child(body, "child", child).unwrap();
        scene.add_collider(child, desc).unwrap();
        (scene, body, child)
    }

    #[test]
    fn own_shape_key() {
        let key = ColliderKey::new(NodeId(3), 0);
        assert!(key.is_own_shape_of(NodeId(3)));
        assert!(!key.is_own_shape_of(NodeId(2)));
        assert!(!ColliderKey::new(NodeId(3), 1).is_own_shape_of(NodeId(3)));
    }

    #[test]
    fn placement_ignores_owner_pose() {
        let (scene, body, child) = body_with_child_collider(
            LocalTransform::from_translation(Vec3::Y),
            ColliderDesc::new(ShapeGeometry::sphere(0.5)).with_position(Vec3::Z),
        );
        let placement = collider_placement(&scene, body, ColliderKey::new(child, 0)).unwrap();
        let origin = placement.matrix.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 0.0);
        assert_relative_eq!(origin.y, 1.0);
        assert_relative_eq!(origin.z, 1.0);
        assert_eq!(placement.scale, Vec3::ONE);
    }

    #[test]
    fn placement_composes_rotation_and_scale() {
        let mut scene = Scene::new();
        let body = scene.spawn(
            "body",
            LocalTransform::IDENTITY.with_scale(Vec3::splat(2.0)),
        );
        scene.insert_rigid_body(body, RigidBodyDesc::dynamic(1.0)).unwrap();
        let child = scene
            .spawn_child(
                body,
                "child",
                LocalTransform::from_translation(Vec3::X)
                    .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
                    .with_scale(Vec3::new(1.0, 3.0, 1.0)),
            )
            .unwrap();
        scene
            .add_collider(
                child,
                ColliderDesc::new(ShapeGeometry::cuboid(Vec3::ONE))
                    .with_position(Vec3::X)
                    .with_scale(Vec3::new(0.5, 1.0, 1.0)),
            )
            .unwrap();

        let placement = collider_placement(&scene, body, ColliderKey::new(child, 0)).unwrap();
        // Offset X is rotated onto +Y inside the child, then everything is
        // scaled by the owner.
        let origin = placement.matrix.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(origin.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(placement.scale.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(placement.scale.y, 6.0, epsilon = 1e-6);
        assert_relative_eq!(placement.scale.z, 2.0, epsilon = 1e-6);

        let x = placement.matrix.transform_vector3(Vec3::X);
        assert_relative_eq!(x.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn placement_clamps_degenerate_scale() {
        let (scene, body, child) = body_with_child_collider(
            LocalTransform::IDENTITY.with_scale(Vec3::new(0.0, -2.0, 1.0)),
            ColliderDesc::new(ShapeGeometry::sphere(1.0)),
        );
        let placement = collider_placement(&scene, body, ColliderKey::new(child, 0)).unwrap();
        assert_relative_eq!(placement.scale.x, 0.01);
        assert_relative_eq!(placement.scale.y, 2.0);
    }

    #[test]
    fn placement_requires_owner_ancestor() {
        let (mut scene, _, child) = body_with_child_collider(
            LocalTransform::IDENTITY,
            ColliderDesc::new(ShapeGeometry::sphere(1.0)),
        );
        let stranger = scene.spawn("stranger", LocalTransform::IDENTITY);
        assert!(collider_placement(&scene, stranger, ColliderKey::new(child, 0)).is_none());
        assert!(collider_placement(&scene, child, ColliderKey::new(child, 1)).is_none());
    }
}
