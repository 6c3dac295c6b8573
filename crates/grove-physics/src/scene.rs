//! Scene-graph capability and the arena scene shipped with the crate.
//!
//! The physics layer only needs to walk the hierarchy, read and write local
//! transforms, and read the physics descriptors on each node. Anything that
//! can answer those questions implements [`SceneGraph`].

use bevy::math::{Affine3A, Quat, Vec3};
use bevy::prelude::Resource;

use grove_core::ResourceError;

use crate::components::{ColliderDesc, JointDesc, RigidBodyDesc};

// ---------------------------------------------------------------------------
// NodeId / LocalTransform
// ---------------------------------------------------------------------------

/// Stable identifier of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Translation, rotation and scale relative to the parent node.
///
/// Rotations are stored scalar-last (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl LocalTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub const fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub const fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Component categories a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    RigidBody,
    Collider,
    Joint,
}

// ---------------------------------------------------------------------------
// SceneGraph
// ---------------------------------------------------------------------------

/// Read and write access to a node hierarchy.
pub trait SceneGraph {
    fn roots(&self) -> Vec<NodeId>;
    fn children(&self, node: NodeId) -> &[NodeId];
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn contains(&self, node: NodeId) -> bool;

    fn local_transform(&self, node: NodeId) -> Option<LocalTransform>;
    fn set_local_transform(&mut self, node: NodeId, transform: LocalTransform);

    fn rigid_body(&self, node: NodeId) -> Option<&RigidBodyDesc>;
    fn colliders(&self, node: NodeId) -> &[ColliderDesc];
    fn joints(&self, node: NodeId) -> &[JointDesc];

    fn has_component(&self, node: NodeId, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::RigidBody => self.rigid_body(node).is_some(),
            ComponentKind::Collider => !self.colliders(node).is_empty(),
            ComponentKind::Joint => !self.joints(node).is_empty(),
        }
    }

    /// First node carrying `kind`, starting at `node` and walking to the root.
    fn nearest_with(&self, node: NodeId, kind: ComponentKind) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.has_component(n, kind) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Composition of every local transform from the root down to `node`.
    fn world_transform(&self, node: NodeId) -> Affine3A {
        let mut affine = Affine3A::IDENTITY;
        let mut current = Some(node);
        while let Some(n) = current {
            if let Some(t) = self.local_transform(n) {
                affine = t.to_affine() * affine;
            }
            current = self.parent(n);
        }
        affine
    }

    /// World rotation of `node`, ignoring scale.
    fn world_rotation(&self, node: NodeId) -> Quat {
        let mut rotation = Quat::IDENTITY;
        let mut current = Some(node);
        while let Some(n) = current {
            if let Some(t) = self.local_transform(n) {
                rotation = t.rotation * rotation;
            }
            current = self.parent(n);
        }
        rotation
    }

    /// `node` and all of its descendants, parents before children.
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if !self.contains(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Every node, depth first from each root in order.
    fn depth_first(&self) -> Vec<NodeId> {
        self.roots()
            .into_iter()
            .flat_map(|root| self.subtree(root))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    transform: LocalTransform,
    rigid_body: Option<RigidBodyDesc>,
    colliders: Vec<ColliderDesc>,
    joints: Vec<JointDesc>,
}

/// Arena-backed scene graph. Node ids are never reused.
#[derive(Resource, Debug, Clone, Default)]
pub struct Scene {
    nodes: Vec<Option<Node>>,
    roots: Vec<NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, name: impl Into<String>, transform: LocalTransform) -> NodeId {
        let id = self.push(name.into(), None, transform);
        self.roots.push(id);
        id
    }

    pub fn spawn_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: LocalTransform,
    ) -> Result<NodeId, ResourceError> {
        if !self.contains(parent) {
            return Err(ResourceError::NodeNotFound(parent.0));
        }
        let id = self.push(name.into(), Some(parent), transform);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    pub fn insert_rigid_body(
        &mut self,
        node: NodeId,
        desc: RigidBodyDesc,
    ) -> Result<(), ResourceError> {
        let n = self
            .node_mut(node)
            .ok_or(ResourceError::NodeNotFound(node.0))?;
        n.rigid_body = Some(desc);
        Ok(())
    }

    /// Appends a collider and returns its index on the node.
    pub fn add_collider(
        &mut self,
        node: NodeId,
        desc: ColliderDesc,
    ) -> Result<usize, ResourceError> {
        let n = self
            .node_mut(node)
            .ok_or(ResourceError::NodeNotFound(node.0))?;
        n.colliders.push(desc);
        Ok(n.colliders.len() - 1)
    }

    pub fn collider_mut(&mut self, node: NodeId, index: usize) -> Option<&mut ColliderDesc> {
        self.node_mut(node)?.colliders.get_mut(index)
    }

    /// Appends a joint and returns its index on the node.
    pub fn add_joint(&mut self, node: NodeId, desc: JointDesc) -> Result<usize, ResourceError> {
        let n = self
            .node_mut(node)
            .ok_or(ResourceError::NodeNotFound(node.0))?;
        n.joints.push(desc);
        Ok(n.joints.len() - 1)
    }

    /// Removes `node` and its descendants. Returns the removed ids, parents
    /// first.
    pub fn remove(&mut self, node: NodeId) -> Vec<NodeId> {
        let removed = self.subtree(node);
        if let Some(parent) = self.parent(node) {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|c| *c != node);
            }
        } else {
            self.roots.retain(|r| *r != node);
        }
        for id in &removed {
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                *slot = None;
            }
        }
        removed
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|n| n.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, name: String, parent: Option<NodeId>, transform: LocalTransform) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            name,
            parent,
            children: Vec::new(),
            transform,
            rigid_body: None,
            colliders: Vec::new(),
            joints: Vec::new(),
        }));
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)?.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)?.as_mut()
    }
}

impl SceneGraph for Scene {
    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node).map_or(&[], |n| n.children.as_slice())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn local_transform(&self, node: NodeId) -> Option<LocalTransform> {
        self.node(node).map(|n| n.transform)
    }

    fn set_local_transform(&mut self, node: NodeId, transform: LocalTransform) {
        if let Some(n) = self.node_mut(node) {
            n.transform = transform;
        }
    }

    fn rigid_body(&self, node: NodeId) -> Option<&RigidBodyDesc> {
        self.node(node)?.rigid_body.as_ref()
    }

    fn colliders(&self, node: NodeId) -> &[ColliderDesc] {
        self.node(node).map_or(&[], |n| n.colliders.as_slice())
    }

    fn joints(&self, node: NodeId) -> &[JointDesc] {
        self.node(node).map_or(&[], |n| n.joints.as_slice())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
