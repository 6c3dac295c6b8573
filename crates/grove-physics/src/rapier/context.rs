//! All rapier pipeline state for one simulation context.

use bevy::math::Vec3;
use rapier3d::prelude::{
    CCDSolver, Collider, ColliderHandle, ColliderSet, DefaultBroadPhase, GenericJoint,
    ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager, MultibodyJointSet,
    NarrowPhase, PhysicsPipeline, RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};

// ---------------------------------------------------------------------------
// RapierContext
// ---------------------------------------------------------------------------

/// Every rapier set and pipeline object of one world, stepped together.
pub struct RapierContext {
    // -- Rapier sets --
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,

    // -- Pipeline objects --
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub ccd_solver: CCDSolver,

    // -- Parameters --
    pub integration_parameters: IntegrationParameters,
    pub gravity: Vec3,

    /// Fixed body anchoring world-attached joints. Created on first use.
    ground: Option<RigidBodyHandle>,
}

impl RapierContext {
    /// Create an empty context with the given gravity and solver iterations.
    pub fn new(gravity: Vec3, solver_iterations: usize) -> Self {
        let integration_parameters = IntegrationParameters {
            num_solver_iterations: solver_iterations.max(1),
            ..IntegrationParameters::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            integration_parameters,
            gravity,
            ground: None,
        }
    }

    /// Run one sub-step of `dt` seconds, then clear user forces.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &(),
        );
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }

    pub fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    pub fn insert_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.collider_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            true,
        );
    }

    pub fn insert_joint(
        &mut self,
        body0: RigidBodyHandle,
        body1: Option<RigidBodyHandle>,
        joint: GenericJoint,
    ) -> ImpulseJointHandle {
        let body1 = match body1 {
            Some(handle) => handle,
            None => self.ground(),
        };
        self.impulse_joint_set.insert(body0, body1, joint, true)
    }

    pub fn remove_joint(&mut self, handle: ImpulseJointHandle) {
        self.impulse_joint_set.remove(handle, true);
    }

    /// Number of bodies, excluding the internal ground anchor.
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len() - usize::from(self.ground.is_some())
    }

    fn ground(&mut self) -> RigidBodyHandle {
        match self.ground {
            Some(handle) => handle,
            None => {
                let handle = self.rigid_body_set.insert(RigidBodyBuilder::fixed().build());
                self.ground = Some(handle);
                handle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
