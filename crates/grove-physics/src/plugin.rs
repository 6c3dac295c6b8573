//! The Bevy plugin wiring a [`PhysicsWorld`] into an app.

use std::marker::PhantomData;

use bevy::app::{App, Plugin, Startup, Update};
use bevy::prelude::{IntoScheduleConfigs, SystemSet};

use grove_core::WorldConfig;

use crate::backend::SimulationBackend;
use crate::driver::{start_world_system, step_world_system};
use crate::scene::Scene;
use crate::world::PhysicsWorld;

/// System sets used by the physics plugin.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicsSet {
    /// Sub-steps the simulation and writes poses back into the scene.
    Step,
}

/// Bevy plugin that owns a [`PhysicsWorld`] driven by backend `B`.
///
/// # Usage
///
/// ```ignore
/// app.add_plugins(GrovePhysicsPlugin::<RapierBackend>::new(WorldConfig::default()));
/// ```
///
/// Inserts the [`WorldConfig`] and an empty [`Scene`] unless either is
/// already present, then the world. The world starts in `Startup` with
/// whatever [`WorldConfig`] the app holds at that point and steps every
/// `Update` inside [`PhysicsSet::Step`].
pub struct GrovePhysicsPlugin<B> {
    config: WorldConfig,
    _backend: PhantomData<fn() -> B>,
}

impl<B> Default for GrovePhysicsPlugin<B> {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl<B> GrovePhysicsPlugin<B> {
    pub const fn new(config: WorldConfig) -> Self {
        Self {
            config,
            _backend: PhantomData,
        }
    }

    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }
}

impl<B: SimulationBackend + Default> Plugin for GrovePhysicsPlugin<B> {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<WorldConfig>() {
            app.insert_resource(self.config.clone());
        }
        app.init_resource::<Scene>()
            .insert_resource(PhysicsWorld::new(self.config.clone(), B::default()))
            .add_systems(Startup, start_world_system::<B>)
            .add_systems(Update, step_world_system::<B>.in_set(PhysicsSet::Step));
    }
}
