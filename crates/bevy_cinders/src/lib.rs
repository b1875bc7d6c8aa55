//! **Cinders** is a CPU particle FX runtime for the
//! [Bevy game engine](https://bevyengine.org/): declarative effect
//! descriptions are compiled into shared prototypes, instantiated through
//! stable 32-bit handles, and simulated deterministically on the CPU. Each
//! frame the runtime spawns, ages, modifies and sorts particles, then
//! writes interleaved vertex data into a caller-owned buffer for whatever
//! renderer the host plugs in.
//!
//! # Getting started
//!
//! Add [`CindersPlugin`] to your Bevy app:
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_cinders::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins((DefaultPlugins, CindersPlugin::default()))
//!         .run();
//! }
//! ```
//!
//! Spawn an effect by loading a `.particlefx.ron` asset:
//!
//! ```
//! use bevy::prelude::*;
//! use bevy_cinders::prelude::*;
//!
//! fn setup(mut commands: Commands, asset_server: Res<AssetServer>) {
//!     commands.spawn((
//!         ParticleEffect::new(asset_server.load("smoke.particlefx.ron")),
//!         Transform::from_xyz(0.0, 1.0, 0.0),
//!     ));
//! }
//! ```
//!
//! # Using the runtime without the plugin
//!
//! The whole simulation core is plain Rust behind [`ParticleContext`]; an
//! engine integration drives it directly:
//!
//! ```
//! use bevy::prelude::*;
//! use bevy_cinders::prelude::*;
//!
//! # fn description() -> ParticleFxAsset { ParticleFxAsset { emitters: vec![] } }
//! let mut context = ParticleContext::new(64, 1024);
//! let prototype = context.new_prototype(&description());
//! let instance = context.create_instance(prototype, None).unwrap();
//! context.start_instance(instance);
//! context.update(1.0 / 60.0, None);
//!
//! let mut buffer = vec![0u8; context.max_vertex_buffer_size(ParticleVertexLayout::GameObject)];
//! let mut cursor = 0;
//! context.generate_vertex_data(
//!     1.0 / 60.0,
//!     instance,
//!     0,
//!     Vec4::ONE,
//!     &mut buffer,
//!     &mut cursor,
//!     ParticleVertexLayout::GameObject,
//! );
//! ```
//!
//! # Concepts
//!
//! - **Prototype**: compiled, shareable form of a [`ParticleFxAsset`]
//!   description; spline properties become fixed tables of linear segments.
//! - **Instance**: one running copy of an effect, addressed by a
//!   generation-checked [`InstanceHandle`] that never dangles.
//! - **Emitter**: one particle source inside an effect, stepping through
//!   `Sleeping -> Prespawn -> Spawning -> Postspawn`.
//! - **Modifier**: acceleration, drag, radial or vortex force applied to
//!   every living particle each frame.
//!
//! Simulation is deterministic: for a fixed seed, transform and `dt`
//! sequence, particle state is bit-identical across runs.

/// Particle effect description schema and RON asset loading.
pub mod asset;

mod animation;
mod context;
mod debug_render;
mod hashing;
mod instance;
mod pool;
/// Convenience re-exports for common particle runtime types.
pub mod prelude;
mod prototype;
mod render_data;
mod rng;
mod runtime;
mod simulate;
mod sort;
mod spawning;
mod transform;
mod vertex;

use bevy::prelude::*;

use asset::{ParticleFxAsset, ParticleFxAssetLoader};
use runtime::{
    cleanup_particle_effects, setup_particle_effects, sync_effect_transforms,
    update_particle_context,
};

pub(crate) const EPSILON: f32 = 0.0001;
pub(crate) const DEG_RAD: f32 = std::f32::consts::PI / 180.0;
/// Motion-blur stretch factor: a 180 degree shutter at 60 fps.
pub(crate) const STRETCH_SCALING: f32 = (1.0 / 60.0) * 0.5;

/// Plugin that adds CPU particle FX support to a Bevy app.
///
/// Registers the description asset and loader, inserts a
/// [`ParticleFxContext`] resource sized by the plugin fields, and adds the
/// systems that create, move, tick and clean up ECS-driven effects.
pub struct CindersPlugin {
    /// Maximum number of concurrent effect instances.
    pub max_instance_count: u32,
    /// Particle ceiling across all instances.
    pub max_particle_count: u32,
}

impl Default for CindersPlugin {
    fn default() -> Self {
        Self {
            max_instance_count: 64,
            max_particle_count: 1024,
        }
    }
}

impl Plugin for CindersPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<ParticleFxAsset>()
            .init_asset_loader::<ParticleFxAssetLoader>();

        app.insert_resource(runtime::ParticleFxContext::new(
            self.max_instance_count,
            self.max_particle_count,
        ));

        app.add_systems(
            Update,
            (
                setup_particle_effects,
                sync_effect_transforms,
                update_particle_context,
                cleanup_particle_effects,
            )
                .chain(),
        );
    }
}

pub use animation::{
    AnimPlayback, AnimationData, EmitterStateChangedFn, FetchAnimationFn, FetchAnimationResult,
};
pub use asset::{
    BlendMode, EmissionSpace, EmitterData, EmitterKey, EmitterProperty, EmitterShape,
    ModifierData, ModifierKey, ModifierKind, ModifierProperty, ParticleKey, ParticleProperty,
    PlayMode, ParticleOrientation, SizeMode, SplinePoint,
};
pub use context::{
    GUI_MAX_PARTICLE_COUNT_KEY, InstanceStats, MAX_INSTANCE_COUNT_KEY, MAX_PARTICLE_COUNT_KEY,
    ParticleContext, Stats,
};
pub use debug_render::RenderLineFn;
pub use hashing::hash_str;
pub use instance::{Emitter, EmitterFlags, EmitterState, Instance, Particle, SortKey};
pub use pool::InstanceHandle;
pub use prototype::{
    EmitterPrototype, LinearSegment, PROPERTY_SAMPLE_COUNT, Property, Prototype, PrototypeHandle,
};
pub use render_data::{
    EmitterRenderData, MaterialRef, RenderConstant, TextureRef, TileSourceRef,
};
pub use runtime::{EffectInstance, ParticleEffect, ParticleFxContext};
pub use transform::UniformTransform;
pub use vertex::{
    GameObjectVertex, GenerateVertexDataResult, GuiVertex, ParticleVertexLayout,
    VERTICES_PER_PARTICLE, vertex_buffer_size,
};
