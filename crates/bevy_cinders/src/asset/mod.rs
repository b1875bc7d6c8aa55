mod spline;
pub(crate) mod serde_helpers;

pub use spline::{EmitterKey, ModifierKey, ParticleKey, SplinePoint, sample_spline};

use bevy::{
    asset::{AssetLoader, LoadContext, io::Reader},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_helpers::*;

#[derive(Default, TypePath)]
pub struct ParticleFxAssetLoader;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ParticleFxAssetLoaderError {
    #[error("Could not load asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl AssetLoader for ParticleFxAssetLoader {
    type Asset = ParticleFxAsset;
    type Settings = ();
    type Error = ParticleFxAssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &(),
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let asset = ron::de::from_bytes::<ParticleFxAsset>(&bytes)?;
        Ok(asset)
    }

    fn extensions(&self) -> &[&str] {
        &["particlefx.ron"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum PlayMode {
    #[default]
    Once,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum EmissionSpace {
    /// Particles are spawned in world space and detach from the emitter.
    #[default]
    World,
    /// Particles live in emitter space and follow the instance transform.
    Emitter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum EmitterShape {
    #[default]
    Circle,
    Sphere,
    Cone,
    TwoDCone,
    Box,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum ParticleOrientation {
    /// Identity rotation.
    #[default]
    Default,
    /// Rotate `+Y` onto the spawn direction.
    InitialDirection,
    /// Follow the velocity direction during simulation.
    MovementDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum SizeMode {
    #[default]
    Manual,
    /// Take quad extents from the animation's per-tile dimensions.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, Reflect)]
pub enum BlendMode {
    #[default]
    Alpha,
    Add,
    /// Deprecated; compiled as [`BlendMode::Add`].
    AddAlpha,
    Mult,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Reflect)]
pub enum ModifierKind {
    #[default]
    Acceleration,
    Drag,
    Radial,
    Vortex,
}

/// A spline-valued emitter property with a symmetric random spread.
#[derive(Debug, Clone, Serialize, Deserialize, Reflect)]
pub struct EmitterProperty {
    pub key: EmitterKey,
    pub points: Vec<SplinePoint>,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub spread: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Reflect)]
pub struct ParticleProperty {
    pub key: ParticleKey,
    pub points: Vec<SplinePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Reflect)]
pub struct ModifierProperty {
    pub key: ModifierKey,
    pub points: Vec<SplinePoint>,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub spread: f32,
}

/// A force-like influence applied to every living particle each frame.
#[derive(Debug, Clone, Serialize, Deserialize, Reflect)]
pub struct ModifierData {
    pub kind: ModifierKind,
    #[serde(default, skip_serializing_if = "is_zero_vec3")]
    pub position: Vec3,
    #[serde(default = "identity_quat", skip_serializing_if = "is_identity_quat")]
    pub rotation: Quat,
    /// Drag only: damp the velocity component along the modifier's X axis
    /// instead of the full velocity.
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_direction: bool,
    #[serde(default)]
    pub properties: Vec<ModifierProperty>,
}

impl Default for ModifierData {
    fn default() -> Self {
        Self {
            kind: ModifierKind::default(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            use_direction: false,
            properties: Vec::new(),
        }
    }
}

impl ModifierData {
    /// First control-point value of a modifier property, or 0 if absent.
    pub fn first_point_value(&self, key: ModifierKey) -> f32 {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.points.first())
            .map(|p| p.y)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Reflect)]
pub struct EmitterData {
    pub id: String,
    #[serde(default)]
    pub mode: PlayMode,
    #[serde(default)]
    pub duration: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub duration_spread: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub start_delay: f32,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub start_delay_spread: f32,
    #[serde(default)]
    pub space: EmissionSpace,
    #[serde(default, skip_serializing_if = "is_zero_vec3")]
    pub position: Vec3,
    #[serde(default = "identity_quat", skip_serializing_if = "is_identity_quat")]
    pub rotation: Quat,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub inherit_velocity: f32,
    #[serde(default = "default_max_particle_count")]
    pub max_particle_count: u32,
    #[serde(default)]
    pub shape: EmitterShape,
    #[serde(default)]
    pub orientation: ParticleOrientation,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stretch_with_velocity: bool,
    #[serde(default)]
    pub size_mode: SizeMode,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub material: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub tile_source: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub animation: String,
    #[serde(default)]
    pub properties: Vec<EmitterProperty>,
    #[serde(default)]
    pub particle_properties: Vec<ParticleProperty>,
    #[serde(default)]
    pub modifiers: Vec<ModifierData>,
}

fn default_max_particle_count() -> u32 {
    128
}

impl Default for EmitterData {
    fn default() -> Self {
        Self {
            id: "emitter".to_string(),
            mode: PlayMode::Once,
            duration: 0.0,
            duration_spread: 0.0,
            start_delay: 0.0,
            start_delay_spread: 0.0,
            space: EmissionSpace::World,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            inherit_velocity: 0.0,
            max_particle_count: default_max_particle_count(),
            shape: EmitterShape::Circle,
            orientation: ParticleOrientation::Default,
            stretch_with_velocity: false,
            size_mode: SizeMode::Manual,
            blend_mode: BlendMode::Alpha,
            material: String::new(),
            tile_source: String::new(),
            animation: String::new(),
            properties: Vec::new(),
            particle_properties: Vec::new(),
            modifiers: Vec::new(),
        }
    }
}

impl EmitterData {
    pub fn property(&self, key: EmitterKey) -> Option<&EmitterProperty> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// First control-point value of an emitter property, or 0 if absent.
    /// Shape extents read this for outlines without running the sampler.
    pub fn first_point_value(&self, key: EmitterKey) -> f32 {
        self.property(key)
            .and_then(|p| p.points.first())
            .map(|p| p.y)
            .unwrap_or(0.0)
    }
}

/// A declarative particle effect: an ordered set of emitters.
#[derive(Asset, TypePath, Debug, Clone, Serialize, Deserialize)]
pub struct ParticleFxAsset {
    pub emitters: Vec<EmitterData>,
}
