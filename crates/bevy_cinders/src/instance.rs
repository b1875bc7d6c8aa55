//! Runtime state of instances, emitters and particles.

use bevy::prelude::*;
use bitflags::bitflags;

use crate::animation::{AnimationData, EmitterStateChangedFn};
use crate::asset::{EmitterData, EmitterKey};
use crate::hashing::hash_str;
use crate::prototype::PrototypeHandle;
use crate::render_data::EmitterRenderData;
use crate::rng::rand11;
use crate::transform::UniformTransform;

/// Lifecycle of an emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitterState {
    /// Not spawning and no living particles.
    #[default]
    Sleeping,
    /// Started, waiting out the start delay.
    Prespawn,
    /// Actively spawning particles.
    Spawning,
    /// Done spawning; living particles drain out.
    Postspawn,
}

/// Sort key: quantized relative lifetime in the high 16 bits, the stable
/// particle index in the low 16 bits to break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SortKey(pub u32);

impl SortKey {
    #[inline]
    pub fn new(life_time: u16, index: u16) -> Self {
        Self((life_time as u32) << 16 | index as u32)
    }
}

/// Plain per-particle state.
///
/// Position and rotation are in emitter or world space depending on the
/// emission space of the emitter that spawned the particle.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub position: Vec3,
    pub source_rotation: Quat,
    pub rotation: Quat,
    pub velocity: Vec3,
    /// Time left before the particle dies.
    pub time_left: f32,
    pub max_life_time: f32,
    /// Reciprocal of `max_life_time`.
    pub oo_max_life_time: f32,
    /// `[-1, 1]` factor combined with property spreads by modifiers.
    pub spread_factor: f32,
    pub source_size: f32,
    pub source_color: Vec4,
    pub color: Vec4,
    pub scale: Vec3,
    pub source_stretch_x: f32,
    pub source_stretch_y: f32,
    pub stretch_x: f32,
    pub stretch_y: f32,
    pub sort_key: SortKey,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            source_rotation: Quat::IDENTITY,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            time_left: 0.0,
            max_life_time: 0.0,
            oo_max_life_time: 0.0,
            spread_factor: 0.0,
            source_size: 0.0,
            source_color: Vec4::ZERO,
            color: Vec4::ZERO,
            scale: Vec3::ZERO,
            source_stretch_x: 0.0,
            source_stretch_y: 0.0,
            stretch_x: 0.0,
            stretch_y: 0.0,
            sort_key: SortKey::default(),
        }
    }
}

bitflags! {
    /// One-shot warnings and dirty bits carried by each emitter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EmitterFlags: u16 {
        /// The fetch-animation failure was already reported.
        const FETCH_ANIM_WARNING = 1 << 0;
        /// `last_position` holds a valid previous-frame position.
        const LAST_POSITION_SET = 1 << 1;
        /// A looping emitter should finish its current cycle and stop.
        const RETIRING = 1 << 2;
        /// The render-data fingerprint must be recomputed.
        const NEEDS_REHASH = 1 << 3;
        /// The vertex-buffer overflow was already reported.
        const RENDER_WARNING = 1 << 4;
        /// The particle-budget exhaustion was already reported.
        const OUT_OF_PARTICLES_WARNING = 1 << 5;
    }
}

/// One running emitter inside an instance.
#[derive(Debug, Default)]
pub struct Emitter {
    pub id_hash: u64,
    pub particles: Vec<Particle>,
    pub animation: AnimationData,
    pub render_data: EmitterRenderData,
    /// One-frame estimate of the emitter's world-space velocity.
    pub velocity: Vec3,
    pub last_position: Vec3,
    pub vertex_index: u32,
    pub vertex_count: u32,
    pub timer: f32,
    /// Fractional spawn debt carried between frames.
    pub particles_to_spawn: f32,
    pub original_seed: u32,
    pub seed: u32,
    pub state: EmitterState,
    /// Duration with the per-instance spread applied at creation.
    pub duration: f32,
    /// Start delay with the per-instance spread applied at creation.
    pub start_delay: f32,
    /// Spawn-rate spread rolled once at creation and held for the emitter's
    /// whole life.
    pub spawn_rate_spread: f32,
    pub flags: EmitterFlags,
}

impl Emitter {
    pub(crate) fn new(desc: &EmitterData, original_seed: u32) -> Self {
        let mut emitter = Emitter {
            original_seed,
            seed: original_seed,
            ..Default::default()
        };
        emitter.reinit(desc);
        emitter
    }

    /// (Re)derives description-bound state, keeping the original seed so the
    /// rolled spreads come out the same every time.
    pub(crate) fn reinit(&mut self, desc: &EmitterData) {
        self.id_hash = hash_str(&desc.id);
        let capacity = desc.max_particle_count as usize;
        self.particles.truncate(capacity);
        self.particles
            .reserve_exact(capacity - self.particles.len());
        let mut seed = self.original_seed;
        self.duration = desc.duration + rand11(&mut seed) * desc.duration_spread;
        self.start_delay = desc.start_delay + rand11(&mut seed) * desc.start_delay_spread;
        let spawn_rate_spread = desc
            .property(EmitterKey::SpawnRate)
            .map(|p| p.spread)
            .unwrap_or(0.0);
        self.spawn_rate_spread = rand11(&mut seed) * spawn_rate_spread;
    }

    /// Back to the just-created state: particles gone, constants gone, seed
    /// rewound. Duration, delay and spawn-rate spread keep their rolled
    /// values.
    pub(crate) fn reset(&mut self) {
        self.particles.clear();
        self.animation = AnimationData::default();
        self.render_data = EmitterRenderData::default();
        self.velocity = Vec3::ZERO;
        self.last_position = Vec3::ZERO;
        self.vertex_index = 0;
        self.vertex_count = 0;
        self.timer = 0.0;
        self.particles_to_spawn = 0.0;
        self.state = EmitterState::Sleeping;
        self.flags = EmitterFlags::empty();
        self.seed = self.original_seed;
    }

    pub fn is_sleeping(&self) -> bool {
        self.state == EmitterState::Sleeping
    }

    /// Looping emitters act like once emitters while retiring.
    pub(crate) fn is_looping(&self, desc: &EmitterData) -> bool {
        !self.flags.contains(EmitterFlags::RETIRING) && desc.mode == crate::asset::PlayMode::Loop
    }
}

/// One running effect: a bag of emitters plus its world transform.
pub struct Instance {
    pub emitters: Vec<Emitter>,
    pub num_awake_emitters: u32,
    pub world_transform: UniformTransform,
    pub prototype: PrototypeHandle,
    pub state_changed: Option<EmitterStateChangedFn>,
    /// Accumulated non-sleeping play time, used to fast-forward on reload.
    pub play_time: f32,
    pub generation: u16,
    pub scale_along_z: bool,
}

impl Instance {
    pub(crate) fn new(prototype: PrototypeHandle) -> Self {
        Self {
            emitters: Vec::new(),
            num_awake_emitters: 0,
            world_transform: UniformTransform::IDENTITY,
            prototype,
            state_changed: None,
            play_time: 0.0,
            generation: 0,
            scale_along_z: false,
        }
    }

    pub fn is_sleeping(&self) -> bool {
        self.emitters.iter().all(Emitter::is_sleeping)
    }
}

/// Moves an emitter to a new state and reports the change through the
/// optional instance callback, keeping the awake-emitter count in step.
pub(crate) fn set_emitter_state(
    emitter: &mut Emitter,
    state_changed: &mut Option<EmitterStateChangedFn>,
    num_awake_emitters: &mut u32,
    state: EmitterState,
) {
    let old_state = emitter.state;
    emitter.state = state;
    if state != old_state {
        if let Some(callback) = state_changed {
            match state {
                EmitterState::Prespawn => *num_awake_emitters += 1,
                EmitterState::Sleeping => {
                    *num_awake_emitters = num_awake_emitters.saturating_sub(1)
                }
                _ => {}
            }
            callback(*num_awake_emitters, emitter.id_hash, state);
        }
    }
}
