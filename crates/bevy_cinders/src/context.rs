//! The particle context: scene-global runtime state and the public API the
//! host drives each frame.
//!
//! All entry points are called from one thread. Handles returned by
//! [`ParticleContext::create_instance`] stay safe forever: operations on a
//! destroyed or stale handle are no-ops.

use bevy::prelude::*;

use crate::animation::{
    AnimationData, EmitterStateChangedFn, FetchAnimationFn, FetchAnimationResult,
};
use crate::asset::{EmitterData, ParticleFxAsset};
use crate::instance::{
    Emitter, EmitterFlags, EmitterState, Instance, set_emitter_state,
};
use crate::pool::{InstanceHandle, InstancePool};
use crate::prototype::{EmitterPrototype, Prototype, PrototypeHandle};
use crate::render_data::{
    EmitterRenderData, MaterialRef, RenderConstant, TileSourceRef, emitter_world_transform,
    rehash_emitter, update_emitter_render_data,
};
use crate::rng::wall_clock_seed;
use crate::spawning::{self, EmitterUpdateContext};
use crate::vertex::{
    GenerateVertexDataResult, ParticleVertexLayout, vertex_buffer_size, warn_vertex_overflow,
    write_emitter_vertices,
};
use crate::{simulate, sort};

/// Config key for tweaking the maximum number of instances in a context.
pub const MAX_INSTANCE_COUNT_KEY: &str = "particle_fx.max_count";
/// Config key for tweaking the total maximum number of particles in a context.
pub const MAX_PARTICLE_COUNT_KEY: &str = "particle_fx.max_particle_count";
/// Config key cited in diagnostics when the GUI vertex layout is active.
pub const GUI_MAX_PARTICLE_COUNT_KEY: &str = "gui.max_particle_count";

/// Fixed step used when fast-forwarding emitters during a replay.
const REPLAY_DT: f32 = 1.0 / 60.0;

/// Context-wide particle statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Particles rendered by the last vertex generation pass.
    pub particles: u32,
    /// Configured particle ceiling.
    pub max_particles: u32,
}

/// Per-instance statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceStats {
    pub play_time: f32,
}

/// Scene-global particle runtime.
pub struct ParticleContext {
    prototypes: Vec<Option<Prototype>>,
    free_prototypes: Vec<u32>,
    instances: InstancePool,
    max_particle_count: u32,
    /// Per-creation seed offset so instances spawned the same frame differ.
    instance_seeding: u16,
    stats: Stats,
    warned_out_of_instances: bool,
    warned_stale_handle: bool,
}

impl ParticleContext {
    pub fn new(max_instance_count: u32, max_particle_count: u32) -> Self {
        Self {
            prototypes: Vec::new(),
            free_prototypes: Vec::new(),
            instances: InstancePool::new(max_instance_count),
            max_particle_count,
            instance_seeding: 0,
            stats: Stats::default(),
            warned_out_of_instances: false,
            warned_stale_handle: false,
        }
    }

    pub fn max_particle_count(&self) -> u32 {
        self.max_particle_count
    }

    pub fn set_max_particle_count(&mut self, max_particle_count: u32) {
        self.max_particle_count = max_particle_count;
    }

    /// Buffer bytes needed to render every particle the context allows.
    pub fn max_vertex_buffer_size(&self, layout: ParticleVertexLayout) -> usize {
        vertex_buffer_size(self.max_particle_count, layout)
    }

    // ---- prototypes ----

    /// Compiles a description and registers the prototype with the context.
    pub fn new_prototype(&mut self, asset: &ParticleFxAsset) -> PrototypeHandle {
        let prototype = Prototype::compile(asset);
        if let Some(slot) = self.free_prototypes.pop() {
            self.prototypes[slot as usize] = Some(prototype);
            PrototypeHandle(slot)
        } else {
            self.prototypes.push(Some(prototype));
            PrototypeHandle(self.prototypes.len() as u32 - 1)
        }
    }

    /// Rebuilds a prototype in place from a new description. Existing
    /// instances keep referring to it; call
    /// [`reload_instance`](Self::reload_instance) to refresh them.
    pub fn reload_prototype(&mut self, handle: PrototypeHandle, asset: &ParticleFxAsset) -> bool {
        match self.prototype_mut(handle) {
            Some(prototype) => {
                prototype.reload(asset);
                true
            }
            None => false,
        }
    }

    /// Unregisters a prototype. Instances still referring to it stop
    /// updating; destroy them first.
    pub fn delete_prototype(&mut self, handle: PrototypeHandle) {
        if let Some(slot) = self.prototypes.get_mut(handle.0 as usize)
            && slot.take().is_some()
        {
            self.free_prototypes.push(handle.0);
        }
    }

    pub fn prototype(&self, handle: PrototypeHandle) -> Option<&Prototype> {
        self.prototypes.get(handle.0 as usize)?.as_ref()
    }

    fn prototype_mut(&mut self, handle: PrototypeHandle) -> Option<&mut Prototype> {
        self.prototypes.get_mut(handle.0 as usize)?.as_mut()
    }

    pub fn emitter_count(&self, handle: PrototypeHandle) -> u32 {
        self.prototype(handle)
            .map(|p| p.emitters.len() as u32)
            .unwrap_or(0)
    }

    pub fn material_path(&self, handle: PrototypeHandle, emitter_index: usize) -> Option<&str> {
        self.prototype(handle)?
            .desc
            .emitters
            .get(emitter_index)
            .map(|e| e.material.as_str())
    }

    pub fn tile_source_path(&self, handle: PrototypeHandle, emitter_index: usize) -> Option<&str> {
        self.prototype(handle)?
            .desc
            .emitters
            .get(emitter_index)
            .map(|e| e.tile_source.as_str())
    }

    pub fn material(&self, handle: PrototypeHandle, emitter_index: usize) -> Option<MaterialRef> {
        self.prototype(handle)?.emitters.get(emitter_index)?.material
    }

    /// Assigns the host-resolved material reference for one emitter.
    pub fn set_material(
        &mut self,
        handle: PrototypeHandle,
        emitter_index: usize,
        material: Option<MaterialRef>,
    ) {
        if let Some(prototype) = self.prototype_mut(handle)
            && let Some(emitter) = prototype.emitters.get_mut(emitter_index)
        {
            emitter.material = material;
        }
    }

    pub fn tile_source(
        &self,
        handle: PrototypeHandle,
        emitter_index: usize,
    ) -> Option<TileSourceRef> {
        self.prototype(handle)?.emitters.get(emitter_index)?.tile_source
    }

    /// Assigns the host-resolved tile source reference for one emitter.
    pub fn set_tile_source(
        &mut self,
        handle: PrototypeHandle,
        emitter_index: usize,
        tile_source: Option<TileSourceRef>,
    ) {
        if let Some(prototype) = self.prototype_mut(handle)
            && let Some(emitter) = prototype.emitters.get_mut(emitter_index)
        {
            emitter.tile_source = tile_source;
        }
    }

    // ---- instance lifecycle ----

    /// Creates an instance of a prototype, seeding its emitters from the
    /// wall clock.
    pub fn create_instance(
        &mut self,
        prototype: PrototypeHandle,
        state_changed: Option<EmitterStateChangedFn>,
    ) -> Option<InstanceHandle> {
        self.create_instance_seeded(prototype, wall_clock_seed(), state_changed)
    }

    /// Creates an instance with an explicit base seed, for deterministic
    /// playback and tests.
    pub fn create_instance_seeded(
        &mut self,
        prototype: PrototypeHandle,
        seed_base: u32,
        state_changed: Option<EmitterStateChangedFn>,
    ) -> Option<InstanceHandle> {
        if self.instances.remaining() == 0 {
            if !self.warned_out_of_instances {
                self.warned_out_of_instances = true;
                warn!(
                    "Instance could not be created since the buffer is full ({}). Tweak \"{}\" in the config file.",
                    self.instances.capacity(),
                    MAX_INSTANCE_COUNT_KEY
                );
            }
            return None;
        }
        let Self {
            prototypes,
            instances,
            instance_seeding,
            ..
        } = self;
        let prototype_data = prototypes
            .get(prototype.0 as usize)
            .and_then(|p| p.as_ref())?;

        let mut instance = Box::new(Instance::new(prototype));
        instance.state_changed = state_changed;
        for (i, emitter_desc) in prototype_data.desc.emitters.iter().enumerate() {
            // Mix in the context seeding so instances spawned the same frame
            // don't look identical
            let original_seed = seed_base
                .wrapping_add(i as u32)
                .wrapping_add(*instance_seeding as u32);
            *instance_seeding = instance_seeding.wrapping_add(1);
            let mut emitter = Emitter::new(emitter_desc, original_seed);
            update_emitter_render_data(
                InstanceHandle::INVALID,
                i,
                &instance.world_transform,
                instance.scale_along_z,
                &mut emitter,
                emitter_desc,
                &prototype_data.emitters[i],
            );
            rehash_emitter(&mut emitter);
            instance.emitters.push(emitter);
        }
        let handle = instances.insert(instance)?;
        if let Some(instance) = instances.get_mut(handle) {
            for emitter in instance.emitters.iter_mut() {
                emitter.render_data.instance = handle;
            }
        }
        Some(handle)
    }

    /// Destroys an instance. Invalid or stale handles are a no-op.
    pub fn destroy_instance(&mut self, handle: InstanceHandle) {
        if !handle.is_valid() {
            return;
        }
        if self.instances.remove(handle).is_none() {
            self.warn_stale();
        }
    }

    fn warn_stale(&mut self) {
        if !self.warned_stale_handle {
            self.warned_stale_handle = true;
            warn!("Stale particle instance handle");
        }
    }

    fn instance_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        if !handle.is_valid() {
            return None;
        }
        if self.instances.get(handle).is_none() {
            self.warn_stale();
            return None;
        }
        self.instances.get_mut(handle)
    }

    /// Starts every emitter of the instance spawning.
    pub fn start_instance(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        let Instance {
            emitters,
            state_changed,
            num_awake_emitters,
            ..
        } = instance;
        for emitter in emitters.iter_mut() {
            start_emitter(emitter, state_changed, num_awake_emitters);
        }
    }

    /// Stops spawning; living particles keep simulating until they die.
    pub fn stop_instance(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        let Instance {
            emitters,
            state_changed,
            num_awake_emitters,
            ..
        } = instance;
        for emitter in emitters.iter_mut() {
            if emitter.state != EmitterState::Sleeping {
                set_emitter_state(
                    emitter,
                    state_changed,
                    num_awake_emitters,
                    EmitterState::Postspawn,
                );
            }
            emitter.flags.remove(EmitterFlags::RETIRING);
        }
    }

    /// Stops spawning at the closest convenient time: looping emitters
    /// finish their current cycle like a once emitter would.
    pub fn retire_instance(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        for emitter in instance.emitters.iter_mut() {
            emitter.flags.insert(EmitterFlags::RETIRING);
        }
    }

    /// Puts the instance back into its just-created state and annihilates
    /// any living particles.
    pub fn reset_instance(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        instance.play_time = 0.0;
        for emitter in instance.emitters.iter_mut() {
            emitter.reset();
        }
    }

    // ---- transform setters & queries ----

    pub fn set_position(&mut self, handle: InstanceHandle, position: Vec3) {
        if let Some(instance) = self.instance_mut(handle) {
            instance.world_transform.translation = position;
        }
    }

    pub fn set_rotation(&mut self, handle: InstanceHandle, rotation: Quat) {
        if let Some(instance) = self.instance_mut(handle) {
            instance.world_transform.rotation = rotation;
        }
    }

    pub fn set_scale(&mut self, handle: InstanceHandle, scale: f32) {
        if let Some(instance) = self.instance_mut(handle) {
            instance.world_transform.scale = scale;
        }
    }

    pub fn set_scale_along_z(&mut self, handle: InstanceHandle, scale_along_z: bool) {
        if let Some(instance) = self.instance_mut(handle) {
            instance.scale_along_z = scale_along_z;
        }
    }

    pub fn position(&self, handle: InstanceHandle) -> Vec3 {
        self.instances
            .get(handle)
            .map(|i| i.world_transform.translation)
            .unwrap_or(Vec3::ZERO)
    }

    /// An instance is sleeping when no emitter spawns and no particles live.
    /// Invalid handles count as sleeping.
    pub fn is_sleeping(&self, handle: InstanceHandle) -> bool {
        self.instances
            .get(handle)
            .map(Instance::is_sleeping)
            .unwrap_or(true)
    }

    pub fn instance_emitter_count(&self, handle: InstanceHandle) -> u32 {
        self.instances
            .get(handle)
            .map(|i| i.emitters.len() as u32)
            .unwrap_or(0)
    }

    /// Read access to one running emitter, e.g. for editors and tests.
    pub fn emitter(&self, handle: InstanceHandle, emitter_index: usize) -> Option<&Emitter> {
        self.instances.get(handle)?.emitters.get(emitter_index)
    }

    pub(crate) fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    // ---- per-frame update ----

    /// Advances every awake instance by `dt`: ages and spawns particles,
    /// applies modifiers, sorts, fetches animation data and refreshes the
    /// cached render descriptors.
    pub fn update(&mut self, dt: f32, mut fetch_animation: Option<&mut FetchAnimationFn>) {
        let total_live: u32 = self
            .instances
            .iter()
            .flat_map(|i| i.emitters.iter())
            .map(|e| e.particles.len() as u32)
            .sum();
        let mut global_budget = self.max_particle_count.saturating_sub(total_live);
        let max_particle_count = self.max_particle_count;

        let Self {
            prototypes,
            instances,
            ..
        } = self;
        for index in 0..instances.capacity() {
            let Some(instance) = instances.slot_mut(index) else {
                continue;
            };
            let Some(prototype) = prototypes
                .get(instance.prototype.0 as usize)
                .and_then(|p| p.as_ref())
            else {
                continue;
            };
            if instance.is_sleeping() {
                // keep the velocity estimate fresh and drop stale vertex
                // ranges so sleeping emitters are not rendered
                let Instance {
                    emitters,
                    world_transform,
                    ..
                } = instance;
                for (emitter, desc) in emitters.iter_mut().zip(&prototype.desc.emitters) {
                    emitter.vertex_count = 0;
                    spawning::update_emitter_velocity(world_transform, emitter, desc, dt);
                }
                continue;
            }
            let handle = InstanceHandle::new(instance.generation, index as u16);
            instance.play_time += dt;
            let Instance {
                emitters,
                world_transform,
                scale_along_z,
                state_changed,
                num_awake_emitters,
                ..
            } = instance;
            for (i, emitter) in emitters.iter_mut().enumerate() {
                let desc = &prototype.desc.emitters[i];
                let emitter_prototype = &prototype.emitters[i];
                spawning::update_emitter_velocity(world_transform, emitter, desc, dt);
                let mut ctx = EmitterUpdateContext {
                    world_transform: &*world_transform,
                    scale_along_z: *scale_along_z,
                    state_changed: &mut *state_changed,
                    num_awake_emitters: &mut *num_awake_emitters,
                    max_particle_count,
                };
                update_emitter(
                    &mut ctx,
                    emitter,
                    emitter_prototype,
                    desc,
                    dt,
                    &mut global_budget,
                );
                fetch_animation_data(
                    emitter,
                    emitter_prototype,
                    desc,
                    fetch_animation.as_deref_mut(),
                );
                update_emitter_render_data(
                    handle,
                    i,
                    world_transform,
                    *scale_along_z,
                    emitter,
                    desc,
                    emitter_prototype,
                );
                if emitter.flags.contains(EmitterFlags::NEEDS_REHASH) {
                    rehash_emitter(emitter);
                }
            }
        }
    }

    // ---- reload / replay ----

    /// Rebuilds the instance from its (possibly reloaded) prototype. With
    /// `replay`, emitters are reset and deterministically fast-forwarded to
    /// the instance's accumulated play time.
    pub fn reload_instance(&mut self, handle: InstanceHandle, replay: bool) {
        if !handle.is_valid() {
            return;
        }
        if self.instances.get(handle).is_none() {
            self.warn_stale();
            return;
        }
        let total_live: u32 = self
            .instances
            .iter()
            .flat_map(|i| i.emitters.iter())
            .map(|e| e.particles.len() as u32)
            .sum();
        let this_live: u32 = self
            .instances
            .get(handle)
            .map(|i| i.emitters.iter().map(|e| e.particles.len() as u32).sum())
            .unwrap_or(0);
        let elsewhere_live = total_live - this_live;
        let max_particle_count = self.max_particle_count;
        let Self {
            prototypes,
            instances,
            instance_seeding,
            ..
        } = self;
        let Some(instance) = instances.get_mut(handle) else {
            return;
        };
        let Some(prototype) = prototypes
            .get(instance.prototype.0 as usize)
            .and_then(|p| p.as_ref())
        else {
            return;
        };

        // the callback record does not survive a reload
        instance.state_changed = None;
        instance.num_awake_emitters = 0;

        let prototype_emitter_count = prototype.desc.emitters.len();
        // in-flight particles of removed emitters are dropped
        instance.emitters.truncate(prototype_emitter_count);
        while instance.emitters.len() < prototype_emitter_count {
            let i = instance.emitters.len();
            let original_seed = wall_clock_seed()
                .wrapping_add(i as u32)
                .wrapping_add(*instance_seeding as u32);
            *instance_seeding = instance_seeding.wrapping_add(1);
            instance
                .emitters
                .push(Emitter::new(&prototype.desc.emitters[i], original_seed));
        }
        for (emitter, desc) in instance.emitters.iter_mut().zip(&prototype.desc.emitters) {
            emitter.reinit(desc);
        }

        if replay {
            let mut max_play_time = 0.0f32;
            for (emitter, emitter_prototype) in
                instance.emitters.iter().zip(&prototype.emitters)
            {
                let time = calculate_replay_time(
                    emitter.duration,
                    emitter.start_delay,
                    emitter_prototype.max_particle_life_time,
                    instance.play_time,
                );
                max_play_time = max_play_time.max(time);
            }
            instance.play_time = max_play_time;
            for i in 0..prototype_emitter_count {
                let others: u32 = elsewhere_live
                    + instance
                        .emitters
                        .iter()
                        .enumerate()
                        .filter(|(k, _)| *k != i)
                        .map(|(_, e)| e.particles.len() as u32)
                        .sum::<u32>();
                let Instance {
                    emitters,
                    world_transform,
                    scale_along_z,
                    state_changed,
                    num_awake_emitters,
                    ..
                } = &mut *instance;
                let emitter = &mut emitters[i];
                emitter.reset();
                start_emitter(emitter, state_changed, num_awake_emitters);
                let mut ctx = EmitterUpdateContext {
                    world_transform: &*world_transform,
                    scale_along_z: *scale_along_z,
                    state_changed: &mut *state_changed,
                    num_awake_emitters: &mut *num_awake_emitters,
                    max_particle_count,
                };
                let mut timer = 0.0;
                while timer < max_play_time {
                    let mut budget = max_particle_count
                        .saturating_sub(others + emitter.particles.len() as u32);
                    update_emitter(
                        &mut ctx,
                        emitter,
                        &prototype.emitters[i],
                        &prototype.desc.emitters[i],
                        REPLAY_DT,
                        &mut budget,
                    );
                    timer += REPLAY_DT;
                }
            }
        }

        for emitter in instance.emitters.iter_mut() {
            rehash_emitter(emitter);
        }
    }

    // ---- rendering ----

    /// Vertex count needed to render one emitter's current particles.
    pub fn emitter_vertex_count(&self, handle: InstanceHandle, emitter_index: usize) -> u32 {
        self.instances
            .get(handle)
            .and_then(|i| i.emitters.get(emitter_index))
            .map(|e| e.particles.len() as u32 * crate::vertex::VERTICES_PER_PARTICLE as u32)
            .unwrap_or(0)
    }

    /// Writes one emitter's vertex data into `vertex_buffer` at
    /// `*byte_cursor`, advancing the cursor by the bytes written. The cursor
    /// lets the host pack several emitters into one buffer; output is always
    /// a whole number of vertices.
    pub fn generate_vertex_data(
        &mut self,
        dt: f32,
        handle: InstanceHandle,
        emitter_index: usize,
        tint: Vec4,
        vertex_buffer: &mut [u8],
        byte_cursor: &mut usize,
        layout: ParticleVertexLayout,
    ) -> GenerateVertexDataResult {
        if !handle.is_valid() {
            return GenerateVertexDataResult::InvalidInstance;
        }
        let max_particle_count = self.max_particle_count;
        let Self {
            prototypes,
            instances,
            stats,
            ..
        } = self;
        let Some(instance) = instances.get_mut(handle) else {
            return GenerateVertexDataResult::InvalidInstance;
        };
        if instance.is_sleeping() {
            return GenerateVertexDataResult::Ok;
        }
        let Some(prototype) = prototypes
            .get(instance.prototype.0 as usize)
            .and_then(|p| p.as_ref())
        else {
            return GenerateVertexDataResult::InvalidInstance;
        };
        let stride = layout.stride();
        let mut vertex_index = (*byte_cursor / stride) as u32;
        let Instance {
            emitters,
            world_transform,
            ..
        } = &mut *instance;
        let Some(emitter) = emitters.get_mut(emitter_index) else {
            return GenerateVertexDataResult::InvalidInstance;
        };
        let desc = &prototype.desc.emitters[emitter_index];
        let mut result = GenerateVertexDataResult::Ok;
        if !vertex_buffer.is_empty() {
            let (written, overflowed) = write_emitter_vertices(
                emitter,
                desc,
                world_transform,
                tint,
                vertex_index,
                vertex_buffer,
                dt,
                layout,
            );
            vertex_index += written;
            if overflowed {
                warn_vertex_overflow(emitter, max_particle_count, layout);
                result = GenerateVertexDataResult::MaxParticlesExceeded;
            }
        }
        *byte_cursor = vertex_index as usize * stride;
        stats.particles = vertex_index / crate::vertex::VERTICES_PER_PARTICLE as u32;
        result
    }

    /// Hands the emitter's render descriptor and its vertex range from the
    /// last generation pass to a callback, skipping emitters with nothing
    /// to draw.
    pub fn render_emitter(
        &self,
        handle: InstanceHandle,
        emitter_index: usize,
        callback: &mut dyn FnMut(&EmitterRenderData, u32, u32),
    ) {
        let Some(instance) = self.instances.get(handle) else {
            warn!("The particlefx instance could not be found when rendering.");
            return;
        };
        let Some(emitter) = instance.emitters.get(emitter_index) else {
            warn!("The particlefx emitter could not be found when rendering.");
            return;
        };
        if emitter.vertex_count == 0 {
            return;
        }
        callback(&emitter.render_data, emitter.vertex_index, emitter.vertex_count);
    }

    /// Borrow of the emitter's cached descriptor; valid until the next
    /// update of the instance.
    pub fn emitter_render_data(
        &self,
        handle: InstanceHandle,
        emitter_index: usize,
    ) -> Option<&EmitterRenderData> {
        Some(&self.instances.get(handle)?.emitters.get(emitter_index)?.render_data)
    }

    /// Sets a render constant on every emitter with the given id hash.
    pub fn set_render_constant(
        &mut self,
        handle: InstanceHandle,
        emitter_id: u64,
        name_hash: u64,
        value: Vec4,
    ) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        for emitter in instance.emitters.iter_mut() {
            if emitter.id_hash != emitter_id {
                continue;
            }
            let constants = &mut emitter.render_data.render_constants;
            match constants.iter_mut().find(|c| c.name_hash == name_hash) {
                Some(constant) => constant.value = value,
                None => constants.push(RenderConstant { name_hash, value }),
            }
            emitter.flags.insert(EmitterFlags::NEEDS_REHASH);
        }
    }

    /// Removes a render constant from every emitter with the given id hash.
    pub fn reset_render_constant(
        &mut self,
        handle: InstanceHandle,
        emitter_id: u64,
        name_hash: u64,
    ) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        for emitter in instance.emitters.iter_mut() {
            if emitter.id_hash != emitter_id {
                continue;
            }
            let constants = &mut emitter.render_data.render_constants;
            if let Some(at) = constants.iter().position(|c| c.name_hash == name_hash) {
                constants.swap_remove(at);
                emitter.flags.insert(EmitterFlags::NEEDS_REHASH);
            }
        }
    }

    /// Recomputes the render-data fingerprints of all emitters on the
    /// instance.
    pub fn rehash(&mut self, handle: InstanceHandle) {
        let Some(instance) = self.instance_mut(handle) else {
            return;
        };
        for emitter in instance.emitters.iter_mut() {
            rehash_emitter(emitter);
        }
    }

    // ---- stats ----

    pub fn stats(&self) -> Stats {
        Stats {
            max_particles: self.max_particle_count,
            ..self.stats
        }
    }

    pub fn instance_stats(&self, handle: InstanceHandle) -> Option<InstanceStats> {
        self.instances.get(handle).map(|i| InstanceStats {
            play_time: i.play_time,
        })
    }

    /// Emitter world transform as exposed to renderers, for hosts that
    /// build their own descriptors.
    pub fn emitter_transform(
        &self,
        handle: InstanceHandle,
        emitter_index: usize,
    ) -> Option<Mat4> {
        let instance = self.instances.get(handle)?;
        let prototype = self.prototype(instance.prototype)?;
        let desc = prototype.desc.emitters.get(emitter_index)?;
        Some(
            emitter_world_transform(&instance.world_transform, instance.scale_along_z, desc)
                .to_matrix(),
        )
    }

    pub(crate) fn prototype_for(&self, instance: &Instance) -> Option<&Prototype> {
        self.prototypes
            .get(instance.prototype.0 as usize)?
            .as_ref()
    }
}

impl Drop for ParticleContext {
    fn drop(&mut self) {
        let lingering = self.instances.live_count();
        if lingering > 0 {
            warn!("Destroyed {lingering} instances (this might indicate leakage).");
        }
    }
}

fn start_emitter(
    emitter: &mut Emitter,
    state_changed: &mut Option<EmitterStateChangedFn>,
    num_awake_emitters: &mut u32,
) {
    set_emitter_state(
        emitter,
        state_changed,
        num_awake_emitters,
        EmitterState::Prespawn,
    );
    emitter.flags.remove(EmitterFlags::RETIRING);
}

/// One full emitter step: age, state machine + spawning, sorting, then
/// simulation.
fn update_emitter(
    ctx: &mut EmitterUpdateContext,
    emitter: &mut Emitter,
    prototype: &EmitterPrototype,
    desc: &EmitterData,
    dt: f32,
    global_budget: &mut u32,
) {
    // standing still; nothing to do
    if emitter.is_sleeping() || dt <= 0.0 {
        return;
    }
    spawning::age_particles(emitter, dt);
    spawning::update_emitter_state(ctx, emitter, prototype, desc, dt, global_budget);
    sort::generate_keys(emitter, prototype.max_particle_life_time);
    sort::sort_particles(emitter);
    simulate::simulate(
        ctx.world_transform,
        ctx.scale_along_z,
        emitter,
        prototype,
        desc,
        dt,
    );
}

fn fetch_animation_data(
    emitter: &mut Emitter,
    prototype: &EmitterPrototype,
    desc: &EmitterData,
    fetch: Option<&mut FetchAnimationFn>,
) {
    emitter.animation = AnimationData::default();
    let (Some(fetch), Some(tile_source)) = (fetch, prototype.tile_source) else {
        return;
    };
    match fetch(tile_source, prototype.animation, &mut emitter.animation) {
        FetchAnimationResult::Ok => {
            assert_eq!(
                emitter.animation.struct_size,
                AnimationData::STRUCT_SIZE,
                "AnimationData::struct_size has an invalid size"
            );
            emitter.flags.remove(EmitterFlags::FETCH_ANIM_WARNING);
        }
        FetchAnimationResult::NotFound | FetchAnimationResult::Error => {
            if !emitter.flags.contains(EmitterFlags::FETCH_ANIM_WARNING) {
                emitter.flags.insert(EmitterFlags::FETCH_ANIM_WARNING);
                warn!("The animation '{}' could not be found", desc.animation);
            }
        }
    }
}

/// Clamps a long play time down while keeping the position relative to the
/// emitter's duration, so looping replays don't iterate forever.
fn calculate_replay_time(
    duration: f32,
    start_delay: f32,
    max_particle_life_time: f32,
    play_time: f32,
) -> f32 {
    let mut time = play_time;
    if play_time > duration + max_particle_life_time + start_delay {
        let inv_duration = 1.0 / duration;
        let emitter_time = (play_time - start_delay) * inv_duration;
        let frac = emitter_time - emitter_time.floor();
        let iterations = 1 + (max_particle_life_time * inv_duration) as u32;
        time = start_delay + duration * (iterations as f32 + frac);
    }
    time
}
