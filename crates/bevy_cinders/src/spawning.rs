//! Emitter state stepping and particle spawning.
//!
//! State flow: `Sleeping -> Prespawn -> Spawning -> Postspawn -> Sleeping`.
//! Spawn rates below the frame rate accumulate fractionally and carry the
//! residual over to the next frame.

use bevy::prelude::*;

use crate::asset::{EmissionSpace, EmitterData, EmitterKey, EmitterShape, ParticleOrientation};
use crate::context::MAX_PARTICLE_COUNT_KEY;
use crate::instance::{
    Emitter, EmitterFlags, EmitterState, Particle, set_emitter_state,
};
use crate::prototype::{EmitterPrototype, Property, segment_index};
use crate::rng::{rand01, rand01_open, rand11};
use crate::transform::UniformTransform;
use crate::{DEG_RAD, animation::EmitterStateChangedFn};

/// Per-instance state threaded through the emitter update.
pub(crate) struct EmitterUpdateContext<'a> {
    pub world_transform: &'a UniformTransform,
    pub scale_along_z: bool,
    pub state_changed: &'a mut Option<EmitterStateChangedFn>,
    pub num_awake_emitters: &'a mut u32,
    pub max_particle_count: u32,
}

/// One-frame estimate of the emitter's world-space velocity, fed into
/// `inherit_velocity` at spawn time.
pub(crate) fn update_emitter_velocity(
    world_transform: &UniformTransform,
    emitter: &mut Emitter,
    desc: &EmitterData,
    dt: f32,
) {
    let world_position = world_transform.apply_point(desc.position);
    if emitter.flags.contains(EmitterFlags::LAST_POSITION_SET) {
        if dt > 0.0 {
            emitter.velocity = (world_position - emitter.last_position) * (1.0 / dt);
        }
    } else {
        emitter.flags.insert(EmitterFlags::LAST_POSITION_SET);
    }
    emitter.last_position = world_position;
}

/// Steps particle life and prunes dead particles by swapping with the last.
pub(crate) fn age_particles(emitter: &mut Emitter, dt: f32) {
    let mut i = 0;
    while i < emitter.particles.len() {
        let particle = &mut emitter.particles[i];
        particle.time_left -= dt;
        if particle.time_left < 0.0 {
            emitter.particles.swap_remove(i);
        } else {
            i += 1;
        }
    }
}

/// Samples all emitter properties at the normalized emitter time.
pub(crate) fn evaluate_emitter_properties(
    timer: f32,
    duration: f32,
    properties: &[Property; EmitterKey::COUNT],
    out: &mut [f32; EmitterKey::COUNT],
) {
    let x = if duration <= 0.0 { 0.0 } else { timer / duration };
    let segment = segment_index(x);
    for (value, property) in out.iter_mut().zip(properties.iter()) {
        *value = property.sample_segment(segment, x);
    }
}

pub(crate) fn stop_emitter(ctx: &mut EmitterUpdateContext, emitter: &mut Emitter) {
    if emitter.state != EmitterState::Sleeping {
        set_emitter_state(
            emitter,
            ctx.state_changed,
            ctx.num_awake_emitters,
            EmitterState::Postspawn,
        );
    }
    emitter.flags.remove(EmitterFlags::RETIRING);
}

/// Advances the emitter state machine by `dt` and spawns this frame's
/// particles. `global_budget` is the number of particles the whole context
/// may still spawn this frame.
pub(crate) fn update_emitter_state(
    ctx: &mut EmitterUpdateContext,
    emitter: &mut Emitter,
    prototype: &EmitterPrototype,
    desc: &EmitterData,
    dt: f32,
    global_budget: &mut u32,
) {
    if emitter.state == EmitterState::Prespawn && emitter.timer >= emitter.start_delay {
        set_emitter_state(
            emitter,
            ctx.state_changed,
            ctx.num_awake_emitters,
            EmitterState::Spawning,
        );
        emitter.timer -= emitter.start_delay;
    }
    emitter.timer += dt;
    if emitter.state != EmitterState::Prespawn {
        // never go above duration
        emitter.timer = emitter.timer.min(emitter.duration);
    }
    if emitter.state == EmitterState::Spawning {
        // wrap looping emitters when they reach the end
        if emitter.is_looping(desc) && emitter.timer >= emitter.duration {
            emitter.timer -= emitter.duration;
        }

        // Evaluate spawn rate every frame while spawning (it might change)
        let mut original_properties = [0.0f32; EmitterKey::COUNT];
        evaluate_emitter_properties(
            emitter.timer,
            emitter.duration,
            &prototype.properties,
            &mut original_properties,
        );
        let spawn_rate = (original_properties[EmitterKey::SpawnRate as usize]
            + emitter.spawn_rate_spread)
            .max(0.0);
        emitter.particles_to_spawn += spawn_rate * dt;
        let requested = emitter.particles_to_spawn as u32;
        emitter.particles_to_spawn -= requested as f32;

        let capacity_left = desc
            .max_particle_count
            .saturating_sub(emitter.particles.len() as u32);
        let mut count = requested.min(capacity_left);
        if count > *global_budget {
            count = *global_budget;
            if !emitter.flags.contains(EmitterFlags::OUT_OF_PARTICLES_WARNING) {
                emitter.flags.insert(EmitterFlags::OUT_OF_PARTICLES_WARNING);
                warn!(
                    "Maximum number of particles ({}) exceeded, particles will not be spawned. Change \"{}\" in the config file.",
                    ctx.max_particle_count, MAX_PARTICLE_COUNT_KEY
                );
            }
        }
        *global_budget -= count;

        let local = UniformTransform::new(desc.position, desc.rotation, 1.0);
        let mut emitter_transform = local;
        let mut emitter_velocity = Vec3::ZERO;
        if desc.space == EmissionSpace::World {
            emitter_transform = if ctx.scale_along_z {
                ctx.world_transform.mul(&local)
            } else {
                ctx.world_transform.mul_no_scale_z(&local)
            };
            emitter_velocity = emitter.velocity * desc.inherit_velocity;
        }
        let mut properties = [0.0f32; EmitterKey::COUNT];
        for _ in 0..count {
            for (i, value) in properties.iter_mut().enumerate() {
                // Apply spread per particle
                let r = rand11(&mut emitter.seed);
                *value = original_properties[i] + r * prototype.properties[i].spread;
            }
            spawn_particle(
                &mut emitter.particles,
                &mut emitter.seed,
                desc,
                &emitter_transform,
                emitter_velocity,
                &properties,
                dt,
            );
        }

        if !emitter.is_looping(desc) && emitter.timer >= emitter.duration {
            stop_emitter(ctx, emitter);
        }
    }
    if emitter.state == EmitterState::Postspawn && emitter.particles.is_empty() {
        set_emitter_state(
            emitter,
            ctx.state_changed,
            ctx.num_awake_emitters,
            EmitterState::Sleeping,
        );
    }
}

fn spawn_particle(
    particles: &mut Vec<Particle>,
    seed: &mut u32,
    desc: &EmitterData,
    emitter_transform: &UniformTransform,
    emitter_velocity: Vec3,
    properties: &[f32; EmitterKey::COUNT],
    dt: f32,
) {
    let mut particle = Particle::default();

    particle.max_life_time = properties[EmitterKey::ParticleLifeTime as usize];
    particle.oo_max_life_time = 1.0 / particle.max_life_time;
    // Include dt since already existing particles have already been advanced
    particle.time_left = particle.max_life_time - dt;
    particle.spread_factor = rand11(seed);
    particle.source_size =
        properties[EmitterKey::ParticleSize as usize] * emitter_transform.scale;
    particle.source_color = Vec4::new(
        properties[EmitterKey::ParticleRed as usize],
        properties[EmitterKey::ParticleGreen as usize],
        properties[EmitterKey::ParticleBlue as usize],
        properties[EmitterKey::ParticleAlpha as usize],
    );

    let (local_position, dir) = sample_shape(seed, desc.shape, properties);

    let mut local = UniformTransform::new(local_position, Quat::IDENTITY, 1.0);
    if desc.orientation == ParticleOrientation::InitialDirection {
        local.rotation = Quat::from_rotation_arc(Vec3::Y, dir);
    }

    let velocity = dir * properties[EmitterKey::ParticleSpeed as usize];
    let transform = emitter_transform.mul(&local);
    particle.position = transform.translation;
    let spin = Quat::from_rotation_z(DEG_RAD * properties[EmitterKey::ParticleRotation as usize]);
    particle.source_rotation = if desc.orientation == ParticleOrientation::MovementDirection {
        // orientation follows the velocity during simulation
        spin
    } else {
        transform.rotation * spin
    };
    particle.rotation = particle.source_rotation;
    particle.velocity = emitter_transform.apply_vector(velocity) + emitter_velocity;
    particle.source_stretch_x = properties[EmitterKey::ParticleStretchX as usize];
    particle.stretch_x = particle.source_stretch_x;
    particle.source_stretch_y = properties[EmitterKey::ParticleStretchY as usize];
    particle.stretch_y = particle.source_stretch_y;

    particles.push(particle);
}

/// Samples a local spawn position and direction for the emitter shape.
fn sample_shape(
    seed: &mut u32,
    shape: EmitterShape,
    properties: &[f32; EmitterKey::COUNT],
) -> (Vec3, Vec3) {
    use std::f32::consts::TAU;
    let size_x = properties[EmitterKey::SizeX as usize];
    let size_y = properties[EmitterKey::SizeY as usize];
    let size_z = properties[EmitterKey::SizeZ as usize];
    match shape {
        EmitterShape::Sphere => {
            // Direction is sampled uniformly over the unit-sphere surface
            let z = rand11(seed);
            let angle = TAU * rand01_open(seed);
            let r = (1.0 - z * z).sqrt();
            let dir = Vec3::new(r * angle.cos(), r * angle.sin(), z);
            // sqrt gives a uniform distribution over the volume; sub-sphere
            // surface area grows quadratically with radius
            let radius = rand01_open(seed).sqrt() * 0.5 * size_x;
            (dir * radius, dir)
        }
        EmitterShape::Circle => {
            let angle = TAU * rand01_open(seed);
            let dir = Vec3::new(angle.cos(), angle.sin(), 0.0);
            let radius = rand01_open(seed).sqrt() * 0.5 * size_x;
            (dir * radius, dir)
        }
        EmitterShape::Cone => {
            // Uniform over the cone-top disc, quadratic height distribution
            // for uniformity over the volume
            let angle = TAU * rand01_open(seed);
            let u = rand01(seed) + rand01(seed);
            let r = if u >= 1.0 { 2.0 - u } else { u };
            let h = rand01(seed).sqrt();
            let height = h * size_y;
            let radius = h * r * 0.5 * size_x;
            let local_position = Vec3::new(radius * angle.cos(), height, radius * angle.sin());
            let dir = if local_position.length_squared() != 0.0 {
                local_position.normalize()
            } else {
                Vec3::Y
            };
            (local_position, dir)
        }
        EmitterShape::TwoDCone => {
            let width = size_x;
            let height = size_y;
            // Sample a parallelogram spanned by the two triangle edges and
            // mirror points that land outside the triangle back in.
            let u = rand01(seed);
            let v = rand01(seed);
            let x = -width * 0.5 * u + width * 0.5 * v;
            let mut y = height * u + height * v;
            if y > height {
                y = 2.0 * height - y;
            }
            let local_position = Vec3::new(x, y, 0.0);
            let dir = if local_position.length_squared() != 0.0 {
                local_position.normalize()
            } else {
                Vec3::Y
            };
            (local_position, dir)
        }
        EmitterShape::Box => {
            let mut p = Vec3::new(rand11(seed), rand11(seed), rand11(seed));
            while p.length_squared() == 0.0 {
                p = Vec3::new(rand11(seed), rand11(seed), rand11(seed));
            }
            let extent = Vec3::new(0.5 * size_x, 0.5 * size_y, 0.5 * size_z);
            (p * extent, Vec3::Y)
        }
    }
}
