//! Per-frame particle simulation: property evaluation, modifiers, velocity
//! integration and orientation.

use bevy::prelude::*;

use crate::asset::{
    EmitterData, EmissionSpace, ModifierData, ModifierKey, ModifierKind, ParticleKey,
    ParticleOrientation,
};
use crate::instance::{Emitter, Particle};
use crate::prototype::{EmitterPrototype, Property, segment_index};
use crate::transform::{UniformTransform, non_zero_or};
use crate::{DEG_RAD, EPSILON, STRETCH_SCALING};

const PARTICLE_LOCAL_BASE_DIR: Vec3 = Vec3::Y;
const ACCELERATION_LOCAL_DIR: Vec3 = Vec3::Y;
const DRAG_LOCAL_DIR: Vec3 = Vec3::X;
const VORTEX_LOCAL_AXIS: Vec3 = Vec3::Z;
// Positive rotation around VORTEX_LOCAL_AXIS
const VORTEX_LOCAL_START_DIR: Vec3 = Vec3::NEG_X;

/// Runs one simulation step over all living particles of an emitter.
pub(crate) fn simulate(
    world_transform: &UniformTransform,
    scale_along_z: bool,
    emitter: &mut Emitter,
    prototype: &EmitterPrototype,
    desc: &EmitterData,
    dt: f32,
) {
    evaluate_particle_properties(emitter, &prototype.particle_properties);
    let emitter_t = if desc.duration <= 0.0 {
        0.0
    } else {
        emitter.timer / desc.duration
    };
    let particles = &mut emitter.particles;
    for (modifier, modifier_desc) in prototype.modifiers.iter().zip(desc.modifiers.iter()) {
        match modifier_desc.kind {
            ModifierKind::Acceleration => {
                let rotation = modifier_rotation(desc, modifier_desc);
                apply_acceleration(
                    particles,
                    &modifier.properties,
                    rotation,
                    world_transform.scale,
                    emitter_t,
                    dt,
                );
            }
            ModifierKind::Drag => {
                let rotation = modifier_rotation(desc, modifier_desc);
                apply_drag(
                    particles,
                    &modifier.properties,
                    modifier_desc.use_direction,
                    rotation,
                    emitter_t,
                    dt,
                );
            }
            ModifierKind::Radial => {
                let position =
                    modifier_position(world_transform, scale_along_z, desc, modifier_desc);
                apply_radial(
                    particles,
                    &modifier.properties,
                    position,
                    world_transform.scale,
                    emitter_t,
                    dt,
                );
            }
            ModifierKind::Vortex => {
                let position =
                    modifier_position(world_transform, scale_along_z, desc, modifier_desc);
                let rotation = modifier_rotation(desc, modifier_desc);
                apply_vortex(
                    particles,
                    &modifier.properties,
                    position,
                    rotation,
                    world_transform.scale,
                    emitter_t,
                    dt,
                );
            }
        }
    }
    for particle in particles.iter_mut() {
        // This velocity integration has a larger error than normal since we
        // don't use the velocity at the beginning of the frame, but particle
        // movement does not need to be very exact
        particle.position += particle.velocity * dt;

        particle.scale.x += particle.scale.x * particle.stretch_x;
        if !desc.stretch_with_velocity {
            particle.scale.y += particle.scale.y * particle.stretch_y;
        } else {
            particle.scale.y += particle.scale.y
                * particle.stretch_y
                * particle.velocity.length()
                * STRETCH_SCALING;
        }
    }
    if desc.orientation == ParticleOrientation::MovementDirection {
        for particle in particles.iter_mut() {
            if particle.velocity.length_squared() > EPSILON {
                let vel_norm = particle.velocity.normalize();
                let y_dot = Vec3::Y.dot(vel_norm);
                // 180-degree corner case: an exact flip has no unique arc
                let q_vel = if (y_dot + 1.0).abs() > EPSILON {
                    Quat::from_rotation_arc(Vec3::Y, vel_norm)
                } else {
                    Quat::from_xyzw(0.0, 0.0, 1.0, 0.0)
                };
                particle.rotation = particle.rotation * q_vel;
            }
        }
    }
}

/// Samples the per-particle properties at each particle's normalized age and
/// folds them into color, scale, rotation and stretch.
pub(crate) fn evaluate_particle_properties(
    emitter: &mut Emitter,
    properties: &[Property; ParticleKey::COUNT],
) {
    for particle in emitter.particles.iter_mut() {
        let x = if particle.max_life_time <= 0.0 {
            0.0
        } else {
            1.0 - particle.time_left * particle.oo_max_life_time
        };
        let segment = segment_index(x);
        let sample = |key: ParticleKey| properties[key as usize].sample_segment(segment, x);

        let scale = sample(ParticleKey::Scale);
        let tint = Vec4::new(
            sample(ParticleKey::Red),
            sample(ParticleKey::Green),
            sample(ParticleKey::Blue),
            sample(ParticleKey::Alpha),
        );
        let rotation = sample(ParticleKey::Rotation);
        let stretch_x = sample(ParticleKey::StretchX);
        let stretch_y = sample(ParticleKey::StretchY);

        particle.scale = Vec3::splat(scale);
        particle.color = (particle.source_color * tint).clamp(Vec4::ZERO, Vec4::ONE);
        particle.rotation = particle.source_rotation * Quat::from_rotation_z(DEG_RAD * rotation);
        particle.stretch_x = particle.source_stretch_x + stretch_x;
        particle.stretch_y = particle.source_stretch_y + stretch_y;
    }
}

/// Modifier position in particle space: emitter-local offset, then the
/// instance transform when emitting into world space.
fn modifier_position(
    world_transform: &UniformTransform,
    scale_along_z: bool,
    desc: &EmitterData,
    modifier: &ModifierData,
) -> Vec3 {
    let position = desc.position + desc.rotation * modifier.position;
    if desc.space == EmissionSpace::World {
        if scale_along_z {
            world_transform.apply_point(position)
        } else {
            world_transform.apply_point_no_scale_z(position)
        }
    } else {
        position
    }
}

fn modifier_rotation(desc: &EmitterData, modifier: &ModifierData) -> Quat {
    desc.rotation * modifier.rotation
}

fn sample_magnitude(property: &Property, emitter_t: f32) -> (f32, f32) {
    let segment = segment_index(emitter_t);
    (property.sample_segment(segment, emitter_t), property.spread)
}

fn apply_acceleration(
    particles: &mut [Particle],
    properties: &[Property; ModifierKey::COUNT],
    rotation: Quat,
    scale: f32,
    emitter_t: f32,
    dt: f32,
) {
    let acc_step = rotation * ACCELERATION_LOCAL_DIR * dt * scale;
    let (magnitude, mag_spread) =
        sample_magnitude(&properties[ModifierKey::Magnitude as usize], emitter_t);
    for particle in particles.iter_mut() {
        particle.velocity += acc_step * (magnitude + mag_spread * particle.spread_factor);
    }
}

fn apply_drag(
    particles: &mut [Particle],
    properties: &[Property; ModifierKey::COUNT],
    use_direction: bool,
    rotation: Quat,
    emitter_t: f32,
    dt: f32,
) {
    let direction = rotation * DRAG_LOCAL_DIR;
    let (magnitude, mag_spread) =
        sample_magnitude(&properties[ModifierKey::Magnitude as usize], emitter_t);
    for particle in particles.iter_mut() {
        let v = if use_direction {
            particle.velocity.dot(direction) * direction
        } else {
            particle.velocity
        };
        // Applied drag > 1 means the particle would travel in the reverse direction
        let applied_drag =
            ((magnitude + mag_spread * particle.spread_factor) * dt).min(1.0);
        particle.velocity -= v * applied_drag;
    }
}

fn particle_dir(particle: &Particle) -> Vec3 {
    particle.rotation * PARTICLE_LOCAL_BASE_DIR
}

fn apply_radial(
    particles: &mut [Particle],
    properties: &[Property; ModifierKey::COUNT],
    position: Vec3,
    scale: f32,
    emitter_t: f32,
    dt: f32,
) {
    let (magnitude, mag_spread) =
        sample_magnitude(&properties[ModifierKey::Magnitude as usize], emitter_t);
    // Only the first frame of max-distance is sampled until it is decided
    // what it should animate over
    let max_distance = properties[ModifierKey::MaxDistance as usize].segments[0].y * scale;
    let max_sq_distance = max_distance * max_distance;
    let applied_factor = dt * scale;
    for particle in particles.iter_mut() {
        let delta = particle.position - position;
        let delta_sq_len = delta.length_squared();
        let applied_magnitude = magnitude + mag_spread * particle.spread_factor;
        // no acceleration when delta lies outside max distance
        let a = if delta_sq_len <= max_sq_distance {
            applied_magnitude
        } else {
            0.0
        };
        let dir = non_zero_or(delta, delta_sq_len, particle_dir(particle)).normalize();
        particle.velocity += dir * a * applied_factor;
    }
}

fn apply_vortex(
    particles: &mut [Particle],
    properties: &[Property; ModifierKey::COUNT],
    position: Vec3,
    rotation: Quat,
    scale: f32,
    emitter_t: f32,
    dt: f32,
) {
    let (magnitude, mag_spread) =
        sample_magnitude(&properties[ModifierKey::Magnitude as usize], emitter_t);
    let max_distance = properties[ModifierKey::MaxDistance as usize].segments[0].y * scale;
    let max_sq_distance = max_distance * max_distance;
    let axis = rotation * VORTEX_LOCAL_AXIS;
    let start = rotation * VORTEX_LOCAL_START_DIR;
    let applied_factor = dt * scale;
    for particle in particles.iter_mut() {
        let delta = particle.position - position;
        // normal from the vortex axis (non-unit)
        let normal = delta - delta.dot(axis) * axis;
        // tangent is the direction of the vortex acceleration; a particle
        // sitting on the axis gets a guaranteed orthogonal start
        let tangent = axis.cross(normal);
        let tangent = non_zero_or(tangent, tangent.length_squared(), start).normalize();
        let normal_sq_len = normal.length_squared();
        let acceleration = if normal_sq_len <= max_sq_distance {
            magnitude + mag_spread * particle.spread_factor
        } else {
            0.0
        };
        particle.velocity += tangent * acceleration * applied_factor;
    }
}
