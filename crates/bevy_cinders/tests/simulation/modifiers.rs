use bevy::prelude::*;
use bevy_cinders::prelude::*;

use crate::helpers::*;

fn modifier(kind: ModifierKind, magnitude: f32) -> ModifierData {
    ModifierData {
        kind,
        properties: vec![modifier_prop(ModifierKey::Magnitude, magnitude)],
        ..Default::default()
    }
}

fn with_modifier(mut emitter: EmitterData, modifier: ModifierData) -> EmitterData {
    emitter.modifiers.push(modifier);
    emitter
}

#[test]
fn acceleration_adds_exactly_magnitude_dt() {
    let emitter = with_modifier(
        basic_emitter(2.0, 1.0, 10.0),
        modifier(ModifierKind::Acceleration, 1.0),
    );
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert!(
        (particle.velocity.y - 1.0).abs() < 1e-6,
        "acceleration 1 over dt 1 must add exactly 1 to the Y velocity, got {}",
        particle.velocity.y
    );
}

#[test]
fn drag_damps_velocity_proportionally() {
    let mut emitter = basic_emitter(2.0, 1.0, 10.0);
    emitter.properties.push(emitter_prop(EmitterKey::ParticleSpeed, 2.0));
    let emitter = with_modifier(emitter, modifier(ModifierKind::Drag, 0.5));
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    // box shape launches along +Y at speed 2; drag halves it
    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert!(
        (particle.velocity.y - 1.0).abs() < 1e-5,
        "expected drag to halve the velocity, got {}",
        particle.velocity.y
    );
}

#[test]
fn drag_never_reverses_velocity() {
    let mut emitter = basic_emitter(2.0, 1.0, 10.0);
    emitter.properties.push(emitter_prop(EmitterKey::ParticleSpeed, 2.0));
    let emitter = with_modifier(emitter, modifier(ModifierKind::Drag, 100.0));
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert_eq!(
        particle.velocity,
        Vec3::ZERO,
        "applied drag saturates at 1 instead of reversing the motion"
    );
}

#[test]
fn radial_ignores_particles_beyond_max_distance() {
    let mut radial = modifier(ModifierKind::Radial, 5.0);
    radial
        .properties
        .push(modifier_prop(ModifierKey::MaxDistance, 1.0));
    radial.position = Vec3::new(2.0, 0.0, 0.0);
    let emitter = with_modifier(basic_emitter(2.0, 1.0, 10.0), radial);
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    // the particle sits at the origin, two units from the modifier
    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert_eq!(particle.velocity, Vec3::ZERO, "outside max_distance nothing happens");
}

#[test]
fn radial_pushes_away_from_the_modifier() {
    let mut radial = modifier(ModifierKind::Radial, 5.0);
    radial
        .properties
        .push(modifier_prop(ModifierKey::MaxDistance, 3.0));
    radial.position = Vec3::new(2.0, 0.0, 0.0);
    let emitter = with_modifier(basic_emitter(2.0, 1.0, 10.0), radial);
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert!(
        (particle.velocity.x + 5.0).abs() < 1e-5,
        "particle at the origin accelerates away from a modifier at +X, got {}",
        particle.velocity.x
    );
    assert_eq!(particle.velocity.y, 0.0);
}

#[test]
fn vortex_accelerates_along_the_tangent() {
    let mut vortex = modifier(ModifierKind::Vortex, 1.0);
    vortex
        .properties
        .push(modifier_prop(ModifierKey::MaxDistance, 10.0));
    vortex.position = Vec3::new(-1.0, 0.0, 0.0);
    let emitter = with_modifier(basic_emitter(2.0, 1.0, 10.0), vortex);
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(1.0, None);

    // delta from the vortex is +X and the axis is +Z, so the tangent is +Y
    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert!(
        (particle.velocity.y - 1.0).abs() < 1e-5,
        "expected a +Y tangent acceleration, got {:?}",
        particle.velocity
    );
    assert!(particle.velocity.x.abs() < 1e-6);
}

#[test]
fn modifier_magnitude_scales_with_instance_scale() {
    let emitter = with_modifier(
        basic_emitter(2.0, 1.0, 10.0),
        modifier(ModifierKind::Acceleration, 1.0),
    );
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.set_scale(instance, 2.0);
    context.start_instance(instance);
    context.update(1.0, None);

    let particle = &context.emitter(instance, 0).unwrap().particles[0];
    assert!(
        (particle.velocity.y - 2.0).abs() < 1e-5,
        "acceleration follows the instance scale, got {}",
        particle.velocity.y
    );
}
