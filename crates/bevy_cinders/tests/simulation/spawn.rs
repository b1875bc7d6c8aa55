use bevy::prelude::*;
use bevy_cinders::EmitterFlags;
use bevy_cinders::prelude::*;

use crate::helpers::*;

#[test]
fn world_space_particles_spawn_at_the_instance_position() {
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(1.0, 60.0, 5.0)]));
    context.set_position(instance, Vec3::new(10.0, 0.0, 0.0));
    context.start_instance(instance);
    context.update(DT, None);

    let emitter = context.emitter(instance, 0).unwrap();
    assert!(!emitter.particles.is_empty());
    assert_eq!(
        emitter.particles[0].position.x, 10.0,
        "world-space particles carry the instance translation"
    );
}

#[test]
fn emitter_space_particles_stay_local() {
    let mut emitter = basic_emitter(1.0, 60.0, 5.0);
    emitter.space = EmissionSpace::Emitter;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.set_position(instance, Vec3::new(10.0, 0.0, 0.0));
    context.start_instance(instance);
    context.update(DT, None);

    let emitter = context.emitter(instance, 0).unwrap();
    assert_eq!(
        emitter.particles[0].position.x, 0.0,
        "emitter-space particles are local; the transform applies at draw time"
    );

    // at draw time the instance transform moves them into the world
    let mut buffer = vec![0u8; vertex_buffer_size(4, ParticleVertexLayout::GameObject)];
    let mut cursor = 0;
    context.generate_vertex_data(
        DT,
        instance,
        0,
        Vec4::ONE,
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::GameObject,
    );
    let vertex: bevy_cinders::GameObjectVertex =
        bytemuck::pod_read_unaligned(&buffer[0..ParticleVertexLayout::GameObject.stride()]);
    assert!(
        (vertex.position[0] - 10.0).abs() < 1.0,
        "drawn quad should sit near x = 10, got {}",
        vertex.position[0]
    );
}

#[test]
fn emitter_capacity_bounds_live_particles() {
    let mut emitter = basic_emitter(10.0, 1000.0, 60.0);
    emitter.max_particle_count = 3;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    for _ in 0..10 {
        context.update(DT, None);
    }
    assert_eq!(particle_count(&context, instance), 3);
}

#[test]
fn global_ceiling_bounds_particles_across_the_context() {
    // 10 particles requested in one frame, but the context only allows 5
    let (mut context, _, instance) =
        setup_sized(&fx(vec![basic_emitter(1.0, 10.0, 60.0)]), 4, 5);
    context.start_instance(instance);
    context.update(1.0, None);

    assert_eq!(particle_count(&context, instance), 5);
    let emitter = context.emitter(instance, 0).unwrap();
    assert!(
        emitter
            .flags
            .contains(EmitterFlags::OUT_OF_PARTICLES_WARNING),
        "exhausting the particle budget must set the one-shot warning flag"
    );
}

#[test]
fn global_ceiling_spans_multiple_instances() {
    let asset = fx(vec![basic_emitter(1.0, 10.0, 60.0)]);
    let mut context = ParticleContext::new(4, 15);
    let prototype = context.new_prototype(&asset);
    let a = context.create_instance_seeded(prototype, SEED, None).unwrap();
    let b = context.create_instance_seeded(prototype, SEED + 1, None).unwrap();
    context.start_instance(a);
    context.start_instance(b);
    context.update(1.0, None);

    let total = particle_count(&context, a) + particle_count(&context, b);
    assert_eq!(total, 15, "instances share one particle budget");
    assert_eq!(particle_count(&context, a), 10, "first instance spawns in full");
}

#[test]
fn spawned_particles_inherit_emitter_velocity() {
    let mut emitter = basic_emitter(10.0, 60.0, 5.0);
    emitter.inherit_velocity = 1.0;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);

    // two updates a meter apart give the emitter a velocity estimate
    context.set_position(instance, Vec3::ZERO);
    context.update(1.0, None);
    context.set_position(instance, Vec3::new(1.0, 0.0, 0.0));
    context.update(1.0, None);

    let emitter = context.emitter(instance, 0).unwrap();
    assert_eq!(emitter.velocity, Vec3::new(1.0, 0.0, 0.0));
    let newest = emitter
        .particles
        .iter()
        .max_by(|a, b| a.time_left.total_cmp(&b.time_left))
        .unwrap();
    assert_eq!(
        newest.velocity,
        Vec3::new(1.0, 0.0, 0.0),
        "zero-speed particles move with the emitter"
    );
}

#[test]
fn sphere_shape_spawns_inside_the_radius() {
    let mut emitter = basic_emitter(10.0, 600.0, 5.0);
    emitter.shape = EmitterShape::Sphere;
    emitter.properties.push(emitter_prop(EmitterKey::SizeX, 2.0));
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(0.1, None);

    let emitter = context.emitter(instance, 0).unwrap();
    assert!(emitter.particles.len() >= 10);
    for particle in &emitter.particles {
        // radius is half of size_x, with a frame of drift allowed
        assert!(
            particle.position.length() <= 1.01,
            "particle escaped the sphere: {}",
            particle.position
        );
    }
}

#[test]
fn cone_shape_points_up() {
    let mut emitter = basic_emitter(10.0, 600.0, 5.0);
    emitter.shape = EmitterShape::Cone;
    emitter.properties.push(emitter_prop(EmitterKey::SizeX, 1.0));
    emitter.properties.push(emitter_prop(EmitterKey::SizeY, 2.0));
    emitter.properties.push(emitter_prop(EmitterKey::ParticleSpeed, 1.0));
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);
    context.update(0.1, None);

    let emitter = context.emitter(instance, 0).unwrap();
    assert!(emitter.particles.len() >= 10);
    for particle in &emitter.particles {
        assert!(
            particle.velocity.y >= 0.0,
            "cone particles never move downward at spawn"
        );
        assert!(particle.position.y <= 2.0 + 0.2);
    }
}
