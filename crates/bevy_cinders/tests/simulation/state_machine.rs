use bevy_cinders::prelude::*;

use crate::helpers::*;

#[test]
fn once_emitter_spawns_and_sleeps_within_two_updates() {
    // duration 0.5, spawn rate 1, lifetime 0.5, stepped with dt = 1.0
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(0.5, 1.0, 0.5)]));
    context.start_instance(instance);

    context.update(1.0, None);
    assert_eq!(particle_count(&context, instance), 1, "one particle mid-frame");
    assert_eq!(
        context.emitter(instance, 0).unwrap().state,
        EmitterState::Postspawn
    );

    context.update(1.0, None);
    assert_eq!(particle_count(&context, instance), 0);
    assert!(context.is_sleeping(instance));
}

#[test]
fn looping_emitter_keeps_spawning() {
    let mut emitter = basic_emitter(1.0, 2.0, 1.5);
    emitter.mode = PlayMode::Loop;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);

    for _ in 0..300 {
        context.update(DT, None);
    }
    assert!(!context.is_sleeping(instance), "looping emitters never finish");
    assert!(particle_count(&context, instance) > 0);
}

#[test]
fn retired_looping_emitter_drains_like_a_once_emitter() {
    let mut emitter = basic_emitter(1.0, 2.0, 0.5);
    emitter.mode = PlayMode::Loop;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);

    for _ in 0..3 {
        context.update(1.0, None);
    }
    assert!(!context.is_sleeping(instance));

    context.retire_instance(instance);
    context.update(1.0, None);
    context.update(1.0, None);
    assert!(
        context.is_sleeping(instance),
        "after retiring, the current cycle ends and particles drain"
    );
}

#[test]
fn start_delay_holds_the_emitter_in_prespawn() {
    let mut emitter = basic_emitter(0.5, 100.0, 1.0);
    emitter.start_delay = 1.0;
    let (mut context, _, instance) = setup(&fx(vec![emitter]));
    context.start_instance(instance);

    for _ in 0..30 {
        context.update(DT, None);
    }
    assert_eq!(
        context.emitter(instance, 0).unwrap().state,
        EmitterState::Prespawn,
        "half a second in, the delay is not over"
    );
    assert_eq!(particle_count(&context, instance), 0);

    for _ in 0..40 {
        context.update(DT, None);
    }
    assert_eq!(
        context.emitter(instance, 0).unwrap().state,
        EmitterState::Spawning
    );
    assert!(particle_count(&context, instance) > 0);
}

#[test]
fn stop_moves_spawning_emitter_to_postspawn() {
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(10.0, 10.0, 5.0)]));
    context.start_instance(instance);
    context.update(0.5, None);
    assert_eq!(
        context.emitter(instance, 0).unwrap().state,
        EmitterState::Spawning
    );

    context.stop_instance(instance);
    assert_eq!(
        context.emitter(instance, 0).unwrap().state,
        EmitterState::Postspawn
    );
    let before = particle_count(&context, instance);
    context.update(0.5, None);
    assert_eq!(
        particle_count(&context, instance),
        before,
        "stopped emitters keep simulating but stop spawning"
    );
}

#[test]
fn reset_annihilates_particles_and_rewinds() {
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(10.0, 10.0, 5.0)]));
    context.start_instance(instance);
    context.update(0.5, None);
    assert!(particle_count(&context, instance) > 0);

    context.reset_instance(instance);
    assert_eq!(particle_count(&context, instance), 0);
    assert!(context.is_sleeping(instance));
    assert_eq!(context.instance_stats(instance).unwrap().play_time, 0.0);
}

#[test]
fn spawn_rate_accumulates_fractionally() {
    // 30 particles/s at 60 fps is one particle every other frame
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(10.0, 30.0, 5.0)]));
    context.start_instance(instance);

    context.update(DT, None);
    assert_eq!(particle_count(&context, instance), 0, "first half particle accrues");
    context.update(DT, None);
    assert_eq!(particle_count(&context, instance), 1);
    context.update(DT, None);
    context.update(DT, None);
    assert_eq!(particle_count(&context, instance), 2);
}
