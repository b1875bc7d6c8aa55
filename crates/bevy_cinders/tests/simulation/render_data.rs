use bevy::prelude::*;
use bevy_cinders::prelude::*;
use bevy_cinders::hash_str;

use crate::helpers::*;

/// Emitter with host references resolved, so fingerprints can be computed.
fn textured_setup() -> (ParticleContext, PrototypeHandle, InstanceHandle) {
    let mut emitter = basic_emitter(10.0, 60.0, 5.0);
    emitter.material = "builtins/particle.material".to_string();
    emitter.tile_source = "atlas".to_string();
    emitter.animation = "glow".to_string();
    let (mut context, prototype, instance) = setup(&fx(vec![emitter]));
    context.set_material(prototype, 0, Some(MaterialRef(0xA)));
    context.set_tile_source(prototype, 0, Some(TileSourceRef(0xB)));
    (context, prototype, instance)
}

fn fetch_texture(
    _tile_source: TileSourceRef,
    _animation: u64,
    data: &mut AnimationData,
) -> FetchAnimationResult {
    *data = AnimationData::new();
    data.texture = Some(TextureRef(0xC));
    FetchAnimationResult::Ok
}

fn update_with_texture(context: &mut ParticleContext, dt: f32) {
    let mut fetch = fetch_texture;
    let fetch_dyn: &mut bevy_cinders::FetchAnimationFn = &mut fetch;
    context.update(dt, Some(fetch_dyn));
}

#[test]
fn render_constant_round_trip_changes_the_fingerprint() {
    let (mut context, _, instance) = textured_setup();
    context.start_instance(instance);
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert!(data.render_constants.is_empty());
    let original_hash = data.mixed_hash;
    assert_ne!(original_hash, 0);

    let emitter_id = hash_str("emitter");
    let name = hash_str("tint");
    let value = Vec4::new(1.0, 0.0, 0.0, 1.0);
    context.set_render_constant(instance, emitter_id, name, value);
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert_eq!(data.render_constants.len(), 1);
    assert_eq!(data.render_constants[0].name_hash, name);
    assert_eq!(data.render_constants[0].value, value);
    let with_constant_hash = data.mixed_hash;
    assert_ne!(with_constant_hash, original_hash, "constants feed the fingerprint");

    context.reset_render_constant(instance, emitter_id, name);
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert!(data.render_constants.is_empty());
    assert_ne!(data.mixed_hash, with_constant_hash);
    assert_eq!(data.mixed_hash, original_hash, "removing the constant restores it");
}

#[test]
fn updating_a_constant_keeps_a_single_entry() {
    let (mut context, _, instance) = textured_setup();
    context.start_instance(instance);
    let emitter_id = hash_str("emitter");
    let name = hash_str("tint");
    context.set_render_constant(instance, emitter_id, name, Vec4::ONE);
    context.set_render_constant(instance, emitter_id, name, Vec4::splat(0.5));
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert_eq!(data.render_constants.len(), 1);
    assert_eq!(data.render_constants[0].value, Vec4::splat(0.5));
}

#[test]
fn rehash_is_deferred_until_material_and_texture_exist() {
    let (mut context, _, instance) = setup(&fx(vec![basic_emitter(10.0, 60.0, 5.0)]));
    context.start_instance(instance);
    context.update(DT, None);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert_eq!(data.mixed_hash, 0, "no material, no fingerprint yet");
    assert_eq!(data.texture, None);
}

#[test]
fn no_material_variant_differs_from_the_full_hash() {
    let (mut context, _, instance) = textured_setup();
    context.start_instance(instance);
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert_ne!(data.mixed_hash, 0);
    assert_ne!(data.mixed_hash_no_material, 0);
    assert_ne!(data.mixed_hash, data.mixed_hash_no_material);
    assert_eq!(data.material, Some(MaterialRef(0xA)));
    assert_eq!(data.texture, Some(TextureRef(0xC)));
}

#[test]
fn render_data_transform_follows_the_instance() {
    let (mut context, _, instance) = textured_setup();
    context.set_position(instance, Vec3::new(3.0, -2.0, 1.0));
    context.start_instance(instance);
    update_with_texture(&mut context, DT);

    let data = context.emitter_render_data(instance, 0).unwrap();
    let translation = data.transform.w_axis.truncate();
    assert_eq!(translation, Vec3::new(3.0, -2.0, 1.0));
    assert_eq!(data.emitter_index, 0);
    assert_eq!(data.instance, instance);
}

#[test]
fn render_emitter_reports_the_cached_vertex_range() {
    let (mut context, _, instance) = textured_setup();
    context.start_instance(instance);
    update_with_texture(&mut context, DT);

    // nothing generated yet: the callback must not fire
    let mut calls = 0;
    context.render_emitter(instance, 0, &mut |_, _, _| calls += 1);
    assert_eq!(calls, 0);

    let mut buffer = vec![0u8; context.max_vertex_buffer_size(ParticleVertexLayout::GameObject)];
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

    let mut seen = None;
    context.render_emitter(instance, 0, &mut |data, vertex_index, vertex_count| {
        seen = Some((data.blend_mode, vertex_index, vertex_count));
    });
    assert_eq!(seen, Some((BlendMode::Alpha, 0, 6)));
}

#[test]
fn fetch_failure_falls_back_to_untextured_rendering() {
    let (mut context, _, instance) = textured_setup();
    context.start_instance(instance);
    let mut fetch = |_: TileSourceRef, _: u64, _: &mut AnimationData| FetchAnimationResult::NotFound;
    let fetch_dyn: &mut bevy_cinders::FetchAnimationFn = &mut fetch;
    context.update(DT, Some(fetch_dyn));

    let data = context.emitter_render_data(instance, 0).unwrap();
    assert_eq!(data.texture, None);

    // vertices still come out, on the unit quad
    let mut buffer = vec![0u8; context.max_vertex_buffer_size(ParticleVertexLayout::GameObject)];
    let mut cursor = 0;
    let result = context.generate_vertex_data(
        DT,
        instance,
        0,
        Vec4::ONE,
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::GameObject,
    );
    assert_eq!(result, GenerateVertexDataResult::Ok);
    assert!(cursor > 0);
}
