use bevy::prelude::*;
use bevy_cinders::prelude::*;
use bevy_cinders::{GameObjectVertex, GuiVertex};

use crate::helpers::*;

const GO_STRIDE: usize = 20;
const GUI_STRIDE: usize = 24;

#[test]
fn vertex_layout_strides() {
    assert_eq!(std::mem::size_of::<GameObjectVertex>(), GO_STRIDE);
    assert_eq!(std::mem::size_of::<GuiVertex>(), GUI_STRIDE);
    assert_eq!(ParticleVertexLayout::GameObject.stride(), GO_STRIDE);
    assert_eq!(ParticleVertexLayout::Gui.stride(), GUI_STRIDE);
    assert_eq!(vertex_buffer_size(1, ParticleVertexLayout::GameObject), 6 * GO_STRIDE);
}

fn run_one_frame(asset: &ParticleFxAsset) -> (ParticleContext, InstanceHandle) {
    let (mut context, _, instance) = setup(asset);
    context.start_instance(instance);
    context.update(DT, None);
    (context, instance)
}

#[test]
fn output_is_a_whole_number_of_vertices() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 300.0, 5.0)]));
    // room for three and a half particles
    let mut buffer = vec![0u8; 3 * 6 * GO_STRIDE + GO_STRIDE * 3];
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
    assert_eq!(cursor % (6 * GO_STRIDE), 0, "only whole particles are written");
}

#[test]
fn overflowing_buffer_truncates_and_reports() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 300.0, 5.0)]));
    assert_eq!(particle_count(&context, instance), 5);

    let mut buffer = vec![0u8; vertex_buffer_size(2, ParticleVertexLayout::GameObject)];
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
    assert_eq!(result, GenerateVertexDataResult::MaxParticlesExceeded);
    assert_eq!(cursor, vertex_buffer_size(2, ParticleVertexLayout::GameObject));
    let emitter = context.emitter(instance, 0).unwrap();
    assert_eq!(emitter.vertex_count, 12);
}

#[test]
fn big_enough_buffer_takes_every_particle() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 300.0, 5.0)]));
    let count = particle_count(&context, instance) as u32;
    assert_eq!(context.emitter_vertex_count(instance, 0), count * 6);

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
    assert_eq!(cursor, count as usize * 6 * GO_STRIDE);
    assert_eq!(context.stats().particles, count);
}

#[test]
fn vertex_color_multiplies_source_property_and_tint() {
    let mut emitter = basic_emitter(1.0, 60.0, 5.0);
    for property in emitter.properties.iter_mut() {
        if matches!(
            property.key,
            EmitterKey::ParticleRed
                | EmitterKey::ParticleGreen
                | EmitterKey::ParticleBlue
                | EmitterKey::ParticleAlpha
        ) {
            property.points = constant_points(0.5);
        }
    }
    for property in emitter.particle_properties.iter_mut() {
        if !matches!(property.key, ParticleKey::Scale) {
            property.points = constant_points(0.5);
        }
    }
    let (mut context, instance) = run_one_frame(&fx(vec![emitter]));

    let mut buffer = vec![0u8; vertex_buffer_size(4, ParticleVertexLayout::GameObject)];
    let mut cursor = 0;
    context.generate_vertex_data(
        DT,
        instance,
        0,
        Vec4::new(0.5, 0.5, 0.5, 0.5),
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::GameObject,
    );
    let vertex: GameObjectVertex = bytemuck::pod_read_unaligned(&buffer[0..GO_STRIDE]);
    // 0.5 source * 0.5 property * 0.5 tint = 0.125 -> 31 as a byte
    assert_eq!(vertex.color, [31, 31, 31, 31]);
}

#[test]
fn tint_above_one_saturates_instead_of_wrapping() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 60.0, 5.0)]));
    let mut buffer = vec![0u8; vertex_buffer_size(4, ParticleVertexLayout::GameObject)];
    let mut cursor = 0;
    context.generate_vertex_data(
        DT,
        instance,
        0,
        Vec4::splat(4.0),
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::GameObject,
    );
    let vertex: GameObjectVertex = bytemuck::pod_read_unaligned(&buffer[0..GO_STRIDE]);
    assert_eq!(vertex.color, [255, 255, 255, 255]);
}

#[test]
fn gui_layout_packs_abgr() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 60.0, 5.0)]));
    let mut buffer = vec![0u8; vertex_buffer_size(4, ParticleVertexLayout::Gui)];
    let mut cursor = 0;
    context.generate_vertex_data(
        DT,
        instance,
        0,
        Vec4::new(1.0, 0.5, 0.0, 1.0),
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::Gui,
    );
    let vertex: GuiVertex = bytemuck::pod_read_unaligned(&buffer[0..GUI_STRIDE]);
    assert_eq!(vertex.color, 0xFF00_7FFF, "alpha, blue, green, red from high to low");
}

#[test]
fn untextured_particles_use_the_unit_quad() {
    let (mut context, instance) = run_one_frame(&fx(vec![basic_emitter(1.0, 60.0, 5.0)]));
    let mut buffer = vec![0u8; vertex_buffer_size(1, ParticleVertexLayout::GameObject)];
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
    let vertex: GameObjectVertex = bytemuck::pod_read_unaligned(&buffer[0..GO_STRIDE]);
    assert_eq!(vertex.uv, [0, 65535], "first corner samples (0, 1)");
}

#[test]
fn byte_cursor_packs_emitters_back_to_back() {
    let asset = fx(vec![
        basic_emitter(1.0, 60.0, 5.0),
        basic_emitter(1.0, 60.0, 5.0),
    ]);
    let (mut context, instance) = run_one_frame(&asset);

    let mut buffer = vec![0u8; vertex_buffer_size(8, ParticleVertexLayout::GameObject)];
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
    let first_end = cursor;
    assert_eq!(first_end, 6 * GO_STRIDE);
    context.generate_vertex_data(
        DT,
        instance,
        1,
        Vec4::ONE,
        &mut buffer,
        &mut cursor,
        ParticleVertexLayout::GameObject,
    );
    assert_eq!(cursor, 2 * 6 * GO_STRIDE);

    let first = context.emitter(instance, 0).unwrap();
    let second = context.emitter(instance, 1).unwrap();
    assert_eq!(first.vertex_index, 0);
    assert_eq!(first.vertex_count, 6);
    assert_eq!(second.vertex_index, 6);
    assert_eq!(second.vertex_count, 6);
}

#[test]
fn flip_book_advances_with_particle_age() {
    let mut emitter = basic_emitter(10.0, 60.0, 10.0);
    emitter.tile_source = "atlas".to_string();
    emitter.animation = "burn".to_string();
    let (mut context, prototype, instance) = setup(&fx(vec![emitter]));
    context.set_tile_source(prototype, 0, Some(TileSourceRef(7)));
    context.start_instance(instance);

    // two tiles, left and right half of the texture
    let tex_coords: std::sync::Arc<[[f32; 8]]> = vec![
        [0.0, 1.0, 0.0, 0.0, 0.5, 0.0, 0.5, 1.0],
        [0.5, 1.0, 0.5, 0.0, 1.0, 0.0, 1.0, 1.0],
    ]
    .into();
    let mut fetch = move |_tile_source: TileSourceRef, _anim: u64, data: &mut AnimationData| {
        *data = AnimationData::new();
        data.texture = Some(TextureRef(9));
        data.tex_coords = tex_coords.clone();
        data.playback = AnimPlayback::LoopForward;
        data.start_tile = 0;
        data.end_tile = 2;
        data.fps = 60;
        data.tile_width = 16;
        data.tile_height = 16;
        FetchAnimationResult::Ok
    };
    let fetch_dyn: &mut bevy_cinders::FetchAnimationFn = &mut fetch;
    context.update(DT, Some(fetch_dyn));

    let mut buffer = vec![0u8; context.max_vertex_buffer_size(ParticleVertexLayout::GameObject)];

    // brand new particle: still on the first tile
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
    let vertex: GameObjectVertex = bytemuck::pod_read_unaligned(&buffer[0..GO_STRIDE]);
    assert_eq!(vertex.uv[0], 0, "a fresh particle starts on tile 0");

    // age the oldest particle to an odd frame index of the 2-tile loop
    for _ in 0..59 {
        let fetch_dyn: &mut bevy_cinders::FetchAnimationFn = &mut fetch;
        context.update(DT, Some(fetch_dyn));
    }
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
    // sorted output puts the oldest particle last
    let offset = (particle_count(&context, instance) - 1) * 6 * GO_STRIDE;
    let vertex: GameObjectVertex =
        bytemuck::pod_read_unaligned(&buffer[offset..offset + GO_STRIDE]);
    assert_eq!(vertex.uv[0], 32767, "the oldest particle has flipped to tile 1");
}
