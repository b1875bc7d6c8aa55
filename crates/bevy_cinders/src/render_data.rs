//! Per-emitter render descriptors and their fingerprints.
//!
//! The host renderer consumes an [`EmitterRenderData`] per emitter: world
//! matrix, material, texture, blend mode, vertex range and render constants,
//! plus a 32-bit "mixed hash" over the render-relevant identity that lets
//! draws with equal fingerprints share a batch.

use bevy::prelude::*;

use crate::asset::{BlendMode, EmitterData};
use crate::hashing;
use crate::instance::{Emitter, EmitterFlags};
use crate::pool::InstanceHandle;
use crate::prototype::EmitterPrototype;
use crate::transform::UniformTransform;

/// Opaque host-side material reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialRef(pub u64);

/// Opaque host-side tile source (texture atlas) reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileSourceRef(pub u64);

/// Opaque host-side texture reference, delivered through animation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRef(pub u64);

/// A name-hash-keyed shader constant carried alongside the draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConstant {
    pub name_hash: u64,
    pub value: Vec4,
}

/// Everything the renderer needs to draw one emitter's particles.
///
/// Borrowed from the context via
/// [`ParticleContext::emitter_render_data`](crate::ParticleContext::emitter_render_data);
/// valid until the next update of the owning instance.
#[derive(Debug, Clone)]
pub struct EmitterRenderData {
    pub transform: Mat4,
    pub material: Option<MaterialRef>,
    pub blend_mode: BlendMode,
    pub texture: Option<TextureRef>,
    pub render_constants: Vec<RenderConstant>,
    pub instance: InstanceHandle,
    pub emitter_index: u32,
    pub mixed_hash: u32,
    pub mixed_hash_no_material: u32,
}

impl Default for EmitterRenderData {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            material: None,
            blend_mode: BlendMode::Alpha,
            texture: None,
            render_constants: Vec::new(),
            instance: InstanceHandle::INVALID,
            emitter_index: 0,
            mixed_hash: 0,
            mixed_hash_no_material: 0,
        }
    }
}

/// Emitter world transform: instance world transform times the emitter's
/// local offset, optionally skipping the Z scale.
pub(crate) fn emitter_world_transform(
    world: &UniformTransform,
    scale_along_z: bool,
    desc: &EmitterData,
) -> UniformTransform {
    let local = UniformTransform::new(desc.position, desc.rotation, 1.0);
    if scale_along_z {
        world.mul(&local)
    } else {
        world.mul_no_scale_z(&local)
    }
}

/// Refreshes the cached descriptor from the current transforms and
/// prototype. Render constants are owned by the descriptor and left as-is.
pub(crate) fn update_emitter_render_data(
    handle: InstanceHandle,
    emitter_index: usize,
    world: &UniformTransform,
    scale_along_z: bool,
    emitter: &mut Emitter,
    desc: &EmitterData,
    prototype: &EmitterPrototype,
) {
    let transform = emitter_world_transform(world, scale_along_z, desc);
    let texture = emitter.animation.texture;
    let data = &mut emitter.render_data;
    data.transform = transform.to_matrix();
    data.material = prototype.material;
    data.blend_mode = prototype.blend_mode;
    data.texture = texture;
    data.instance = handle;
    data.emitter_index = emitter_index as u32;
}

/// Recomputes the emitter's fingerprints. With the material or texture still
/// unresolved the rehash is deferred until they arrive.
pub(crate) fn rehash_emitter(emitter: &mut Emitter) {
    let (Some(material), Some(texture)) =
        (emitter.render_data.material, emitter.render_data.texture)
    else {
        emitter.flags.insert(EmitterFlags::NEEDS_REHASH);
        return;
    };
    let blend_mode = emitter.render_data.blend_mode;
    let no_material = hashing::mixed_hash(
        texture,
        blend_mode,
        &emitter.render_data.render_constants,
        None,
    );
    let with_material = hashing::mixed_hash(
        texture,
        blend_mode,
        &emitter.render_data.render_constants,
        Some(material),
    );
    emitter.render_data.mixed_hash_no_material = no_material;
    emitter.render_data.mixed_hash = with_material;
    emitter.flags.remove(EmitterFlags::NEEDS_REHASH);
}
