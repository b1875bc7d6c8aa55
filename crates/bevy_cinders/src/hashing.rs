//! Stable hashing for emitter ids, render constant names and render-data
//! fingerprints.

use bevy::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::render_data::RenderConstant;
use crate::{BlendMode, MaterialRef, TextureRef};

/// Hashes a name (emitter id, animation id, render constant name) into the
/// 64-bit form used everywhere at runtime.
pub fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// 32-bit fingerprint over the rendering-relevant emitter state.
///
/// Pass `material: None` for the no-material variant; everything else is
/// always included. Two emitters with equal fingerprints can be batched
/// into the same draw.
pub fn mixed_hash(
    texture: TextureRef,
    blend_mode: BlendMode,
    constants: &[RenderConstant],
    material: Option<MaterialRef>,
) -> u32 {
    let mut hasher = DefaultHasher::new();
    texture.0.hash(&mut hasher);
    (blend_mode as u32).hash(&mut hasher);
    for constant in constants {
        constant.name_hash.hash(&mut hasher);
        hash_vec4(&mut hasher, constant.value);
    }
    if let Some(material) = material {
        material.0.hash(&mut hasher);
    }
    hasher.finish() as u32
}

fn hash_vec4(hasher: &mut DefaultHasher, v: Vec4) {
    v.x.to_bits().hash(hasher);
    v.y.to_bits().hash(hasher);
    v.z.to_bits().hash(hasher);
    v.w.to_bits().hash(hasher);
}
