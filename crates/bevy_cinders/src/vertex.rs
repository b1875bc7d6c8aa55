//! Vertex stream generation.
//!
//! Each particle becomes six vertices (two triangles) in the caller's byte
//! buffer, in one of two interleaved layouts. Generation stops before the
//! buffer would overflow and reports the truncation once per emitter.

use bevy::prelude::*;
use bytemuck::{Pod, Zeroable};

use crate::animation::AnimCursor;
use crate::asset::{EmissionSpace, EmitterData};
use crate::context::{GUI_MAX_PARTICLE_COUNT_KEY, MAX_PARTICLE_COUNT_KEY};
use crate::instance::{Emitter, EmitterFlags};
use crate::transform::UniformTransform;

pub const VERTICES_PER_PARTICLE: usize = 6;

/// Interleaved vertex layouts the generator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleVertexLayout {
    /// 3 float position, RGBA bytes, UV as normalized shorts.
    #[default]
    GameObject,
    /// 3 float position, one packed ABGR dword, UV floats.
    Gui,
}

impl ParticleVertexLayout {
    pub fn stride(&self) -> usize {
        match self {
            ParticleVertexLayout::GameObject => std::mem::size_of::<GameObjectVertex>(),
            ParticleVertexLayout::Gui => std::mem::size_of::<GuiVertex>(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GameObjectVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
    /// UV scaled by 65535.
    pub uv: [u16; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GuiVertex {
    pub position: [f32; 3],
    /// Packed RGBA8, ABGR byte order.
    pub color: u32,
    pub uv: [f32; 2],
}

/// Buffer bytes needed to render `particle_count` particles.
pub fn vertex_buffer_size(particle_count: u32, layout: ParticleVertexLayout) -> usize {
    particle_count as usize * VERTICES_PER_PARTICLE * layout.stride()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateVertexDataResult {
    Ok,
    InvalidInstance,
    MaxParticlesExceeded,
}

/// UV quad of an untextured particle.
const UNIT_TEX_COORDS: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

/// Corner selection per `(h_flip | v_flip << 1)`, six entries per variant.
const TEX_COORD_ORDER: [[usize; VERTICES_PER_PARTICLE]; 4] = [
    [0, 1, 2, 2, 3, 0],
    [3, 2, 1, 1, 0, 3], // h
    [1, 0, 3, 3, 2, 1], // v
    [2, 3, 0, 0, 1, 2], // hv
];

fn to_byte(v: f32) -> u8 {
    (v * 255.0) as u8
}

fn to_short(v: f32) -> u16 {
    (v * 65535.0) as u16
}

fn pack_abgr(c: Vec4) -> u32 {
    ((c.w * 255.0) as u32) << 24
        | ((c.z * 255.0) as u32) << 16
        | ((c.y * 255.0) as u32) << 8
        | (c.x * 255.0) as u32
}

/// Writes the emitter's particles into `buffer` starting at vertex
/// `vertex_index_start`, in sorted order. Returns the number of vertices
/// written and whether the buffer ran out.
pub(crate) fn write_emitter_vertices(
    emitter: &mut Emitter,
    desc: &EmitterData,
    world_transform: &UniformTransform,
    tint: Vec4,
    vertex_index_start: u32,
    buffer: &mut [u8],
    dt: f32,
    layout: ParticleVertexLayout,
) -> (u32, bool) {
    let stride = layout.stride();
    emitter.vertex_index = vertex_index_start;
    emitter.vertex_count = 0;

    let anim = &emitter.animation;
    let mut cursor = AnimCursor::new(anim, desc.size_mode);
    let use_unit_quad = anim.tex_coords.is_empty();
    if use_unit_quad {
        cursor.start_tile = 0;
        cursor.tile_count = 1;
    }
    // Sample anim tiles in the frame center
    let half_dt = dt * 0.5;

    let emission_transform = if desc.space == EmissionSpace::Emitter {
        *world_transform
    } else {
        UniformTransform::IDENTITY
    };

    let max_vertex_count = (buffer.len() / stride) as u32;
    let mut vertex_index = vertex_index_start;

    let mut width_factor = 1.0f32;
    let mut height_factor = 1.0f32;
    if !cursor.auto_size {
        if anim.tile_width > anim.tile_height {
            height_factor = anim.tile_height as f32 / anim.tile_width as f32;
        } else if anim.tile_height > 0 {
            width_factor = anim.tile_width as f32 / anim.tile_height as f32;
        }
        // Extent for each vertex, scale by half
        width_factor *= 0.5;
        height_factor *= 0.5;
    }

    let flip_flag = (anim.hflip as usize) | ((anim.vflip as usize) << 1);
    let tex_lookup = &TEX_COORD_ORDER[flip_flag];

    let particle_count = emitter.particles.len();
    let mut written = 0;
    for particle in emitter.particles.iter() {
        if vertex_index + VERTICES_PER_PARTICLE as u32 > max_vertex_count {
            break;
        }
        let mut tile = 0u32;
        let size;
        if cursor.playing {
            tile = cursor.tile(
                particle.max_life_time,
                particle.time_left,
                particle.oo_max_life_time,
                half_dt,
            );
            if cursor.auto_size {
                let td = anim.tex_dims[(cursor.start_tile + tile) as usize];
                width_factor = td[0] * 0.5;
                height_factor = td[1] * 0.5;
                size = particle.scale;
            } else {
                size = particle.scale * particle.source_size;
            }
        } else {
            size = particle.scale * particle.source_size;
        }
        tile += cursor.start_tile;
        let tex_coord: &[f32; 8] = if use_unit_quad {
            &UNIT_TEX_COORDS
        } else {
            &anim.tex_coords[tile as usize]
        };

        let rotation = emission_transform.rotation * particle.rotation;
        let translation = emission_transform.apply_point(particle.position);
        let scale = size * emission_transform.scale;

        let x = rotation * (scale * Vec3::new(width_factor, 0.0, 0.0));
        let y = rotation * (scale * Vec3::new(0.0, height_factor, 0.0));

        let p0 = -x - y + translation;
        let p1 = -x + y + translation;
        let p2 = x - y + translation;
        let p3 = x + y + translation;

        let c = particle.color;
        let c = Vec4::new(c.x * tint.x, c.y * tint.y, c.z * tint.z, c.w * tint.w);

        let corners = [p0, p1, p3, p3, p2, p0];
        for (i, corner) in corners.iter().enumerate() {
            let u = tex_coord[tex_lookup[i] * 2];
            let v = tex_coord[tex_lookup[i] * 2 + 1];
            let offset = (vertex_index as usize + i) * stride;
            match layout {
                ParticleVertexLayout::GameObject => {
                    let vertex = GameObjectVertex {
                        position: corner.to_array(),
                        color: [to_byte(c.x), to_byte(c.y), to_byte(c.z), to_byte(c.w)],
                        uv: [to_short(u), to_short(v)],
                    };
                    buffer[offset..offset + stride].copy_from_slice(bytemuck::bytes_of(&vertex));
                }
                ParticleVertexLayout::Gui => {
                    let vertex = GuiVertex {
                        position: corner.to_array(),
                        color: pack_abgr(c),
                        uv: [u, v],
                    };
                    buffer[offset..offset + stride].copy_from_slice(bytemuck::bytes_of(&vertex));
                }
            }
        }
        vertex_index += VERTICES_PER_PARTICLE as u32;
        written += 1;
    }

    let overflowed = written < particle_count;
    emitter.vertex_count = vertex_index - emitter.vertex_index;
    (emitter.vertex_count, overflowed)
}

/// Reports a vertex-buffer overflow once per emitter, naming the config key
/// matching the active layout.
pub(crate) fn warn_vertex_overflow(
    emitter: &mut Emitter,
    max_particle_count: u32,
    layout: ParticleVertexLayout,
) {
    if emitter.flags.contains(EmitterFlags::RENDER_WARNING) {
        return;
    }
    emitter.flags.insert(EmitterFlags::RENDER_WARNING);
    let config_key = match layout {
        ParticleVertexLayout::GameObject => MAX_PARTICLE_COUNT_KEY,
        ParticleVertexLayout::Gui => GUI_MAX_PARTICLE_COUNT_KEY,
    };
    warn!(
        "Maximum number of particles ({}) exceeded, particles will not be rendered. Change \"{}\" in the config file.",
        max_particle_count, config_key
    );
}
