//! Compilation of effect descriptions into runtime prototypes.
//!
//! Spline properties are approximated by [`PROPERTY_SAMPLE_COUNT`] linear
//! segments at compile time so that runtime sampling is a single multiply-add.
//! A prototype is shared read-only by any number of instances; reloading
//! rebuilds its contents in place without touching them.

use bevy::prelude::*;

use crate::asset::{
    BlendMode, EmitterKey, ModifierKey, ParticleFxAsset, ParticleKey, SplinePoint, sample_spline,
};
use crate::hashing::hash_str;
use crate::render_data::{MaterialRef, TileSourceRef};

/// Number of linear segments each property spline is sampled into.
pub const PROPERTY_SAMPLE_COUNT: usize = 64;

/// One linear piece of a sampled property: `y = (x - x_start) * slope + y_start`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearSegment {
    pub x: f32,
    pub y: f32,
    pub k: f32,
}

/// A property sampled into segments, plus its random spread amplitude.
#[derive(Debug, Clone)]
pub struct Property {
    pub segments: [LinearSegment; PROPERTY_SAMPLE_COUNT],
    pub spread: f32,
}

impl Default for Property {
    fn default() -> Self {
        Self {
            segments: [LinearSegment::default(); PROPERTY_SAMPLE_COUNT],
            spread: 0.0,
        }
    }
}

/// Segment index covering `x`, clamped to the last segment for `x >= 1`.
#[inline]
pub fn segment_index(x: f32) -> usize {
    ((x * PROPERTY_SAMPLE_COUNT as f32) as usize).min(PROPERTY_SAMPLE_COUNT - 1)
}

impl Property {
    /// O(1) lookup on the segment containing `x`.
    #[inline]
    pub fn sample(&self, x: f32) -> f32 {
        self.sample_segment(segment_index(x), x)
    }

    /// Lookup with a precomputed segment index (shared across properties
    /// evaluated at the same `x`).
    #[inline]
    pub fn sample_segment(&self, segment: usize, x: f32) -> f32 {
        let s = &self.segments[segment];
        (x - s.x) * s.k + s.y
    }

    fn fill_from_points(&mut self, points: &[SplinePoint]) {
        let dx = 1.0 / PROPERTY_SAMPLE_COUNT as f32;
        let mut x0 = 0.0;
        let mut y0 = sample_spline(points, x0);
        for segment in self.segments.iter_mut() {
            let y1 = sample_spline(points, x0 + dx);
            segment.x = x0;
            segment.y = y0;
            segment.k = (y1 - y0) * PROPERTY_SAMPLE_COUNT as f32;
            x0 += dx;
            y0 = y1;
        }
    }

    /// Largest value the sampled property reaches on `[0, 1]`.
    pub fn max_sampled_value(&self) -> f32 {
        let dx = 1.0 / PROPERTY_SAMPLE_COUNT as f32;
        self.segments
            .iter()
            .fold(0.0f32, |max, s| max.max(s.y).max(s.y + s.k * dx))
    }
}

/// A compiled modifier: its sampled properties; shape data stays in the
/// description.
#[derive(Debug, Clone, Default)]
pub struct ModifierPrototype {
    pub properties: [Property; ModifierKey::COUNT],
}

/// Compiled per-emitter data shared by all instances of a prototype.
#[derive(Debug, Clone)]
pub struct EmitterPrototype {
    pub properties: [Property; EmitterKey::COUNT],
    pub particle_properties: [Property; ParticleKey::COUNT],
    pub modifiers: Vec<ModifierPrototype>,
    /// Hash of the animation id resolved through the fetch callback.
    pub animation: u64,
    /// Tile source reference, filled in by the host after compilation.
    pub tile_source: Option<TileSourceRef>,
    /// Material reference, filled in by the host after compilation.
    pub material: Option<MaterialRef>,
    pub blend_mode: BlendMode,
    /// Largest possible particle lifetime, used to quantize sort keys and
    /// clamp replay.
    pub max_particle_life_time: f32,
}

impl Default for EmitterPrototype {
    fn default() -> Self {
        Self {
            properties: Default::default(),
            particle_properties: Default::default(),
            modifiers: Vec::new(),
            animation: 0,
            tile_source: None,
            material: None,
            blend_mode: BlendMode::Alpha,
            max_particle_life_time: 0.0,
        }
    }
}

/// Stable reference to a prototype registered with a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrototypeHandle(pub(crate) u32);

/// Compiled form of one effect description.
///
/// Retains the description itself; the spawner and debug rendering read
/// shape parameters straight from it.
#[derive(Debug, Clone)]
pub struct Prototype {
    pub desc: ParticleFxAsset,
    pub emitters: Vec<EmitterPrototype>,
}

impl Prototype {
    pub fn compile(asset: &ParticleFxAsset) -> Self {
        let mut prototype = Prototype {
            desc: asset.clone(),
            emitters: Vec::new(),
        };
        prototype.recompile();
        prototype
    }

    /// Rebuilds the compiled emitters in place, e.g. after the description
    /// changed. Host-assigned material and tile-source references are reset
    /// and must be assigned again.
    pub fn reload(&mut self, asset: &ParticleFxAsset) {
        self.desc = asset.clone();
        self.recompile();
    }

    fn recompile(&mut self) {
        self.emitters.clear();
        for emitter_desc in &self.desc.emitters {
            let mut emitter = EmitterPrototype {
                animation: hash_str(&emitter_desc.animation),
                // Add-alpha is deprecated because of premultiplied alpha
                blend_mode: match emitter_desc.blend_mode {
                    BlendMode::AddAlpha => BlendMode::Add,
                    other => other,
                },
                ..Default::default()
            };
            for property in &emitter_desc.properties {
                if property.points.is_empty() {
                    warn!(
                        "Invalid emitter key {:?}: property has no control points",
                        property.key
                    );
                    continue;
                }
                let slot = &mut emitter.properties[property.key as usize];
                slot.fill_from_points(&property.points);
                slot.spread = property.spread;
            }
            emitter.max_particle_life_time = emitter.properties
                [EmitterKey::ParticleLifeTime as usize]
                .max_sampled_value();
            for property in &emitter_desc.particle_properties {
                if property.points.is_empty() {
                    warn!(
                        "Invalid particle key {:?}: property has no control points",
                        property.key
                    );
                    continue;
                }
                emitter.particle_properties[property.key as usize]
                    .fill_from_points(&property.points);
            }
            for modifier_desc in &emitter_desc.modifiers {
                let mut modifier = ModifierPrototype::default();
                for property in &modifier_desc.properties {
                    if property.points.is_empty() {
                        warn!(
                            "Invalid modifier key {:?}: property has no control points",
                            property.key
                        );
                        continue;
                    }
                    let slot = &mut modifier.properties[property.key as usize];
                    slot.fill_from_points(&property.points);
                    slot.spread = property.spread;
                }
                emitter.modifiers.push(modifier);
            }
            self.emitters.push(emitter);
        }
    }
}
