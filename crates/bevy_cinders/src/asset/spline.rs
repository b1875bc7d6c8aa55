use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// One Hermite control point of a property spline.
///
/// `x` values must be monotonically increasing on `[0, 1]`. The tangent is
/// `(tx, ty)` with `tx > 0`; a single-point spline extrapolates linearly
/// along its tangent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Reflect)]
pub struct SplinePoint {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_tangent_x")]
    pub tx: f32,
    #[serde(default)]
    pub ty: f32,
}

fn default_tangent_x() -> f32 {
    1.0
}

impl SplinePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            tx: 1.0,
            ty: 0.0,
        }
    }

    pub fn with_tangent(mut self, tx: f32, ty: f32) -> Self {
        self.tx = tx;
        self.ty = ty;
        self
    }
}

/// Properties sampled per emitter over its normalized duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKey {
    SpawnRate,
    SizeX,
    SizeY,
    SizeZ,
    ParticleLifeTime,
    ParticleSpeed,
    ParticleSize,
    ParticleRed,
    ParticleGreen,
    ParticleBlue,
    ParticleAlpha,
    ParticleRotation,
    ParticleStretchX,
    ParticleStretchY,
}

impl EmitterKey {
    pub const COUNT: usize = 14;
}

/// Properties sampled per particle over its normalized lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
#[serde(rename_all = "snake_case")]
pub enum ParticleKey {
    Scale,
    Red,
    Green,
    Blue,
    Alpha,
    Rotation,
    StretchX,
    StretchY,
}

impl ParticleKey {
    pub const COUNT: usize = 8;
}

/// Properties sampled per modifier at the emitter's normalized time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKey {
    Magnitude,
    MaxDistance,
}

impl ModifierKey {
    pub const COUNT: usize = 2;
}

fn hermite(y0: f32, y1: f32, t0: f32, t1: f32, t: f32) -> f32 {
    (2.0 * t * t * t - 3.0 * t * t + 1.0) * y0
        + (t * t * t - 2.0 * t * t + t) * t0
        + (-2.0 * t * t * t + 3.0 * t * t) * y1
        + (t * t * t - t * t) * t1
}

fn segment_value(points: &[SplinePoint], segment: usize, t: f32) -> f32 {
    let p0 = points[segment];
    let p1 = points[segment + 1];
    let dx = p1.x - p0.x;

    let t0 = dx * p0.ty / p0.tx;
    let t1 = dx * p1.ty / p1.tx;

    hermite(p0.y, p1.y, t0, t1, t)
}

/// Evaluates the spline at `x`.
///
/// Single-point splines fall back to linear extrapolation from the point's
/// tangent. `x` outside the covered range evaluates the nearest segment's
/// cubic, which extrapolates smoothly.
pub fn sample_spline(points: &[SplinePoint], x: f32) -> f32 {
    if points.len() == 1 {
        let p = points[0];
        return p.y + (x - p.x) * p.ty / p.tx;
    }
    let mut segment_index = 0;
    let mut t = 0.0;
    for s in 0..points.len() - 1 {
        let p0 = points[s];
        let p1 = points[s + 1];
        if (x >= p0.x && x < p1.x) || s == points.len() - 2 {
            t = (x - p0.x) / (p1.x - p0.x);
            segment_index = s;
            break;
        }
    }
    segment_value(points, segment_index, t)
}
