//! Emitter shape outlines for debug overlays.
//!
//! Walks every live instance and emits line segments for the emitter
//! shapes through a caller-supplied callback. Color encodes state: blue
//! while sleeping, green fading to blue as a once emitter progresses
//! through its duration.

use bevy::prelude::*;

use crate::asset::{EmitterKey, EmitterShape};
use crate::context::ParticleContext;
use crate::transform::UniformTransform;

/// Receives one line segment `(start, end, color)` per call.
pub type RenderLineFn<'a> = dyn FnMut(Vec3, Vec3, Vec4) + 'a;

const SEGMENT_COUNT: usize = 16;

impl ParticleContext {
    /// Draws every emitter's shape outline through `render_line`.
    pub fn debug_render(&self, render_line: &mut RenderLineFn) {
        for instance in self.instances() {
            let Some(prototype) = self.prototype_for(instance) else {
                continue;
            };
            for (emitter, desc) in instance.emitters.iter().zip(&prototype.desc.emitters) {
                let mut color = Vec4::new(0.0, 1.0, 0.0, 1.0);
                if emitter.is_sleeping() {
                    color.y = 0.0;
                    color.z = 1.0;
                } else if !emitter.is_looping(desc) {
                    let t = if desc.duration <= 0.0 {
                        0.0
                    } else {
                        emitter.timer / desc.duration
                    };
                    color.y = 1.0 - t;
                    color.z = t;
                }
                let local = UniformTransform::new(desc.position, desc.rotation, 1.0);
                let transform = if instance.scale_along_z {
                    instance.world_transform.mul(&local)
                } else {
                    instance.world_transform.mul_no_scale_z(&local)
                };

                let size_x = desc.first_point_value(EmitterKey::SizeX);
                let size_y = desc.first_point_value(EmitterKey::SizeY);
                let size_z = desc.first_point_value(EmitterKey::SizeZ);
                match desc.shape {
                    EmitterShape::Sphere | EmitterShape::Circle => {
                        draw_sphere(render_line, &transform, 0.5 * size_x, color);
                    }
                    EmitterShape::Cone | EmitterShape::TwoDCone => {
                        draw_cone(render_line, &transform, 0.5 * size_x, size_y, color);
                    }
                    EmitterShape::Box => {
                        let extents =
                            Vec3::new(0.5 * size_x, 0.5 * size_y, 0.5 * size_z);
                        draw_box(render_line, &transform, extents, color);
                    }
                }
            }
        }
    }
}

fn draw_sphere(
    render_line: &mut RenderLineFn,
    transform: &UniformTransform,
    radius: f32,
    color: Vec4,
) {
    let mut vertices = [[Vec3::ZERO; 3]; SEGMENT_COUNT + 1];
    for (j, rings) in vertices.iter_mut().enumerate() {
        let angle = std::f32::consts::TAU * j as f32 / SEGMENT_COUNT as f32;
        let (sin, cos) = angle.sin_cos();
        rings[0] = Vec3::new(radius * cos, radius * sin, 0.0);
        rings[1] = Vec3::new(0.0, radius * cos, radius * sin);
        rings[2] = Vec3::new(radius * cos, 0.0, radius * sin);
    }
    for j in 1..SEGMENT_COUNT + 1 {
        for k in 0..3 {
            render_line(
                transform.apply_point(vertices[j - 1][k]),
                transform.apply_point(vertices[j][k]),
                color,
            );
        }
    }
}

/// Cone outline along the spawn axis: apex at the origin, base disc of the
/// given radius at `height` along +Y.
fn draw_cone(
    render_line: &mut RenderLineFn,
    transform: &UniformTransform,
    radius: f32,
    height: f32,
    color: Vec4,
) {
    let apex = transform.translation;
    for corner in [
        Vec3::new(radius, height, 0.0),
        Vec3::new(-radius, height, 0.0),
        Vec3::new(0.0, height, radius),
        Vec3::new(0.0, height, -radius),
    ] {
        render_line(apex, transform.apply_point(corner), color);
    }
    let mut vertices = [Vec3::ZERO; SEGMENT_COUNT];
    for (j, vertex) in vertices.iter_mut().enumerate() {
        let angle = std::f32::consts::TAU * j as f32 / SEGMENT_COUNT as f32;
        *vertex = Vec3::new(radius * angle.cos(), height, radius * angle.sin());
    }
    for j in 1..SEGMENT_COUNT {
        render_line(
            transform.apply_point(vertices[j - 1]),
            transform.apply_point(vertices[j]),
            color,
        );
    }
    render_line(
        transform.apply_point(vertices[SEGMENT_COUNT - 1]),
        transform.apply_point(vertices[0]),
        color,
    );
}

fn draw_box(
    render_line: &mut RenderLineFn,
    transform: &UniformTransform,
    extents: Vec3,
    color: Vec4,
) {
    let corner = |x: f32, y: f32, z: f32| {
        transform.apply_point(Vec3::new(x * extents.x, y * extents.y, z * extents.z))
    };
    for z in [-1.0, 1.0] {
        render_line(corner(-1.0, -1.0, z), corner(1.0, -1.0, z), color);
        render_line(corner(1.0, -1.0, z), corner(1.0, 1.0, z), color);
        render_line(corner(1.0, 1.0, z), corner(-1.0, 1.0, z), color);
        render_line(corner(-1.0, 1.0, z), corner(-1.0, -1.0, z), color);
    }
    for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        render_line(corner(x, y, -1.0), corner(x, y, 1.0), color);
    }
}
