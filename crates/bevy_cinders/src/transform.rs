//! Uniform-scale rigid transforms.
//!
//! Instance and emitter transforms carry a single scale factor next to the
//! rotation and translation. The `*_no_scale_z` variants apply the scale to
//! X and Y only, which is what 2D games want when a scaled game object
//! should not push particles along the depth axis.

use bevy::prelude::*;

/// Translation + rotation + uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformTransform {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: f32,
}

impl Default for UniformTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl UniformTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: 1.0,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// Transforms a point (scale, rotate, then translate).
    #[inline]
    pub fn apply_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (point * self.scale) + self.translation
    }

    /// Transforms a point, scaling X and Y only.
    #[inline]
    pub fn apply_point_no_scale_z(&self, point: Vec3) -> Vec3 {
        let scaled = Vec3::new(point.x * self.scale, point.y * self.scale, point.z);
        self.rotation * scaled + self.translation
    }

    /// Transforms a direction or velocity (no translation).
    #[inline]
    pub fn apply_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * (vector * self.scale)
    }

    /// Composes two transforms; `self` is the parent.
    pub fn mul(&self, child: &UniformTransform) -> UniformTransform {
        UniformTransform {
            rotation: self.rotation * child.rotation,
            translation: self.apply_point(child.translation),
            scale: self.scale * child.scale,
        }
    }

    /// Composes two transforms without scaling the child translation along Z.
    pub fn mul_no_scale_z(&self, child: &UniformTransform) -> UniformTransform {
        UniformTransform {
            rotation: self.rotation * child.rotation,
            translation: self.apply_point_no_scale_z(child.translation),
            scale: self.scale * child.scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            self.translation,
        )
    }
}

/// `v` if its squared length is nonzero, otherwise `fallback`.
#[inline]
pub fn non_zero_or(v: Vec3, sq_length: f32, fallback: Vec3) -> Vec3 {
    if sq_length > 0.0 { v } else { fallback }
}
