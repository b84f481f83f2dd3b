//! Math utilities and helpers.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Object transform.
///
/// Rotation is stored as Tait-Bryan angles in radians and applied in Y, X, Z
/// order, so the model matrix is `translate * Ry * Rx * Rz * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position offset
    pub translation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
    /// Rotation angles (x = pitch, y = yaw, z = roll)
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    /// Create a transform at the given position.
    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Builder-style scale setter.
    #[inline]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builder-style rotation setter.
    #[inline]
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation as a quaternion.
    #[inline]
    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    /// Model matrix.
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }

    /// Matrix for transforming normals (inverse transpose of the upper 3x3).
    ///
    /// Scale must be non-zero on every axis.
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.quat()) * Mat3::from_diagonal(self.scale.recip())
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn identity_transform() {
        let t = Transform::default();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert_eq!(t.normal_matrix(), Mat3::IDENTITY);
    }

    #[test]
    fn yaw_rotates_forward_onto_x() {
        let t = Transform::default().with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0));
        let p = t.matrix().transform_point3(Vec3::Z);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn translation_applies_after_scale() {
        let t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::ONE);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 4.0);
        assert_relative_eq!(p.z, 5.0);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let t = Transform::default().with_scale(Vec3::new(4.0, 1.0, 1.0));
        let n = t.normal_matrix() * Vec3::X;
        assert_relative_eq!(n.x, 0.25);
        assert_relative_eq!(n.y, 0.0);
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(112, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(112, 16), 112);
        assert_eq!(align_up(100, 0), 100);
    }
}
