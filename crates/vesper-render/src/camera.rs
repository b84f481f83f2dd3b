//! Camera and view management.
//!
//! Clip space follows Vulkan conventions: depth maps to `0..1` and the view
//! space is left-handed with +Z pointing into the screen. With `up = -Y` the
//! image is upright in a Vulkan viewport.

use glam::{EulerRot, Mat3, Mat4, Vec3, Vec4};

/// Camera holding a projection and a view matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Create a camera with identity matrices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an orthographic projection for the given view volume.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        let width = right - left;
        let height = bottom - top;
        let depth = far - near;
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / height, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / depth, 0.0),
            Vec4::new(
                -(right + left) / width,
                -(bottom + top) / height,
                -near / depth,
                1.0,
            ),
        );
    }

    /// Set a perspective projection.
    ///
    /// `fov_y` is in radians. `aspect` must be non-zero.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        debug_assert!(aspect.abs() > f32::EPSILON, "aspect ratio must be non-zero");
        self.projection = Mat4::perspective_lh(fov_y, aspect, near, far);
    }

    /// Look from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_basis(position, u, v, w);
    }

    /// Look from `position` at `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Place the camera at `position` with Tait-Bryan `rotation` applied in
    /// Y, X, Z order (the same convention as object transforms).
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let basis = Mat3::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        self.set_basis(position, basis.x_axis, basis.y_axis, basis.z_axis);
    }

    fn set_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// Get the projection-view matrix.
    pub fn projection_view(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn assert_vec3_eq(a: Vec3, b: Vec3) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-5);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-5);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-5);
    }

    #[test]
    fn perspective_depth_is_zero_to_one() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0);
        let near = camera.projection().project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = camera.projection().project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn orthographic_maps_volume_to_clip_space() {
        let mut camera = Camera::new();
        camera.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let p = camera.projection();
        assert_vec3_eq(p.transform_point3(Vec3::new(-2.0, -1.0, 0.0)), Vec3::new(-1.0, -1.0, 0.0));
        assert_vec3_eq(p.transform_point3(Vec3::new(2.0, 1.0, 10.0)), Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn view_target_puts_target_ahead() {
        let mut camera = Camera::new();
        camera.set_view_target(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::NEG_Y);
        let target = camera.view().transform_point3(Vec3::ZERO);
        assert_vec3_eq(target, Vec3::new(0.0, 0.0, 5.0));
        assert_vec3_eq(camera.position(), Vec3::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn inverse_view_undoes_view() {
        let mut camera = Camera::new();
        camera.set_view_direction(Vec3::new(1.0, -2.0, 3.0), Vec3::new(0.3, 0.1, 1.0), Vec3::NEG_Y);
        let product = camera.view() * camera.inverse_view();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn yaw_turns_view_onto_x() {
        let mut camera = Camera::new();
        let position = Vec3::new(0.0, 0.0, -2.5);
        camera.set_view_yxz(position, Vec3::new(0.0, FRAC_PI_2, 0.0));
        let ahead = camera.view().transform_point3(position + Vec3::new(3.0, 0.0, 0.0));
        assert_vec3_eq(ahead, Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn unrotated_view_is_translation() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        assert!(camera
            .view()
            .abs_diff_eq(Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0)), 1e-6));
    }
}
