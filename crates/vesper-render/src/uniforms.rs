//! Global uniform block.

use glam::{Mat4, Vec3};

/// Single point light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::splat(-1.0),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Per-frame constants bound at set 0, binding 0.
///
/// Layout must match `GlobalUbo` in the simple shader (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalUniforms {
    pub projection_view: [[f32; 4]; 4],
    /// RGB color, w is intensity.
    pub ambient_color: [f32; 4],
    /// xyz position, w unused.
    pub light_position: [f32; 4],
    /// RGB color, w is intensity.
    pub light_color: [f32; 4],
}

impl Default for GlobalUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

impl GlobalUniforms {
    /// Uniforms with a dim white ambient term and the default light.
    pub fn new(projection_view: Mat4) -> Self {
        Self {
            projection_view: projection_view.to_cols_array_2d(),
            ambient_color: [1.0, 1.0, 1.0, 0.02],
            light_position: [0.0; 4],
            light_color: [0.0; 4],
        }
        .with_light(&PointLight::default())
    }

    pub fn with_ambient(mut self, color: Vec3, intensity: f32) -> Self {
        self.ambient_color = color.extend(intensity).to_array();
        self
    }

    pub fn with_light(mut self, light: &PointLight) -> Self {
        self.light_position = light.position.extend(0.0).to_array();
        self.light_color = light.color.extend(light.intensity).to_array();
        self
    }

    pub fn projection_view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection_view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn std140_layout() {
        assert_eq!(size_of::<GlobalUniforms>(), 112);
        assert_eq!(offset_of!(GlobalUniforms, ambient_color), 64);
        assert_eq!(offset_of!(GlobalUniforms, light_position), 80);
        assert_eq!(offset_of!(GlobalUniforms, light_color), 96);
    }

    #[test]
    fn defaults() {
        let uniforms = GlobalUniforms::default();
        assert_eq!(uniforms.projection_view(), Mat4::IDENTITY);
        assert_eq!(uniforms.ambient_color, [1.0, 1.0, 1.0, 0.02]);
        assert_eq!(uniforms.light_position, [-1.0, -1.0, -1.0, 0.0]);
        assert_eq!(uniforms.light_color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn light_intensity_packed_in_w() {
        let uniforms = GlobalUniforms::default()
            .with_ambient(Vec3::new(0.1, 0.2, 0.3), 0.5)
            .with_light(&PointLight {
                position: Vec3::new(1.0, -3.0, 2.0),
                color: Vec3::new(1.0, 0.5, 0.25),
                intensity: 4.0,
            });
        assert_eq!(uniforms.ambient_color, [0.1, 0.2, 0.3, 0.5]);
        assert_eq!(uniforms.light_position, [1.0, -3.0, 2.0, 0.0]);
        assert_eq!(uniforms.light_color, [1.0, 0.5, 0.25, 4.0]);
    }
}
