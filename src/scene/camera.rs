//! Cameras supplied by the scene collaborator

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// A perspective camera as extracted from the world each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Update aspect ratio from a viewport size
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn uniform_data(&self) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        let view_proj = proj * view;

        CameraUniformData {
            view,
            proj,
            view_proj,
            inv_view: view.inverse(),
            inv_proj: proj.inverse(),
            position: self.position.extend(1.0),
            near_far: Vec4::new(self.near, self.far, 0.0, 0.0),
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_data_is_consistent() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let data = camera.uniform_data();
        assert_eq!(data.view_proj, data.proj * data.view);
        assert_eq!(data.position, Vec4::new(0.0, 0.0, 10.0, 1.0));
        assert_eq!(
            bytemuck::bytes_of(&data).len(),
            std::mem::size_of::<CameraUniformData>()
        );
    }

    #[test]
    fn test_set_aspect_ignores_zero_height() {
        let mut camera = Camera::default();
        camera.set_aspect(1920.0, 0.0);
        assert_eq!(camera.aspect, 16.0 / 9.0);
        camera.set_aspect(800.0, 800.0);
        assert_eq!(camera.aspect, 1.0);
    }
}
