//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Light variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Point { radius: f32 },
    Directional { direction: Vec3 },
}

/// A light as extracted from the world each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn point(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            kind: LightKind::Point { radius },
            position,
            color,
            intensity,
        }
    }

    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize_or_zero(),
            },
            position: Vec3::ZERO,
            color,
            intensity,
        }
    }

    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        let (position, direction_type) = match self.kind {
            LightKind::Point { radius } => (self.position.extend(radius), Vec4::ZERO), // type 0 = point
            LightKind::Directional { direction } => {
                (Vec4::ZERO, direction.extend(1.0)) // type 1 = directional
            }
        };
        GpuLightData {
            position,
            color_intensity: self.color.extend(self.intensity),
            direction_type,
        }
    }
}

/// GPU light data
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// rgb = color, a = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type
    pub direction_type: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_gpu_data() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 5.0, 10.0);
        let data = light.to_gpu_data();
        assert_eq!(data.position, Vec4::new(1.0, 2.0, 3.0, 10.0));
        assert_eq!(data.color_intensity.w, 5.0);
        assert_eq!(data.direction_type.w, 0.0);
    }

    #[test]
    fn test_directional_light_is_normalized() {
        let light = Light::directional(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        let data = light.to_gpu_data();
        assert_eq!(data.direction_type, Vec4::new(0.0, -1.0, 0.0, 1.0));
    }
}
