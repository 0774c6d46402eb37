//! Light types and their GPU layout

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Default cap on lights accepted per flush
pub const MAX_LIGHTS: u32 = 32;

/// Point light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// A light pushed into the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point(PointLight),
    Directional(DirectionalLight),
}

impl Light {
    pub fn point(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Light::Point(PointLight {
            position,
            color,
            intensity,
            radius,
        })
    }

    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Light::Directional(DirectionalLight {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        })
    }

    /// Convert to GPU data format
    pub fn to_gpu_data(&self, casts_shadow: bool) -> GpuLightData {
        let shadow = if casts_shadow { 1.0 } else { 0.0 };
        match self {
            Light::Point(p) => GpuLightData {
                position: p.position.extend(p.radius),
                color_intensity: p.color.extend(p.intensity),
                direction_type: Vec4::ZERO, // type 0 = point
                flags: Vec4::new(shadow, 0.0, 0.0, 0.0),
            },
            Light::Directional(d) => GpuLightData {
                position: Vec4::new(0.0, 0.0, 0.0, f32::MAX),
                color_intensity: d.color.extend(d.intensity),
                direction_type: d.direction.extend(1.0), // type 1 = directional
                flags: Vec4::new(shadow, 0.0, 0.0, 0.0),
            },
        }
    }
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0=point, 1=directional)
    pub direction_type: Vec4,
    /// x = casts shadow, yzw = unused
    pub flags: Vec4,
}

/// Light buffer contents for one flush
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightBlock {
    pub lights: [GpuLightData; MAX_LIGHTS as usize],
    /// x = number of valid entries
    pub count: [u32; 4],
}

impl LightBlock {
    pub fn from_queue(queue: &[(Light, bool)]) -> Self {
        let mut block = Self::zeroed();
        for (slot, (light, casts_shadow)) in block.lights.iter_mut().zip(queue) {
            *slot = light.to_gpu_data(*casts_shadow);
        }
        block.count[0] = queue.len().min(MAX_LIGHTS as usize) as u32;
        block
    }

    pub fn count(&self) -> u32 {
        self.count[0]
    }
}
