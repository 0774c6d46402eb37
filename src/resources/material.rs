//! Materials: named parameters bound to a shader plus fixed-function state

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::*;
use crate::error::RenderResult;
use crate::resources::shader::{Shader, MAX_MATERIAL_UNIFORMS};
use crate::resources::units::TextureBinding;

/// A typed material parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialParam {
    Float(f32),
    Vector(Vec4),
    Texture { binding: TextureBinding, unit: u32 },
    TextureCube { binding: TextureBinding, unit: u32 },
}

/// Material uniform block as laid out in WGSL
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub values: [Vec4; MAX_MATERIAL_UNIFORMS],
}

/// Named-parameter bag bound to a shader
#[derive(Debug)]
pub struct Material {
    shader: Shader,
    params: BTreeMap<String, MaterialParam>,
    uniform_buffer: BufferHandle,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub cull: CullMode,
    pub blend: Option<BlendState>,
}

impl Material {
    pub(crate) fn new<B: GraphicsBackend>(backend: &mut B, shader: Shader) -> RenderResult<Self> {
        let uniform_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("{} Material Uniforms", shader.label())),
            size: std::mem::size_of::<MaterialUniformData>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        Ok(Self {
            shader,
            params: BTreeMap::new(),
            uniform_buffer,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::Less,
            cull: CullMode::Back,
            blend: None,
        })
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub(crate) fn uniform_buffer(&self) -> BufferHandle {
        self.uniform_buffer
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, MaterialParam::Float(value));
    }

    pub fn set_vector(&mut self, name: &str, value: Vec4) {
        self.set(name, MaterialParam::Vector(value));
    }

    /// Sample a 2D texture through slot `name` on `unit`
    pub fn set_texture(&mut self, name: &str, binding: TextureBinding, unit: u32) {
        self.set(name, MaterialParam::Texture { binding, unit });
    }

    /// Sample a cube texture through slot `name` on `unit`
    pub fn set_texture_cube(&mut self, name: &str, binding: TextureBinding, unit: u32) {
        self.set(name, MaterialParam::TextureCube { binding, unit });
    }

    /// Set a parameter, replacing any previous value of that name
    pub fn set(&mut self, name: &str, param: MaterialParam) {
        if self.shader.uniform_index(name).is_none() && self.shader.texture_slot(name).is_none() {
            log::debug!(
                "Material parameter '{}' is not declared by shader '{}'",
                name,
                self.shader.label()
            );
        }
        self.params.insert(name.to_string(), param);
    }

    pub fn get(&self, name: &str) -> Option<&MaterialParam> {
        self.params.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<MaterialParam> {
        self.params.remove(name)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &MaterialParam)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Scalar and vector parameters packed in the shader's declared order
    pub fn uniform_data(&self) -> MaterialUniformData {
        let mut data = MaterialUniformData::zeroed();
        for (slot, name) in self.shader.descriptor().uniforms.iter().enumerate() {
            data.values[slot] = match self.params.get(name) {
                Some(MaterialParam::Float(v)) => Vec4::new(*v, 0.0, 0.0, 0.0),
                Some(MaterialParam::Vector(v)) => *v,
                _ => Vec4::ZERO,
            };
        }
        data
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.uniform_buffer);
    }
}
