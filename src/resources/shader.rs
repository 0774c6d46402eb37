//! Shader programs and their declared interface
//!
//! Every shader is a WGSL module with `vs_main`/`fs_main` entry points and
//! three bind groups:
//! - group 0: camera (binding 0) and lights (binding 1)
//! - group 1: object transform (binding 0)
//! - group 2: material parameters (binding 0, `array<vec4<f32>, 16>`),
//!   followed by one texture/sampler pair per declared slot at bindings
//!   `1 + 2i` and `2 + 2i`
//!
//! Full-screen shaders take no vertex buffers and are drawn as a single
//! triangle from `@builtin(vertex_index)`.

use std::sync::Arc;

use crate::backend::*;
use crate::error::{RenderError, RenderResult};

/// Scalar/vector parameters a material uniform block holds
pub const MAX_MATERIAL_UNIFORMS: usize = 16;

/// What a shader's vertex stage consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInput {
    /// Mesh vertex buffers with [`Vertex`] layout
    Mesh,
    /// No vertex buffers; three vertices covering the viewport
    Fullscreen,
}

/// A texture input declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub dimension: TextureViewDimension,
    /// A draw without this slot bound is reported as a binding error
    pub required: bool,
}

impl TextureSlot {
    pub fn texture_2d(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: TextureViewDimension::D2,
            required: true,
        }
    }

    pub fn cube(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: TextureViewDimension::Cube,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Source and interface of a shader program
#[derive(Debug, Clone)]
pub struct ShaderDescriptor {
    pub label: String,
    pub source: String,
    pub vertex_input: VertexInput,
    /// Parameter names in uniform-block order; floats occupy `.x` of their slot
    pub uniforms: Vec<String>,
    pub texture_slots: Vec<TextureSlot>,
    pub color_outputs: u32,
}

impl ShaderDescriptor {
    pub fn new(label: &str, source: &str) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
            vertex_input: VertexInput::Mesh,
            uniforms: Vec::new(),
            texture_slots: Vec::new(),
            color_outputs: 1,
        }
    }

    pub fn with_vertex_input(mut self, vertex_input: VertexInput) -> Self {
        self.vertex_input = vertex_input;
        self
    }

    pub fn with_uniforms(mut self, names: &[&str]) -> Self {
        self.uniforms = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot) -> Self {
        self.texture_slots.push(slot);
        self
    }

    pub fn with_color_outputs(mut self, count: u32) -> Self {
        self.color_outputs = count;
        self
    }

    fn validate(&self) -> RenderResult<()> {
        let fail = |msg: String| Err(RenderError::InvalidShader(format!("{}: {}", self.label, msg)));
        if self.source.trim().is_empty() {
            return fail("empty source".into());
        }
        if self.uniforms.len() > MAX_MATERIAL_UNIFORMS {
            return fail(format!(
                "{} uniforms declared, at most {} supported",
                self.uniforms.len(),
                MAX_MATERIAL_UNIFORMS
            ));
        }
        if self.color_outputs == 0 || self.color_outputs > 8 {
            return fail(format!("{} color outputs", self.color_outputs));
        }
        let mut names: Vec<&str> = self
            .uniforms
            .iter()
            .map(String::as_str)
            .chain(self.texture_slots.iter().map(|s| s.name.as_str()))
            .collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return fail(format!("parameter '{}' declared twice", pair[0]));
        }
        Ok(())
    }
}

/// Identifies a shader registered with a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u32);

/// A validated shader program, cheap to clone
#[derive(Debug, Clone)]
pub struct Shader {
    id: ShaderId,
    desc: Arc<ShaderDescriptor>,
}

impl Shader {
    pub(crate) fn new(id: ShaderId, desc: ShaderDescriptor) -> RenderResult<Self> {
        desc.validate()?;
        Ok(Self {
            id,
            desc: Arc::new(desc),
        })
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn descriptor(&self) -> &ShaderDescriptor {
        &self.desc
    }

    pub fn vertex_input(&self) -> VertexInput {
        self.desc.vertex_input
    }

    pub fn color_outputs(&self) -> u32 {
        self.desc.color_outputs
    }

    /// Uniform-block slot of a scalar/vector parameter
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.desc.uniforms.iter().position(|n| n == name)
    }

    /// Declared texture slot with its position
    pub fn texture_slot(&self, name: &str) -> Option<(usize, &TextureSlot)> {
        self.desc
            .texture_slots
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.name == name)
    }

    pub fn texture_slots(&self) -> &[TextureSlot] {
        &self.desc.texture_slots
    }

    /// Material bind group layout for this shader
    pub(crate) fn material_layout_entries(&self) -> Vec<BindGroupLayoutEntry> {
        let mut entries = vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }];
        for (i, slot) in self.desc.texture_slots.iter().enumerate() {
            entries.push(BindGroupLayoutEntry {
                binding: texture_binding(i),
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: slot.dimension,
                },
            });
            entries.push(BindGroupLayoutEntry {
                binding: sampler_binding(i),
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: false },
            });
        }
        entries
    }
}

/// Binding of the texture in slot `i` of the material group
pub fn texture_binding(slot: usize) -> u32 {
    1 + 2 * slot as u32
}

/// Binding of the sampler in slot `i` of the material group
pub fn sampler_binding(slot: usize) -> u32 {
    2 + 2 * slot as u32
}
