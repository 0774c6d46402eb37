//! Skybox drawn behind the scene from a cube texture

use crate::backend::*;
use crate::error::RenderResult;
use crate::renderer::Renderer;
use crate::resources::{GpuMesh, ShaderDescriptor, TextureBinding, TextureSlot};
use crate::scene::{MaterialId, NodeId, Scene};

const BACKGROUND_SHADER: &str = include_str!("../shaders/background.wgsl");

pub fn background_shader_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new("Background", BACKGROUND_SHADER)
        .with_uniforms(&["lod_level", "exposure"])
        .with_texture(TextureSlot::cube("background"))
}

/// A unit cube node whose faces sit on the far plane.
///
/// Push it like any other node; it only covers pixels no other geometry
/// has written depth to.
#[derive(Debug, Clone, Copy)]
pub struct Background {
    node: NodeId,
    material: MaterialId,
}

impl Background {
    /// Add a background node to `scene` showing `cubemap`.
    ///
    /// All backgrounds of a renderer share one shader.
    pub fn new<B: GraphicsBackend>(
        renderer: &mut Renderer<B>,
        scene: &mut Scene,
        mesh: GpuMesh,
        cubemap: TextureBinding,
    ) -> RenderResult<Self> {
        let shader = renderer.shared_shader(background_shader_descriptor())?;
        let mut material = renderer.create_custom_material(&shader)?;
        material.depth_compare = CompareFunction::LessEqual;
        material.depth_write = false;
        material.cull = CullMode::None;
        material.set_float("lod_level", 0.0);
        material.set_float("exposure", 1.0);
        material.set_texture_cube("background", cubemap, 0);

        let material = scene.add_material(material);
        let node = scene.add_node("Background", mesh, material)?;
        Ok(Self { node, material })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn set_cubemap(&self, scene: &mut Scene, cubemap: TextureBinding) -> RenderResult<()> {
        scene.material_mut(self.material)?.set_texture_cube("background", cubemap, 0);
        Ok(())
    }

    /// Mip level sampled, e.g. a prefilter mip for a blurred sky
    pub fn set_lod_level(&self, scene: &mut Scene, lod_level: f32) -> RenderResult<()> {
        scene.material_mut(self.material)?.set_float("lod_level", lod_level);
        Ok(())
    }

    pub fn set_exposure(&self, scene: &mut Scene, exposure: f32) -> RenderResult<()> {
        scene.material_mut(self.material)?.set_float("exposure", exposure);
        Ok(())
    }
}
