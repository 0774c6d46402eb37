//! Deferred renderer
//!
//! Draws and lights are accumulated with [`Renderer::push_render`] and
//! [`Renderer::push_light`], then executed in push order by
//! [`Renderer::render_pushed_commands`]. Each queued draw remembers the
//! render target that was active when it was pushed.

mod capture;
mod draw;

pub use capture::{capture_projection, capture_view, prefilter_roughness};

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::backend::*;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::error::{RenderError, RenderResult};
use crate::resources::pixel::{PixelLayout, PixelType};
use crate::resources::{
    CubeFace, CubeTexture, GpuMesh, Material, Mesh, RenderTarget, Shader, ShaderDescriptor, ShaderId,
    TargetBinding, Texture2D, TextureBinding, TextureSlot, VertexInput,
};
use crate::scene::{Camera, Light, LightBlock, MaterialId, NodeId, Scene};
use crate::RendererConfig;

use draw::{DrawItem, FrameSlot, ObjectSlot, PipelineKey};

const DEFAULT_SHADER: &str = include_str!("../shaders/default.wgsl");
const BLIT_SHADER: &str = include_str!("../shaders/blit.wgsl");

/// Counters reported by a flush, blit or capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Draw calls issued
    pub draws: u32,
    /// Render passes encoded
    pub passes: u32,
    /// Lights written to the light buffer
    pub lights: u32,
    /// Texture slots that fell back to a default texture
    pub binding_errors: u32,
}

/// A queued draw
#[derive(Debug, Clone)]
struct DrawCommand {
    mesh: GpuMesh,
    material: MaterialId,
    world: Mat4,
    target: Option<TargetBinding>,
}

/// Textures substituted for missing or invalid material inputs
struct Fallbacks {
    white: Texture2D,
    black_cube: CubeTexture,
    white_binding: TextureBinding,
    black_cube_binding: TextureBinding,
}

/// Bind group layouts shared by every pipeline
struct SharedLayouts {
    frame: BindGroupLayoutHandle,
    object: BindGroupLayoutHandle,
}

/// Depth buffer used when drawing to the presentation surface
struct SurfaceDepth {
    texture: TextureHandle,
    view: TextureViewHandle,
    size: (u32, u32),
}

/// Scene renderer generic over the GPU backend
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    camera: Camera,
    target: Option<TargetBinding>,

    draw_queue: Vec<DrawCommand>,
    light_queue: Vec<(Light, bool)>,

    layouts: SharedLayouts,
    material_layouts: HashMap<ShaderId, BindGroupLayoutHandle>,
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
    shared_shaders: HashMap<String, Shader>,
    next_shader_id: u32,
    default_shader: Shader,

    light_buffer: BufferHandle,
    frame: FrameSlot,
    capture_frames: Vec<FrameSlot>,
    objects: Vec<ObjectSlot>,

    fallbacks: Fallbacks,
    surface_depth: Option<SurfaceDepth>,
    capture_target: Option<RenderTarget>,
}

impl Renderer<WgpuBackend> {
    /// Create a renderer presenting to `window`
    pub fn with_window(window: Arc<winit::window::Window>, config: RendererConfig) -> RenderResult<Self> {
        let backend = WgpuBackend::new(window, config.vsync)?;
        Self::new(backend, config)
    }

    /// Create a renderer drawing into an offscreen backbuffer of the
    /// configured size
    pub fn headless(config: RendererConfig) -> RenderResult<Self> {
        let backend = WgpuBackend::headless(config.width, config.height)?;
        Self::new(backend, config)
    }
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, config: RendererConfig) -> RenderResult<Self> {
        let frame_layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;
        let object_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX,
            ty: BindingType::UniformBuffer,
        }])?;

        let light_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Light Buffer".into()),
            size: std::mem::size_of::<LightBlock>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let frame = FrameSlot::new(&mut backend, frame_layout, light_buffer, "Camera Buffer")?;

        let mut objects = Vec::with_capacity(config.object_pool_size as usize);
        for index in 0..config.object_pool_size {
            objects.push(ObjectSlot::new(&mut backend, object_layout, index)?);
        }

        let fallbacks = Fallbacks::new(&mut backend)?;

        let mut camera = Camera::default();
        let (width, height) = backend.surface_size();
        camera.set_render_size(width, height);

        let default_shader = Shader::new(ShaderId(0), default_shader_descriptor())?;
        let material_layout = backend.create_bind_group_layout(&default_shader.material_layout_entries())?;
        let mut material_layouts = HashMap::new();
        material_layouts.insert(default_shader.id(), material_layout);

        log::info!(
            "Renderer initialized ({}x{} surface, {} object slots)",
            width,
            height,
            objects.len()
        );

        Ok(Self {
            backend,
            config,
            camera,
            target: None,
            draw_queue: Vec::new(),
            light_queue: Vec::new(),
            layouts: SharedLayouts {
                frame: frame_layout,
                object: object_layout,
            },
            material_layouts,
            pipelines: HashMap::new(),
            shared_shaders: HashMap::new(),
            next_shader_id: 1,
            default_shader,
            light_buffer,
            frame,
            capture_frames: Vec::new(),
            objects,
            fallbacks,
            surface_depth: None,
            capture_target: None,
        })
    }

    /// Release renderer-owned GPU resources and hand back the backend
    pub fn destroy(mut self) -> B {
        for slot in self.objects.drain(..) {
            self.backend.destroy_bind_group(slot.bind_group);
            self.backend.destroy_buffer(slot.buffer);
        }
        for frame in self.capture_frames.drain(..) {
            self.backend.destroy_bind_group(frame.bind_group);
            self.backend.destroy_buffer(frame.camera_buffer);
        }
        self.backend.destroy_bind_group(self.frame.bind_group);
        self.backend.destroy_buffer(self.frame.camera_buffer);
        self.backend.destroy_buffer(self.light_buffer);
        self.fallbacks.white.destroy(&mut self.backend);
        self.fallbacks.black_cube.destroy(&mut self.backend);
        if let Some(depth) = self.surface_depth.take() {
            self.backend.destroy_texture(depth.texture);
        }
        if let Some(target) = self.capture_target.take() {
            target.destroy(&mut self.backend);
        }
        for (_, pipeline) in self.pipelines.drain() {
            self.backend.destroy_render_pipeline(pipeline);
        }
        for (_, layout) in self.material_layouts.drain() {
            self.backend.destroy_bind_group_layout(layout);
        }
        self.backend.destroy_bind_group_layout(self.layouts.frame);
        self.backend.destroy_bind_group_layout(self.layouts.object);
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Resize the presentation surface
    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
        if self.target.is_none() {
            self.camera.set_render_size(width, height);
        }
    }

    /// Register a shader program and its material layout
    pub fn create_shader(&mut self, desc: ShaderDescriptor) -> RenderResult<Shader> {
        let shader = Shader::new(ShaderId(self.next_shader_id), desc).map_err(|e| {
            log::error!("{}", e);
            e
        })?;
        let layout = self
            .backend
            .create_bind_group_layout(&shader.material_layout_entries())?;
        self.next_shader_id += 1;
        self.material_layouts.insert(shader.id(), layout);
        log::debug!(
            "Registered shader '{}' ({} uniforms, {} texture slots)",
            shader.label(),
            shader.descriptor().uniforms.len(),
            shader.texture_slots().len()
        );
        Ok(shader)
    }

    /// Shader registered once per renderer under `desc.label`; later calls
    /// with the same label return the first registration
    pub fn shared_shader(&mut self, desc: ShaderDescriptor) -> RenderResult<Shader> {
        if let Some(shader) = self.shared_shaders.get(&desc.label) {
            return Ok(shader.clone());
        }
        let label = desc.label.clone();
        let shader = self.create_shader(desc)?;
        self.shared_shaders.insert(label, shader.clone());
        Ok(shader)
    }

    /// Release a shader's material layout and every pipeline built from
    /// it. Materials still using the shader fail to draw afterwards.
    pub fn destroy_shader(&mut self, shader: &Shader) {
        if shader.id() == self.default_shader.id() {
            log::warn!("Refusing to destroy the default shader");
            return;
        }
        self.shared_shaders.retain(|_, shared| shared.id() != shader.id());
        if let Some(layout) = self.material_layouts.remove(&shader.id()) {
            self.backend.destroy_bind_group_layout(layout);
        }
        let backend = &mut self.backend;
        self.pipelines.retain(|key, pipeline| {
            if key.shader == shader.id() {
                backend.destroy_render_pipeline(*pipeline);
                false
            } else {
                true
            }
        });
        log::debug!("Destroyed shader '{}'", shader.label());
    }

    /// Number of render pipelines currently cached
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Shader used by [`create_material`](Self::create_material)
    pub fn default_shader(&self) -> &Shader {
        &self.default_shader
    }

    /// Material with the built-in lit shader
    pub fn create_material(&mut self) -> RenderResult<Material> {
        let shader = self.default_shader.clone();
        let mut material = Material::new(&mut self.backend, shader)?;
        material.set_vector("base_color", Vec4::ONE);
        material.set_float("metallic", 0.0);
        material.set_float("roughness", 0.5);
        material.set_float("exposure", 1.0);
        Ok(material)
    }

    /// Material for a shader registered with this renderer
    pub fn create_custom_material(&mut self, shader: &Shader) -> RenderResult<Material> {
        if !self.material_layouts.contains_key(&shader.id()) {
            let err = RenderError::InvalidShader(format!("'{}' is not registered", shader.label()));
            log::error!("{}", err);
            return Err(err);
        }
        Material::new(&mut self.backend, shader.clone())
    }

    pub fn upload_mesh(&mut self, mesh: &Mesh) -> RenderResult<GpuMesh> {
        mesh.upload(&mut self.backend)
    }

    /// Queue `node` and its descendants, depth first, with their current
    /// world transforms
    pub fn push_render(&mut self, scene: &Scene, node: NodeId) -> RenderResult<()> {
        let order = scene.subtree(node).map_err(|e| {
            log::error!("push_render: {}", e);
            e
        })?;
        for id in order {
            let entry = scene.node(id)?;
            let (Some(mesh), Some(material)) = (entry.mesh, entry.material) else {
                continue;
            };
            self.draw_queue.push(DrawCommand {
                mesh,
                material,
                world: scene.world_transform(id)?,
                target: self.target.clone(),
            });
        }
        Ok(())
    }

    /// Queue a light for the next flush
    pub fn push_light(&mut self, light: Light, casts_shadow: bool) {
        let cap = self.config.max_lights.min(crate::scene::MAX_LIGHTS) as usize;
        if self.light_queue.len() >= cap {
            log::warn!("Light limit of {} reached, dropping {:?}", cap, light);
            return;
        }
        self.light_queue.push((light, casts_shadow));
    }

    /// Direct subsequent pushes to `target`, or to the presentation surface
    /// with `None`. The camera aspect follows the new render size.
    pub fn set_target(&mut self, target: Option<&RenderTarget>) {
        self.target = target.map(RenderTarget::binding);
        let (width, height) = match &self.target {
            Some(binding) => (binding.width, binding.height),
            None => self.backend.surface_size(),
        };
        self.camera.set_render_size(width, height);
    }

    /// Target that new pushes go to; `None` is the presentation surface
    pub fn target(&self) -> Option<&TargetBinding> {
        self.target.as_ref()
    }

    pub fn queued_draws(&self) -> usize {
        self.draw_queue.len()
    }

    pub fn queued_lights(&self) -> usize {
        self.light_queue.len()
    }

    /// Execute every queued draw and clear both queues.
    ///
    /// Consecutive draws into the same target share a render pass. The
    /// first pass into a target clears it. Presents when any draw went to
    /// the presentation surface.
    pub fn render_pushed_commands(&mut self, scene: &Scene) -> RenderResult<FlushStats> {
        let commands = std::mem::take(&mut self.draw_queue);
        let lights = std::mem::take(&mut self.light_queue);
        if commands.is_empty() {
            log::trace!("Flush with an empty draw queue");
            return Ok(FlushStats::default());
        }

        let block = LightBlock::from_queue(&lights);
        self.backend
            .write_buffer(self.light_buffer, 0, bytemuck::bytes_of(&block));
        let camera = self.camera.uniform_data();
        self.backend
            .write_buffer(self.frame.camera_buffer, 0, bytemuck::bytes_of(&camera));

        let mut items = Vec::with_capacity(commands.len());
        for command in &commands {
            let material = scene.material(command.material).map_err(|e| {
                log::error!("Flush: {}", e);
                e
            })?;
            items.push(DrawItem {
                mesh: Some(command.mesh),
                material,
                world: command.world,
                target: command.target.clone(),
                frame: self.frame.bind_group,
                front_face: FrontFace::Ccw,
                source: None,
            });
        }

        let mut stats = self.execute("Scene Pass", &items)?;
        stats.lights = block.count();
        log::trace!("Flushed {:?}", stats);
        Ok(stats)
    }

    /// Draw `material`'s full-screen shader into `destination` (the
    /// presentation surface when `None`), sampling `source` through the
    /// shader's `"source"` slot
    pub fn blit(
        &mut self,
        source: Option<TextureBinding>,
        destination: Option<&RenderTarget>,
        material: &Material,
    ) -> RenderResult<FlushStats> {
        if material.shader().vertex_input() != VertexInput::Fullscreen {
            let err = RenderError::NotFullscreen(material.shader().label().to_string());
            log::error!("Blit: {}", err);
            return Err(err);
        }
        if source.is_some() && material.shader().texture_slot("source").is_none() {
            log::debug!(
                "Blit source ignored, shader '{}' has no 'source' slot",
                material.shader().label()
            );
        }
        let item = DrawItem {
            mesh: None,
            material,
            world: Mat4::IDENTITY,
            target: destination.map(RenderTarget::binding),
            frame: self.frame.bind_group,
            front_face: FrontFace::Ccw,
            source,
        };
        self.execute("Blit Pass", std::slice::from_ref(&item))
    }
}

impl Fallbacks {
    fn new<B: GraphicsBackend>(backend: &mut B) -> RenderResult<Self> {
        let mut white = Texture2D::solid_color(backend, "Fallback White", [255, 255, 255, 255])?;
        let mut black_cube = CubeTexture::new("Fallback Black Cube");
        for face in CubeFace::ALL {
            black_cube.generate_face(
                backend,
                face,
                1,
                1,
                PixelLayout::Rgba,
                PixelType::UnsignedByte,
                Some(&[0, 0, 0, 255]),
            )?;
        }
        let white_binding = white.binding(backend)?;
        let black_cube_binding = black_cube.binding(backend)?;
        Ok(Self {
            white,
            black_cube,
            white_binding,
            black_cube_binding,
        })
    }

    fn for_dimension(&self, dimension: TextureViewDimension) -> TextureBinding {
        match dimension {
            TextureViewDimension::Cube => self.black_cube_binding,
            TextureViewDimension::D2 | TextureViewDimension::D2Array => self.white_binding,
        }
    }
}

fn default_shader_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new("Default Lit", DEFAULT_SHADER)
        .with_uniforms(&["base_color", "metallic", "roughness", "exposure"])
        .with_texture(TextureSlot::texture_2d("albedo").optional())
        .with_texture(TextureSlot::cube("EnvIrradiance").optional())
        .with_texture(TextureSlot::cube("EnvPrefilter").optional())
        .with_texture(TextureSlot::texture_2d("BRDFLUT").optional())
}

/// Fullscreen copy of the blit source into the destination
pub fn blit_shader_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new("Blit", BLIT_SHADER)
        .with_vertex_input(VertexInput::Fullscreen)
        .with_texture(TextureSlot::texture_2d("source"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;
    use glam::Vec3;

    fn renderer() -> Renderer<DummyBackend> {
        Renderer::new(DummyBackend::new(64, 32), RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_push_render_resolves_world_transforms() {
        let mut renderer = renderer();
        let mesh = renderer.upload_mesh(&Mesh::cube()).unwrap();
        let mut scene = Scene::new();
        let material = renderer.create_material().unwrap();
        let material = scene.add_material(material);
        let parent = scene.add_node("parent", mesh, material).unwrap();
        let child = scene.add_node("child", mesh, material).unwrap();
        scene.attach(parent, child).unwrap();
        scene.node_mut(parent).unwrap().transform = Transform::from_position(Vec3::X);
        scene.node_mut(child).unwrap().transform = Transform::from_position(Vec3::Y);

        renderer.push_render(&scene, parent).unwrap();
        assert_eq!(renderer.queued_draws(), 2);

        // Later edits do not affect queued draws
        scene.node_mut(parent).unwrap().transform = Transform::default();
        assert_eq!(
            renderer.draw_queue[1].world.w_axis.truncate(),
            Vec3::new(1.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_light_cap() {
        let mut renderer = Renderer::new(
            DummyBackend::new(8, 8),
            RendererConfig {
                max_lights: 2,
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..3 {
            renderer.push_light(Light::point(Vec3::ZERO, Vec3::ONE, 1.0, 5.0), false);
        }
        assert_eq!(renderer.queued_lights(), 2);
    }

    #[test]
    fn test_set_target_follows_aspect() {
        let mut renderer = renderer();
        let target = RenderTarget::new(renderer.backend_mut(), "square", 16, 16, PixelType::UnsignedByte, 1, true)
            .unwrap();
        renderer.set_target(Some(&target));
        assert_eq!(renderer.target().map(|t| t.width), Some(16));
        assert!(matches!(
            renderer.camera().projection,
            crate::scene::Projection::Perspective { aspect, .. } if aspect == 1.0
        ));
        renderer.set_target(None);
        assert!(matches!(
            renderer.camera().projection,
            crate::scene::Projection::Perspective { aspect, .. } if aspect == 2.0
        ));
    }

    #[test]
    fn test_unregistered_shader_is_rejected() {
        let mut renderer = renderer();
        let mut other = Renderer::new(DummyBackend::new(8, 8), RendererConfig::default()).unwrap();
        let _ = other.create_shader(ShaderDescriptor::new("a", "x")).unwrap();
        let foreign = other.create_shader(ShaderDescriptor::new("b", "x")).unwrap();
        assert!(matches!(
            renderer.create_custom_material(&foreign),
            Err(RenderError::InvalidShader(_))
        ));
    }

    #[test]
    fn test_destroy_shader_releases_pipelines() {
        let mut renderer = renderer();
        let shader = renderer.create_shader(ShaderDescriptor::new("Flat", "x")).unwrap();
        let mesh = renderer.upload_mesh(&Mesh::cube()).unwrap();
        let mut scene = Scene::new();
        let material = renderer.create_custom_material(&shader).unwrap();
        let material = scene.add_material(material);
        let node = scene.add_node("flat", mesh, material).unwrap();
        let layouts = renderer.backend().live_bind_group_layouts();

        renderer.push_render(&scene, node).unwrap();
        renderer.render_pushed_commands(&scene).unwrap();
        assert_eq!(renderer.pipeline_count(), 1);
        let pipeline = renderer.backend().passes()[0].draws[0].pipeline;
        let desc = renderer.backend().pipeline(pipeline).unwrap();
        assert_eq!(desc.color_targets[0].write_mask, ColorWrites::ALL);

        renderer.destroy_shader(&shader);
        assert_eq!(renderer.pipeline_count(), 0);
        assert_eq!(renderer.backend().live_pipelines(), 0);
        assert_eq!(renderer.backend().live_bind_group_layouts(), layouts - 1);
        assert!(matches!(
            renderer.create_custom_material(&shader),
            Err(RenderError::InvalidShader(_))
        ));

        let default = renderer.default_shader().clone();
        renderer.destroy_shader(&default);
        assert!(renderer.create_material().is_ok());
    }
}
