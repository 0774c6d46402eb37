//! Pass encoding shared by flushes, blits and cube captures

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use glam::Mat4;

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::{
    sampler_binding, texture_binding, GpuMesh, Material, MaterialParam, TargetBinding, TextureBinding,
    TextureSlot, VertexInput,
};
use crate::scene::CameraUniformData;

use super::{FlushStats, Renderer, SurfaceDepth};

/// Camera buffer plus the group 0 bind group exposing it with the lights
pub(super) struct FrameSlot {
    pub(super) camera_buffer: BufferHandle,
    pub(super) bind_group: BindGroupHandle,
}

impl FrameSlot {
    pub(super) fn new<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        light_buffer: BufferHandle,
        label: &str,
    ) -> RenderResult<Self> {
        let camera_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: std::mem::size_of::<CameraUniformData>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let bind_group = backend.create_bind_group(
            layout,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer: camera_buffer,
                        offset: 0,
                        size: None,
                    },
                ),
                (
                    1,
                    BindGroupEntry::Buffer {
                        buffer: light_buffer,
                        offset: 0,
                        size: None,
                    },
                ),
            ],
        )?;
        Ok(Self {
            camera_buffer,
            bind_group,
        })
    }
}

/// Per-draw object uniform buffer and its group 1 bind group
pub(super) struct ObjectSlot {
    pub(super) buffer: BufferHandle,
    pub(super) bind_group: BindGroupHandle,
}

impl ObjectSlot {
    pub(super) fn new<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        index: u32,
    ) -> RenderResult<Self> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("Object Buffer {}", index)),
            size: std::mem::size_of::<ObjectUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let bind_group = backend.create_bind_group(
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            )],
        )?;
        Ok(Self { buffer, bind_group })
    }
}

/// One draw ready for encoding
pub(super) struct DrawItem<'a> {
    /// `None` draws a full-screen triangle
    pub(super) mesh: Option<GpuMesh>,
    pub(super) material: &'a Material,
    pub(super) world: Mat4,
    /// `None` is the presentation surface
    pub(super) target: Option<TargetBinding>,
    /// Group 0 bind group holding the camera for this draw
    pub(super) frame: BindGroupHandle,
    pub(super) front_face: FrontFace,
    /// Overrides the material's `"source"` slot
    pub(super) source: Option<TextureBinding>,
}

/// Everything a render pipeline is specialized on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub(super) shader: crate::resources::ShaderId,
    color_formats: Vec<TextureFormat>,
    /// Depth write and comparison, when the target has a depth buffer
    depth: Option<(bool, CompareFunction)>,
    cull: CullMode,
    blend: Option<BlendState>,
    front_face: FrontFace,
}

/// Why a texture slot fell back to a default texture
enum SlotIssue {
    Unset,
    NotATexture,
    WrongDimension(TextureViewDimension),
    UnitTaken(u32),
}

impl fmt::Display for SlotIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotIssue::Unset => write!(f, "no texture set"),
            SlotIssue::NotATexture => write!(f, "parameter is not a texture"),
            SlotIssue::WrongDimension(dim) => write!(f, "bound texture is {:?}", dim),
            SlotIssue::UnitTaken(unit) => write!(f, "unit {} already holds another texture", unit),
        }
    }
}

#[derive(Default)]
struct EncodeState {
    stats: FlushStats,
    frame: Option<FrameContext>,
    pass: Option<TargetBinding>,
    cleared: HashSet<TextureViewHandle>,
    transient: Vec<BindGroupHandle>,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Encode `items` in order and submit.
    ///
    /// Presents when the presentation surface was drawn to and encoding
    /// succeeded; otherwise work encoded so far is submitted only.
    pub(super) fn execute(&mut self, label: &str, items: &[DrawItem<'_>]) -> RenderResult<FlushStats> {
        if items.is_empty() {
            return Ok(FlushStats::default());
        }
        let mut state = EncodeState::default();
        let result = self.encode(label, items, &mut state);
        if state.pass.take().is_some() {
            self.backend.end_render_pass();
        }

        let finished = match (&result, state.frame) {
            (Ok(()), Some(_)) => self.backend.end_frame(),
            _ => {
                self.backend.submit();
                Ok(())
            }
        };
        for bind_group in state.transient.drain(..) {
            self.backend.destroy_bind_group(bind_group);
        }

        if let Err(err) = &result {
            log::error!("{} aborted: {}", label, err);
        }
        result?;
        finished?;
        Ok(state.stats)
    }

    fn encode(&mut self, label: &str, items: &[DrawItem<'_>], state: &mut EncodeState) -> RenderResult<()> {
        self.ensure_object_slots(items.len())?;
        for (slot, item) in self.objects.iter().zip(items) {
            let uniform = ObjectUniform::from_model(item.world);
            self.backend
                .write_buffer(slot.buffer, 0, bytemuck::bytes_of(&uniform));
        }
        for item in items {
            let data = item.material.uniform_data();
            self.backend
                .write_buffer(item.material.uniform_buffer(), 0, bytemuck::bytes_of(&data));
        }

        for (index, item) in items.iter().enumerate() {
            let target = match state.pass.clone() {
                Some(open) if index > 0 && items[index - 1].target == item.target => open,
                _ => self.begin_pass(label, &item.target, state)?,
            };

            let shader = item.material.shader();
            let attachments = target.colors.len() as u32;
            if shader.color_outputs() != attachments {
                return Err(RenderError::AttachmentMismatch {
                    shader: shader.label().to_string(),
                    expected: shader.color_outputs(),
                    actual: attachments,
                });
            }

            let pipeline = self.pipeline_for(item, &target)?;
            let material_group = self.material_bind_group(item, &mut state.stats)?;
            state.transient.push(material_group);

            self.backend.set_render_pipeline(pipeline);
            self.backend.set_bind_group(0, item.frame);
            self.backend.set_bind_group(1, self.objects[index].bind_group);
            self.backend.set_bind_group(2, material_group);
            match (shader.vertex_input(), item.mesh) {
                (VertexInput::Mesh, Some(mesh)) => {
                    self.backend.set_vertex_buffer(0, mesh.vertex_buffer, 0);
                    self.backend
                        .set_index_buffer(mesh.index_buffer, 0, IndexFormat::Uint32);
                    self.backend.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
                (VertexInput::Mesh, None) => {
                    return Err(RenderError::InvalidShader(format!(
                        "'{}' needs a mesh",
                        shader.label()
                    )));
                }
                (VertexInput::Fullscreen, _) => self.backend.draw(0..3, 0..1),
            }
            state.stats.draws += 1;
        }
        Ok(())
    }

    /// Close the open pass and begin one into `target`, clearing it the
    /// first time it is drawn to
    fn begin_pass(
        &mut self,
        label: &str,
        target: &Option<TargetBinding>,
        state: &mut EncodeState,
    ) -> RenderResult<TargetBinding> {
        if state.pass.take().is_some() {
            self.backend.end_render_pass();
        }
        let binding = match target {
            Some(binding) => binding.clone(),
            None => self.surface_binding(state)?,
        };

        let first = binding
            .colors
            .first()
            .map_or(true, |(view, _)| state.cleared.insert(*view));
        let (color_load, depth_load) = if first {
            (LoadOp::Clear(self.config.clear_color), LoadOp::Clear([1.0, 0.0, 0.0, 0.0]))
        } else {
            (LoadOp::Load, LoadOp::Load)
        };

        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(label.to_string()),
            color_attachments: binding
                .colors
                .iter()
                .map(|(view, _)| ColorAttachment {
                    view: *view,
                    load_op: color_load.clone(),
                    store_op: StoreOp::Store,
                })
                .collect(),
            depth_stencil_attachment: binding.depth.map(|view| DepthStencilAttachment {
                view,
                depth_load_op: depth_load.clone(),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        self.backend.set_viewport(
            0.0,
            0.0,
            binding.width as f32,
            binding.height as f32,
            0.0,
            1.0,
        );
        state.stats.passes += 1;
        state.pass = Some(binding.clone());
        Ok(binding)
    }

    /// Swapchain view and surface depth buffer, beginning the frame on
    /// first use
    fn surface_binding(&mut self, state: &mut EncodeState) -> RenderResult<TargetBinding> {
        let frame = match state.frame {
            Some(frame) => frame,
            None => {
                let frame = self.backend.begin_frame()?;
                state.frame = Some(frame);
                frame
            }
        };
        let depth = self.surface_depth_view(frame.width, frame.height)?;
        Ok(TargetBinding {
            colors: vec![(frame.swapchain_view, self.backend.swapchain_format())],
            depth: Some(depth),
            width: frame.width,
            height: frame.height,
        })
    }

    fn surface_depth_view(&mut self, width: u32, height: u32) -> RenderResult<TextureViewHandle> {
        let desc = TextureDescriptor {
            label: Some("Surface Depth".into()),
            width,
            height,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        };
        match &mut self.surface_depth {
            Some(depth) if depth.size == (width, height) => return Ok(depth.view),
            Some(depth) => {
                self.backend.recreate_texture(depth.texture, &desc)?;
                depth.size = (width, height);
                return Ok(depth.view);
            }
            None => {}
        }
        let texture = self.backend.create_texture(&desc)?;
        let view = self
            .backend
            .create_texture_view(texture, &TextureViewDescriptor::default())?;
        self.surface_depth = Some(SurfaceDepth {
            texture,
            view,
            size: (width, height),
        });
        Ok(view)
    }

    fn ensure_object_slots(&mut self, count: usize) -> RenderResult<()> {
        if self.objects.len() >= count {
            return Ok(());
        }
        while self.objects.len() < count {
            let slot = ObjectSlot::new(&mut self.backend, self.layouts.object, self.objects.len() as u32)?;
            self.objects.push(slot);
        }
        log::debug!("Object uniform pool grown to {} slots", count);
        Ok(())
    }

    fn pipeline_for(&mut self, item: &DrawItem<'_>, target: &TargetBinding) -> RenderResult<RenderPipelineHandle> {
        let material = item.material;
        let shader = material.shader();
        let key = PipelineKey {
            shader: shader.id(),
            color_formats: target.colors.iter().map(|(_, format)| *format).collect(),
            depth: target.depth.map(|_| {
                if material.depth_test {
                    (material.depth_write, material.depth_compare)
                } else {
                    (false, CompareFunction::Always)
                }
            }),
            cull: material.cull,
            blend: material.blend,
            front_face: item.front_face,
        };
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let material_layout = *self
            .material_layouts
            .get(&shader.id())
            .ok_or_else(|| RenderError::InvalidShader(format!("'{}' is not registered", shader.label())))?;
        let pipeline = self.backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(format!("{} Pipeline", shader.label())),
            shader_source: shader.descriptor().source.clone(),
            vertex_layouts: match shader.vertex_input() {
                VertexInput::Mesh => vec![Vertex::layout()],
                VertexInput::Fullscreen => Vec::new(),
            },
            bind_group_layouts: vec![self.layouts.frame, self.layouts.object, material_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: key.front_face,
            cull_mode: key.cull,
            depth_stencil: key.depth.map(|(write, compare)| DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: write,
                depth_compare: compare,
            }),
            color_targets: key
                .color_formats
                .iter()
                .map(|&format| ColorTargetState {
                    format,
                    blend: key.blend,
                    write_mask: ColorWrites::ALL,
                })
                .collect(),
        })?;
        log::debug!(
            "Created pipeline for '{}' ({} pipelines cached)",
            shader.label(),
            self.pipelines.len() + 1
        );
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    /// Group 2 bind group for one draw; slots that cannot be bound as
    /// declared get a fallback texture
    fn material_bind_group(&mut self, item: &DrawItem<'_>, stats: &mut FlushStats) -> RenderResult<BindGroupHandle> {
        let material = item.material;
        let shader = material.shader();
        let layout = *self
            .material_layouts
            .get(&shader.id())
            .ok_or_else(|| RenderError::InvalidShader(format!("'{}' is not registered", shader.label())))?;

        let mut entries = vec![(
            0,
            BindGroupEntry::Buffer {
                buffer: material.uniform_buffer(),
                offset: 0,
                size: None,
            },
        )];
        let mut units = HashMap::new();
        for (index, slot) in shader.texture_slots().iter().enumerate() {
            let binding = match resolve_slot(item, slot, &mut units) {
                Ok(binding) => binding,
                Err(issue) => {
                    if slot.required || !matches!(issue, SlotIssue::Unset) {
                        log::warn!(
                            "Material '{}': texture slot '{}' {}, using fallback",
                            shader.label(),
                            slot.name,
                            issue
                        );
                        stats.binding_errors += 1;
                    }
                    self.fallbacks.for_dimension(slot.dimension)
                }
            };
            entries.push((texture_binding(index), BindGroupEntry::Texture(binding.view)));
            entries.push((sampler_binding(index), BindGroupEntry::Sampler(binding.sampler)));
        }
        Ok(self.backend.create_bind_group(layout, &entries)?)
    }
}

fn resolve_slot(
    item: &DrawItem<'_>,
    slot: &TextureSlot,
    units: &mut HashMap<u32, TextureHandle>,
) -> Result<TextureBinding, SlotIssue> {
    if slot.name == "source" {
        if let Some(source) = item.source {
            if source.dimension != slot.dimension {
                return Err(SlotIssue::WrongDimension(source.dimension));
            }
            return Ok(source);
        }
    }
    let (binding, unit, cube) = match item.material.get(&slot.name) {
        Some(MaterialParam::Texture { binding, unit }) => (*binding, *unit, false),
        Some(MaterialParam::TextureCube { binding, unit }) => (*binding, *unit, true),
        Some(_) => return Err(SlotIssue::NotATexture),
        None => return Err(SlotIssue::Unset),
    };
    let expects_cube = slot.dimension == TextureViewDimension::Cube;
    if binding.dimension != slot.dimension || cube != expects_cube {
        return Err(SlotIssue::WrongDimension(binding.dimension));
    }
    match units.entry(unit) {
        Entry::Occupied(entry) if *entry.get() != binding.texture => Err(SlotIssue::UnitTaken(unit)),
        Entry::Occupied(_) => Ok(binding),
        Entry::Vacant(entry) => {
            entry.insert(binding.texture);
            Ok(binding)
        }
    }
}
