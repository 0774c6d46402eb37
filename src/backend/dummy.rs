//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It keeps texel memory for every
//! texture on the CPU, applies clear operations, and records each render
//! pass and draw (including a snapshot of the uniform data bound at draw
//! time) so the renderer can be inspected without hardware.

use std::collections::{BTreeMap, HashMap};

use bytemuck::Pod;

use crate::backend::traits::*;
use crate::backend::types::*;

/// Texture subresource written by a recorded pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedTarget {
    pub texture: TextureHandle,
    pub array_layer: u32,
    pub mip_level: u32,
}

/// A single draw call as seen by the backend
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub pipeline: RenderPipelineHandle,
    pub pipeline_label: Option<String>,
    pub element_count: u32,
    pub indexed: bool,
    /// Contents of the buffer at binding 0 of every bound group, keyed by
    /// group index, captured when the draw was recorded
    pub uniforms: BTreeMap<u32, Vec<u8>>,
    /// Texture views referenced by the bound groups, in binding order
    pub textures: Vec<TextureViewHandle>,
}

impl DrawRecord {
    /// Decode the uniform snapshot of `group` as `T`
    pub fn uniform<T: Pod>(&self, group: u32) -> Option<T> {
        let bytes = self.uniforms.get(&group)?;
        let size = std::mem::size_of::<T>();
        if bytes.len() < size {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(&bytes[..size]))
    }
}

/// A render pass as seen by the backend
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub label: Option<String>,
    pub color_targets: Vec<RecordedTarget>,
    pub load_ops: Vec<LoadOp>,
    pub draws: Vec<DrawRecord>,
}

type FillFn = Box<dyn Fn(&DrawRecord) -> [f32; 4]>;

struct DummyTexture {
    desc: TextureDescriptor,
    /// Indexed by `layer * mip_levels + mip`
    subresources: Vec<Vec<u8>>,
}

impl DummyTexture {
    fn new(desc: &TextureDescriptor) -> Self {
        let mut subresources = Vec::with_capacity((desc.array_layers * desc.mip_levels) as usize);
        for _layer in 0..desc.array_layers {
            for mip in 0..desc.mip_levels {
                let (w, h) = desc.mip_size(mip);
                subresources.push(vec![0; (w * h * desc.format.bytes_per_pixel()) as usize]);
            }
        }
        Self {
            desc: desc.clone(),
            subresources,
        }
    }

    fn index(&self, layer: u32, mip: u32) -> Option<usize> {
        if layer >= self.desc.array_layers || mip >= self.desc.mip_levels {
            return None;
        }
        Some((layer * self.desc.mip_levels + mip) as usize)
    }
}

struct DummyView {
    texture: TextureHandle,
    desc: TextureViewDescriptor,
}

struct PassState {
    record: RecordedPass,
    color_views: Vec<TextureViewHandle>,
    pipeline: Option<RenderPipelineHandle>,
    bind_groups: BTreeMap<u32, BindGroupHandle>,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    surface_width: u32,
    surface_height: u32,
    float32_filterable: bool,
    backbuffer: TextureHandle,
    backbuffer_view: TextureViewHandle,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, DummyTexture>,
    texture_views: HashMap<u64, DummyView>,
    samplers: HashMap<u64, SamplerDescriptor>,
    bind_group_layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    render_pipelines: HashMap<u64, RenderPipelineDescriptor>,

    next_buffer_id: u64,
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_layout_id: u64,
    next_bind_group_id: u64,
    next_render_pipeline_id: u64,

    current_pass: Option<PassState>,
    passes: Vec<RecordedPass>,
    submissions: u32,
    presented_frames: u32,
    fill: Option<FillFn>,
}

const SWAPCHAIN_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

impl DummyBackend {
    /// Create a new dummy backend with a `width`x`height` backbuffer.
    pub fn new(width: u32, height: u32) -> Self {
        let mut backend = Self {
            surface_width: width.max(1),
            surface_height: height.max(1),
            float32_filterable: true,
            backbuffer: TextureHandle(0),
            backbuffer_view: TextureViewHandle(0),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_view_id: 1,
            next_sampler_id: 1,
            next_layout_id: 1,
            next_bind_group_id: 1,
            next_render_pipeline_id: 1,
            current_pass: None,
            passes: Vec::new(),
            submissions: 0,
            presented_frames: 0,
            fill: None,
        };
        let desc = backend.backbuffer_descriptor();
        let texture = backend.insert_texture(&desc);
        backend.backbuffer = texture;
        backend.backbuffer_view = backend.insert_view(texture, TextureViewDescriptor::default());
        backend
    }

    /// Toggle whether the simulated device can filter 32-bit float textures.
    pub fn with_float32_filtering(mut self, supported: bool) -> Self {
        self.float32_filterable = supported;
        self
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Install a function that computes a flat color for every draw.
    ///
    /// When set, each draw fills its color targets with the returned color,
    /// which lets tests observe what a draw wrote through texture readback.
    pub fn set_fill(&mut self, fill: impl Fn(&DrawRecord) -> [f32; 4] + 'static) {
        self.fill = Some(Box::new(fill));
    }

    /// Render passes recorded so far, in encoding order.
    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    /// Forget recorded passes.
    pub fn clear_log(&mut self) {
        self.passes.clear();
    }

    /// Total draws across all recorded passes.
    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(|p| p.draws.len()).sum()
    }

    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn presented_frames(&self) -> u32 {
        self.presented_frames
    }

    /// Number of bind groups currently alive.
    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_bind_group_layouts(&self) -> usize {
        self.bind_group_layouts.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.render_pipelines.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Descriptor a pipeline was created from.
    pub fn pipeline(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.render_pipelines.get(&pipeline.0)
    }

    /// The texture behind the presentation surface.
    pub fn backbuffer(&self) -> TextureHandle {
        self.backbuffer
    }

    /// Raw texels of one texture subresource.
    pub fn texture_data(&self, texture: TextureHandle, layer: u32, mip: u32) -> Option<&[u8]> {
        let tex = self.textures.get(&texture.0)?;
        let index = tex.index(layer, mip)?;
        Some(&tex.subresources[index])
    }

    /// Subresource a view addresses.
    pub fn view_target(&self, view: TextureViewHandle) -> Option<RecordedTarget> {
        let v = self.texture_views.get(&view.0)?;
        Some(RecordedTarget {
            texture: v.texture,
            array_layer: v.desc.base_array_layer,
            mip_level: v.desc.base_mip_level,
        })
    }

    fn backbuffer_descriptor(&self) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("Backbuffer".into()),
            width: self.surface_width,
            height: self.surface_height,
            format: SWAPCHAIN_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            ..Default::default()
        }
    }

    fn insert_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, DummyTexture::new(desc));
        TextureHandle(id)
    }

    fn insert_view(&mut self, texture: TextureHandle, desc: TextureViewDescriptor) -> TextureViewHandle {
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.texture_views.insert(id, DummyView { texture, desc });
        TextureViewHandle(id)
    }

    fn fill_view(&mut self, view: TextureViewHandle, color: [f32; 4]) {
        let Some(target) = self.view_target(view) else {
            return;
        };
        let Some(tex) = self.textures.get_mut(&target.texture.0) else {
            return;
        };
        let Some(index) = tex.index(target.array_layer, target.mip_level) else {
            return;
        };
        let texel = encode_texel(tex.desc.format, color);
        for chunk in tex.subresources[index].chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(&texel);
        }
    }

    fn snapshot_draw(&self, state: &PassState, element_count: u32, indexed: bool) -> Option<DrawRecord> {
        let pipeline = state.pipeline?;
        let mut uniforms = BTreeMap::new();
        let mut textures = Vec::new();
        for (&index, group) in &state.bind_groups {
            let Some(entries) = self.bind_groups.get(&group.0) else {
                continue;
            };
            for (binding, entry) in entries {
                match entry {
                    BindGroupEntry::Buffer { buffer, offset, size } if *binding == 0 => {
                        if let Some(data) = self.buffers.get(&buffer.0) {
                            let start = (*offset as usize).min(data.len());
                            let end = size
                                .map(|s| (start + s as usize).min(data.len()))
                                .unwrap_or(data.len());
                            uniforms.insert(index, data[start..end].to_vec());
                        }
                    }
                    BindGroupEntry::Texture(view) => textures.push(*view),
                    _ => {}
                }
            }
        }
        Some(DrawRecord {
            pipeline,
            pipeline_label: self
                .render_pipelines
                .get(&pipeline.0)
                .and_then(|p| p.label.clone()),
            element_count,
            indexed,
            uniforms,
            textures,
        })
    }

    fn record_draw(&mut self, element_count: u32, indexed: bool) {
        let Some(state) = self.current_pass.take() else {
            log::warn!("DummyBackend: draw outside of a render pass");
            return;
        };
        let record = self.snapshot_draw(&state, element_count, indexed);
        let mut state = state;
        match record {
            Some(record) => {
                if let Some(color) = self.fill.as_ref().map(|fill| fill(&record)) {
                    for view in state.color_views.clone() {
                        self.fill_view(view, color);
                    }
                }
                state.record.draws.push(record);
            }
            None => log::warn!("DummyBackend: draw without a pipeline"),
        }
        self.current_pass = Some(state);
    }
}

/// Encode a normalized RGBA color as one texel of `format`
fn encode_texel(format: TextureFormat, color: [f32; 4]) -> Vec<u8> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let half = |v: f32| half::f16::from_f32(v).to_le_bytes();
    let channels = &color[..format.channels() as usize];
    match format {
        TextureFormat::R8Unorm
        | TextureFormat::Rg8Unorm
        | TextureFormat::Rgba8Unorm
        | TextureFormat::Rgba8UnormSrgb => channels.iter().map(|&v| unorm(v)).collect(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            vec![unorm(color[2]), unorm(color[1]), unorm(color[0]), unorm(color[3])]
        }
        TextureFormat::R16Float | TextureFormat::Rg16Float | TextureFormat::Rgba16Float => {
            channels.iter().flat_map(|&v| half(v)).collect()
        }
        TextureFormat::R32Float
        | TextureFormat::Rg32Float
        | TextureFormat::Rgba32Float
        | TextureFormat::Depth32Float => channels.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

impl GraphicsBackend for DummyBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_width = width;
            self.surface_height = height;
            let desc = self.backbuffer_descriptor();
            if let Some(tex) = self.textures.get_mut(&self.backbuffer.0) {
                *tex = DummyTexture::new(&desc);
            }
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        log::trace!("DummyBackend: begin frame");
        Ok(FrameContext {
            swapchain_view: self.backbuffer_view,
            width: self.surface_width,
            height: self.surface_height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.submit();
        self.presented_frames += 1;
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        SWAPCHAIN_FORMAT
    }

    fn supports_float32_filtering(&self) -> bool {
        self.float32_filterable
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = self.create_buffer(desc)?;
        self.write_buffer(handle, 0, data);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(buf) = self.buffers.get_mut(&buffer.0) else {
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} layers, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers,
            desc.mip_levels
        );
        if desc.width == 0 || desc.height == 0 || desc.array_layers == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero-sized texture {:?}",
                desc.label
            )));
        }
        Ok(self.insert_texture(desc))
    }

    fn recreate_texture(
        &mut self,
        texture: TextureHandle,
        desc: &TextureDescriptor,
    ) -> BackendResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidHandle("texture"))?;
        *tex = DummyTexture::new(desc);
        self.texture_views
            .retain(|_, v| v.texture != texture || v.desc.fits(desc));
        Ok(())
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::InvalidHandle("texture"));
        }
        Ok(self.insert_view(texture, desc.clone()))
    }

    fn write_texture(&mut self, texture: TextureHandle, region: &TextureRegion, data: &[u8]) {
        let Some(tex) = self.textures.get_mut(&texture.0) else {
            return;
        };
        let Some(index) = tex.index(region.array_layer, region.mip_level) else {
            log::warn!("DummyBackend: write outside texture subresources");
            return;
        };
        let bpp = tex.desc.format.bytes_per_pixel() as usize;
        let (mip_width, _) = tex.desc.mip_size(region.mip_level);
        let row = region.width as usize * bpp;
        let dst = &mut tex.subresources[index];
        for (y, src_row) in data.chunks_exact(row).take(region.height as usize).enumerate() {
            let start = y * mip_width as usize * bpp;
            if start + row <= dst.len() {
                dst[start..start + row].copy_from_slice(src_row);
            }
        }
    }

    fn read_texture(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
    ) -> BackendResult<Vec<u8>> {
        self.submit();
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or(BackendError::InvalidHandle("texture"))?;
        let index = tex
            .index(region.array_layer, region.mip_level)
            .ok_or_else(|| BackendError::ReadbackFailed("subresource out of range".into()))?;
        let bpp = tex.desc.format.bytes_per_pixel() as usize;
        let (mip_width, mip_height) = tex.desc.mip_size(region.mip_level);
        if region.width > mip_width || region.height > mip_height {
            return Err(BackendError::ReadbackFailed(format!(
                "region {}x{} exceeds mip size {}x{}",
                region.width, region.height, mip_width, mip_height
            )));
        }
        let src = &tex.subresources[index];
        let row = region.width as usize * bpp;
        let mut out = Vec::with_capacity(row * region.height as usize);
        for y in 0..region.height as usize {
            let start = y * mip_width as usize * bpp;
            out.extend_from_slice(&src[start..start + row]);
        }
        Ok(out)
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let id = self.next_sampler_id;
        self.next_sampler_id += 1;
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.next_layout_id;
        self.next_layout_id += 1;
        self.bind_group_layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or(BackendError::InvalidHandle("bind group layout"))?;
        if layout_entries.len() != entries.len() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "bind group has {} entries, layout expects {}",
                entries.len(),
                layout_entries.len()
            )));
        }
        let id = self.next_bind_group_id;
        self.next_bind_group_id += 1;
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("DummyBackend: creating render pipeline {:?}", desc.label);
        if let Some(missing) = desc
            .bind_group_layouts
            .iter()
            .find(|h| !self.bind_group_layouts.contains_key(&h.0))
        {
            return Err(BackendError::PipelineCreationFailed(format!(
                "unknown bind group layout {:?}",
                missing
            )));
        }
        let id = self.next_render_pipeline_id;
        self.next_render_pipeline_id += 1;
        self.render_pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.current_pass.is_some() {
            log::warn!("DummyBackend: render pass begun while another is open");
            self.end_render_pass();
        }
        for att in &desc.color_attachments {
            if let LoadOp::Clear(color) = att.load_op {
                self.fill_view(att.view, color);
            }
        }
        if let Some(depth) = &desc.depth_stencil_attachment {
            if let LoadOp::Clear(_) = depth.depth_load_op {
                self.fill_view(depth.view, [depth.depth_clear_value; 4]);
            }
        }
        let color_targets = desc
            .color_attachments
            .iter()
            .filter_map(|att| self.view_target(att.view))
            .collect();
        self.current_pass = Some(PassState {
            record: RecordedPass {
                label: desc.label.clone(),
                color_targets,
                load_ops: desc.color_attachments.iter().map(|a| a.load_op.clone()).collect(),
                draws: Vec::new(),
            },
            color_views: desc.color_attachments.iter().map(|a| a.view).collect(),
            pipeline: None,
            bind_groups: BTreeMap::new(),
        });
    }

    fn end_render_pass(&mut self) {
        if let Some(state) = self.current_pass.take() {
            self.passes.push(state.record);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(state) = self.current_pass.as_mut() {
            state.pipeline = Some(pipeline);
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if let Some(state) = self.current_pass.as_mut() {
            state.bind_groups.insert(index, bind_group);
        }
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferHandle, _offset: u64) {}

    fn set_index_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _format: IndexFormat) {}

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32, _min_depth: f32, _max_depth: f32) {}

    fn draw(&mut self, vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {
        self.record_draw(vertices.len() as u32, false);
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        _base_vertex: i32,
        _instances: std::ops::Range<u32>,
    ) {
        self.record_draw(indices.len() as u32, true);
    }

    fn submit(&mut self) {
        if self.current_pass.is_some() {
            log::warn!("DummyBackend: submit with an open render pass");
            self.end_render_pass();
        }
        self.submissions += 1;
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.texture_views.retain(|_, v| v.texture != texture);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        self.bind_group_layouts.remove(&layout.0);
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.render_pipelines.remove(&pipeline.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_texture(backend: &mut DummyBackend, format: TextureFormat) -> TextureHandle {
        backend
            .create_texture(&TextureDescriptor {
                label: Some("test".into()),
                width: 4,
                height: 4,
                array_layers: 6,
                mip_levels: 3,
                format,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            })
            .unwrap()
    }

    #[test]
    fn test_clear_fills_only_addressed_subresource() {
        let mut backend = DummyBackend::new(8, 8);
        let texture = small_texture(&mut backend, TextureFormat::Rgba8Unorm);
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::single(2, 1))
            .unwrap();

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear".into()),
            color_attachments: vec![ColorAttachment {
                view,
                load_op: LoadOp::Clear([1.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.end_render_pass();

        let cleared = backend.texture_data(texture, 2, 1).unwrap();
        assert_eq!(cleared.len(), 2 * 2 * 4);
        assert!(cleared.chunks(4).all(|t| t == [255, 0, 0, 255]));
        assert!(backend.texture_data(texture, 1, 1).unwrap().iter().all(|&b| b == 0));
        assert_eq!(
            backend.passes()[0].color_targets,
            vec![RecordedTarget {
                texture,
                array_layer: 2,
                mip_level: 1
            }]
        );
    }

    #[test]
    fn test_write_then_read_texture() {
        let mut backend = DummyBackend::new(8, 8);
        let texture = small_texture(&mut backend, TextureFormat::Rgba8Unorm);
        let region = TextureRegion {
            mip_level: 0,
            array_layer: 5,
            width: 4,
            height: 4,
        };
        let data: Vec<u8> = (0..64).collect();
        backend.write_texture(texture, &region, &data);
        assert_eq!(backend.read_texture(texture, &region).unwrap(), data);
    }

    #[test]
    fn test_draw_snapshots_uniforms() {
        let mut backend = DummyBackend::new(8, 8);
        let layout = backend
            .create_bind_group_layout(&[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX,
                ty: BindingType::UniformBuffer,
            }])
            .unwrap();
        let buffer = backend
            .create_buffer_init(
                &BufferDescriptor {
                    label: None,
                    size: 4,
                    usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                    mapped_at_creation: false,
                },
                bytemuck::bytes_of(&7.5f32),
            )
            .unwrap();
        let group = backend
            .create_bind_group(
                layout,
                &[(0, BindGroupEntry::Buffer { buffer, offset: 0, size: None })],
            )
            .unwrap();
        let pipeline = backend
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("p".into()),
                shader_source: String::new(),
                vertex_layouts: vec![],
                bind_group_layouts: vec![layout],
                primitive_topology: PrimitiveTopology::TriangleList,
                front_face: FrontFace::Ccw,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets: vec![],
            })
            .unwrap();

        let frame = backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: vec![ColorAttachment {
                view: frame.swapchain_view,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(pipeline);
        backend.set_bind_group(0, group);
        backend.draw(0..3, 0..1);
        backend.write_buffer(buffer, 0, bytemuck::bytes_of(&1.0f32));
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        let draws = &backend.passes()[0].draws;
        assert_eq!(draws[0].uniform::<f32>(0), Some(7.5));
        assert_eq!(draws[1].uniform::<f32>(0), Some(1.0));
        assert_eq!(draws[0].pipeline_label.as_deref(), Some("p"));
    }

    #[test]
    fn test_encode_half_texel() {
        let texel = encode_texel(TextureFormat::Rgba16Float, [1.0, 0.5, 0.0, 1.0]);
        let halves: Vec<f32> = texel
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect();
        assert_eq!(halves, vec![1.0, 0.5, 0.0, 1.0]);
    }
}
