//! Off-screen render targets

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::cube_texture::{CubeFace, CubeTexture};
use crate::resources::pixel::{self, PixelLayout, PixelType};
use crate::resources::units::{CachedSampler, TextureBinding};

/// Most color attachments a render target may own
pub const MAX_COLOR_ATTACHMENTS: u32 = 8;

/// Views and formats a render pass writes to
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBinding {
    pub colors: Vec<(TextureViewHandle, TextureFormat)>,
    pub depth: Option<TextureViewHandle>,
    pub width: u32,
    pub height: u32,
}

struct Attachment {
    texture: TextureHandle,
    view: TextureViewHandle,
}

struct AttachedFace {
    view: TextureViewHandle,
    format: TextureFormat,
    face: CubeFace,
    mip: u32,
    size: u32,
}

/// Framebuffer owning color attachments and an optional depth buffer.
///
/// Attachment 0 can be redirected into one face and mip of a cube texture.
pub struct RenderTarget {
    label: String,
    width: u32,
    height: u32,
    precision: PixelType,
    format: TextureFormat,
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
    depth_size: (u32, u32),
    attached_face: Option<AttachedFace>,
    sampler: CachedSampler,
}

fn check_size(width: u32, height: u32) -> RenderResult<()> {
    if width == 0 || height == 0 {
        let err = RenderError::InvalidDimensions {
            width,
            height,
            reason: "dimensions must be positive",
        };
        log::error!("RenderTarget: {}", err);
        return Err(err);
    }
    Ok(())
}

impl RenderTarget {
    /// Create a target with `attachments` color attachments of the given
    /// precision and, optionally, a depth buffer
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        precision: PixelType,
        attachments: u32,
        depth: bool,
    ) -> RenderResult<Self> {
        check_size(width, height)?;
        if attachments == 0 || attachments > MAX_COLOR_ATTACHMENTS {
            let err = RenderError::InvalidAttachmentCount(attachments);
            log::error!("RenderTarget '{}': {}", label, err);
            return Err(err);
        }

        let mut target = Self {
            label: label.to_string(),
            width,
            height,
            precision,
            format: pixel::storage_format(PixelLayout::Rgba, precision, backend.supports_float32_filtering()),
            colors: Vec::with_capacity(attachments as usize),
            depth: None,
            depth_size: (width, height),
            attached_face: None,
            sampler: CachedSampler::default(),
        };

        for index in 0..attachments {
            let texture = backend.create_texture(&target.color_descriptor(index))?;
            let view = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
            target.colors.push(Attachment { texture, view });
        }
        if depth {
            let texture = backend.create_texture(&target.depth_descriptor(width, height))?;
            let view = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
            target.depth = Some(Attachment { texture, view });
        }

        log::debug!(
            "Created render target '{}' ({}x{}, {} x {:?}, depth: {})",
            label,
            width,
            height,
            attachments,
            target.format,
            depth
        );
        Ok(target)
    }

    fn color_descriptor(&self, index: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(format!("{} Color {}", self.label, index)),
            width: self.width,
            height: self.height,
            format: self.format,
            usage: TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
            ..Default::default()
        }
    }

    fn depth_descriptor(&self, width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(format!("{} Depth", self.label)),
            width,
            height,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        }
    }

    /// Bring the depth buffer to `size` when it differs
    fn fit_depth<B: GraphicsBackend>(&mut self, backend: &mut B, size: (u32, u32)) -> RenderResult<()> {
        if self.depth_size == size {
            return Ok(());
        }
        if let Some(depth) = &self.depth {
            backend.recreate_texture(depth.texture, &self.depth_descriptor(size.0, size.1))?;
        }
        self.depth_size = size;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Width currently written to; follows the cube face while one is attached
    pub fn width(&self) -> u32 {
        self.attached_face.as_ref().map_or(self.width, |f| f.size)
    }

    /// Height currently written to; follows the cube face while one is attached
    pub fn height(&self) -> u32 {
        self.attached_face.as_ref().map_or(self.height, |f| f.size)
    }

    pub fn precision(&self) -> PixelType {
        self.precision
    }

    pub fn attachment_count(&self) -> u32 {
        self.colors.len() as u32
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Face and mip attachment 0 currently writes to
    pub fn attached_face(&self) -> Option<(CubeFace, u32)> {
        self.attached_face.as_ref().map(|f| (f.face, f.mip))
    }

    /// Texture behind color attachment `index`
    pub fn color_handle(&self, index: u32) -> RenderResult<TextureHandle> {
        self.colors
            .get(index as usize)
            .map(|a| a.texture)
            .ok_or(RenderError::InvalidAttachmentIndex {
                index,
                count: self.attachment_count(),
            })
    }

    /// Color attachment `index` as a sampled texture for materials
    pub fn color_texture<B: GraphicsBackend>(&mut self, backend: &mut B, index: u32) -> RenderResult<TextureBinding> {
        let Some(attachment) = self.colors.get(index as usize) else {
            let err = RenderError::InvalidAttachmentIndex {
                index,
                count: self.attachment_count(),
            };
            log::error!("RenderTarget '{}': {}", self.label, err);
            return Err(err);
        };
        let (texture, view) = (attachment.texture, attachment.view);
        let sampler = self.sampler.get(
            backend,
            SamplerDescriptor {
                label: Some(format!("{} Sampler", self.label)),
                mipmap_filter: FilterMode::Nearest,
                lod_max_clamp: 0.0,
                ..Default::default()
            },
        )?;
        Ok(TextureBinding {
            texture,
            view,
            sampler,
            dimension: TextureViewDimension::D2,
        })
    }

    /// Redirect attachment 0 into `face` of `cube` at `mip`.
    ///
    /// The depth buffer follows the face size. Targets with several
    /// attachments only accept faces of their own size.
    pub fn attach_cube_face<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        cube: &mut CubeTexture,
        face: CubeFace,
        mip: u32,
    ) -> RenderResult<()> {
        let view = cube.face_view(backend, face, mip)?;
        let format = cube.format().ok_or(RenderError::Uninitialized)?;
        let size = cube.face_size(mip);
        if self.colors.len() > 1 && (size != self.width || size != self.height) {
            let err = RenderError::InvalidDimensions {
                width: size,
                height: size,
                reason: "cube face must match the size of a multi-attachment target",
            };
            log::error!("RenderTarget '{}': {}", self.label, err);
            return Err(err);
        }
        self.fit_depth(backend, (size, size))?;
        self.attached_face = Some(AttachedFace {
            view,
            format,
            face,
            mip,
            size,
        });
        Ok(())
    }

    /// Route attachment 0 back to the target's own texture
    pub fn detach_cube_face<B: GraphicsBackend>(&mut self, backend: &mut B) -> RenderResult<()> {
        if self.attached_face.take().is_some() {
            self.fit_depth(backend, (self.width, self.height))?;
        }
        Ok(())
    }

    /// Reallocate every attachment at a new size; contents are discarded
    pub fn resize<B: GraphicsBackend>(&mut self, backend: &mut B, width: u32, height: u32) -> RenderResult<()> {
        check_size(width, height)?;
        self.width = width;
        self.height = height;
        for index in 0..self.colors.len() {
            let desc = self.color_descriptor(index as u32);
            backend.recreate_texture(self.colors[index].texture, &desc)?;
        }
        let size = (self.width(), self.height());
        // Force reallocation so the depth contents are discarded too
        self.depth_size = (0, 0);
        self.fit_depth(backend, size)
    }

    /// Snapshot of the views a pass into this target writes to
    pub fn binding(&self) -> TargetBinding {
        let mut colors: Vec<(TextureViewHandle, TextureFormat)> =
            self.colors.iter().map(|a| (a.view, self.format)).collect();
        if let Some(face) = &self.attached_face {
            colors[0] = (face.view, face.format);
        }
        TargetBinding {
            colors,
            depth: self.depth.as_ref().map(|d| d.view),
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.sampler.destroy(backend);
        for attachment in self.colors.drain(..) {
            backend.destroy_texture(attachment.texture);
        }
        if let Some(depth) = self.depth.take() {
            backend.destroy_texture(depth.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_count_bounds() {
        let mut backend = DummyBackend::new(4, 4);
        for count in [0, 9] {
            let result = RenderTarget::new(&mut backend, "t", 8, 8, PixelType::UnsignedByte, count, false);
            assert!(matches!(result, Err(RenderError::InvalidAttachmentCount(c)) if c == count));
        }
        let mut target = RenderTarget::new(&mut backend, "t", 8, 8, PixelType::HalfFloat, 3, true).unwrap();
        assert_eq!(target.binding().colors.len(), 3);
        assert!(target.color_texture(&mut backend, 2).is_ok());
        assert!(matches!(
            target.color_texture(&mut backend, 3),
            Err(RenderError::InvalidAttachmentIndex { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_cube_face_redirect() {
        let mut backend = DummyBackend::new(4, 4);
        let mut cube = CubeTexture::new("prefilter");
        cube.default_initialize(&mut backend, 32, 32, PixelLayout::Rgb, PixelType::HalfFloat, true)
            .unwrap();
        let mut target = RenderTarget::new(&mut backend, "capture", 32, 32, PixelType::HalfFloat, 1, true).unwrap();
        let own = target.binding();

        target
            .attach_cube_face(&mut backend, &mut cube, CubeFace::NegativeY, 2)
            .unwrap();
        let redirected = target.binding();
        assert_eq!((redirected.width, redirected.height), (8, 8));
        let written = backend.view_target(redirected.colors[0].0).unwrap();
        assert_eq!(written.texture, cube.handle().unwrap());
        assert_eq!((written.array_layer, written.mip_level), (3, 2));
        assert_eq!(redirected.depth, own.depth);

        target.detach_cube_face(&mut backend).unwrap();
        assert_eq!(target.binding(), own);
    }

    #[test]
    fn test_resize_keeps_views() {
        let mut backend = DummyBackend::new(4, 4);
        let mut target = RenderTarget::new(&mut backend, "t", 8, 8, PixelType::UnsignedByte, 1, true).unwrap();
        let before = target.binding();
        target.resize(&mut backend, 16, 4).unwrap();
        let after = target.binding();
        assert_eq!(after.colors, before.colors);
        assert_eq!((after.width, after.height), (16, 4));
        let data = backend.texture_data(target.color_handle(0).unwrap(), 0, 0).unwrap();
        assert_eq!(data.len(), 16 * 4 * 4);
    }

    #[test]
    fn test_float_precision_follows_filtering_support() {
        let mut backend = DummyBackend::new(4, 4);
        let target = RenderTarget::new(&mut backend, "hdr", 8, 8, PixelType::Float, 1, false).unwrap();
        assert_eq!(target.binding().colors[0].1, TextureFormat::Rgba32Float);

        let mut backend = DummyBackend::new(4, 4).with_float32_filtering(false);
        let target = RenderTarget::new(&mut backend, "hdr", 8, 8, PixelType::Float, 2, false).unwrap();
        assert!(target
            .binding()
            .colors
            .iter()
            .all(|&(_, format)| format == TextureFormat::Rgba16Float));
        assert_eq!(target.precision(), PixelType::Float);
        let texels = backend.texture_data(target.color_handle(1).unwrap(), 0, 0).unwrap();
        assert_eq!(texels.len(), 8 * 8 * 8);
    }
}
