//! 2D textures created from raw texel data

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::cube_texture::{sampler_descriptor, TextureFilter, WrapMode};
use crate::resources::pixel::{self, PixelLayout, PixelType};
use crate::resources::units::{CachedSampler, TextureBinding};

/// GPU texture with an associated view and sampler
pub struct Texture2D {
    pub name: String,
    handle: TextureHandle,
    view: TextureViewHandle,
    sampler: CachedSampler,
    width: u32,
    height: u32,
    layout: PixelLayout,
    ty: PixelType,
    format: TextureFormat,

    pub filter_min: TextureFilter,
    pub filter_mag: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl Texture2D {
    /// Create and upload a texture from tightly packed texels
    #[allow(clippy::too_many_arguments)]
    pub fn from_data<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        width: u32,
        height: u32,
        layout: PixelLayout,
        ty: PixelType,
        data: &[u8],
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            let err = RenderError::InvalidDimensions {
                width,
                height,
                reason: "dimensions must be positive",
            };
            log::error!("{}: {}", name, err);
            return Err(err);
        }
        let format = pixel::storage_format(layout, ty, backend.supports_float32_filtering());
        let bytes = pixel::to_storage(data, width, height, layout, ty, format).map_err(|e| {
            log::error!("{}: {}", name, e);
            e
        })?;

        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(name.to_string()),
            width,
            height,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
            ..Default::default()
        })?;
        backend.write_texture(
            handle,
            &TextureRegion {
                mip_level: 0,
                array_layer: 0,
                width,
                height,
            },
            &bytes,
        );
        let view = backend.create_texture_view(handle, &TextureViewDescriptor::default())?;

        log::debug!("Created texture '{}' ({}x{}, {:?})", name, width, height, format);

        Ok(Self {
            name: name.to_string(),
            handle,
            view,
            sampler: CachedSampler::default(),
            width,
            height,
            layout,
            ty,
            format,
            filter_min: TextureFilter::Linear,
            filter_mag: TextureFilter::Linear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
        })
    }

    /// Create a 1x1 texture of a single color
    pub fn solid_color<B: GraphicsBackend>(backend: &mut B, name: &str, color: [u8; 4]) -> RenderResult<Self> {
        Self::from_data(backend, name, 1, 1, PixelLayout::Rgba, PixelType::UnsignedByte, &color)
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Sampling binding for shaders
    pub fn binding<B: GraphicsBackend>(&mut self, backend: &mut B) -> RenderResult<TextureBinding> {
        let desc = sampler_descriptor(
            &self.name,
            self.filter_min,
            self.filter_mag,
            [self.wrap_s, self.wrap_t, WrapMode::ClampToEdge],
        );
        let sampler = self.sampler.get(backend, desc)?;
        Ok(TextureBinding {
            texture: self.handle,
            view: self.view,
            sampler,
            dimension: TextureViewDimension::D2,
        })
    }

    /// Read texels back in the layout and type they were created with
    pub fn read<B: GraphicsBackend>(&self, backend: &mut B) -> RenderResult<Vec<u8>> {
        let raw = backend.read_texture(
            self.handle,
            &TextureRegion {
                mip_level: 0,
                array_layer: 0,
                width: self.width,
                height: self.height,
            },
        )?;
        Ok(pixel::from_storage(&raw, self.layout, self.ty, self.format))
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.sampler.destroy(backend);
        backend.destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_round_trip() {
        let mut backend = DummyBackend::new(4, 4);
        let texture = Texture2D::solid_color(&mut backend, "white", [255, 255, 255, 255]).unwrap();
        assert_eq!(texture.read(&mut backend).unwrap(), vec![255, 255, 255, 255]);
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut backend = DummyBackend::new(4, 4);
        let result = Texture2D::from_data(&mut backend, "empty", 0, 4, PixelLayout::R, PixelType::UnsignedByte, &[]);
        assert!(matches!(result, Err(RenderError::InvalidDimensions { .. })));
    }
}
