//! Cube textures with per-face and per-mip addressing

use std::collections::HashMap;

use glam::Vec3;

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::pixel::{self, PixelLayout, PixelType};
use crate::resources::units::{CachedSampler, TextureBinding, TextureUnits};

/// One of the six faces of a cube texture, in storage-layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn from_index(index: u32) -> RenderResult<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(RenderError::InvalidFace(index))
    }

    /// Array layer holding this face
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Face following this one in storage order
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() as usize + 1).copied()
    }

    /// Direction a camera looks along to see this face
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the capture camera for this face
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// Texture filtering, including the mip-aware minification modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl TextureFilter {
    /// (texel filter, mip filter, samples beyond the base level)
    fn modes(self) -> (FilterMode, FilterMode, bool) {
        match self {
            TextureFilter::Nearest => (FilterMode::Nearest, FilterMode::Nearest, false),
            TextureFilter::Linear => (FilterMode::Linear, FilterMode::Nearest, false),
            TextureFilter::NearestMipmapNearest => (FilterMode::Nearest, FilterMode::Nearest, true),
            TextureFilter::LinearMipmapNearest => (FilterMode::Linear, FilterMode::Nearest, true),
            TextureFilter::NearestMipmapLinear => (FilterMode::Nearest, FilterMode::Linear, true),
            TextureFilter::LinearMipmapLinear => (FilterMode::Linear, FilterMode::Linear, true),
        }
    }
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl From<WrapMode> for AddressMode {
    fn from(mode: WrapMode) -> Self {
        match mode {
            WrapMode::Repeat => AddressMode::Repeat,
            WrapMode::ClampToEdge => AddressMode::ClampToEdge,
            WrapMode::MirroredRepeat => AddressMode::MirrorRepeat,
        }
    }
}

/// Sampler descriptor for the given filter and wrap state
pub(crate) fn sampler_descriptor(
    label: &str,
    min: TextureFilter,
    mag: TextureFilter,
    wrap: [WrapMode; 3],
) -> SamplerDescriptor {
    let (min_filter, mipmap_filter, uses_mips) = min.modes();
    let (mag_filter, _, _) = mag.modes();
    SamplerDescriptor {
        label: Some(format!("{} Sampler", label)),
        mag_filter,
        min_filter,
        mipmap_filter,
        address_mode_u: wrap[0].into(),
        address_mode_v: wrap[1].into(),
        address_mode_w: wrap[2].into(),
        lod_max_clamp: if uses_mips { 32.0 } else { 0.0 },
        compare: None,
    }
}

struct CubeStorage {
    texture: TextureHandle,
    cube_view: TextureViewHandle,
    layout: PixelLayout,
    ty: PixelType,
    format: TextureFormat,
    size: u32,
    mip_levels: u32,
    face_views: HashMap<(CubeFace, u32), TextureViewHandle>,
}

/// Six square faces of identical size and format, optionally mip-mapped
pub struct CubeTexture {
    label: String,
    storage: Option<CubeStorage>,
    mipmapping: bool,
    sampler: CachedSampler,

    pub filter_min: TextureFilter,
    pub filter_mag: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
}

impl Default for CubeTexture {
    fn default() -> Self {
        Self::new("Cube Texture")
    }
}

fn reject<T>(label: &str, err: RenderError) -> RenderResult<T> {
    log::error!("{}: {}", label, err);
    Err(err)
}

fn check_square(width: u32, height: u32) -> RenderResult<u32> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions {
            width,
            height,
            reason: "dimensions must be positive",
        });
    }
    if width != height {
        return Err(RenderError::InvalidDimensions {
            width,
            height,
            reason: "cube faces must be square",
        });
    }
    Ok(width)
}

impl CubeTexture {
    /// Create an empty cube texture; no storage exists until it is
    /// initialized or a face is generated
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            storage: None,
            mipmapping: false,
            sampler: CachedSampler::default(),
            filter_min: TextureFilter::Linear,
            filter_mag: TextureFilter::Linear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_r: WrapMode::ClampToEdge,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Backend texture; stays the same across resizes
    pub fn handle(&self) -> Option<TextureHandle> {
        self.storage.as_ref().map(|s| s.texture)
    }

    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    pub fn mipmapping(&self) -> bool {
        self.mipmapping
    }

    /// Face width at mip 0, 0 before allocation
    pub fn face_width(&self) -> u32 {
        self.storage.as_ref().map_or(0, |s| s.size)
    }

    /// Face height at mip 0, 0 before allocation
    pub fn face_height(&self) -> u32 {
        self.face_width()
    }

    /// Edge length of every face at `mip`
    pub fn face_size(&self, mip: u32) -> u32 {
        let size = self.face_width();
        mip_extent(size, size, mip).0
    }

    pub fn mip_levels(&self) -> u32 {
        self.storage.as_ref().map_or(0, |s| s.mip_levels)
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.storage.as_ref().map(|s| s.format)
    }

    pub fn pixel_layout(&self) -> Option<(PixelLayout, PixelType)> {
        self.storage.as_ref().map(|s| (s.layout, s.ty))
    }

    fn descriptor(&self, size: u32, format: TextureFormat, mip_levels: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(self.label.clone()),
            width: size,
            height: size,
            array_layers: 6,
            mip_levels,
            format,
            usage: TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_DST
                | TextureUsage::COPY_SRC
                | TextureUsage::RENDER_ATTACHMENT,
        }
    }

    /// Create or reallocate storage under the existing handle
    fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        size: u32,
        layout: PixelLayout,
        ty: PixelType,
    ) -> RenderResult<()> {
        let format = pixel::storage_format(layout, ty, backend.supports_float32_filtering());
        let mip_levels = if self.mipmapping {
            full_mip_chain(size, size)
        } else {
            1
        };
        let desc = self.descriptor(size, format, mip_levels);

        match self.storage.as_mut() {
            Some(storage) => {
                backend.recreate_texture(storage.texture, &desc)?;
                storage.face_views.retain(|&(_, mip), _| mip < mip_levels);
                storage.layout = layout;
                storage.ty = ty;
                storage.format = format;
                storage.size = size;
                storage.mip_levels = mip_levels;
            }
            None => {
                let texture = backend.create_texture(&desc)?;
                let cube_view = backend.create_texture_view(texture, &TextureViewDescriptor::cube())?;
                self.storage = Some(CubeStorage {
                    texture,
                    cube_view,
                    layout,
                    ty,
                    format,
                    size,
                    mip_levels,
                    face_views: HashMap::new(),
                });
            }
        }

        log::debug!(
            "{}: allocated {}x{} faces as {:?} with {} mip levels",
            self.label,
            size,
            size,
            format,
            mip_levels
        );
        Ok(())
    }

    /// Allocate all six faces with undefined contents.
    ///
    /// With `mipmap` a full mip chain is allocated and minification switches
    /// to trilinear filtering.
    pub fn default_initialize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
        layout: PixelLayout,
        ty: PixelType,
        mipmap: bool,
    ) -> RenderResult<()> {
        let size = match check_square(width, height) {
            Ok(size) => size,
            Err(e) => return reject(&self.label, e),
        };
        self.mipmapping = mipmap;
        if mipmap {
            self.filter_min = TextureFilter::LinearMipmapLinear;
        }
        self.allocate(backend, size, layout, ty)
    }

    /// Upload texels into `face` at mip 0; `None` only allocates.
    ///
    /// Storage is allocated by the first call; later calls must match its
    /// size and format.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_face<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        face: CubeFace,
        width: u32,
        height: u32,
        layout: PixelLayout,
        ty: PixelType,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        let size = match check_square(width, height) {
            Ok(size) => size,
            Err(e) => return reject(&self.label, e),
        };
        if self.storage.is_none() {
            if let Some(data) = data {
                // Validate before allocating so a bad upload leaves nothing behind
                let expected = pixel::external_size(size, size, layout, ty);
                if data.len() != expected {
                    return reject(
                        &self.label,
                        RenderError::InvalidDataLength {
                            expected,
                            actual: data.len(),
                        },
                    );
                }
            }
            self.allocate(backend, size, layout, ty)?;
        }
        self.upload(backend, face, size, layout, ty, 0, data)
    }

    /// Upload texels into `face` at an explicit mip level.
    ///
    /// The level must already be allocated and `width` must equal the face
    /// size at that level.
    #[allow(clippy::too_many_arguments)]
    pub fn set_mip_face<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        face: CubeFace,
        width: u32,
        height: u32,
        layout: PixelLayout,
        ty: PixelType,
        mip: u32,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        let size = match check_square(width, height) {
            Ok(size) => size,
            Err(e) => return reject(&self.label, e),
        };
        self.upload(backend, face, size, layout, ty, mip, data)
    }

    #[allow(clippy::too_many_arguments)]
    fn upload<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        face: CubeFace,
        size: u32,
        layout: PixelLayout,
        ty: PixelType,
        mip: u32,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        let float32 = backend.supports_float32_filtering();
        let Some(storage) = self.storage.as_ref() else {
            return reject(&self.label, RenderError::Uninitialized);
        };
        if mip >= storage.mip_levels {
            return reject(
                &self.label,
                RenderError::InvalidMipLevel {
                    level: mip,
                    available: storage.mip_levels,
                },
            );
        }
        let expected = mip_extent(storage.size, storage.size, mip).0;
        if size != expected {
            return reject(
                &self.label,
                RenderError::FaceMismatch {
                    expected,
                    actual: size,
                },
            );
        }
        if pixel::storage_format(layout, ty, float32) != storage.format {
            return reject(&self.label, RenderError::FormatMismatch);
        }

        let Some(data) = data else {
            return Ok(());
        };
        let bytes = match pixel::to_storage(data, size, size, layout, ty, storage.format) {
            Ok(bytes) => bytes,
            Err(e) => return reject(&self.label, e),
        };
        backend.write_texture(
            storage.texture,
            &TextureRegion {
                mip_level: mip,
                array_layer: face.index(),
                width: size,
                height: size,
            },
            &bytes,
        );
        log::trace!("{}: uploaded {:?} mip {}", self.label, face, mip);
        Ok(())
    }

    /// Reallocate every face (and the mip chain when mip-mapped) at a new
    /// size; previous contents are discarded
    pub fn resize<B: GraphicsBackend>(&mut self, backend: &mut B, width: u32, height: u32) -> RenderResult<()> {
        let size = match check_square(width, height) {
            Ok(size) => size,
            Err(e) => return reject(&self.label, e),
        };
        let Some((layout, ty)) = self.pixel_layout() else {
            return reject(&self.label, RenderError::Uninitialized);
        };
        self.allocate(backend, size, layout, ty)
    }

    /// Read one face at `mip` back in the texture's own layout and type
    pub fn read_face<B: GraphicsBackend>(&self, backend: &mut B, face: CubeFace, mip: u32) -> RenderResult<Vec<u8>> {
        let Some(storage) = self.storage.as_ref() else {
            return reject(&self.label, RenderError::Uninitialized);
        };
        if mip >= storage.mip_levels {
            return reject(
                &self.label,
                RenderError::InvalidMipLevel {
                    level: mip,
                    available: storage.mip_levels,
                },
            );
        }
        let size = mip_extent(storage.size, storage.size, mip).0;
        let raw = backend.read_texture(
            storage.texture,
            &TextureRegion {
                mip_level: mip,
                array_layer: face.index(),
                width: size,
                height: size,
            },
        )?;
        Ok(pixel::from_storage(&raw, storage.layout, storage.ty, storage.format))
    }

    /// 2D view of a single face at `mip`, usable as a render attachment
    pub fn face_view<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        face: CubeFace,
        mip: u32,
    ) -> RenderResult<TextureViewHandle> {
        let Some(storage) = self.storage.as_mut() else {
            return reject(&self.label, RenderError::Uninitialized);
        };
        if mip >= storage.mip_levels {
            return reject(
                &self.label,
                RenderError::InvalidMipLevel {
                    level: mip,
                    available: storage.mip_levels,
                },
            );
        }
        if let Some(&view) = storage.face_views.get(&(face, mip)) {
            return Ok(view);
        }
        let view = backend.create_texture_view(
            storage.texture,
            &TextureViewDescriptor {
                label: Some(format!("{} {:?} mip {}", self.label, face, mip)),
                ..TextureViewDescriptor::single(face.index(), mip)
            },
        )?;
        storage.face_views.insert((face, mip), view);
        Ok(view)
    }

    /// Sampling binding for shaders; the sampler follows the current filter
    /// and wrap settings
    pub fn binding<B: GraphicsBackend>(&mut self, backend: &mut B) -> RenderResult<TextureBinding> {
        let Some((texture, view)) = self.storage.as_ref().map(|s| (s.texture, s.cube_view)) else {
            return reject(&self.label, RenderError::Uninitialized);
        };
        let desc = sampler_descriptor(
            &self.label,
            self.filter_min,
            self.filter_mag,
            [self.wrap_s, self.wrap_t, self.wrap_r],
        );
        let sampler = self.sampler.get(backend, desc)?;
        Ok(TextureBinding {
            texture,
            view,
            sampler,
            dimension: TextureViewDimension::Cube,
        })
    }

    /// Bind for sampling on `unit`, or on the active unit when `None`.
    ///
    /// Returns the binding previously occupying that unit.
    pub fn bind<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        units: &mut TextureUnits,
        unit: Option<u32>,
    ) -> RenderResult<Option<TextureBinding>> {
        let binding = self.binding(backend)?;
        Ok(units.bind(unit, binding))
    }

    /// Remove this texture from every unit it is bound to
    pub fn unbind(&self, units: &mut TextureUnits) -> Vec<u32> {
        match self.handle() {
            Some(texture) => units.unbind_texture(texture),
            None => Vec::new(),
        }
    }

    /// Release GPU storage and sampler
    pub fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.sampler.destroy(backend);
        if let Some(storage) = self.storage.take() {
            backend.destroy_texture(storage.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_order_and_vectors() {
        assert_eq!(CubeFace::from_index(3).unwrap(), CubeFace::NegativeY);
        assert!(matches!(CubeFace::from_index(6), Err(RenderError::InvalidFace(6))));
        assert_eq!(CubeFace::NegativeZ.next(), None);
        assert_eq!(CubeFace::PositiveX.next(), Some(CubeFace::NegativeX));
        for face in CubeFace::ALL {
            assert_eq!(face.direction().dot(face.up()), 0.0);
        }
        assert_eq!(CubeFace::PositiveY.up(), Vec3::Z);
    }

    #[test]
    fn test_mipmap_switches_filter() {
        let mut backend = DummyBackend::new(4, 4);
        let mut cube = CubeTexture::new("env");
        cube.default_initialize(&mut backend, 128, 128, PixelLayout::Rgb, PixelType::Float, true)
            .unwrap();
        assert_eq!(cube.mip_levels(), 8);
        assert_eq!(cube.filter_min, TextureFilter::LinearMipmapLinear);
        assert_eq!(cube.face_size(3), 16);
    }

    #[test]
    fn test_non_square_is_rejected() {
        let mut backend = DummyBackend::new(4, 4);
        let mut cube = CubeTexture::new("bad");
        let result = cube.default_initialize(&mut backend, 64, 32, PixelLayout::Rgba, PixelType::UnsignedByte, false);
        assert!(matches!(result, Err(RenderError::InvalidDimensions { .. })));
        assert!(!cube.is_initialized());
    }

    #[test]
    fn test_sampler_follows_filter_state() {
        let mut backend = DummyBackend::new(4, 4);
        let mut cube = CubeTexture::new("env");
        cube.default_initialize(&mut backend, 8, 8, PixelLayout::Rgba, PixelType::UnsignedByte, false)
            .unwrap();
        let first = cube.binding(&mut backend).unwrap();
        assert_eq!(cube.binding(&mut backend).unwrap(), first);

        cube.filter_mag = TextureFilter::Nearest;
        let second = cube.binding(&mut backend).unwrap();
        assert_ne!(second.sampler, first.sampler);
        assert_eq!(second.view, first.view);
    }

    #[test]
    fn test_bind_and_unbind_units() {
        let mut backend = DummyBackend::new(4, 4);
        let mut units = TextureUnits::new();
        let mut cube = CubeTexture::new("env");
        cube.default_initialize(&mut backend, 8, 8, PixelLayout::Rgba, PixelType::UnsignedByte, false)
            .unwrap();

        units.set_active(2);
        assert_eq!(cube.bind(&mut backend, &mut units, None).unwrap(), None);
        assert!(cube.bind(&mut backend, &mut units, Some(5)).unwrap().is_none());
        assert!(units.get(2).is_some());
        assert_eq!(cube.unbind(&mut units), vec![2, 5]);
        assert!(units.is_empty());
    }
}
