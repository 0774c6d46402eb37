//! External texel layouts and their GPU storage formats

use half::f16;

use crate::backend::TextureFormat;
use crate::error::{RenderError, RenderResult};

/// Channel layout of caller-supplied texel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    R,
    Rg,
    Rgb,
    Rgba,
}

impl PixelLayout {
    pub fn channels(&self) -> u32 {
        match self {
            PixelLayout::R => 1,
            PixelLayout::Rg => 2,
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }
}

/// Component type of caller-supplied texel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UnsignedByte,
    HalfFloat,
    Float,
}

impl PixelType {
    /// Bytes per component
    pub fn size(&self) -> u32 {
        match self {
            PixelType::UnsignedByte => 1,
            PixelType::HalfFloat => 2,
            PixelType::Float => 4,
        }
    }
}

/// GPU format used to store texels of the given layout and type.
///
/// RGB has no GPU equivalent and is stored as RGBA. 32-bit float data falls
/// back to 16-bit storage when the device cannot filter 32-bit floats.
pub fn storage_format(layout: PixelLayout, ty: PixelType, float32_filterable: bool) -> TextureFormat {
    let ty = match ty {
        PixelType::Float if !float32_filterable => PixelType::HalfFloat,
        other => other,
    };
    match (layout, ty) {
        (PixelLayout::R, PixelType::UnsignedByte) => TextureFormat::R8Unorm,
        (PixelLayout::Rg, PixelType::UnsignedByte) => TextureFormat::Rg8Unorm,
        (PixelLayout::Rgb | PixelLayout::Rgba, PixelType::UnsignedByte) => TextureFormat::Rgba8Unorm,
        (PixelLayout::R, PixelType::HalfFloat) => TextureFormat::R16Float,
        (PixelLayout::Rg, PixelType::HalfFloat) => TextureFormat::Rg16Float,
        (PixelLayout::Rgb | PixelLayout::Rgba, PixelType::HalfFloat) => TextureFormat::Rgba16Float,
        (PixelLayout::R, PixelType::Float) => TextureFormat::R32Float,
        (PixelLayout::Rg, PixelType::Float) => TextureFormat::Rg32Float,
        (PixelLayout::Rgb | PixelLayout::Rgba, PixelType::Float) => TextureFormat::Rgba32Float,
    }
}

/// Number of bytes a `width`x`height` image of this layout/type occupies
pub fn external_size(width: u32, height: u32, layout: PixelLayout, ty: PixelType) -> usize {
    width as usize * height as usize * layout.channels() as usize * ty.size() as usize
}

fn read_components(data: &[u8], ty: PixelType) -> Vec<f32> {
    match ty {
        PixelType::UnsignedByte => data.iter().map(|&b| b as f32 / 255.0).collect(),
        PixelType::HalfFloat => data
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        PixelType::Float => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

fn write_components(values: &[f32], ty: PixelType) -> Vec<u8> {
    match ty {
        PixelType::UnsignedByte => values
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
        PixelType::HalfFloat => values
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect(),
        PixelType::Float => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn storage_type(format: TextureFormat) -> PixelType {
    match format {
        TextureFormat::R16Float | TextureFormat::Rg16Float | TextureFormat::Rgba16Float => {
            PixelType::HalfFloat
        }
        TextureFormat::R32Float
        | TextureFormat::Rg32Float
        | TextureFormat::Rgba32Float
        | TextureFormat::Depth32Float => PixelType::Float,
        _ => PixelType::UnsignedByte,
    }
}

/// Convert caller texels into the byte layout of `format`
pub fn to_storage(
    data: &[u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    ty: PixelType,
    format: TextureFormat,
) -> RenderResult<Vec<u8>> {
    let expected = external_size(width, height, layout, ty);
    if data.len() != expected {
        return Err(RenderError::InvalidDataLength {
            expected,
            actual: data.len(),
        });
    }

    let target_ty = storage_type(format);
    let expand = layout == PixelLayout::Rgb;
    if target_ty == ty && !expand {
        return Ok(data.to_vec());
    }

    let mut values = read_components(data, ty);
    if expand {
        values = values
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 1.0])
            .collect();
    }
    Ok(write_components(&values, target_ty))
}

/// Convert texels stored as `format` back into the caller layout/type
pub fn from_storage(data: &[u8], layout: PixelLayout, ty: PixelType, format: TextureFormat) -> Vec<u8> {
    let source_ty = storage_type(format);
    let strip = layout == PixelLayout::Rgb;
    if source_ty == ty && !strip {
        return data.to_vec();
    }

    let mut values = read_components(data, source_ty);
    if strip {
        values = values
            .chunks_exact(4)
            .flat_map(|rgba| [rgba[0], rgba[1], rgba[2]])
            .collect();
    }
    write_components(&values, ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_is_stored_as_rgba() {
        let format = storage_format(PixelLayout::Rgb, PixelType::UnsignedByte, true);
        assert_eq!(format, TextureFormat::Rgba8Unorm);

        let stored = to_storage(&[10, 20, 30, 40, 50, 60], 2, 1, PixelLayout::Rgb, PixelType::UnsignedByte, format)
            .unwrap();
        assert_eq!(stored, vec![10, 20, 30, 255, 40, 50, 60, 255]);
        assert_eq!(
            from_storage(&stored, PixelLayout::Rgb, PixelType::UnsignedByte, format),
            vec![10, 20, 30, 40, 50, 60]
        );
    }

    #[test]
    fn test_external_size_of_large_faces() {
        assert_eq!(
            external_size(16384, 16384, PixelLayout::Rgba, PixelType::Float),
            16384 * 16384 * 16
        );
        assert_eq!(external_size(4, 2, PixelLayout::Rgb, PixelType::HalfFloat), 48);
    }

    #[test]
    fn test_float_falls_back_to_half() {
        assert_eq!(
            storage_format(PixelLayout::Rgb, PixelType::Float, true),
            TextureFormat::Rgba32Float
        );
        let format = storage_format(PixelLayout::Rgb, PixelType::Float, false);
        assert_eq!(format, TextureFormat::Rgba16Float);

        let texel: Vec<u8> = [0.5f32, 2.0, 16.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let stored = to_storage(&texel, 1, 1, PixelLayout::Rgb, PixelType::Float, format).unwrap();
        assert_eq!(stored.len(), 8);
        assert_eq!(from_storage(&stored, PixelLayout::Rgb, PixelType::Float, format), texel);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let result = to_storage(&[0; 5], 2, 1, PixelLayout::Rgb, PixelType::UnsignedByte, TextureFormat::Rgba8Unorm);
        assert!(matches!(
            result,
            Err(RenderError::InvalidDataLength { expected: 6, actual: 5 })
        ));
    }
}
