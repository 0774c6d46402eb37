//! Cube texture allocation, upload and readback through the dummy backend.

mod common;

use rstest::rstest;

use common::{decode_f32, encode_f32, init_logger};
use radiance_engine::backend::{DummyBackend, TextureFormat};
use radiance_engine::resources::pixel::{PixelLayout, PixelType};
use radiance_engine::resources::{CubeFace, CubeTexture};
use radiance_engine::RenderError;

fn face_pattern(face: CubeFace, texels: usize, channels: usize) -> Vec<u8> {
    (0..texels * channels)
        .map(|i| (face.index() as usize * 40 + i * 7) as u8)
        .collect()
}

#[rstest]
#[case::rgb_float_mipmapped(512, PixelLayout::Rgb, PixelType::Float, true, 10, TextureFormat::Rgba32Float)]
#[case::rgba_byte(64, PixelLayout::Rgba, PixelType::UnsignedByte, false, 1, TextureFormat::Rgba8Unorm)]
#[case::rg_half(32, PixelLayout::Rg, PixelType::HalfFloat, true, 6, TextureFormat::Rg16Float)]
fn test_default_initialize(
    #[case] size: u32,
    #[case] layout: PixelLayout,
    #[case] ty: PixelType,
    #[case] mipmap: bool,
    #[case] mip_levels: u32,
    #[case] format: TextureFormat,
) {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Environment");
    assert!(!cube.is_initialized());

    cube.default_initialize(&mut backend, size, size, layout, ty, mipmap)
        .unwrap();

    assert!(cube.is_initialized());
    assert_eq!(cube.face_size(0), size);
    assert_eq!(cube.mip_levels(), mip_levels);
    assert_eq!(cube.format(), Some(format));
    assert_eq!(cube.face_size(mip_levels - 1), if mipmap { 1 } else { size });
}

#[test]
fn test_resize_reallocates_mip_chain() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Prefilter");
    cube.default_initialize(&mut backend, 1024, 1024, PixelLayout::Rgb, PixelType::HalfFloat, true)
        .unwrap();
    assert_eq!(cube.mip_levels(), 11);
    let handle = cube.handle();

    cube.resize(&mut backend, 256, 256).unwrap();

    assert_eq!(cube.handle(), handle);
    assert_eq!(cube.face_size(0), 256);
    assert_eq!(cube.mip_levels(), 9);
    for face in CubeFace::ALL {
        let texels = cube.read_face(&mut backend, face, 0).unwrap();
        assert_eq!(texels.len(), 256 * 256 * 3 * 2);
    }
    assert_eq!(cube.read_face(&mut backend, CubeFace::NegativeZ, 8).unwrap().len(), 3 * 2);
}

#[test]
fn test_resize_requires_storage() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Empty");
    assert!(matches!(
        cube.resize(&mut backend, 16, 16),
        Err(RenderError::Uninitialized)
    ));
}

#[test]
fn test_generate_and_read_bytes() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Sky");
    for face in CubeFace::ALL {
        let data = face_pattern(face, 4 * 4, 3);
        cube.generate_face(&mut backend, face, 4, 4, PixelLayout::Rgb, PixelType::UnsignedByte, Some(&data))
            .unwrap();
    }

    for face in CubeFace::ALL {
        let texels = cube.read_face(&mut backend, face, 0).unwrap();
        assert_eq!(texels, face_pattern(face, 4 * 4, 3), "{:?}", face);
    }
}

#[rstest]
#[case::float32_filterable(true, TextureFormat::Rgba32Float)]
#[case::half_fallback(false, TextureFormat::Rgba16Float)]
fn test_generate_and_read_floats(#[case] float32: bool, #[case] format: TextureFormat) {
    init_logger();
    let mut backend = DummyBackend::new(8, 8).with_float32_filtering(float32);
    let mut cube = CubeTexture::new("HDR");
    // Values exactly representable in half precision
    let values: Vec<f32> = (0..2 * 2 * 3).map(|i| i as f32 * 0.25).collect();
    for face in CubeFace::ALL {
        cube.generate_face(
            &mut backend,
            face,
            2,
            2,
            PixelLayout::Rgb,
            PixelType::Float,
            Some(&encode_f32(&values)),
        )
        .unwrap();
    }

    assert_eq!(cube.format(), Some(format));
    let texels = cube.read_face(&mut backend, CubeFace::PositiveY, 0).unwrap();
    assert_eq!(decode_f32(&texels), values);
}

#[test]
fn test_set_mip_face_checks_level_size() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Mips");
    cube.default_initialize(&mut backend, 8, 8, PixelLayout::Rgba, PixelType::UnsignedByte, true)
        .unwrap();

    let level2 = vec![9u8; 2 * 2 * 4];
    cube.set_mip_face(&mut backend, CubeFace::NegativeX, 2, 2, PixelLayout::Rgba, PixelType::UnsignedByte, 2, Some(&level2))
        .unwrap();
    assert_eq!(cube.read_face(&mut backend, CubeFace::NegativeX, 2).unwrap(), level2);

    let wrong = vec![0u8; 4 * 4 * 4];
    assert!(matches!(
        cube.set_mip_face(&mut backend, CubeFace::NegativeX, 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, 2, Some(&wrong)),
        Err(RenderError::FaceMismatch { expected: 2, actual: 4 })
    ));
    assert!(matches!(
        cube.read_face(&mut backend, CubeFace::PositiveX, 4),
        Err(RenderError::InvalidMipLevel { level: 4, available: 4 })
    ));
}

#[rstest]
#[case::not_square(4, 2)]
#[case::zero(0, 0)]
fn test_invalid_dimensions_are_rejected(#[case] width: u32, #[case] height: u32) {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Bad");
    let result = cube.default_initialize(&mut backend, width, height, PixelLayout::Rgba, PixelType::UnsignedByte, false);
    assert!(matches!(result, Err(RenderError::InvalidDimensions { .. })));
    assert!(!cube.is_initialized());
}

#[test]
fn test_short_upload_leaves_texture_unallocated() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Short");
    let result = cube.generate_face(
        &mut backend,
        CubeFace::PositiveX,
        4,
        4,
        PixelLayout::Rgba,
        PixelType::UnsignedByte,
        Some(&[0u8; 10]),
    );
    assert!(matches!(
        result,
        Err(RenderError::InvalidDataLength { expected: 64, actual: 10 })
    ));
    assert!(!cube.is_initialized());
}

#[test]
fn test_later_faces_must_match_storage() {
    init_logger();
    let mut backend = DummyBackend::new(8, 8);
    let mut cube = CubeTexture::new("Mixed");
    cube.generate_face(&mut backend, CubeFace::PositiveX, 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, None)
        .unwrap();

    assert!(matches!(
        cube.generate_face(&mut backend, CubeFace::NegativeX, 8, 8, PixelLayout::Rgba, PixelType::UnsignedByte, None),
        Err(RenderError::FaceMismatch { expected: 4, actual: 8 })
    ));
    assert!(matches!(
        cube.generate_face(&mut backend, CubeFace::NegativeX, 4, 4, PixelLayout::Rgba, PixelType::Float, None),
        Err(RenderError::FormatMismatch)
    ));
}
