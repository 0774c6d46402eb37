//! Shared helpers for the renderer integration tests.
//!
//! Every test runs on the [`DummyBackend`], which keeps texel memory on the
//! CPU so rendered and uploaded contents can be read back and compared.

#![allow(dead_code)]

use glam::{Vec3, Vec4};

use radiance_engine::backend::DummyBackend;
use radiance_engine::resources::{GpuMesh, Mesh, RenderTarget, ShaderDescriptor, TextureSlot};
use radiance_engine::resources::pixel::PixelType;
use radiance_engine::scene::{MaterialId, NodeId, Scene};
use radiance_engine::{Renderer, RendererConfig};

pub const SURFACE_WIDTH: u32 = 64;
pub const SURFACE_HEIGHT: u32 = 32;

/// Route `log` output through the test harness
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renderer over a fresh dummy backend with a 64x32 surface
pub fn dummy_renderer() -> Renderer<DummyBackend> {
    dummy_renderer_with(DummyBackend::new(SURFACE_WIDTH, SURFACE_HEIGHT))
}

pub fn dummy_renderer_with(backend: DummyBackend) -> Renderer<DummyBackend> {
    init_logger();
    let config = RendererConfig {
        width: SURFACE_WIDTH,
        height: SURFACE_HEIGHT,
        ..Default::default()
    };
    Renderer::new(backend, config).expect("dummy renderer")
}

/// Single-attachment target with depth
pub fn target(renderer: &mut Renderer<DummyBackend>, label: &str, size: u32) -> RenderTarget {
    RenderTarget::new(renderer.backend_mut(), label, size, size, PixelType::UnsignedByte, 1, true)
        .expect("render target")
}

/// Scene with one cube drawn with the default material
pub struct CubeScene {
    pub scene: Scene,
    pub mesh: GpuMesh,
    pub material: MaterialId,
    pub node: NodeId,
}

impl CubeScene {
    pub fn new(renderer: &mut Renderer<DummyBackend>) -> Self {
        let mut scene = Scene::new();
        let mesh = renderer.upload_mesh(&Mesh::cube()).expect("cube mesh");
        let material = renderer.create_material().expect("default material");
        let material = scene.add_material(material);
        let node = scene.add_node("Cube", mesh, material).expect("cube node");
        Self {
            scene,
            mesh,
            material,
            node,
        }
    }
}

/// Shader whose only purpose is to be recorded by the dummy backend
pub fn solid_shader(label: &str) -> ShaderDescriptor {
    ShaderDescriptor::new(label, "// recorded, never compiled")
        .with_uniforms(&["color"])
        .with_texture(TextureSlot::texture_2d("albedo").optional())
}

pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn encode_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// First RGB texel of a float RGB face readback
pub fn first_rgb(bytes: &[u8]) -> Vec3 {
    let values = decode_f32(&bytes[..12]);
    Vec3::new(values[0], values[1], values[2])
}

/// Color the dummy backend writes for a draw facing `direction`
pub fn direction_color(direction: Vec3) -> Vec4 {
    (direction * 0.5 + Vec3::splat(0.5)).extend(1.0)
}
