//! Radiance - a scene-graph renderer with deferred command submission
//!
//! The crate renders through a [`GraphicsBackend`](backend::GraphicsBackend):
//! - **wgpu**: real GPU rendering, presenting to a window or headless
//! - **Dummy**: a CPU-side recorder used for tests and tooling
//!
//! # Features
//! - Scene arena with parent/child transforms and shared materials
//! - Deferred draw/light queues flushed per frame into render targets
//! - Cube textures with per-face and per-mip addressing
//! - Cube-map capture and image-based lighting precomputation
//!   (environment, irradiance, specular prefilter, BRDF lookup)

pub mod backend;
pub mod error;
pub mod ibl;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::DummyBackend;
pub use error::{RenderError, RenderResult};
pub use renderer::{FlushStats, Renderer};

/// Configuration for a [`Renderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial render width
    pub width: u32,
    /// Initial render height
    pub height: u32,
    /// Color targets are cleared to this at the first pass of a flush
    pub clear_color: [f32; 4],
    /// Maximum number of lights accepted per flush
    pub max_lights: u32,
    /// Near plane of cube-map capture cameras
    pub capture_near: f32,
    /// Far plane of cube-map capture cameras
    pub capture_far: f32,
    /// Per-object uniform slots allocated up front; the pool grows on demand
    pub object_pool_size: u32,
    /// Enable vsync when presenting to a window
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            max_lights: scene::MAX_LIGHTS,
            capture_near: 0.1,
            capture_far: 10.0,
            object_pool_size: 64,
            vsync: true,
        }
    }
}
