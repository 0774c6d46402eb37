//! Resource management
//!
//! GPU textures, render targets, meshes, shaders and materials.

mod cube_texture;
mod material;
mod mesh;
pub mod pixel;
mod render_target;
mod shader;
mod texture;
mod units;

pub use cube_texture::*;
pub use material::*;
pub use mesh::*;
pub use pixel::{PixelLayout, PixelType};
pub use render_target::*;
pub use shader::*;
pub use texture::*;
pub use units::{TextureBinding, TextureUnits};
