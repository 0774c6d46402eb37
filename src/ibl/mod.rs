//! Image-based lighting precomputation
//!
//! Turns an equirectangular radiance image into the maps a lit material
//! samples for ambient light:
//! - an environment cube resampled from the image
//! - a diffuse irradiance cube convolved from the environment
//! - a specular prefilter cube with one roughness per mip level
//! - a BRDF integration lookup table
//!
//! Every cube map is produced with [`Renderer::render_to_cubemap`] on a
//! private scene holding a single unit cube.

mod background;

pub use background::{background_shader_descriptor, Background};

use glam::Vec3;

use crate::backend::*;
use crate::error::RenderResult;
use crate::renderer::{prefilter_roughness, Renderer};
use crate::resources::pixel::{PixelLayout, PixelType};
use crate::resources::{
    CubeTexture, GpuMesh, Material, Mesh, RenderTarget, Shader, ShaderDescriptor, Texture2D, TextureSlot,
    VertexInput,
};
use crate::scene::{MaterialId, NodeId, Scene};

const EQUIRECT_TO_CUBE_SHADER: &str = include_str!("../shaders/equirect_to_cube.wgsl");
const IRRADIANCE_SHADER: &str = include_str!("../shaders/irradiance.wgsl");
const PREFILTER_SHADER: &str = include_str!("../shaders/prefilter.wgsl");
const BRDF_LUT_SHADER: &str = include_str!("../shaders/brdf_lut.wgsl");

/// Material slot names lit shaders read the baked maps from
pub const IRRADIANCE_SLOT: &str = "EnvIrradiance";
pub const PREFILTER_SLOT: &str = "EnvPrefilter";
pub const BRDF_LUT_SLOT: &str = "BRDFLUT";

/// Sizes of the baked maps
#[derive(Debug, Clone)]
pub struct IblConfig {
    /// Face size of the environment cube
    pub environment_size: u32,
    /// Face size of the irradiance cube
    pub irradiance_size: u32,
    /// Base face size of the prefilter cube
    pub prefilter_size: u32,
    /// Prefilter mip levels rendered, from smooth to fully rough
    pub prefilter_mips: u32,
    /// Width and height of the BRDF lookup table
    pub brdf_lut_size: u32,
    /// Where capture cameras sit
    pub capture_position: Vec3,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 512,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mips: 5,
            brdf_lut_size: 512,
            capture_position: Vec3::ZERO,
        }
    }
}

/// The baked lighting maps
pub struct EnvironmentMaps {
    pub environment: CubeTexture,
    pub irradiance: CubeTexture,
    pub prefilter: CubeTexture,
    pub brdf_lut: RenderTarget,
}

/// Capture shaders registered for one bake
struct BakeShaders {
    equirect_to_cube: Shader,
    irradiance: Shader,
    prefilter: Shader,
    brdf_lut: Shader,
}

impl BakeShaders {
    fn register<B: GraphicsBackend>(renderer: &mut Renderer<B>) -> RenderResult<Self> {
        Ok(Self {
            equirect_to_cube: renderer.create_shader(
                ShaderDescriptor::new("Equirect To Cube", EQUIRECT_TO_CUBE_SHADER)
                    .with_texture(TextureSlot::texture_2d("environment")),
            )?,
            irradiance: renderer.create_shader(
                ShaderDescriptor::new("Irradiance Capture", IRRADIANCE_SHADER)
                    .with_texture(TextureSlot::cube("environment")),
            )?,
            prefilter: renderer.create_shader(
                ShaderDescriptor::new("Prefilter Capture", PREFILTER_SHADER)
                    .with_uniforms(&["roughness", "resolution"])
                    .with_texture(TextureSlot::cube("environment")),
            )?,
            brdf_lut: renderer.create_shader(
                ShaderDescriptor::new("Integrate BRDF", BRDF_LUT_SHADER).with_vertex_input(VertexInput::Fullscreen),
            )?,
        })
    }
}

/// Material drawn from inside the capture cube
fn capture_material<B: GraphicsBackend>(renderer: &mut Renderer<B>, shader: &Shader) -> RenderResult<Material> {
    let mut material = renderer.create_custom_material(shader)?;
    material.depth_compare = CompareFunction::LessEqual;
    material.cull = CullMode::None;
    Ok(material)
}

impl BakeShaders {
    fn destroy<B: GraphicsBackend>(self, renderer: &mut Renderer<B>) {
        renderer.destroy_shader(&self.equirect_to_cube);
        renderer.destroy_shader(&self.irradiance);
        renderer.destroy_shader(&self.prefilter);
        renderer.destroy_shader(&self.brdf_lut);
    }
}

/// Cube maps a bake renders into
struct BakedCubes {
    environment: CubeTexture,
    irradiance: CubeTexture,
    prefilter: CubeTexture,
}

impl BakedCubes {
    fn new() -> Self {
        Self {
            environment: CubeTexture::new("Environment"),
            irradiance: CubeTexture::new("Irradiance"),
            prefilter: CubeTexture::new("Prefilter"),
        }
    }

    fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.environment.destroy(backend);
        self.irradiance.destroy(backend);
        self.prefilter.destroy(backend);
    }
}

impl EnvironmentMaps {
    /// Run the full precompute sequence for `radiance`, an equirectangular
    /// HDR image.
    ///
    /// Capture shaders, the capture mesh and their materials are released
    /// before returning, as are any maps already allocated when a step fails.
    pub fn bake<B: GraphicsBackend>(
        renderer: &mut Renderer<B>,
        radiance: &mut Texture2D,
        config: &IblConfig,
    ) -> RenderResult<Self> {
        log::info!("Baking image-based lighting from '{}'", radiance.name);
        let shaders = BakeShaders::register(renderer)?;
        let cube_mesh = match renderer.upload_mesh(&Mesh::cube()) {
            Ok(mesh) => mesh,
            Err(err) => {
                shaders.destroy(renderer);
                return Err(err);
            }
        };
        let mut scene = Scene::new();
        let mut cubes = BakedCubes::new();

        let result = Self::render_cubes(renderer, &mut scene, cube_mesh, &shaders, radiance, config, &mut cubes)
            .and_then(|mips| Self::integrate_brdf(renderer, &shaders, config).map(|lut| (mips, lut)));

        scene.destroy(renderer.backend_mut());
        cube_mesh.destroy(renderer.backend_mut());
        shaders.destroy(renderer);

        match result {
            Ok((mips, brdf_lut)) => {
                log::info!(
                    "Image-based lighting baked (environment {}, irradiance {}, prefilter {} x {} mips, BRDF LUT {})",
                    config.environment_size,
                    config.irradiance_size,
                    config.prefilter_size,
                    mips,
                    config.brdf_lut_size
                );
                Ok(Self {
                    environment: cubes.environment,
                    irradiance: cubes.irradiance,
                    prefilter: cubes.prefilter,
                    brdf_lut,
                })
            }
            Err(err) => {
                log::error!("Image-based lighting bake failed: {}", err);
                cubes.destroy(renderer.backend_mut());
                Err(err)
            }
        }
    }

    /// Render the environment, irradiance and prefilter cubes; returns the
    /// number of prefilter mips rendered
    fn render_cubes<B: GraphicsBackend>(
        renderer: &mut Renderer<B>,
        scene: &mut Scene,
        cube_mesh: GpuMesh,
        shaders: &BakeShaders,
        radiance: &mut Texture2D,
        config: &IblConfig,
        cubes: &mut BakedCubes,
    ) -> RenderResult<u32> {
        let position = config.capture_position;

        let mut to_cube = capture_material(renderer, &shaders.equirect_to_cube)?;
        to_cube.set_texture("environment", radiance.binding(renderer.backend_mut())?, 0);
        let to_cube = scene.add_material(to_cube);
        let node = scene.add_node("Environment Cube", cube_mesh, to_cube)?;

        cubes.environment.default_initialize(
            renderer.backend_mut(),
            config.environment_size,
            config.environment_size,
            PixelLayout::Rgb,
            PixelType::Float,
            false,
        )?;
        renderer.render_to_cubemap(scene, node, &mut cubes.environment, position, 0)?;
        let environment_binding = cubes.environment.binding(renderer.backend_mut())?;

        let mut irradiance_material = capture_material(renderer, &shaders.irradiance)?;
        irradiance_material.set_texture_cube("environment", environment_binding, 0);
        use_material(scene, node, irradiance_material)?;
        cubes.irradiance.default_initialize(
            renderer.backend_mut(),
            config.irradiance_size,
            config.irradiance_size,
            PixelLayout::Rgb,
            PixelType::Float,
            false,
        )?;
        renderer.render_to_cubemap(scene, node, &mut cubes.irradiance, position, 0)?;

        let mut prefilter_material = capture_material(renderer, &shaders.prefilter)?;
        prefilter_material.set_texture_cube("environment", environment_binding, 0);
        prefilter_material.set_float("resolution", config.environment_size as f32);
        let prefilter_id = use_material(scene, node, prefilter_material)?;
        cubes.prefilter.default_initialize(
            renderer.backend_mut(),
            config.prefilter_size,
            config.prefilter_size,
            PixelLayout::Rgb,
            PixelType::Float,
            true,
        )?;
        let mips = config.prefilter_mips.clamp(1, cubes.prefilter.mip_levels());
        for mip in 0..mips {
            let roughness = prefilter_roughness(mip, mips);
            scene
                .material_mut(prefilter_id)?
                .set_float("roughness", roughness);
            renderer.render_to_cubemap(scene, node, &mut cubes.prefilter, position, mip)?;
            log::debug!("Prefiltered mip {} at roughness {:.2}", mip, roughness);
        }
        Ok(mips)
    }

    fn integrate_brdf<B: GraphicsBackend>(
        renderer: &mut Renderer<B>,
        shaders: &BakeShaders,
        config: &IblConfig,
    ) -> RenderResult<RenderTarget> {
        let brdf_lut = RenderTarget::new(
            renderer.backend_mut(),
            "BRDF LUT",
            config.brdf_lut_size,
            config.brdf_lut_size,
            PixelType::HalfFloat,
            1,
            true,
        )?;
        let brdf_material = match renderer.create_custom_material(&shaders.brdf_lut) {
            Ok(material) => material,
            Err(err) => {
                brdf_lut.destroy(renderer.backend_mut());
                return Err(err);
            }
        };
        let blitted = renderer.blit(None, Some(&brdf_lut), &brdf_material);
        brdf_material.destroy(renderer.backend_mut());
        match blitted {
            Ok(_) => Ok(brdf_lut),
            Err(err) => {
                brdf_lut.destroy(renderer.backend_mut());
                Err(err)
            }
        }
    }

    /// Point `material`'s irradiance, prefilter and BRDF slots at the baked
    /// maps on units 0, 1 and 2
    pub fn apply_to<B: GraphicsBackend>(&mut self, backend: &mut B, material: &mut Material) -> RenderResult<()> {
        material.set_texture_cube(IRRADIANCE_SLOT, self.irradiance.binding(backend)?, 0);
        material.set_texture_cube(PREFILTER_SLOT, self.prefilter.binding(backend)?, 1);
        material.set_texture(BRDF_LUT_SLOT, self.brdf_lut.color_texture(backend, 0)?, 2);
        Ok(())
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.environment.destroy(backend);
        self.irradiance.destroy(backend);
        self.prefilter.destroy(backend);
        self.brdf_lut.destroy(backend);
    }
}

/// Swap the capture cube's material
fn use_material(scene: &mut Scene, node: NodeId, material: Material) -> RenderResult<MaterialId> {
    let id = scene.add_material(material);
    scene.node_mut(node)?.material = Some(id);
    Ok(id)
}
