//! Image-based lighting bake and skybox background.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{dummy_renderer, encode_f32, first_rgb, CubeScene};
use radiance_engine::backend::{CompareFunction, DummyBackend};
use radiance_engine::ibl::{Background, EnvironmentMaps, IblConfig};
use radiance_engine::resources::pixel::{PixelLayout, PixelType};
use radiance_engine::resources::{
    CubeFace, CubeTexture, MaterialParam, MaterialUniformData, Mesh, Texture2D,
};
use radiance_engine::{RenderError, Renderer};

fn small_config(prefilter_mips: u32) -> IblConfig {
    IblConfig {
        environment_size: 8,
        irradiance_size: 4,
        prefilter_size: 16,
        prefilter_mips,
        brdf_lut_size: 8,
        ..Default::default()
    }
}

fn radiance(renderer: &mut Renderer<DummyBackend>) -> Texture2D {
    let values: Vec<f32> = (0..8 * 4).flat_map(|i| [i as f32, 0.5, 2.0]).collect();
    Texture2D::from_data(
        renderer.backend_mut(),
        "Sky HDR",
        8,
        4,
        PixelLayout::Rgb,
        PixelType::Float,
        &encode_f32(&values),
    )
    .unwrap()
}

/// Target mip and roughness of every prefilter draw, in order
fn prefilter_draws(renderer: &Renderer<DummyBackend>) -> Vec<(u32, f32)> {
    renderer
        .backend()
        .passes()
        .iter()
        .flat_map(|pass| pass.draws.iter().map(move |draw| (pass, draw)))
        .filter(|(_, draw)| draw.pipeline_label.as_deref() == Some("Prefilter Capture Pipeline"))
        .map(|(pass, draw)| {
            let params = draw.uniform::<MaterialUniformData>(2).unwrap();
            (pass.color_targets[0].mip_level, params.values[0].x)
        })
        .collect()
}

#[test]
fn test_bake_produces_every_map() {
    let mut renderer = dummy_renderer();
    let mut hdr = radiance(&mut renderer);

    let maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();

    assert_eq!(maps.environment.face_size(0), 8);
    assert_eq!(maps.environment.mip_levels(), 1);
    assert_eq!(maps.irradiance.face_size(0), 4);
    assert_eq!(maps.prefilter.face_size(0), 16);
    assert_eq!(maps.prefilter.mip_levels(), 5);
    assert_eq!((maps.brdf_lut.width(), maps.brdf_lut.height()), (8, 8));

    let labels: Vec<Option<String>> = renderer
        .backend()
        .passes()
        .iter()
        .map(|pass| pass.draws[0].pipeline_label.clone())
        .collect();
    // environment, irradiance, five prefilter mips, then the lookup table
    assert_eq!(labels.len(), 6 + 6 + 5 * 6 + 1);
    assert_eq!(labels[0].as_deref(), Some("Equirect To Cube Pipeline"));
    assert_eq!(labels[6].as_deref(), Some("Irradiance Capture Pipeline"));
    assert_eq!(labels.last().unwrap().as_deref(), Some("Integrate BRDF Pipeline"));
    assert_eq!(renderer.backend().presented_frames(), 0);
}

#[rstest]
#[case::five_levels(5, vec![0.0, 0.25, 0.5, 0.75, 1.0])]
#[case::single_level(1, vec![0.0])]
#[case::clamped_to_chain(9, vec![0.0, 0.25, 0.5, 0.75, 1.0])]
fn test_prefilter_sweeps_roughness(#[case] mips: u32, #[case] expected: Vec<f32>) {
    let mut renderer = dummy_renderer();
    let mut hdr = radiance(&mut renderer);

    EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(mips)).unwrap();

    let draws = prefilter_draws(&renderer);
    assert_eq!(draws.len(), expected.len() * 6);
    for (mip, roughness) in expected.iter().enumerate() {
        let level: Vec<_> = draws[mip * 6..(mip + 1) * 6].to_vec();
        assert!(level.iter().all(|&(m, r)| m == mip as u32 && r == *roughness), "{:?}", level);
    }
}

#[test]
fn test_prefilter_levels_hold_their_own_pass() {
    let mut renderer = dummy_renderer();
    renderer.backend_mut().set_fill(|draw| {
        match draw.pipeline_label.as_deref() {
            Some("Prefilter Capture Pipeline") => {
                let roughness = draw.uniform::<MaterialUniformData>(2).map_or(-1.0, |p| p.values[0].x);
                [roughness, 0.0, 0.0, 1.0]
            }
            _ => [0.0, 0.0, 0.0, 1.0],
        }
    });
    let mut hdr = radiance(&mut renderer);

    let mut maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();

    for mip in 0..5 {
        for face in CubeFace::ALL {
            let texels = maps.prefilter.read_face(renderer.backend_mut(), face, mip).unwrap();
            let expected = Vec3::new(mip as f32 / 4.0, 0.0, 0.0);
            assert!(first_rgb(&texels).abs_diff_eq(expected, 1e-6), "mip {} {:?}", mip, face);
        }
    }
    maps.destroy(renderer.backend_mut());
}

#[test]
fn test_apply_binds_maps_on_fixed_units() {
    let mut renderer = dummy_renderer();
    let mut hdr = radiance(&mut renderer);
    let mut maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();
    let mut cubes = CubeScene::new(&mut renderer);

    let material = cubes.scene.material_mut(cubes.material).unwrap();
    maps.apply_to(renderer.backend_mut(), material).unwrap();

    let material = cubes.scene.material(cubes.material).unwrap();
    assert!(matches!(
        material.get("EnvIrradiance"),
        Some(MaterialParam::TextureCube { unit: 0, .. })
    ));
    assert!(matches!(
        material.get("EnvPrefilter"),
        Some(MaterialParam::TextureCube { unit: 1, .. })
    ));
    assert!(matches!(material.get("BRDFLUT"), Some(MaterialParam::Texture { unit: 2, .. })));

    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();
    assert_eq!(stats.binding_errors, 0);
    maps.destroy(renderer.backend_mut());
}

#[test]
fn test_repeated_bakes_release_capture_shaders() {
    let mut renderer = dummy_renderer();
    let mut hdr = radiance(&mut renderer);
    let pipelines = renderer.pipeline_count();
    let layouts = renderer.backend().live_bind_group_layouts();

    let mut counts = Vec::new();
    for _ in 0..3 {
        let maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();
        maps.destroy(renderer.backend_mut());
        counts.push((
            renderer.pipeline_count(),
            renderer.backend().live_pipelines(),
            renderer.backend().live_bind_group_layouts(),
        ));
    }

    assert_eq!(counts, vec![(pipelines, pipelines, layouts); 3]);
}

#[test]
fn test_failed_bake_frees_allocated_maps() {
    let mut renderer = dummy_renderer();
    let mut hdr = radiance(&mut renderer);
    // Leaves the renderer's capture target allocated
    let maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();
    maps.destroy(renderer.backend_mut());
    let textures = renderer.backend().live_textures();
    let layouts = renderer.backend().live_bind_group_layouts();

    let config = IblConfig {
        brdf_lut_size: 0,
        ..small_config(5)
    };
    let result = EnvironmentMaps::bake(&mut renderer, &mut hdr, &config);

    assert!(matches!(result, Err(RenderError::InvalidDimensions { .. })));
    assert_eq!(renderer.backend().live_textures(), textures);
    assert_eq!(renderer.backend().live_bind_group_layouts(), layouts);
}

#[test]
fn test_backgrounds_share_one_shader() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let sky_mesh = renderer.upload_mesh(&Mesh::cube()).unwrap();
    let mut sky = CubeTexture::new("Sky");
    sky.default_initialize(renderer.backend_mut(), 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, false)
        .unwrap();
    let sky = sky.binding(renderer.backend_mut()).unwrap();

    let first = Background::new(&mut renderer, &mut cubes.scene, sky_mesh, sky).unwrap();
    let layouts = renderer.backend().live_bind_group_layouts();
    let second = Background::new(&mut renderer, &mut cubes.scene, sky_mesh, sky).unwrap();
    assert_eq!(renderer.backend().live_bind_group_layouts(), layouts);

    renderer.push_render(&cubes.scene, first.node()).unwrap();
    renderer.push_render(&cubes.scene, second.node()).unwrap();
    renderer.render_pushed_commands(&cubes.scene).unwrap();
    let draws = &renderer.backend().passes()[0].draws;
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].pipeline, draws[1].pipeline);
    assert_eq!(renderer.pipeline_count(), 1);
}

#[test]
fn test_background_sits_behind_scene() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let mut hdr = radiance(&mut renderer);
    let mut maps = EnvironmentMaps::bake(&mut renderer, &mut hdr, &small_config(5)).unwrap();
    renderer.backend_mut().clear_log();
    let sky_mesh = renderer.upload_mesh(&Mesh::cube()).unwrap();
    let sky = maps.environment.binding(renderer.backend_mut()).unwrap();

    let background = Background::new(&mut renderer, &mut cubes.scene, sky_mesh, sky).unwrap();
    background.set_lod_level(&mut cubes.scene, 2.0).unwrap();
    background.set_exposure(&mut cubes.scene, 0.5).unwrap();

    let material = cubes.scene.material(background.material()).unwrap();
    assert_eq!(material.depth_compare, CompareFunction::LessEqual);
    assert_eq!(material.get("lod_level"), Some(&MaterialParam::Float(2.0)));
    assert_eq!(material.get("exposure"), Some(&MaterialParam::Float(0.5)));

    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    renderer.push_render(&cubes.scene, background.node()).unwrap();
    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(stats.draws, 2);
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.binding_errors, 0);
    let draws = &renderer.backend().passes()[0].draws;
    assert_eq!(draws[1].pipeline_label.as_deref(), Some("Background Pipeline"));
    assert_eq!(draws[1].textures, vec![sky.view]);
}
