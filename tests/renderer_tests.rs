//! Deferred flushes, blits and cube captures recorded by the dummy backend.

mod common;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::{direction_color, dummy_renderer, first_rgb, solid_shader, target, CubeScene};
use radiance_engine::backend::{LoadOp, TextureViewDimension};
use radiance_engine::renderer::blit_shader_descriptor;
use radiance_engine::resources::pixel::{PixelLayout, PixelType};
use radiance_engine::resources::{CubeFace, CubeTexture, ShaderDescriptor, Texture2D, TextureSlot, VertexInput};
use radiance_engine::scene::{CameraUniformData, Light, Transform};
use radiance_engine::{FlushStats, RenderError};

#[test]
fn test_empty_flush_is_a_no_op() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    let output = target(&mut renderer, "Output", 16);
    let handle = output.color_handle(0).unwrap();
    let before = renderer.backend().texture_data(handle, 0, 0).unwrap().to_vec();
    renderer.push_light(Light::point(Vec3::ONE, Vec3::ONE, 1.0, 5.0), false);

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(stats, FlushStats::default());
    assert!(renderer.backend().passes().is_empty());
    assert_eq!(renderer.backend().submissions(), 0);
    assert_eq!(renderer.backend().texture_data(handle, 0, 0).unwrap(), &before[..]);
    assert_eq!(renderer.queued_lights(), 0);
}

#[test]
fn test_flush_drains_both_queues() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    renderer.push_light(Light::directional(Vec3::NEG_Y, Vec3::ONE, 2.0), true);
    renderer.push_light(Light::point(Vec3::ONE, Vec3::X, 1.0, 5.0), false);

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.lights, 2);
    assert_eq!(renderer.queued_draws(), 0);
    assert_eq!(renderer.queued_lights(), 0);

    let again = renderer.render_pushed_commands(&cubes.scene).unwrap();
    assert_eq!(again, FlushStats::default());
    assert_eq!(renderer.backend().draw_count(), 1);
}

#[test]
fn test_single_node_into_target() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    let output = target(&mut renderer, "Output", 512);
    renderer.set_target(Some(&output));
    renderer.push_render(&cubes.scene, cubes.node).unwrap();

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(stats.draws, 1);
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.binding_errors, 0);
    let passes = renderer.backend().passes();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].color_targets[0].texture, output.color_handle(0).unwrap());
    assert!(matches!(passes[0].load_ops[0], LoadOp::Clear(_)));
    let draw = &passes[0].draws[0];
    assert!(draw.indexed);
    assert_eq!(draw.element_count, 36);
    assert_eq!(renderer.backend().presented_frames(), 0);
}

#[test]
fn test_surface_flush_presents() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    renderer.push_render(&cubes.scene, cubes.node).unwrap();

    renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(renderer.backend().presented_frames(), 1);
    let pass = &renderer.backend().passes()[0];
    assert_eq!(pass.color_targets[0].texture, renderer.backend().backbuffer());
}

#[test]
fn test_draws_keep_push_order_across_targets() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let second = cubes.scene.add_node("Second", cubes.mesh, cubes.material).unwrap();
    let first_target = target(&mut renderer, "First", 16);
    let second_target = target(&mut renderer, "Second", 32);

    renderer.set_target(Some(&first_target));
    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    renderer.set_target(Some(&second_target));
    renderer.push_render(&cubes.scene, second).unwrap();
    renderer.set_target(Some(&first_target));
    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    renderer.push_render(&cubes.scene, second).unwrap();

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();
    assert_eq!(stats.draws, 4);
    assert_eq!(stats.passes, 3);

    let passes = renderer.backend().passes();
    let order: Vec<_> = passes.iter().map(|p| p.color_targets[0].texture).collect();
    let first_handle = first_target.color_handle(0).unwrap();
    let second_handle = second_target.color_handle(0).unwrap();
    assert_eq!(order, vec![first_handle, second_handle, first_handle]);
    assert!(matches!(passes[0].load_ops[0], LoadOp::Clear(_)));
    assert!(matches!(passes[1].load_ops[0], LoadOp::Clear(_)));
    assert!(matches!(passes[2].load_ops[0], LoadOp::Load));
    assert_eq!(passes[2].draws.len(), 2);
}

#[test]
fn test_push_uses_target_active_at_push_time() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    let output = target(&mut renderer, "Output", 16);
    renderer.set_target(Some(&output));
    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    renderer.set_target(None);

    renderer.render_pushed_commands(&cubes.scene).unwrap();

    let pass = &renderer.backend().passes()[0];
    assert_eq!(pass.color_targets[0].texture, output.color_handle(0).unwrap());
    assert_eq!(renderer.backend().presented_frames(), 0);
}

#[test]
fn test_attachment_mismatch_aborts_without_presenting() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let shader = renderer.create_shader(solid_shader("Two Outputs").with_color_outputs(2)).unwrap();
    let material = renderer.create_custom_material(&shader).unwrap();
    let material = cubes.scene.add_material(material);
    let node = cubes.scene.add_node("Mismatch", cubes.mesh, material).unwrap();
    renderer.push_render(&cubes.scene, node).unwrap();

    let result = renderer.render_pushed_commands(&cubes.scene);

    assert!(matches!(
        result,
        Err(RenderError::AttachmentMismatch { expected: 2, actual: 1, .. })
    ));
    assert_eq!(renderer.backend().presented_frames(), 0);
    assert_eq!(renderer.backend().draw_count(), 0);
    assert_eq!(renderer.queued_draws(), 0);
}

#[rstest]
#[case::unset(None)]
#[case::wrong_dimension(Some(TextureViewDimension::Cube))]
fn test_missing_texture_falls_back(#[case] bound: Option<TextureViewDimension>) {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let shader = renderer
        .create_shader(
            ShaderDescriptor::new("Textured", "// recorded").with_texture(TextureSlot::texture_2d("albedo")),
        )
        .unwrap();
    let mut material = renderer.create_custom_material(&shader).unwrap();
    let mut sky = CubeTexture::new("Sky");
    sky.default_initialize(renderer.backend_mut(), 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, false)
        .unwrap();
    if bound.is_some() {
        let binding = sky.binding(renderer.backend_mut()).unwrap();
        material.set_texture_cube("albedo", binding, 0);
    }
    let material = cubes.scene.add_material(material);
    let node = cubes.scene.add_node("Textured", cubes.mesh, material).unwrap();
    renderer.push_render(&cubes.scene, node).unwrap();

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(stats.draws, 1);
    assert_eq!(stats.binding_errors, 1);
    let draw = &renderer.backend().passes()[0].draws[0];
    assert_eq!(draw.textures.len(), 1);
}

#[test]
fn test_unit_collision_keeps_first_texture() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let shader = renderer
        .create_shader(
            ShaderDescriptor::new("Two Maps", "// recorded")
                .with_texture(TextureSlot::texture_2d("albedo"))
                .with_texture(TextureSlot::texture_2d("normal")),
        )
        .unwrap();
    let mut red = Texture2D::solid_color(renderer.backend_mut(), "Red", [255, 0, 0, 255]).unwrap();
    let mut blue = Texture2D::solid_color(renderer.backend_mut(), "Blue", [0, 0, 255, 255]).unwrap();
    let red_binding = red.binding(renderer.backend_mut()).unwrap();
    let blue_binding = blue.binding(renderer.backend_mut()).unwrap();
    let mut material = renderer.create_custom_material(&shader).unwrap();
    material.set_texture("albedo", red_binding, 3);
    material.set_texture("normal", blue_binding, 3);
    let material = cubes.scene.add_material(material);
    let node = cubes.scene.add_node("Collide", cubes.mesh, material).unwrap();
    renderer.push_render(&cubes.scene, node).unwrap();

    let stats = renderer.render_pushed_commands(&cubes.scene).unwrap();

    assert_eq!(stats.binding_errors, 1);
    let draw = &renderer.backend().passes()[0].draws[0];
    assert_eq!(draw.textures[0], red_binding.view);
    assert_ne!(draw.textures[1], blue_binding.view);
}

#[test]
fn test_blit_requires_fullscreen_shader() {
    let mut renderer = dummy_renderer();
    let material = renderer.create_material().unwrap();
    let output = target(&mut renderer, "Output", 8);

    let result = renderer.blit(None, Some(&output), &material);

    assert!(matches!(result, Err(RenderError::NotFullscreen(_))));
    assert!(renderer.backend().passes().is_empty());
}

#[test]
fn test_blit_copies_source_into_destination() {
    let mut renderer = dummy_renderer();
    let shader = renderer.create_shader(blit_shader_descriptor()).unwrap();
    assert_eq!(shader.vertex_input(), VertexInput::Fullscreen);
    let material = renderer.create_custom_material(&shader).unwrap();
    let mut source = Texture2D::solid_color(renderer.backend_mut(), "Source", [10, 20, 30, 255]).unwrap();
    let source_binding = source.binding(renderer.backend_mut()).unwrap();
    let output = target(&mut renderer, "Output", 8);

    let stats = renderer.blit(Some(source_binding), Some(&output), &material).unwrap();

    assert_eq!(stats, FlushStats { draws: 1, passes: 1, lights: 0, binding_errors: 0 });
    let pass = &renderer.backend().passes()[0];
    assert_eq!(pass.label.as_deref(), Some("Blit Pass"));
    assert_eq!(pass.color_targets[0].texture, output.color_handle(0).unwrap());
    assert!(!pass.draws[0].indexed);
    assert_eq!(pass.draws[0].element_count, 3);
    assert_eq!(pass.draws[0].textures, vec![source_binding.view]);
}

#[test]
fn test_capture_writes_each_face_along_its_direction() {
    let mut renderer = dummy_renderer();
    renderer.backend_mut().set_fill(|draw| {
        draw.uniform::<CameraUniformData>(0)
            .map(|camera| direction_color(camera.forward()).to_array())
            .unwrap_or([0.0; 4])
    });
    let cubes = CubeScene::new(&mut renderer);
    let mut cube = CubeTexture::new("Capture");
    cube.default_initialize(renderer.backend_mut(), 8, 8, PixelLayout::Rgb, PixelType::Float, false)
        .unwrap();

    let stats = renderer
        .render_to_cubemap(&cubes.scene, cubes.node, &mut cube, Vec3::new(0.0, 1.0, 0.0), 0)
        .unwrap();

    assert_eq!(stats.draws, 6);
    assert_eq!(stats.passes, 6);
    for face in CubeFace::ALL {
        let texel = first_rgb(&cube.read_face(renderer.backend_mut(), face, 0).unwrap());
        let expected = direction_color(face.direction()).truncate();
        assert!(texel.abs_diff_eq(expected, 1e-4), "{:?}: {} != {}", face, texel, expected);
    }
    let layers: Vec<u32> = renderer
        .backend()
        .passes()
        .iter()
        .map(|p| p.color_targets[0].array_layer)
        .collect();
    assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_capture_leaves_queue_and_target_alone() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    let output = target(&mut renderer, "Output", 16);
    renderer.set_target(Some(&output));
    renderer.push_render(&cubes.scene, cubes.node).unwrap();
    let mut cube = CubeTexture::new("Capture");
    cube.default_initialize(renderer.backend_mut(), 4, 4, PixelLayout::Rgba, PixelType::HalfFloat, true)
        .unwrap();

    renderer
        .render_to_cubemap(&cubes.scene, cubes.node, &mut cube, Vec3::ZERO, 1)
        .unwrap();

    assert_eq!(renderer.queued_draws(), 1);
    assert_eq!(renderer.target(), Some(&output.binding()));
    assert!(renderer
        .backend()
        .passes()
        .iter()
        .all(|p| p.color_targets[0].mip_level == 1));
}

#[test]
fn test_capture_rejects_bad_cubes() {
    let mut renderer = dummy_renderer();
    let cubes = CubeScene::new(&mut renderer);
    let mut empty = CubeTexture::new("Empty");
    assert!(matches!(
        renderer.render_to_cubemap(&cubes.scene, cubes.node, &mut empty, Vec3::ZERO, 0),
        Err(RenderError::Uninitialized)
    ));

    let mut cube = CubeTexture::new("Single");
    cube.default_initialize(renderer.backend_mut(), 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, false)
        .unwrap();
    assert!(matches!(
        renderer.render_to_cubemap(&cubes.scene, cubes.node, &mut cube, Vec3::ZERO, 1),
        Err(RenderError::InvalidMipLevel { level: 1, available: 1 })
    ));
    assert!(renderer.backend().passes().is_empty());
}

#[test]
fn test_capture_of_empty_group_draws_nothing() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let group = cubes.scene.add_group("Empty");
    let mut cube = CubeTexture::new("Capture");
    cube.default_initialize(renderer.backend_mut(), 4, 4, PixelLayout::Rgba, PixelType::UnsignedByte, false)
        .unwrap();

    let stats = renderer
        .render_to_cubemap(&cubes.scene, group, &mut cube, Vec3::ZERO, 0)
        .unwrap();

    assert_eq!(stats, FlushStats::default());
    assert_eq!(renderer.backend().submissions(), 0);
}

#[test]
fn test_child_draws_with_parent_transform() {
    let mut renderer = dummy_renderer();
    let mut cubes = CubeScene::new(&mut renderer);
    let child = cubes.scene.add_node("Child", cubes.mesh, cubes.material).unwrap();
    cubes.scene.node_mut(cubes.node).unwrap().transform = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
    cubes.scene.node_mut(child).unwrap().transform = Transform::from_position(Vec3::new(0.0, 3.0, 0.0));
    cubes.scene.attach(cubes.node, child).unwrap();
    renderer.push_render(&cubes.scene, cubes.node).unwrap();

    renderer.render_pushed_commands(&cubes.scene).unwrap();

    let draws = &renderer.backend().passes()[0].draws;
    assert_eq!(draws.len(), 2);
    let model = draws[1].uniform::<[Vec4; 4]>(1).unwrap();
    assert_eq!(model[3], Vec4::new(2.0, 3.0, 0.0, 1.0));
}
