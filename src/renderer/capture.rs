//! Rendering a scene subtree into the six faces of a cube texture

use glam::{Mat4, Vec3};

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::pixel::PixelType;
use crate::resources::{CubeFace, CubeTexture, GpuMesh, Material, RenderTarget};
use crate::scene::{CameraUniformData, NodeId, Scene};

use super::draw::{DrawItem, FrameSlot};
use super::{FlushStats, Renderer};

/// Progress through the faces of one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Pending(CubeFace),
    Complete,
}

impl CaptureState {
    fn start() -> Self {
        CaptureState::Pending(CubeFace::PositiveX)
    }

    fn advance(face: CubeFace) -> Self {
        face.next().map_or(CaptureState::Complete, CaptureState::Pending)
    }
}

/// 90 degree square projection with Y flipped.
///
/// Framebuffer rows are stored top-down while cube faces expect +v to run
/// along the face's up vector, so clip-space Y is negated. This reverses
/// triangle winding; capture draws use clockwise front faces.
pub fn capture_projection(near: f32, far: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
}

/// View matrix looking from `position` through `face`
pub fn capture_view(face: CubeFace, position: Vec3) -> Mat4 {
    Mat4::look_at_rh(position, position + face.direction(), face.up())
}

/// Roughness a prefilter pass uses for `mip` of a `mip_count` level chain
pub fn prefilter_roughness(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        return 0.0;
    }
    mip as f32 / (mip_count - 1) as f32
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Draw `node` and its descendants six times from `position`, once into
    /// each face of `cube` at `mip`, and submit.
    ///
    /// The draw queue is left untouched.
    pub fn render_to_cubemap(
        &mut self,
        scene: &Scene,
        node: NodeId,
        cube: &mut CubeTexture,
        position: Vec3,
        mip: u32,
    ) -> RenderResult<FlushStats> {
        if !cube.is_initialized() {
            log::error!("Cube capture into '{}': {}", cube.label(), RenderError::Uninitialized);
            return Err(RenderError::Uninitialized);
        }
        if mip >= cube.mip_levels() {
            let err = RenderError::InvalidMipLevel {
                level: mip,
                available: cube.mip_levels(),
            };
            log::error!("Cube capture into '{}': {}", cube.label(), err);
            return Err(err);
        }

        let mut drawables: Vec<(GpuMesh, &Material, Mat4)> = Vec::new();
        for id in scene.subtree(node)? {
            let entry = scene.node(id)?;
            if let (Some(mesh), Some(material)) = (entry.mesh, entry.material) {
                drawables.push((mesh, scene.material(material)?, scene.world_transform(id)?));
            }
        }
        if drawables.is_empty() {
            log::debug!("Cube capture of {:?} has nothing to draw", node);
            return Ok(FlushStats::default());
        }

        self.ensure_capture_frames()?;
        let size = cube.face_size(mip);
        let mut target = match self.capture_target.take() {
            Some(target) => target,
            None => RenderTarget::new(&mut self.backend, "Cube Capture", size, size, PixelType::HalfFloat, 1, true)?,
        };

        let result = self.capture_faces(&mut target, &drawables, cube, position, mip);
        let detached = target.detach_cube_face(&mut self.backend);
        self.capture_target = Some(target);
        let stats = result?;
        detached?;

        log::debug!(
            "Captured {} draws into '{}' mip {} ({}x{})",
            stats.draws,
            cube.label(),
            mip,
            size,
            size
        );
        Ok(stats)
    }

    fn capture_faces(
        &mut self,
        target: &mut RenderTarget,
        drawables: &[(GpuMesh, &Material, Mat4)],
        cube: &mut CubeTexture,
        position: Vec3,
        mip: u32,
    ) -> RenderResult<FlushStats> {
        let (near, far) = (self.config.capture_near, self.config.capture_far);
        let projection = capture_projection(near, far);
        let mut items = Vec::with_capacity(drawables.len() * CubeFace::ALL.len());

        let mut state = CaptureState::start();
        while let CaptureState::Pending(face) = state {
            target.attach_cube_face(&mut self.backend, cube, face, mip)?;
            let binding = target.binding();

            let frame = &self.capture_frames[face.index() as usize];
            let camera = CameraUniformData::new(capture_view(face, position), projection, position, near, far);
            self.backend
                .write_buffer(frame.camera_buffer, 0, bytemuck::bytes_of(&camera));

            for &(mesh, material, world) in drawables {
                items.push(DrawItem {
                    mesh: Some(mesh),
                    material,
                    world,
                    target: Some(binding.clone()),
                    frame: frame.bind_group,
                    front_face: FrontFace::Cw,
                    source: None,
                });
            }
            state = CaptureState::advance(face);
        }

        self.execute("Cube Capture", &items)
    }

    /// One camera buffer per face so every face's view survives until submit
    fn ensure_capture_frames(&mut self) -> RenderResult<()> {
        while self.capture_frames.len() < CubeFace::ALL.len() {
            let label = format!("Capture Camera {}", self.capture_frames.len());
            let slot = FrameSlot::new(&mut self.backend, self.layouts.frame, self.light_buffer, &label)?;
            self.capture_frames.push(slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_view_looks_along_face() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        for face in CubeFace::ALL {
            let camera = CameraUniformData::new(capture_view(face, position), Mat4::IDENTITY, position, 0.1, 10.0);
            assert!(camera.forward().abs_diff_eq(face.direction(), 1e-5), "{:?}", face);
        }
    }

    #[test]
    fn test_projection_flips_y() {
        let proj = capture_projection(0.1, 10.0);
        let above = proj * Vec4::new(0.0, 0.5, -1.0, 1.0);
        let right = proj * Vec4::new(0.5, 0.0, -1.0, 1.0);
        assert!(above.y / above.w < 0.0);
        assert!(right.x / right.w > 0.0);
        // 90 degree field of view: the frustum edge maps to the clip edge
        let edge = proj * Vec4::new(1.0, 0.0, -1.0, 1.0);
        assert!((edge.x / edge.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_prefilter_roughness_sweep() {
        let sweep: Vec<f32> = (0..5).map(|mip| prefilter_roughness(mip, 5)).collect();
        assert_eq!(sweep, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }

    #[test]
    fn test_state_visits_faces_in_order() {
        let mut state = CaptureState::start();
        let mut visited = Vec::new();
        while let CaptureState::Pending(face) = state {
            visited.push(face);
            state = CaptureState::advance(face);
        }
        assert_eq!(visited, CubeFace::ALL.to_vec());
        assert_eq!(state, CaptureState::Complete);
    }
}
