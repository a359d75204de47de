//! Rendering of subject meshes into RGBA and depth layers.
//!
//! [`render_subject`] is the only entry point the rest of the crate uses. It
//! builds a [`Scene`] for one mesh and hands it to a [`RenderEngine`]; any
//! engine honoring that trait can be swapped in. [`SoftwareRasterizer`] is the
//! built-in CPU engine.

mod lights;
mod rasterizer;

use glam::{Mat4, Vec3, Vec4};
use image::RgbaImage;
use thiserror::Error;

use crate::compositor::DepthMap;
use crate::mesh::Mesh;

pub use lights::{raymond_lights, DirectionalLight};
pub use rasterizer::SoftwareRasterizer;

/// Errors that can occur while rendering a subject.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Offscreen render context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("Invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },
    #[error("Mesh has no triangles")]
    EmptyMesh,
    #[error("Engine produced {found:?} output for a {expected:?} viewport")]
    OutputSize { expected: (u32, u32), found: (u32, u32) },
}

/// Surface material of a rendered mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Linear RGBA base color.
    pub base_color: Vec4,
    pub metallic: f32,
}

impl Material {
    /// Off-white matte material that renders every subject as uniform clay.
    pub fn clay() -> Self {
        Self {
            base_color: Vec4::new(1.0, 1.0, 0.9, 1.0),
            metallic: 0.0,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::clay()
    }
}

/// Pinhole camera given by focal lengths and principal point in pixels.
///
/// Looks down its local -Z axis with +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntrinsicsCamera {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl IntrinsicsCamera {
    pub const DEFAULT_ZNEAR: f32 = 0.05;
    pub const DEFAULT_ZFAR: f32 = 100.0;

    pub fn new(focal_length: f32, center: [f32; 2]) -> Self {
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: center[0],
            cy: center[1],
            znear: Self::DEFAULT_ZNEAR,
            zfar: Self::DEFAULT_ZFAR,
        }
    }

    /// Project a camera-space point to pixel coordinates and its distance along the view axis.
    pub fn project(&self, point: Vec3) -> (f32, f32, f32) {
        let depth = -point.z;
        let u = self.cx + self.fx * point.x / depth;
        let v = self.cy - self.fy * point.y / depth;
        (u, v, depth)
    }
}

/// Everything an engine needs to draw one subject.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    pub mesh: &'a Mesh,
    pub material: Material,
    pub camera: IntrinsicsCamera,
    /// Camera-to-world transform.
    pub camera_pose: Mat4,
    pub lights: Vec<DirectionalLight>,
    pub ambient: Vec3,
    /// RGBA written where nothing is drawn.
    pub background: [u8; 4],
}

/// Color and depth produced by one render call.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Alpha is 0 wherever the mesh is absent.
    pub color: RgbaImage,
    /// [`DepthMap::NO_SURFACE`] wherever the mesh is absent.
    pub depth: DepthMap,
}

/// An offscreen rendering engine.
pub trait RenderEngine {
    /// Render `scene` into a `width` x `height` color and depth buffer.
    fn render(&self, scene: &Scene<'_>, width: u32, height: u32) -> Result<RenderOutput, RenderError>;
}

/// Ambient light level of the overlay scene.
const AMBIENT: f32 = 0.3;

/// Render one subject mesh at the background's resolution.
///
/// The x component of `camera_translation` is negated before building the
/// camera pose; the fitted parameters use the opposite horizontal convention.
pub fn render_subject(
    engine: &dyn RenderEngine,
    mesh: &Mesh,
    width: u32,
    height: u32,
    camera_center: [f32; 2],
    camera_translation: [f32; 3],
    focal_length: f32,
) -> Result<RenderOutput, RenderError> {
    if mesh.faces().is_empty() {
        return Err(RenderError::EmptyMesh);
    }

    let [tx, ty, tz] = camera_translation;
    let scene = Scene {
        mesh,
        material: Material::clay(),
        camera: IntrinsicsCamera::new(focal_length, camera_center),
        camera_pose: Mat4::from_translation(Vec3::new(-tx, ty, tz)),
        lights: raymond_lights().to_vec(),
        ambient: Vec3::splat(AMBIENT),
        background: [0, 0, 0, 0],
    };

    let output = engine.render(&scene, width, height)?;

    let expected = (width, height);
    for found in [output.color.dimensions(), output.depth.dimensions()] {
        if found != expected {
            return Err(RenderError::OutputSize { expected, found });
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Engine that always fails to get a context.
    struct Headless;

    impl RenderEngine for Headless {
        fn render(&self, _: &Scene<'_>, _: u32, _: u32) -> Result<RenderOutput, RenderError> {
            Err(RenderError::ContextUnavailable("no display".into()))
        }
    }

    /// Engine that ignores the requested size.
    struct FixedSize;

    impl RenderEngine for FixedSize {
        fn render(&self, _: &Scene<'_>, _: u32, _: u32) -> Result<RenderOutput, RenderError> {
            Ok(RenderOutput {
                color: RgbaImage::new(2, 2),
                depth: DepthMap::new(2, 2),
            })
        }
    }

    /// Engine that records the scene it was given.
    struct Recording(std::cell::RefCell<Option<(Mat4, Material, usize)>>);

    impl RenderEngine for Recording {
        fn render(&self, scene: &Scene<'_>, width: u32, height: u32) -> Result<RenderOutput, RenderError> {
            *self.0.borrow_mut() = Some((scene.camera_pose, scene.material, scene.lights.len()));
            Ok(RenderOutput {
                color: RgbaImage::new(width, height),
                depth: DepthMap::new(width, height),
            })
        }
    }

    fn triangle() -> Mesh {
        Mesh::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn projection_follows_intrinsics() {
        let camera = IntrinsicsCamera::new(100.0, [50.0, 40.0]);
        let (u, v, d) = camera.project(Vec3::new(1.0, 1.0, -10.0));
        assert!((u - 60.0).abs() < 1e-5);
        assert!((v - 30.0).abs() < 1e-5);
        assert!((d - 10.0).abs() < 1e-6);
    }

    #[test]
    fn adapter_flips_horizontal_translation() {
        let engine = Recording(Default::default());
        render_subject(&engine, &triangle(), 8, 6, [4.0, 3.0], [0.5, -0.2, 12.0], 5000.0).unwrap();
        let recorded = *engine.0.borrow();
        let (pose, material, lights) = recorded.unwrap();
        assert_eq!(pose.w_axis.truncate(), Vec3::new(-0.5, -0.2, 12.0));
        assert_eq!(material, Material::clay());
        assert_eq!(lights, 3);
    }

    #[test]
    fn context_failure_propagates() {
        let err = render_subject(&Headless, &triangle(), 8, 6, [4.0, 3.0], [0.0, 0.0, 5.0], 500.0).unwrap_err();
        assert!(matches!(err, RenderError::ContextUnavailable(_)));
    }

    #[test]
    fn wrong_output_size_is_rejected() {
        let err = render_subject(&FixedSize, &triangle(), 8, 6, [4.0, 3.0], [0.0, 0.0, 5.0], 500.0).unwrap_err();
        assert!(matches!(
            err,
            RenderError::OutputSize { expected: (8, 6), found: (2, 2) }
        ));
    }

    #[test]
    fn clay_material_is_opaque_off_white() {
        let clay = Material::clay();
        assert_eq!(clay.base_color, Vec4::new(1.0, 1.0, 0.9, 1.0));
        assert_eq!(clay.metallic, 0.0);
    }
}
