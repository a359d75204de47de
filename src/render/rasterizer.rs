//! CPU rasterizer with a linear-depth z-buffer.

use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};

use super::{RenderEngine, RenderError, RenderOutput, Scene};
use crate::compositor::DepthMap;

/// Triangles whose doubled screen area is below this are skipped.
const MIN_AREA: f32 = 1e-8;

/// Barycentric tolerance for pixel centers lying on a shared edge.
const EDGE_EPSILON: f32 = 1e-6;

/// Built-in engine that rasterizes the scene on the CPU.
///
/// Shading is Lambertian: `base * (ambient + sum(intensity * max(0, n.l)))`.
/// Faces are lit from whichever side faces the camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRasterizer;

impl SoftwareRasterizer {
    pub fn new() -> Self {
        Self
    }
}

/// Color and depth targets with a depth test on write.
struct FrameBuffer {
    color: RgbaImage,
    depth: DepthMap,
}

impl FrameBuffer {
    fn new(width: u32, height: u32, background: [u8; 4]) -> Self {
        Self {
            color: RgbaImage::from_pixel(width, height, Rgba(background)),
            depth: DepthMap::new(width, height),
        }
    }

    /// True if `depth` is nearer than what is stored at (x, y).
    fn passes(&self, x: u32, y: u32, depth: f32) -> bool {
        let current = self.depth.get(x, y);
        current == DepthMap::NO_SURFACE || depth < current
    }

    fn write(&mut self, x: u32, y: u32, depth: f32, color: [u8; 4]) {
        self.depth.set(x, y, depth);
        self.color.put_pixel(x, y, Rgba(color));
    }
}

/// Triangle vertex after projection.
#[derive(Clone, Copy)]
struct ScreenVertex {
    pixel: Vec2,
    depth: f32,
    normal: Vec3,
    view: Vec3,
}

/// Twice the signed area of (a, b, p).
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

impl RenderEngine for SoftwareRasterizer {
    fn render(&self, scene: &Scene<'_>, width: u32, height: u32) -> Result<RenderOutput, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewport { width, height });
        }
        if scene.mesh.faces().is_empty() {
            return Err(RenderError::EmptyMesh);
        }

        let camera = &scene.camera;
        let world_to_camera = scene.camera_pose.inverse();
        let normals = scene.mesh.vertex_normals();

        let vertices: Vec<ScreenVertex> = scene
            .mesh
            .positions()
            .iter()
            .zip(&normals)
            .map(|(&position, &normal)| {
                let point = world_to_camera.transform_point3(position);
                let (u, v, depth) = camera.project(point);
                ScreenVertex {
                    pixel: Vec2::new(u, v),
                    depth,
                    normal: world_to_camera.transform_vector3(normal),
                    view: -point,
                }
            })
            .collect();

        // Lights are fixed in world space.
        let lights: Vec<(Vec3, Vec3)> = scene
            .lights
            .iter()
            .map(|light| {
                (
                    world_to_camera.transform_vector3(light.to_light()).normalize_or_zero(),
                    light.color * light.intensity,
                )
            })
            .collect();

        let base = scene.material.base_color;
        let alpha = (base.w.clamp(0.0, 1.0) * 255.0).round() as u8;
        let shade = |normal: Vec3| -> [u8; 4] {
            let mut irradiance = scene.ambient;
            for &(direction, radiance) in &lights {
                irradiance += radiance * normal.dot(direction).max(0.0);
            }
            let rgb = (base.truncate() * irradiance).clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
            [rgb.x.round() as u8, rgb.y.round() as u8, rgb.z.round() as u8, alpha]
        };

        let mut target = FrameBuffer::new(width, height, scene.background);
        let mut drawn = 0usize;
        let mut clipped = 0usize;

        for face in scene.mesh.faces() {
            let [a, b, c] = [
                vertices[face[0] as usize],
                vertices[face[1] as usize],
                vertices[face[2] as usize],
            ];

            if [a, b, c].iter().any(|v| v.depth < camera.znear || v.depth > camera.zfar) {
                clipped += 1;
                continue;
            }

            let area = edge(a.pixel, b.pixel, c.pixel);
            if area.abs() < MIN_AREA {
                continue;
            }

            let min = a.pixel.min(b.pixel).min(c.pixel).floor().max(Vec2::ZERO);
            let max = a.pixel.max(b.pixel).max(c.pixel).ceil();
            let x_end = (max.x.max(0.0) as u32).min(width);
            let y_end = (max.y.max(0.0) as u32).min(height);

            for y in min.y as u32..y_end {
                for x in min.x as u32..x_end {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let wa = edge(b.pixel, c.pixel, p) / area;
                    let wb = edge(c.pixel, a.pixel, p) / area;
                    let wc = edge(a.pixel, b.pixel, p) / area;
                    if wa < -EDGE_EPSILON || wb < -EDGE_EPSILON || wc < -EDGE_EPSILON {
                        continue;
                    }

                    // Perspective-correct interpolation through 1/depth.
                    let (ia, ib, ic) = (wa / a.depth, wb / b.depth, wc / c.depth);
                    let inv_depth = ia + ib + ic;
                    let depth = 1.0 / inv_depth;
                    if !target.passes(x, y, depth) {
                        continue;
                    }

                    let mut normal =
                        ((a.normal * ia + b.normal * ib + c.normal * ic) * depth).normalize_or_zero();
                    let view = (a.view * ia + b.view * ib + c.view * ic) * depth;
                    if normal.dot(view) < 0.0 {
                        normal = -normal;
                    }

                    target.write(x, y, depth, shade(normal));
                    drawn += 1;
                }
            }
        }

        log::debug!(
            "Rasterized {} triangles ({} clipped), {} fragments, {} pixels covered",
            scene.mesh.faces().len(),
            clipped,
            drawn,
            target.depth.covered_pixels()
        );

        Ok(RenderOutput {
            color: target.color,
            depth: target.depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::render::render_subject;

    /// Square of side 2 centered on the origin in the z = `z` plane.
    fn square(z: f32, first_index: u32) -> (Vec<Vec3>, Vec<[u32; 3]>) {
        let positions = vec![
            Vec3::new(-1.0, -1.0, z),
            Vec3::new(1.0, -1.0, z),
            Vec3::new(1.0, 1.0, z),
            Vec3::new(-1.0, 1.0, z),
        ];
        let i = first_index;
        (positions, vec![[i, i + 1, i + 2], [i, i + 2, i + 3]])
    }

    fn square_mesh() -> Mesh {
        let (positions, faces) = square(0.0, 0);
        Mesh::new(positions, faces).unwrap()
    }

    #[test]
    fn covered_pixels_are_opaque_with_depth() {
        let out = render_subject(&SoftwareRasterizer, &square_mesh(), 32, 32, [16.0, 16.0], [0.0, 0.0, 10.0], 50.0)
            .unwrap();

        // The square spans pixels 11..21 on both axes.
        let center = out.color.get_pixel(16, 16);
        assert_eq!(center[3], 255);
        assert!((out.depth.get(16, 16) - 10.0).abs() < 1e-4);

        assert_eq!(out.color.get_pixel(2, 2).0, [0, 0, 0, 0]);
        assert_eq!(out.depth.get(2, 2), DepthMap::NO_SURFACE);
        assert_eq!(out.depth.covered_pixels(), 100);
    }

    #[test]
    fn lit_clay_is_bright_and_warm() {
        let out = render_subject(&SoftwareRasterizer, &square_mesh(), 32, 32, [16.0, 16.0], [0.0, 0.0, 10.0], 50.0)
            .unwrap();
        let [r, g, b, _] = out.color.get_pixel(16, 16).0;
        assert_eq!((r, g), (255, 255));
        assert!(b <= g);
    }

    #[test]
    fn horizontal_translation_is_negated() {
        // A translation of -2 puts the camera at x = +2, centering a square that sits at x = +2.
        let (positions, faces) = square(0.0, 0);
        let shifted: Vec<Vec3> = positions.iter().map(|p| *p + Vec3::new(2.0, 0.0, 0.0)).collect();
        let mesh = Mesh::new(shifted, faces).unwrap();

        let out = render_subject(&SoftwareRasterizer, &mesh, 32, 32, [16.0, 16.0], [-2.0, 0.0, 10.0], 50.0).unwrap();
        assert_eq!(out.color.get_pixel(16, 16)[3], 255);

        let out = render_subject(&SoftwareRasterizer, &mesh, 32, 32, [16.0, 16.0], [2.0, 0.0, 10.0], 50.0).unwrap();
        assert_eq!(out.color.get_pixel(16, 16)[3], 0);
    }

    #[test]
    fn nearer_surface_wins_z_test() {
        let (mut positions, mut faces) = square(0.0, 0);
        let (front, front_faces) = square(2.0, 4);
        positions.extend(front);
        faces.extend(front_faces);
        let mesh = Mesh::new(positions, faces).unwrap();

        let out = render_subject(&SoftwareRasterizer, &mesh, 32, 32, [16.0, 16.0], [0.0, 0.0, 10.0], 50.0).unwrap();
        assert!((out.depth.get(16, 16) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn geometry_behind_camera_is_dropped() {
        let out = render_subject(&SoftwareRasterizer, &square_mesh(), 32, 32, [16.0, 16.0], [0.0, 0.0, -10.0], 50.0)
            .unwrap();
        assert_eq!(out.depth.covered_pixels(), 0);
        assert!(out.color.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn empty_viewport_is_an_error() {
        let err = render_subject(&SoftwareRasterizer, &square_mesh(), 0, 32, [0.0, 16.0], [0.0, 0.0, 10.0], 50.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidViewport { width: 0, height: 32 }));
    }
}
