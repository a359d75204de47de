//! Fixed three-light rig.

use glam::{Mat3, Mat4, Vec3};

/// Light with parallel rays, oriented by a pose matrix.
///
/// Rays travel along the pose's -Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub pose: Mat4,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    /// Unit vector from a surface towards the light.
    pub fn to_light(&self) -> Vec3 {
        self.pose.z_axis.truncate().normalize_or_zero()
    }
}

/// Three white lights 30 degrees off the view axis, 120 degrees apart in azimuth.
pub fn raymond_lights() -> [DirectionalLight; 3] {
    let theta = std::f32::consts::PI / 6.0;
    let phis = [0.0, 2.0 / 3.0, 4.0 / 3.0].map(|k: f32| k * std::f32::consts::PI);

    phis.map(|phi| {
        let z = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()).normalize();
        let mut x = Vec3::new(-z.y, z.x, 0.0);
        if x.length() == 0.0 {
            x = Vec3::X;
        }
        let x = x.normalize();
        let y = z.cross(x);

        DirectionalLight {
            pose: Mat4::from_mat3(Mat3::from_cols(x, y, z)),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    })
}
