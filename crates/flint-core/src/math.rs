//! Transform math for the spinning quad.

use glam::{Mat4, Vec3};

use crate::uniforms::FrameUniforms;

/// Rotation speed of the model in degrees per second.
pub const SPIN_DEGREES_PER_SECOND: f32 = 90.0;
/// Vertical field of view in degrees.
pub const FOV_Y_DEGREES: f32 = 45.0;
/// Near clip plane distance.
pub const Z_NEAR: f32 = 0.1;
/// Far clip plane distance.
pub const Z_FAR: f32 = 10.0;
/// Camera position, looking at the origin with +Z up.
pub const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Width over height, falling back to 1 for a degenerate extent.
#[inline]
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Model matrix: rotation about +Z proportional to elapsed time.
#[inline]
pub fn spin_model(elapsed_secs: f32) -> Mat4 {
    Mat4::from_rotation_z((elapsed_secs * SPIN_DEGREES_PER_SECOND).to_radians())
}

/// View matrix for the fixed camera.
#[inline]
pub fn camera_view() -> Mat4 {
    Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z)
}

/// Perspective projection for Vulkan clip space (Y down, depth 0..1).
#[inline]
pub fn vulkan_perspective(aspect: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;
    proj
}

/// Uniforms for the spinning quad at a point in time.
pub fn spinning_quad(elapsed_secs: f32, width: u32, height: u32) -> FrameUniforms {
    FrameUniforms {
        model: spin_model(elapsed_secs),
        view: camera_view(),
        proj: vulkan_perspective(aspect_ratio(width, height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn model_rotates_quarter_turn_per_second() {
        let p = spin_model(1.0).transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn model_at_zero_is_identity() {
        assert!(spin_model(0.0).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let p = camera_view().transform_point3(EYE);
        assert_relative_eq!(p.length(), 0.0, epsilon = 1e-5);
        let target = camera_view().transform_point3(Vec3::ZERO);
        assert!(target.z < 0.0, "origin must be in front of the camera");
    }

    #[test]
    fn projection_flips_y() {
        let proj = vulkan_perspective(1.0);
        let clip = proj * glam::Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(clip.y < 0.0);
    }

    #[test]
    fn aspect_ratio_handles_degenerate_extent() {
        assert_relative_eq!(aspect_ratio(800, 600), 800.0 / 600.0);
        assert_relative_eq!(aspect_ratio(0, 600), 1.0);
        assert_relative_eq!(aspect_ratio(800, 0), 1.0);
    }

    #[test]
    fn quad_center_projects_inside_clip_volume() {
        let u = spinning_quad(0.3, 800, 600);
        let clip = u.proj * u.view * u.model * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
