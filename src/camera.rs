use crate::constants::{CAMERA_FOVY, CAMERA_Z};
use glam::{Mat4, Vec3};

/// Simple right-handed camera with perspective projection, orbiting the
/// origin on the XZ plane.
#[derive(Clone, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    pub fovy_radians: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, CAMERA_Z),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect: 1.0,
            fovy_radians: CAMERA_FOVY,
            znear: 0.1,
            zfar: 100.0,
        }
    }
}

impl Camera {
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Place the eye at `angle` radians around the Y axis, keeping distance.
    pub fn orbit(&mut self, angle: f32, elevation: f32) {
        let r = CAMERA_Z;
        self.eye = Vec3::new(r * angle.sin(), elevation, r * angle.cos());
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy_radians, self.aspect, self.znear, self.zfar)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_keeps_distance_from_target() {
        let mut cam = Camera::default();
        cam.orbit(1.3, 0.0);
        assert!((cam.eye.length() - CAMERA_Z).abs() < 1e-4);
    }

    #[test]
    fn origin_projects_to_screen_centre() {
        let mut cam = Camera::default();
        cam.set_viewport(1920, 1080);
        let clip = cam.view_proj() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
    }
}
