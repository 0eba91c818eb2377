use glam::{EulerRot, Mat4, Quat};
use std::f32::consts::FRAC_PI_2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

pub const DEFAULT_FOV_DEG: f32 = 90.0;
pub const FOV_RANGE_DEG: (f32, f32) = (10.0, 90.0);
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;
/// Radians per pixel of mouse drag.
const ROTATE_SPEED: f64 = 0.002;
/// Degrees of field of view per wheel line.
const ZOOM_STEP_DEG: f32 = 5.0;

/// Look-around camera fixed at the centre of the panorama sphere.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Rotation about +y, radians.
    pub yaw: f32,
    /// Rotation about the camera's x axis, radians, within ±π/2.
    pub pitch: f32,
    pub fov_deg: f32,
    pub aspect: f32,
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov_deg: DEFAULT_FOV_DEG,
            aspect,
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Rotation-only view matrix; the camera never leaves the origin.
    pub fn view(&self) -> Mat4 {
        Mat4::from_quat(self.orientation().inverse())
    }

    /// glam's `perspective_rh` already targets wgpu's `[0, 1]` depth range.
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect, NEAR, FAR)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    pub fn rotate(&mut self, dx: f64, dy: f64) {
        self.yaw += (dx * ROTATE_SPEED) as f32;
        self.pitch = (self.pitch + (dy * ROTATE_SPEED) as f32).clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    /// Positive `lines` (wheel up) narrows the field of view.
    pub fn zoom(&mut self, lines: f32) {
        let (min, max) = FOV_RANGE_DEG;
        self.fov_deg = (self.fov_deg - lines * ZOOM_STEP_DEG).clamp(min, max);
    }
}

#[derive(Debug, Default)]
pub struct CameraController {
    mouse_down: bool,
    last_mouse: Option<(f64, f64)>,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles window events and updates the camera.
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut Camera) {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                if *button == MouseButton::Left {
                    self.mouse_down = *state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor((position.x, position.y), camera);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
                camera.zoom(lines);
            }
            _ => {}
        }
    }

    /// Drags the view while the left mouse button is held.
    fn handle_cursor(&mut self, xy: (f64, f64), camera: &mut Camera) {
        if let Some(last) = self.last_mouse {
            if self.mouse_down {
                camera.rotate(xy.0 - last.0, xy.1 - last.1);
            }
        }
        self.last_mouse = Some(xy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn pitch_is_clamped() {
        let mut cam = Camera::new(1.0);
        cam.rotate(0.0, 10_000.0);
        assert_eq!(cam.pitch, FRAC_PI_2);
        cam.rotate(0.0, -100_000.0);
        assert_eq!(cam.pitch, -FRAC_PI_2);
    }

    #[test]
    fn yaw_is_unbounded() {
        let mut cam = Camera::new(1.0);
        cam.rotate(5000.0, 0.0);
        assert!((cam.yaw - 10.0).abs() < 1e-5);
    }

    #[test]
    fn fov_stays_in_range() {
        let mut cam = Camera::new(1.0);
        cam.zoom(-3.0);
        assert_eq!(cam.fov_deg, 90.0);
        cam.zoom(100.0);
        assert_eq!(cam.fov_deg, 10.0);
        cam.zoom(-1.0);
        assert_eq!(cam.fov_deg, 15.0);
    }

    #[test]
    fn default_view_looks_down_negative_z() {
        let cam = Camera::new(1.0);
        let clip = cam.view_proj() * Vec3::new(0.0, 0.0, -500.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
