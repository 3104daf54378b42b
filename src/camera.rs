//! Perspective camera, projection and orbit controls.
//!
//! [`OrbitControls`] keeps the camera on a sphere around a target point. Dragging
//! with the left button rotates, the wheel dollies and the right (or middle)
//! button pans. Input is queued by [`OrbitControls::handle_window_events`] and
//! applied once per frame in [`OrbitControls::update`], optionally damped.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, Zero, perspective};
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};

use crate::config::{CameraConfig, OrbitConfig};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

// Keeps the polar angle away from the poles where the view matrix degenerates.
const POLAR_EPSILON: f32 = 1e-6;

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>, T: Into<Point3<f32>>>(position: P, target: T) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }
}

#[derive(Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// A zero-sized viewport (minimised window, hidden canvas) keeps the last aspect.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view: [[f32; 4]; 4],
    view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view: Matrix4::identity().into(),
            view_proj: Matrix4::identity().into(),
            inv_view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        let view = camera.view_matrix();
        let view_proj = projection.calc_matrix() * view;
        self.view = view.into();
        self.view_proj = view_proj.into();
        self.inv_view_proj = view_proj.invert().unwrap_or(Matrix4::identity()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: OrbitControls,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

pub fn camera_from_config(config: &CameraConfig) -> Camera {
    Camera::new(config.position, config.look_at)
}

/// Radius, azimuth (around +Y, from +Z towards +X) and polar angle (from +Y).
#[derive(Clone, Copy, Debug, PartialEq)]
struct Spherical {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl Spherical {
    fn from_offset(offset: Vector3<f32>) -> Self {
        let radius = offset.magnitude();
        if radius == 0.0 {
            return Self {
                radius,
                theta: 0.0,
                phi: 0.0,
            };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vector3<f32> {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vector3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Drag {
    Rotate,
    Pan,
}

#[derive(Debug)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    settings: OrbitConfig,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_pixels: (f32, f32),
    pan_offset: Vector3<f32>,
    drag: Option<Drag>,
    cursor: Option<PhysicalPosition<f64>>,
    viewport_height: f32,
}

impl OrbitControls {
    pub fn new(settings: &OrbitConfig, viewport_height: u32) -> Self {
        Self {
            target: settings.target.into(),
            settings: settings.clone(),
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_pixels: (0.0, 0.0),
            pan_offset: Vector3::zero(),
            drag: None,
            cursor: None,
            viewport_height: viewport_height.max(1) as f32,
        }
    }

    pub fn resize(&mut self, height: u32) {
        if height > 0 {
            self.viewport_height = height as f32;
        }
    }

    /// Orbit horizontally by `angle` radians (positive moves the camera left).
    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    /// Orbit vertically by `angle` radians (positive moves the camera up).
    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    pub fn dolly_in(&mut self, steps: f32) {
        self.scale *= self.zoom_scale().powf(steps);
    }

    pub fn dolly_out(&mut self, steps: f32) {
        self.scale /= self.zoom_scale().powf(steps);
    }

    /// Queue a screen-space pan of `dx`, `dy` pixels.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.pan_pixels.0 += dx * self.settings.pan_speed;
        self.pan_pixels.1 += dy * self.settings.pan_speed;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.settings.zoom_speed)
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.drag = match (state, button) {
                    (ElementState::Pressed, MouseButton::Left) => Some(Drag::Rotate),
                    (ElementState::Pressed, MouseButton::Right | MouseButton::Middle) => {
                        Some(Drag::Pan)
                    }
                    (ElementState::Released, _) => None,
                    _ => self.drag,
                };
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (Some(drag), Some(last)) = (self.drag, self.cursor) {
                    let dx = (position.x - last.x) as f32;
                    let dy = (position.y - last.y) as f32;
                    match drag {
                        Drag::Rotate => {
                            let full_turn = 2.0 * std::f32::consts::PI * self.settings.rotate_speed;
                            self.rotate_left(full_turn * dx / self.viewport_height);
                            self.rotate_up(full_turn * dy / self.viewport_height);
                        }
                        Drag::Pan => self.pan(dx, dy),
                    }
                }
                self.cursor = Some(*position);
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.drag = None;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    // A line is roughly 100 pixels on most platforms
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / 100.0) as f32,
                };
                if scroll > 0.0 {
                    self.dolly_in(scroll);
                } else if scroll < 0.0 {
                    self.dolly_out(-scroll);
                }
            }
            _ => (),
        }
    }

    /// Applies pending input to `camera` and keeps it inside the configured limits.
    pub fn update(&mut self, camera: &mut Camera, fovy: Rad<f32>) {
        let offset = camera.position - self.target;
        self.apply_pan_pixels(camera, offset.magnitude(), fovy);

        let mut spherical = Spherical::from_offset(offset);
        let factor = if self.settings.enable_damping {
            self.settings.damping_factor
        } else {
            1.0
        };
        spherical.theta += self.theta_delta * factor;
        spherical.phi += self.phi_delta * factor;
        spherical.phi = spherical
            .phi
            .clamp(self.settings.min_polar_angle, self.settings.max_polar_angle)
            .clamp(POLAR_EPSILON, std::f32::consts::PI - POLAR_EPSILON);
        spherical.radius = (spherical.radius * self.scale)
            .clamp(self.settings.min_distance, self.settings.max_distance);
        self.target += self.pan_offset * factor;

        camera.target = self.target;
        camera.position = self.target + spherical.to_offset();

        if self.settings.enable_damping {
            let decay = 1.0 - self.settings.damping_factor;
            self.theta_delta *= decay;
            self.phi_delta *= decay;
            self.pan_offset *= decay;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;
    }

    fn apply_pan_pixels(&mut self, camera: &Camera, distance: f32, fovy: Rad<f32>) {
        let (dx, dy) = std::mem::take(&mut self.pan_pixels);
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        let forward = (camera.target - camera.position).normalize();
        let right = forward.cross(camera.up).normalize();
        let up = right.cross(forward);
        let target_distance = distance * (fovy.0 / 2.0).tan();
        let left = 2.0 * dx * target_distance / self.viewport_height;
        let upward = 2.0 * dy * target_distance / self.viewport_height;
        self.pan_offset += right * -left + up * upward;
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, MetricSpace};

    use super::*;

    fn setup(damping: bool) -> (Camera, OrbitControls) {
        let settings = OrbitConfig {
            enable_damping: damping,
            ..Default::default()
        };
        let camera = Camera::new((0.0, 0.0, 3.0), (0.0, 0.0, 0.0));
        (camera, OrbitControls::new(&settings, 600))
    }

    fn polar(camera: &Camera, target: Point3<f32>) -> f32 {
        Spherical::from_offset(camera.position - target).phi
    }

    #[test]
    fn spherical_round_trip_matches_offset() {
        let offset = Vector3::new(1.0, 2.0, -3.0);
        let back = Spherical::from_offset(offset).to_offset();
        assert!((back - offset).magnitude() < 1e-5);
    }

    #[test]
    fn first_update_clamps_the_polar_angle() {
        let (mut camera, mut controls) = setup(true);
        controls.update(&mut camera, Deg(75.0).into());
        let max = OrbitConfig::default().max_polar_angle;
        assert!((polar(&camera, controls.target) - max).abs() < 1e-4);
        assert!(camera.position.y > 0.0);
        assert_eq!(camera.target, Point3::new(0.0, 0.0, -0.2));
        // The radius from the target is preserved
        assert!((camera.position.distance(controls.target) - 3.2).abs() < 1e-4);
    }

    #[test]
    fn widest_valid_polar_range_stays_finite() {
        let settings = OrbitConfig {
            min_polar_angle: 0.0,
            max_polar_angle: std::f32::consts::PI,
            ..Default::default()
        };
        let mut config = crate::config::SceneConfig::default();
        config.controls = settings.clone();
        config.validate().unwrap();

        let mut camera = Camera::new((0.0, 0.0, 3.0), (0.0, 0.0, 0.0));
        let mut controls = OrbitControls::new(&settings, 600);
        for _ in 0..10 {
            controls.update(&mut camera, Deg(75.0).into());
        }
        let phi = polar(&camera, controls.target);
        assert!(phi > 0.0 && phi < std::f32::consts::PI);
        assert!(camera.position.x.is_finite() && camera.position.y.is_finite());
    }

    #[test]
    fn dolly_is_clamped_to_the_distance_range() {
        let (mut camera, mut controls) = setup(false);
        controls.dolly_out(100.0);
        controls.update(&mut camera, Deg(75.0).into());
        assert!((camera.position.distance(controls.target) - 10.0).abs() < 1e-4);

        controls.dolly_in(200.0);
        controls.update(&mut camera, Deg(75.0).into());
        assert!((camera.position.distance(controls.target) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn undamped_rotation_is_applied_once() {
        let (mut camera, mut controls) = setup(false);
        controls.update(&mut camera, Deg(75.0).into());
        let before = camera.position;
        controls.rotate_left(0.5);
        controls.update(&mut camera, Deg(75.0).into());
        let moved = camera.position;
        assert!(before.distance(moved) > 0.1);
        controls.update(&mut camera, Deg(75.0).into());
        assert!(moved.distance(camera.position) < 1e-5);
    }

    #[test]
    fn damped_rotation_decays() {
        let (mut camera, mut controls) = setup(true);
        controls.update(&mut camera, Deg(75.0).into());
        controls.rotate_left(1.0);
        let mut last_step = f32::MAX;
        let mut previous = camera.position;
        for _ in 0..20 {
            controls.update(&mut camera, Deg(75.0).into());
            let step = previous.distance(camera.position);
            assert!(step <= last_step + 1e-6);
            last_step = step;
            previous = camera.position;
        }
        assert!(controls.theta_delta.abs() < 1.0);
    }

    #[test]
    fn cannot_orbit_below_the_floor() {
        let (mut camera, mut controls) = setup(false);
        controls.rotate_up(-3.0);
        controls.update(&mut camera, Deg(75.0).into());
        let max = OrbitConfig::default().max_polar_angle;
        assert!(polar(&camera, controls.target) <= max + 1e-5);
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let (mut camera, mut controls) = setup(false);
        controls.update(&mut camera, Deg(75.0).into());
        let offset_before = camera.position - controls.target;
        controls.pan(100.0, 0.0);
        controls.update(&mut camera, Deg(75.0).into());
        // Dragging right moves the scene right, so the target moves left (-X)
        assert!(controls.target.x < 0.0);
        let offset_after = camera.position - controls.target;
        assert!((offset_after - offset_before).magnitude() < 1e-4);
    }

    #[test]
    fn zero_sized_resize_keeps_aspect() {
        let mut projection = Projection::new(800, 600, Deg(75.0), 0.1, 1000.0);
        projection.resize(0, 0);
        assert!((projection.aspect() - 800.0 / 600.0).abs() < 1e-6);
        projection.resize(1000, 500);
        assert_eq!(projection.aspect(), 2.0);
    }
}
