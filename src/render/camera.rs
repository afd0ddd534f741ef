use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

const MIN_DISTANCE: f32 = 0.05;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
/// Vertical field of view in degrees.
pub const FOV_Y_DEG: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub zoom_enabled: bool,
    pub pan_enabled: bool,
    /// Radians of orbit per dragged pixel.
    pub rotate_speed: f32,
    /// Distance factor per wheel line.
    pub zoom_speed: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            zoom_enabled: true,
            pan_enabled: false,
            rotate_speed: 0.005,
            zoom_speed: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrbitPose {
    target: [f32; 3],
    distance: f32,
    yaw: f32,
    pitch: f32,
}

/// Orbit camera around a target point. `yaw`/`pitch` describe the view
/// direction from the eye toward the target.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub target: [f32; 3],
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    config: ControlsConfig,
    home: OrbitPose,
    min_distance: f32,
    max_distance: f32,
}

impl OrbitControls {
    pub fn new(target: [f32; 3], distance: f32, yaw: f32, pitch: f32, config: ControlsConfig) -> Self {
        let distance = distance.max(MIN_DISTANCE);
        let pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        Self {
            target,
            distance,
            yaw,
            pitch,
            config,
            home: OrbitPose {
                target,
                distance,
                yaw,
                pitch,
            },
            min_distance: MIN_DISTANCE,
            max_distance: distance * 20.0,
        }
    }

    /// Frames a box so the whole model is visible from a three-quarter view
    /// slightly above it.
    pub fn from_bounds(center: [f32; 3], extent: [f32; 3], config: ControlsConfig) -> Self {
        let distance = framing_distance(extent);
        let (yaw, pitch) = forward_to_yaw_pitch([-1.0, -0.4, -1.0]);
        let mut controls = Self::new(center, distance, yaw, pitch, config);
        controls.min_distance = (distance * 0.1).max(MIN_DISTANCE);
        controls
    }

    /// Re-targets onto new bounds keeping the current viewing angle; the
    /// result becomes the new home pose.
    pub fn frame_bounds_preserve_orientation(&mut self, center: [f32; 3], extent: [f32; 3]) {
        let distance = framing_distance(extent);
        self.target = center;
        self.distance = distance;
        self.min_distance = (distance * 0.1).max(MIN_DISTANCE);
        self.max_distance = distance * 20.0;
        self.home = self.pose();
    }

    pub fn config(&self) -> ControlsConfig {
        self.config
    }

    fn pose(&self) -> OrbitPose {
        OrbitPose {
            target: self.target,
            distance: self.distance,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    pub fn basis(&self) -> ([f32; 3], [f32; 3], [f32; 3]) {
        camera_basis(self.yaw, self.pitch)
    }

    pub fn eye(&self) -> Vec3 {
        let (forward, _, _) = self.basis();
        Vec3::from(self.target) - Vec3::from(forward) * self.distance
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::from(self.target), Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let near = (self.distance * 0.01).max(0.001);
        let far = self.distance * 100.0 + 10.0;
        Mat4::perspective_rh(FOV_Y_DEG.to_radians(), aspect.max(1e-3), near, far)
    }

    /// Rotates around the target by a pointer drag in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.config.rotate_speed;
        self.pitch -= dy * self.config.rotate_speed;
        wrap_angles(&mut self.yaw, &mut self.pitch);
    }

    /// Moves toward (positive lines) or away from the target. Does nothing
    /// when zoom is disabled.
    pub fn zoom(&mut self, lines: f32) -> bool {
        if !self.config.zoom_enabled || lines == 0.0 || !lines.is_finite() {
            return false;
        }
        let scale = self.config.zoom_speed.max(1.0001).powf(-lines);
        self.distance = (self.distance * scale).clamp(self.min_distance, self.max_distance);
        true
    }

    /// Slides the target in the view plane by a pointer drag in pixels.
    /// Does nothing when panning is disabled.
    pub fn pan(&mut self, dx: f32, dy: f32, viewport_height: f32) -> bool {
        if !self.config.pan_enabled {
            return false;
        }
        let (_, right, up) = self.basis();
        let world_per_pixel = 2.0 * self.distance * (FOV_Y_DEG.to_radians() * 0.5).tan()
            / viewport_height.max(1.0);
        for axis in 0..3 {
            self.target[axis] += (-right[axis] * dx + up[axis] * dy) * world_per_pixel;
        }
        true
    }

    pub fn reset(&mut self) {
        let home = self.home;
        self.target = home.target;
        self.distance = home.distance;
        self.yaw = home.yaw;
        self.pitch = home.pitch;
    }
}

fn framing_distance(extent: [f32; 3]) -> f32 {
    let radius = extent[0].max(extent[1]).max(extent[2]);
    if radius > 0.0 && radius.is_finite() {
        radius * 3.0
    } else {
        3.0
    }
}

fn forward_to_yaw_pitch(forward: [f32; 3]) -> (f32, f32) {
    let len = length(forward).max(1e-6);
    let nx = forward[0] / len;
    let ny = forward[1] / len;
    let nz = forward[2] / len;
    let yaw = nz.atan2(nx);
    let pitch = ny.asin();
    (yaw, pitch)
}

fn camera_basis(yaw: f32, pitch: f32) -> ([f32; 3], [f32; 3], [f32; 3]) {
    let cos_pitch = pitch.cos();
    let forward = [yaw.cos() * cos_pitch, pitch.sin(), yaw.sin() * cos_pitch];
    let right = [-yaw.sin(), 0.0, yaw.cos()];
    let up = normalize(cross(right, forward));
    (forward, right, up)
}

fn wrap_angles(yaw: &mut f32, pitch: &mut f32) {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if yaw.is_finite() {
        *yaw = (*yaw + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
    if pitch.is_finite() {
        *pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }
}

fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = length(v);
    if len > 1e-6 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlsConfig, OrbitControls, PITCH_LIMIT};

    fn locked() -> ControlsConfig {
        ControlsConfig {
            zoom_enabled: false,
            pan_enabled: false,
            ..ControlsConfig::default()
        }
    }

    #[test]
    fn from_bounds_produces_finite_state() {
        let controls =
            OrbitControls::from_bounds([1.0, 2.0, 3.0], [4.0, 5.0, 6.0], ControlsConfig::default());
        assert!(controls.eye().is_finite());
        assert!(controls.yaw.is_finite());
        assert!(controls.pitch.is_finite());
        assert!(controls.pitch < 0.0, "camera should look down at the model");
    }

    #[test]
    fn eye_looks_at_target() {
        let controls = OrbitControls::new([0.0, 1.0, 0.0], 4.0, 0.3, -0.2, ControlsConfig::default());
        let eye = controls.eye();
        assert!((eye.distance(glam::Vec3::new(0.0, 1.0, 0.0)) - 4.0).abs() < 1e-4);
        let view = controls.view_matrix().transform_point3(glam::Vec3::new(0.0, 1.0, 0.0));
        assert!(view.x.abs() < 1e-4 && view.y.abs() < 1e-4);
        assert!((view.z + 4.0).abs() < 1e-4);
    }

    #[test]
    fn orbit_keeps_distance_and_clamps_pitch() {
        let mut controls = OrbitControls::new([0.0; 3], 5.0, 0.0, 0.0, ControlsConfig::default());
        controls.orbit(120.0, -100_000.0);
        assert!((controls.eye().length() - 5.0).abs() < 1e-3);
        assert!((controls.pitch - PITCH_LIMIT).abs() < 1e-6);
    }

    #[test]
    fn zoom_respects_config() {
        let mut enabled = OrbitControls::new([0.0; 3], 5.0, 0.0, 0.0, ControlsConfig::default());
        assert!(enabled.zoom(1.0));
        assert!(enabled.distance < 5.0);

        let mut disabled = OrbitControls::new([0.0; 3], 5.0, 0.0, 0.0, locked());
        assert!(!disabled.zoom(3.0));
        assert_eq!(disabled.distance, 5.0);
    }

    #[test]
    fn pan_disabled_is_a_no_op() {
        let mut controls = OrbitControls::new([0.0; 3], 5.0, 0.0, 0.0, locked());
        assert!(!controls.pan(40.0, 10.0, 720.0));
        assert_eq!(controls.target, [0.0; 3]);

        let mut panning = OrbitControls::new(
            [0.0; 3],
            5.0,
            0.0,
            0.0,
            ControlsConfig {
                pan_enabled: true,
                ..ControlsConfig::default()
            },
        );
        assert!(panning.pan(40.0, 10.0, 720.0));
        assert_ne!(panning.target, [0.0; 3]);
    }

    #[test]
    fn reset_returns_to_home_pose() {
        let mut controls =
            OrbitControls::from_bounds([0.0; 3], [1.0, 1.0, 1.0], ControlsConfig::default());
        let home_eye = controls.eye();
        controls.orbit(200.0, 50.0);
        controls.zoom(2.0);
        controls.reset();
        assert!(controls.eye().distance(home_eye) < 1e-5);
    }

    #[test]
    fn frame_bounds_preserves_orientation() {
        let mut controls = OrbitControls::new([5.0, 6.0, 7.0], 2.0, 1.1, -0.3, ControlsConfig::default());
        controls.frame_bounds_preserve_orientation([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        assert!((controls.yaw - 1.1).abs() < 1e-6);
        assert!((controls.pitch + 0.3).abs() < 1e-6);
        assert_eq!(controls.target, [0.0; 3]);
        assert!(controls.eye().is_finite());
    }
}
