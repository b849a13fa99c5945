//! 2D follow camera. `position` is the top-left corner of the view in world
//! units, matching body coordinates.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::types::Aabb;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Visible area in world units.
    pub viewport: Vec2,
    /// Follow rate in 1/s. 0 snaps to the target every step.
    pub smoothing: f32,
    /// Half-extents of the box around the view center the target may move
    /// in without dragging the camera.
    pub deadzone: Vec2,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            viewport: Vec2::new(960.0, 540.0),
            smoothing: 8.0,
            deadzone: Vec2::new(48.0, 32.0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec2,
    cfg: CameraConfig,
    bounds: Option<Aabb>,
}

impl Camera {
    pub fn new(cfg: CameraConfig) -> Self {
        Self {
            position: Vec2::ZERO,
            cfg,
            bounds: None,
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.cfg.viewport
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.cfg.viewport * 0.5
    }

    /// Keep the view inside `bounds` (usually the level extents).
    pub fn set_bounds(&mut self, bounds: Option<Aabb>) {
        self.bounds = bounds;
        self.position = self.clamped(self.position);
    }

    /// Center on `target` immediately.
    pub fn snap_to(&mut self, target: Vec2) {
        self.position = self.clamped(target - self.cfg.viewport * 0.5);
    }

    /// Ease toward keeping `target` inside the deadzone.
    pub fn follow(&mut self, target: Vec2, dt: f32) {
        let offset = target - self.center();
        let excess = Vec2::new(
            excess_past(offset.x, self.cfg.deadzone.x),
            excess_past(offset.y, self.cfg.deadzone.y),
        );
        if excess == Vec2::ZERO {
            return;
        }
        let desired = self.position + excess;
        let t = if self.cfg.smoothing > 0.0 {
            1.0 - (-self.cfg.smoothing * dt.max(0.0)).exp()
        } else {
            1.0
        };
        self.position = self.clamped(self.position.lerp(desired, t));
    }

    pub fn visible_area(&self) -> Aabb {
        Aabb::from_pos_size(self.position, self.cfg.viewport)
    }

    fn clamped(&self, pos: Vec2) -> Vec2 {
        let Some(b) = self.bounds else {
            return pos;
        };
        Vec2::new(
            clamp_axis(pos.x, b.x, b.width, self.cfg.viewport.x),
            clamp_axis(pos.y, b.y, b.height, self.cfg.viewport.y),
        )
    }
}

fn excess_past(offset: f32, half: f32) -> f32 {
    if offset > half {
        offset - half
    } else if offset < -half {
        offset + half
    } else {
        0.0
    }
}

// Levels smaller than the view are centered instead.
fn clamp_axis(pos: f32, min: f32, extent: f32, view: f32) -> f32 {
    if extent <= view {
        min + (extent - view) * 0.5
    } else {
        pos.clamp(min, min + extent - view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(smoothing: f32) -> Camera {
        Camera::new(CameraConfig {
            viewport: Vec2::new(100.0, 50.0),
            smoothing,
            deadzone: Vec2::new(10.0, 5.0),
        })
    }

    #[test]
    fn test_snap_centers_target() {
        let mut c = cam(0.0);
        c.snap_to(Vec2::new(200.0, 100.0));
        assert_eq!(c.position, Vec2::new(150.0, 75.0));
        assert_eq!(c.center(), Vec2::new(200.0, 100.0));
    }

    #[test]
    fn test_deadzone_holds_camera_still() {
        let mut c = cam(0.0);
        c.snap_to(Vec2::new(200.0, 100.0));
        c.follow(Vec2::new(208.0, 96.0), 1.0 / 60.0);
        assert_eq!(c.position, Vec2::new(150.0, 75.0));
        c.follow(Vec2::new(215.0, 100.0), 1.0 / 60.0);
        assert!((c.position.x - 155.0).abs() < 1e-4);
    }

    #[test]
    fn test_smoothing_eases_without_overshoot() {
        let mut c = cam(8.0);
        c.follow(Vec2::new(500.0, 25.0), 1.0 / 60.0);
        let first = c.position.x;
        assert!(first > 0.0 && first < 500.0 - 50.0 - 10.0);
        for _ in 0..600 {
            c.follow(Vec2::new(500.0, 25.0), 1.0 / 60.0);
        }
        assert!(c.position.x <= 440.0 + 1e-3);
        assert!(c.position.x > 439.0);
    }

    #[test]
    fn test_bounds_clamp_and_center_small_levels() {
        let mut c = cam(0.0);
        c.set_bounds(Some(Aabb::new(0.0, 0.0, 300.0, 40.0)));
        c.snap_to(Vec2::new(5.0, 5.0));
        assert_eq!(c.position.x, 0.0);
        // 40 tall level in a 50 tall view sits centered
        assert_eq!(c.position.y, -5.0);
        c.snap_to(Vec2::new(1000.0, 5.0));
        assert_eq!(c.position.x, 200.0);
        // The view never shows past the level's right edge
        assert_eq!(c.visible_area(), Aabb::new(200.0, -5.0, 100.0, 50.0));
        assert_eq!(c.visible_area().right(), 300.0);
    }
}
