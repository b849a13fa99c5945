use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// User-defined opaque key carried on bodies (e.g., pack an entity id). Never
/// interpreted by the physics world.
pub type UserKey = u64;

/// Axis-aligned box with a top-left origin. Y grows downward.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Aabb {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos.x, pos.y, size.x, size.y)
    }

    /// Bounding box of two arbitrary corners.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::from_pos_size(min, max - min)
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.min() + self.size() * 0.5
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Strict overlap: boxes sharing only an edge do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Inclusive containment (points on the border are inside).
    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn translated(&self, by: Vec2) -> Aabb {
        Aabb::new(self.x + by.x, self.y + by.y, self.width, self.height)
    }
}

/// Identity shared by dynamic and static bodies. Allocated from a single
/// monotonically increasing counter and never reused within a world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Initial state for [`PhysicsWorldApi::add_dynamic_body`](crate::api::PhysicsWorldApi::add_dynamic_body).
#[derive(Copy, Clone, Debug)]
pub struct DynamicBodyDesc {
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub gravity_scale: f32,
    pub user_key: Option<UserKey>,
}

impl DynamicBodyDesc {
    /// Body at rest with unit gravity scale.
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            gravity_scale: 1.0,
            user_key: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_acceleration(mut self, acceleration: Vec2) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_gravity_scale(mut self, gravity_scale: f32) -> Self {
        self.gravity_scale = gravity_scale;
        self
    }

    pub fn with_user_key(mut self, key: UserKey) -> Self {
        self.user_key = Some(key);
        self
    }
}

/// A body moved by the world every step. Callers mutate `velocity`,
/// `acceleration` and `gravity_scale` directly between steps; the size is
/// fixed for the body's lifetime.
#[derive(Clone, Debug)]
pub struct DynamicBody {
    pub(crate) id: BodyId,
    pub position: Vec2,
    pub(crate) size: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub gravity_scale: f32,
    pub(crate) on_ground: bool,
    pub user_key: Option<UserKey>,
}

impl DynamicBody {
    pub(crate) fn from_desc(id: BodyId, desc: DynamicBodyDesc) -> Self {
        Self {
            id,
            position: desc.position,
            size: desc.size,
            velocity: desc.velocity,
            acceleration: desc.acceleration,
            gravity_scale: desc.gravity_scale,
            on_ground: false,
            user_key: desc.user_key,
        }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// True only if the last step resolved a landing on top of static geometry.
    pub fn on_ground(&self) -> bool {
        self.on_ground
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_pos_size(self.position, self.size)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct StaticBodyDesc {
    pub aabb: Aabb,
    pub user_key: Option<UserKey>,
}

impl StaticBodyDesc {
    pub fn new(aabb: Aabb) -> Self {
        Self { aabb, user_key: None }
    }

    pub fn with_user_key(mut self, key: UserKey) -> Self {
        self.user_key = Some(key);
        self
    }
}

/// Immovable level geometry.
#[derive(Copy, Clone, Debug)]
pub struct StaticBody {
    pub(crate) id: BodyId,
    pub(crate) aabb: Aabb,
    pub(crate) user_key: Option<UserKey>,
}

impl StaticBody {
    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn user_key(&self) -> Option<UserKey> {
        self.user_key
    }
}

/// Ray query result.
#[derive(Copy, Clone, Debug)]
pub struct RayHit {
    /// Distance along the ray in units of `dir` (`origin + dir * toi`).
    pub toi: f32,
    /// Surface normal at entry; zero when the origin starts inside the box.
    pub normal: Vec2,
    pub contact: Vec2,
}

/// World-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Broadphase cell size in world units (typ. a few tiles).
    pub cell_size: f32,
    /// Gravity acceleration. X is applied unscaled, Y is multiplied by each
    /// body's `gravity_scale`.
    pub gravity: Vec2,
    /// Enable wall-clock instrumentation of `step` (adds small overhead when true).
    pub enable_timing: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            gravity: Vec2::new(0.0, 1600.0),
            enable_timing: false,
        }
    }
}

/// Debug statistics for the world and its last step.
#[derive(Copy, Clone, Debug, Default)]
pub struct WorldStats {
    pub dynamic_bodies: usize,
    pub static_bodies: usize,
    /// Non-empty spatial hash cells.
    pub cells: usize,
    /// Broadphase candidates tested exactly during the last step.
    pub candidate_tests: usize,
    /// Overlaps resolved during the last step.
    pub contacts: usize,
}

/// Timing for the last completed step.
#[derive(Copy, Clone, Debug, Default)]
pub struct WorldTiming {
    pub step_ms: f64,
    pub bodies_stepped: usize,
}
