use std::time::Duration;

use glam::Vec2;

use crate::error::{AssetError, Result};
use crate::hud::HudSnapshot;
use crate::input::RawEvent;
use crate::narrowphase::Axis;
use crate::types::*;

/// Public API contract for the kinematic physics world.
pub trait PhysicsWorldApi {
    /// Construct a new world. Fails on a non-positive or non-finite cell size.
    fn new(cfg: WorldConfig) -> Result<Self>
    where
        Self: Sized;

    // --- Bodies ------------------------------------------------------------

    /// Register a dynamic body and return its id. The live body is reachable
    /// through [`dynamic_body_mut`](Self::dynamic_body_mut).
    fn add_dynamic_body(&mut self, desc: DynamicBodyDesc) -> BodyId;

    /// Register immovable geometry and index it into the broadphase.
    fn add_static_body(&mut self, desc: StaticBodyDesc) -> BodyId;

    /// Remove a dynamic body. Its id is never handed out again.
    fn remove_dynamic_body(&mut self, id: BodyId) -> Result<DynamicBody>;

    /// Remove a static body from the world and from every cell it was hashed into.
    fn remove_static_body(&mut self, id: BodyId) -> Result<StaticBody>;

    /// Drop every body. The id counter keeps counting.
    fn clear(&mut self);

    // --- Simulation --------------------------------------------------------

    /// Integrate and resolve all dynamic bodies. No-op for `dt <= 0`.
    fn step(&mut self, dt: f32);

    // --- Access ------------------------------------------------------------

    fn dynamic_body(&self, id: BodyId) -> Result<&DynamicBody>;

    fn dynamic_body_mut(&mut self, id: BodyId) -> Result<&mut DynamicBody>;

    fn static_body(&self, id: BodyId) -> Result<&StaticBody>;

    /// Dynamic bodies in step order (ascending id).
    fn dynamic_bodies(&self) -> impl Iterator<Item = &DynamicBody>;

    fn static_bodies(&self) -> impl Iterator<Item = &StaticBody>;

    // --- Queries -----------------------------------------------------------

    /// Static bodies whose boxes strictly overlap `area`, ascending id.
    fn query_static(&self, area: Aabb) -> Vec<BodyId>;

    /// Closest static body hit by `origin + dir * t` for `t` in `[0, max_t]`.
    fn raycast(&self, origin: Vec2, dir: Vec2, max_t: f32) -> Option<(BodyId, RayHit)>;
}

/// Exact primitive tests used after broadphase narrowing.
pub trait NarrowphaseApi {
    fn overlap_aabb_aabb(a: &Aabb, b: &Aabb) -> bool;

    fn overlap_point_aabb(p: Vec2, b: &Aabb) -> bool;

    fn ray_aabb(origin: Vec2, dir: Vec2, b: &Aabb) -> Option<RayHit>;

    /// New min coordinate on `axis` for `moving` after being pushed out of
    /// `fixed`, opposite to a travel of sign `delta`.
    fn push_out(axis: Axis, moving: &Aabb, delta: f32, fixed: &Aabb) -> f32;
}

// --- Host seams ------------------------------------------------------------

/// Monotonic wall clock, measured from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Handle returned by host event sources; pass it back to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// What a raw input listener asks the host to do with the native event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Continue,
    /// Suppress the host's default handling (e.g. page scroll on arrow keys).
    PreventDefault,
}

/// Host render/tick callback source (e.g. a requestAnimationFrame driver).
pub trait TickSource {
    fn subscribe(&self, callback: Box<dyn FnMut()>) -> SubscriptionId;

    /// Returns false if the id was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Host raw input transport (DOM events, native input API, ...).
pub trait RawInputSource {
    fn subscribe(&self, listener: Box<dyn FnMut(&RawEvent) -> Propagation>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// Texture used whenever an asset cannot be resolved.
    pub const PLACEHOLDER: TextureHandle = TextureHandle(0);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(pub u32);

/// External scene-graph renderer. Owns no simulation state.
pub trait Renderer {
    fn create_sprite(&mut self, texture: TextureHandle, size: Vec2) -> RenderHandle;

    /// Place a sprite at its simulated top-left position.
    fn place(&mut self, handle: RenderHandle, position: Vec2, grounded: bool);

    fn destroy(&mut self, handle: RenderHandle);

    fn set_camera(&mut self, position: Vec2);

    fn set_hitboxes_visible(&mut self, visible: bool);
}

/// Resolves opaque asset ids to texture handles.
pub trait AssetLoader {
    fn texture(&mut self, id: &str) -> std::result::Result<TextureHandle, AssetError>;
}

/// Fire-and-forget sound cues.
pub trait AudioSink {
    fn play(&mut self, cue: &str);
}

/// One-way observer of HUD snapshots.
pub trait HudSink {
    fn publish(&mut self, snapshot: &HudSnapshot);
}

impl<F: FnMut(&HudSnapshot)> HudSink for F {
    fn publish(&mut self, snapshot: &HudSnapshot) {
        self(snapshot)
    }
}
