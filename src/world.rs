use glam::Vec2;

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::api::{NarrowphaseApi, PhysicsWorldApi};
use crate::error::{Error, Result};
use crate::narrowphase::{Axis, Narrowphase};
use crate::spatial_hash::SpatialHash;
use crate::types::*;

/// Upper bound on overlap-and-push passes per axis per body. Non-penetrating
/// static geometry converges in far fewer; hitting it means the level has
/// overlapping statics or the body tunnelled deep into a cluster.
pub const MAX_RESOLVE_PASSES: usize = 16;

/// Kinematic world: dynamic boxes integrated with gravity and pushed out of
/// static boxes one axis at a time.
pub struct PhysicsWorld {
    pub cfg: WorldConfig,
    next_id: u32,

    // Ordered maps keep step order stable (ascending id)
    dynamics: BTreeMap<BodyId, DynamicBody>,
    statics: BTreeMap<BodyId, StaticBody>,

    // Broadphase over statics only; dynamic bodies are never hashed
    hash: SpatialHash<BodyId>,

    last_stats: WorldStats,
    last_timing: Option<WorldTiming>,
}

impl PhysicsWorldApi for PhysicsWorld {
    fn new(cfg: WorldConfig) -> Result<Self> {
        let hash = SpatialHash::new(cfg.cell_size)?;
        debug!(cell_size = cfg.cell_size, gravity = ?cfg.gravity, "physics world created");
        Ok(Self {
            cfg,
            next_id: 1,
            dynamics: BTreeMap::new(),
            statics: BTreeMap::new(),
            hash,
            last_stats: WorldStats::default(),
            last_timing: None,
        })
    }

    fn add_dynamic_body(&mut self, desc: DynamicBodyDesc) -> BodyId {
        let id = self.alloc_id();
        self.dynamics.insert(id, DynamicBody::from_desc(id, desc));
        id
    }

    fn add_static_body(&mut self, desc: StaticBodyDesc) -> BodyId {
        let id = self.alloc_id();
        self.hash.add(id, &desc.aabb);
        self.statics.insert(
            id,
            StaticBody {
                id,
                aabb: desc.aabb,
                user_key: desc.user_key,
            },
        );
        id
    }

    fn remove_dynamic_body(&mut self, id: BodyId) -> Result<DynamicBody> {
        self.dynamics.remove(&id).ok_or(Error::BodyNotFound(id))
    }

    fn remove_static_body(&mut self, id: BodyId) -> Result<StaticBody> {
        let body = self.statics.remove(&id).ok_or(Error::BodyNotFound(id))?;
        self.hash.remove(id);
        Ok(body)
    }

    fn clear(&mut self) {
        self.dynamics.clear();
        self.statics.clear();
        self.hash.clear();
        self.last_stats = WorldStats::default();
        self.last_timing = None;
    }

    fn step(&mut self, dt: f32) {
        // Also rejects NaN
        if !(dt > 0.0) {
            return;
        }
        let t0 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let gravity = self.cfg.gravity;
        let mut stats = WorldStats::default();

        let Self {
            dynamics,
            statics,
            hash,
            ..
        } = self;
        for body in dynamics.values_mut() {
            body.velocity.x += (body.acceleration.x + gravity.x) * dt;
            body.velocity.y += (body.acceleration.y + body.gravity_scale * gravity.y) * dt;
            let delta = body.velocity * dt;

            // X fully, then Y: corner hits always resolve horizontally first
            resolve_axis(body, Axis::X, delta.x, hash, statics, &mut stats);
            body.on_ground = false;
            resolve_axis(body, Axis::Y, delta.y, hash, statics, &mut stats);
        }

        stats.dynamic_bodies = self.dynamics.len();
        stats.static_bodies = self.statics.len();
        stats.cells = self.hash.cell_count();
        self.last_stats = stats;
        if let Some(t0) = t0 {
            self.last_timing = Some(WorldTiming {
                step_ms: t0.elapsed().as_secs_f64() * 1000.0,
                bodies_stepped: self.dynamics.len(),
            });
        }
    }

    fn dynamic_body(&self, id: BodyId) -> Result<&DynamicBody> {
        self.dynamics.get(&id).ok_or(Error::BodyNotFound(id))
    }

    fn dynamic_body_mut(&mut self, id: BodyId) -> Result<&mut DynamicBody> {
        self.dynamics.get_mut(&id).ok_or(Error::BodyNotFound(id))
    }

    fn static_body(&self, id: BodyId) -> Result<&StaticBody> {
        self.statics.get(&id).ok_or(Error::BodyNotFound(id))
    }

    fn dynamic_bodies(&self) -> impl Iterator<Item = &DynamicBody> {
        self.dynamics.values()
    }

    fn static_bodies(&self) -> impl Iterator<Item = &StaticBody> {
        self.statics.values()
    }

    fn query_static(&self, area: Aabb) -> Vec<BodyId> {
        self.hash
            .query(&area)
            .into_iter()
            .filter(|id| {
                self.statics
                    .get(id)
                    .is_some_and(|s| Narrowphase::overlap_aabb_aabb(&area, &s.aabb))
            })
            .collect()
    }

    fn raycast(&self, origin: Vec2, dir: Vec2, max_t: f32) -> Option<(BodyId, RayHit)> {
        if dir.length_squared() == 0.0 || !(max_t >= 0.0) {
            return None;
        }
        // Walk the grid along the ray; a hit closer than the current cell's
        // exit cannot be beaten by anything in a later cell.
        let mut best: Option<(BodyId, RayHit)> = None;
        self.hash.walk_ray(origin, dir, max_t, |ids, leave| {
            for &id in ids {
                let Some(s) = self.statics.get(&id) else { continue };
                let Some(hit) = Narrowphase::ray_aabb(origin, dir, &s.aabb) else { continue };
                if hit.toi > max_t {
                    continue;
                }
                // Ties keep the lower id
                let closer = match &best {
                    Some((bid, bh)) => hit.toi < bh.toi || (hit.toi == bh.toi && id < *bid),
                    None => true,
                };
                if closer {
                    best = Some((id, hit));
                }
            }
            !matches!(&best, Some((_, hit)) if hit.toi < leave)
        });
        best
    }
}

/// Move `body` by `delta` along `axis`, then push it out of every overlapping
/// static until none remain. Each pass snaps to the nearest edge among all
/// current overlaps, so a body wedged against several statics settles against
/// the one it reached first.
fn resolve_axis(
    body: &mut DynamicBody,
    axis: Axis,
    delta: f32,
    hash: &SpatialHash<BodyId>,
    statics: &BTreeMap<BodyId, StaticBody>,
    stats: &mut WorldStats,
) {
    if delta == 0.0 {
        return;
    }
    match axis {
        Axis::X => body.position.x += delta,
        Axis::Y => body.position.y += delta,
    }

    for _ in 0..MAX_RESOLVE_PASSES {
        let bounds = body.aabb();
        let mut target: Option<f32> = None;
        for id in hash.query(&bounds) {
            stats.candidate_tests += 1;
            let Some(s) = statics.get(&id) else { continue };
            if !Narrowphase::overlap_aabb_aabb(&bounds, &s.aabb) {
                continue;
            }
            stats.contacts += 1;
            let pushed = Narrowphase::push_out(axis, &bounds, delta, &s.aabb);
            target = Some(match target {
                // Moving forward: the smallest pushed coordinate is the nearest edge
                Some(t) if delta > 0.0 => t.min(pushed),
                Some(t) => t.max(pushed),
                None => pushed,
            });
        }

        let Some(target) = target else {
            return;
        };
        match axis {
            Axis::X => {
                body.position.x = target;
                body.velocity.x = 0.0;
            }
            Axis::Y => {
                body.position.y = target;
                body.velocity.y = 0.0;
                if delta > 0.0 {
                    body.on_ground = true;
                }
            }
        }
    }

    let bounds = body.aabb();
    let still_overlapping = hash.query(&bounds).into_iter().any(|id| {
        statics
            .get(&id)
            .is_some_and(|s| Narrowphase::overlap_aabb_aabb(&bounds, &s.aabb))
    });
    if !still_overlapping {
        return;
    }
    warn!(
        body = %body.id,
        ?axis,
        passes = MAX_RESOLVE_PASSES,
        "overlap resolution did not converge"
    );
}

impl PhysicsWorld {
    fn alloc_id(&mut self) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Return debug/perf stats gathered during the last `step`.
    pub fn debug_stats(&self) -> WorldStats {
        WorldStats {
            dynamic_bodies: self.dynamics.len(),
            static_bodies: self.statics.len(),
            cells: self.hash.cell_count(),
            ..self.last_stats
        }
    }

    /// Return timing for the last `step` (only when `enable_timing` is set).
    pub fn timing(&self) -> Option<WorldTiming> {
        self.last_timing
    }

    pub fn spatial_hash(&self) -> &SpatialHash<BodyId> {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> WorldConfig {
        WorldConfig {
            cell_size: 16.0,
            gravity: Vec2::ZERO,
            enable_timing: false,
        }
    }

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(cfg()).unwrap()
    }

    #[test]
    fn test_resolves_flush_against_wall() {
        let mut w = world();
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::splat(10.0)).with_velocity(Vec2::new(100.0, 0.0)),
        );
        w.add_static_body(StaticBodyDesc::new(Aabb::new(15.0, 0.0, 10.0, 10.0)));
        w.step(1.0);
        let body = w.dynamic_body(b).unwrap();
        assert_eq!(body.position.x, 5.0);
        assert_eq!(body.velocity.x, 0.0);
        assert_eq!(body.position.y, 0.0);
        assert!(!body.on_ground());
    }

    #[test]
    fn test_moving_left_stops_at_right_edge() {
        let mut w = world();
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::new(40.0, 3.0), Vec2::splat(10.0))
                .with_velocity(Vec2::new(-30.0, 0.0)),
        );
        w.add_static_body(StaticBodyDesc::new(Aabb::new(0.0, 0.0, 20.0, 20.0)));
        w.step(1.0);
        let body = w.dynamic_body(b).unwrap();
        assert_eq!(body.position, Vec2::new(20.0, 3.0));
        assert_eq!(body.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_ground_contact_is_reconfirmed_every_step() {
        let mut w = PhysicsWorld::new(WorldConfig {
            gravity: Vec2::new(0.0, 100.0),
            ..cfg()
        })
        .unwrap();
        let b = w.add_dynamic_body(DynamicBodyDesc::new(Vec2::new(0.0, 0.0), Vec2::splat(10.0)));
        w.add_static_body(StaticBodyDesc::new(Aabb::new(-50.0, 10.0, 100.0, 10.0)));

        for _ in 0..5 {
            w.step(1.0 / 60.0);
            let body = w.dynamic_body(b).unwrap();
            assert!(body.on_ground());
            assert_eq!(body.position.y, 0.0);
            assert_eq!(body.velocity.y, 0.0);
        }

        w.dynamic_body_mut(b).unwrap().velocity.y = -300.0;
        w.step(1.0 / 60.0);
        let body = w.dynamic_body(b).unwrap();
        assert!(!body.on_ground());
        assert!(body.position.y < 0.0);
    }

    fn settle_then_walk(floor_y: f32, height: f32) -> DynamicBody {
        let mut w = PhysicsWorld::new(WorldConfig {
            gravity: Vec2::new(0.0, 1600.0),
            ..cfg()
        })
        .unwrap();
        w.add_static_body(StaticBodyDesc::new(Aabb::new(-1000.0, floor_y, 2000.0, 10.0)));
        let b = w.add_dynamic_body(DynamicBodyDesc::new(
            Vec2::new(0.0, floor_y - height - 3.0),
            Vec2::new(1.0, height),
        ));
        for _ in 0..30 {
            w.step(1.0 / 60.0);
        }
        assert!(w.dynamic_body(b).unwrap().on_ground());
        w.dynamic_body_mut(b).unwrap().velocity.x = 100.0;
        w.step(1.0 / 60.0);
        w.dynamic_body(b).unwrap().clone()
    }

    #[test]
    fn test_resting_body_walks_along_non_dyadic_floor() {
        let body = settle_then_walk(14.11, 1.94);
        assert!((body.position.x - 100.0 / 60.0).abs() < 1e-4, "x {}", body.position.x);
        assert!(body.on_ground());
        assert!(body.position.y + 1.94 <= 14.11);

        for i in 0..12u8 {
            for j in 0..8u8 {
                let floor_y = 3.7 + f32::from(i) * 13.37;
                let height = 0.61 + f32::from(j) * 1.13;
                let body = settle_then_walk(floor_y, height);
                assert!(
                    (body.position.x - 100.0 / 60.0).abs() < 1e-4,
                    "floor {floor_y} height {height}: x {}",
                    body.position.x
                );
                assert!(body.on_ground());
                assert!(floor_y - body.aabb().bottom() < 1e-3);
            }
        }
    }

    #[test]
    fn test_ceiling_hit_does_not_ground() {
        let mut w = world();
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::new(0.0, 30.0), Vec2::splat(10.0))
                .with_velocity(Vec2::new(0.0, -25.0)),
        );
        w.add_static_body(StaticBodyDesc::new(Aabb::new(0.0, 0.0, 10.0, 10.0)));
        w.step(1.0);
        let body = w.dynamic_body(b).unwrap();
        assert_eq!(body.position.y, 10.0);
        assert_eq!(body.velocity.y, 0.0);
        assert!(!body.on_ground());
    }

    #[test]
    fn test_wedged_between_two_statics_clears_both() {
        let mut w = world();
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::splat(10.0)).with_velocity(Vec2::new(10.0, 0.0)),
        );
        // Ids ascend, so the farther block is found first by the broadphase
        let far = w.add_static_body(StaticBodyDesc::new(Aabb::new(18.0, 6.0, 10.0, 4.0)));
        let near = w.add_static_body(StaticBodyDesc::new(Aabb::new(15.0, 0.0, 10.0, 4.0)));
        w.step(1.0);
        let body = w.dynamic_body(b).unwrap();
        assert_eq!(body.position.x, 5.0);
        let bounds = body.aabb();
        for id in [far, near] {
            assert!(!bounds.overlaps(&w.static_body(id).unwrap().aabb()));
        }
    }

    #[test]
    fn test_diagonal_into_corner_resolves_x_first() {
        let mut w = world();
        // Moving down-right into the top-left corner of a block
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::splat(10.0)).with_velocity(Vec2::new(8.0, 8.0)),
        );
        w.add_static_body(StaticBodyDesc::new(Aabb::new(12.0, 12.0, 20.0, 20.0)));
        w.step(1.0);
        // X alone (8..18 at y 0..10) clears the block; Y then lands on top
        let body = w.dynamic_body(b).unwrap();
        assert_eq!(body.position, Vec2::new(8.0, 2.0));
        assert_eq!(body.velocity, Vec2::new(8.0, 0.0));
        assert!(body.on_ground());
    }

    #[test]
    fn test_gravity_scale_and_acceleration() {
        let mut w = PhysicsWorld::new(WorldConfig {
            gravity: Vec2::new(1.0, 10.0),
            ..cfg()
        })
        .unwrap();
        let floaty = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE)
                .with_gravity_scale(0.5)
                .with_acceleration(Vec2::new(2.0, 0.0)),
        );
        w.step(1.0);
        let body = w.dynamic_body(floaty).unwrap();
        assert_eq!(body.velocity, Vec2::new(3.0, 5.0));
        assert_eq!(body.position, Vec2::new(3.0, 5.0));
    }

    #[test]
    fn test_step_ignores_non_positive_dt() {
        let mut w = world();
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE).with_velocity(Vec2::ONE),
        );
        w.step(0.0);
        w.step(-1.0);
        w.step(f32::NAN);
        assert_eq!(w.dynamic_body(b).unwrap().position, Vec2::ZERO);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut w = world();
        let a = w.add_dynamic_body(DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE));
        let s = w.add_static_body(StaticBodyDesc::new(Aabb::new(0.0, 5.0, 1.0, 1.0)));
        assert!(s > a);
        w.remove_dynamic_body(a).unwrap();
        assert!(matches!(w.remove_dynamic_body(a), Err(Error::BodyNotFound(id)) if id == a));
        assert!(matches!(w.dynamic_body_mut(a), Err(Error::BodyNotFound(_))));
        w.clear();
        let c = w.add_dynamic_body(DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE));
        assert!(c > s);
    }

    #[test]
    fn test_removed_body_is_not_stepped() {
        let mut w = world();
        let a = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE).with_velocity(Vec2::X),
        );
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::ONE).with_velocity(Vec2::X),
        );
        let removed = w.remove_dynamic_body(a).unwrap();
        w.step(1.0);
        assert_eq!(removed.position, Vec2::ZERO);
        assert_eq!(w.dynamic_bodies().count(), 1);
        assert_eq!(w.dynamic_body(b).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_remove_static_unblocks_path() {
        let mut w = world();
        let wall = w.add_static_body(StaticBodyDesc::new(Aabb::new(15.0, 0.0, 10.0, 10.0)));
        let b = w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::splat(10.0)).with_velocity(Vec2::new(10.0, 0.0)),
        );
        w.remove_static_body(wall).unwrap();
        assert_eq!(w.spatial_hash().cell_count(), 0);
        w.step(1.0);
        assert_eq!(w.dynamic_body(b).unwrap().position.x, 10.0);
        assert!(w.remove_static_body(wall).is_err());
    }

    #[test]
    fn test_query_static_is_exact() {
        let mut w = world();
        let s = w.add_static_body(StaticBodyDesc::new(Aabb::new(0.0, 0.0, 4.0, 4.0)));
        // Same cell, no exact overlap
        assert!(w.query_static(Aabb::new(8.0, 8.0, 2.0, 2.0)).is_empty());
        assert_eq!(w.query_static(Aabb::new(3.0, 3.0, 2.0, 2.0)), vec![s]);
    }

    #[test]
    fn test_raycast_hits_closest() {
        let mut w = world();
        let near = w.add_static_body(StaticBodyDesc::new(Aabb::new(20.0, -5.0, 10.0, 10.0)));
        let _far = w.add_static_body(StaticBodyDesc::new(Aabb::new(60.0, -5.0, 10.0, 10.0)));
        let (id, hit) = w.raycast(Vec2::ZERO, Vec2::X, 100.0).unwrap();
        assert_eq!(id, near);
        assert!((hit.toi - 20.0).abs() < 1e-5);
        assert!(w.raycast(Vec2::ZERO, Vec2::NEG_X, 100.0).is_none());
        assert!(w.raycast(Vec2::ZERO, Vec2::X, 10.0).is_none());
    }

    #[test]
    fn test_raycast_unbounded_reach() {
        let mut w = world();
        let target = w.add_static_body(StaticBodyDesc::new(Aabb::new(500.0, 500.0, 10.0, 10.0)));
        w.add_static_body(StaticBodyDesc::new(Aabb::new(-40.0, 900.0, 10.0, 10.0)));

        let (id, hit) = w.raycast(Vec2::ZERO, Vec2::new(1.0, 1.0), f32::INFINITY).unwrap();
        assert_eq!(id, target);
        assert!((hit.toi - 500.0).abs() < 1e-3);
        assert_eq!(hit.normal, Vec2::NEG_X);

        assert!(w.raycast(Vec2::ZERO, Vec2::new(1.0, 1.0), 100_000.0).is_some());
        assert!(w.raycast(Vec2::new(0.0, 600.0), Vec2::new(1.0, 0.0), f32::INFINITY).is_none());
        assert!(w.raycast(Vec2::ZERO, Vec2::new(-1.0, 3.0), 1.0e30).is_none());
    }

    #[test]
    fn test_raycast_tie_prefers_lower_id() {
        let mut w = world();
        let first = w.add_static_body(StaticBodyDesc::new(Aabb::new(40.0, -10.0, 10.0, 10.0)));
        let second = w.add_static_body(StaticBodyDesc::new(Aabb::new(40.0, 0.0, 10.0, 10.0)));
        let (id, hit) = w.raycast(Vec2::ZERO, Vec2::X, f32::INFINITY).unwrap();
        assert_eq!(id, first);
        assert_ne!(id, second);
        assert_eq!(hit.toi, 40.0);
    }

    #[test]
    fn test_stats_and_timing() {
        let mut w = PhysicsWorld::new(WorldConfig {
            enable_timing: true,
            ..cfg()
        })
        .unwrap();
        w.add_dynamic_body(
            DynamicBodyDesc::new(Vec2::ZERO, Vec2::splat(10.0)).with_velocity(Vec2::new(100.0, 0.0)),
        );
        w.add_static_body(StaticBodyDesc::new(Aabb::new(15.0, 0.0, 10.0, 10.0)));
        w.step(1.0);
        let stats = w.debug_stats();
        assert_eq!(stats.dynamic_bodies, 1);
        assert_eq!(stats.static_bodies, 1);
        assert_eq!(stats.contacts, 1);
        assert!(stats.candidate_tests >= 1);
        let timing = w.timing().unwrap();
        assert_eq!(timing.bodies_stepped, 1);
        assert!(timing.step_ms >= 0.0);
    }

    #[test]
    fn test_rejects_bad_cell_size() {
        let res = PhysicsWorld::new(WorldConfig {
            cell_size: 0.0,
            ..cfg()
        });
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
    }
}
