use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::types::*;

/// Resolution axis. The world always resolves `X` before `Y`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Exact AABB primitives.
pub struct Narrowphase;

impl NarrowphaseApi for Narrowphase {
    #[inline]
    fn overlap_aabb_aabb(a: &Aabb, b: &Aabb) -> bool {
        a.overlaps(b)
    }

    #[inline]
    fn overlap_point_aabb(p: Vec2, b: &Aabb) -> bool {
        b.contains_point(p)
    }

    fn ray_aabb(origin: Vec2, dir: Vec2, b: &Aabb) -> Option<RayHit> {
        // Slab method; earliest t >= 0 with the entry normal
        let min = b.min();
        let max = b.max();
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;
        let mut n_enter = Vec2::ZERO;

        for (o, d, lo, hi, axis_n) in [
            (origin.x, dir.x, min.x, max.x, Vec2::X),
            (origin.y, dir.y, min.y, max.y, Vec2::Y),
        ] {
            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (lo - o) * inv;
            let mut t2 = (hi - o) * inv;
            let mut sign = -1.0;
            if t1 > t2 {
                core::mem::swap(&mut t1, &mut t2);
                sign = 1.0;
            }
            if t1 > tmin {
                tmin = t1;
                n_enter = axis_n * sign;
            }
            tmax = tmax.min(t2);
            if tmin > tmax {
                return None;
            }
        }

        if tmax < 0.0 {
            return None;
        }
        // Origin inside the box: immediate hit with no meaningful normal
        let inside = tmin < 0.0;
        let toi = if inside { 0.0 } else { tmin };
        Some(RayHit {
            toi,
            normal: if inside { Vec2::ZERO } else { n_enter },
            contact: origin + dir * toi,
        })
    }

    fn push_out(axis: Axis, moving: &Aabb, delta: f32, fixed: &Aabb) -> f32 {
        match axis {
            Axis::X if delta > 0.0 => flush_before(fixed.x, moving.width),
            Axis::X => fixed.right(),
            Axis::Y if delta > 0.0 => flush_before(fixed.y, moving.height),
            Axis::Y => fixed.bottom(),
        }
    }
}

/// Min coordinate for a box of `size` ending at `edge`. `edge - size` can
/// round so that `min + size` lands past `edge`, which would still count as
/// overlap; step down until the far side is at or before the edge.
fn flush_before(edge: f32, size: f32) -> f32 {
    let mut min = edge - size;
    let mut step = ulp(edge.abs().max(size.abs()));
    while min + size > edge {
        min -= step;
        step *= 2.0;
    }
    min
}

fn ulp(x: f32) -> f32 {
    (f32::from_bits(x.to_bits() + 1) - x).max(f32::MIN_POSITIVE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_is_strict() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let touching = Aabb::new(10.0, 0.0, 10.0, 10.0);
        let inside = Aabb::new(9.5, 9.5, 10.0, 10.0);
        assert!(!Narrowphase::overlap_aabb_aabb(&a, &touching));
        assert!(Narrowphase::overlap_aabb_aabb(&a, &inside));
        assert!(Narrowphase::overlap_aabb_aabb(&inside, &a));
    }

    #[test]
    fn test_overlap_point_aabb_inclusive() {
        let b = Aabb::new(-1.0, -2.0, 2.0, 4.0);
        assert!(Narrowphase::overlap_point_aabb(Vec2::ZERO, &b));
        assert!(Narrowphase::overlap_point_aabb(Vec2::new(1.0, 2.0), &b));
        assert!(!Narrowphase::overlap_point_aabb(Vec2::new(1.1, 0.0), &b));
    }

    #[test]
    fn test_ray_aabb_hit() {
        let b = Aabb::new(-1.0, -1.0, 2.0, 2.0);
        let hit = Narrowphase::ray_aabb(Vec2::new(-5.0, 0.0), Vec2::X, &b).unwrap();
        assert!((hit.toi - 4.0).abs() < 1e-5);
        assert!((hit.normal.x + 1.0).abs() < 1e-5);
        assert!((hit.contact.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_aabb_from_below_reports_downward_normal() {
        let b = Aabb::new(0.0, 0.0, 4.0, 4.0);
        let hit = Narrowphase::ray_aabb(Vec2::new(2.0, 10.0), Vec2::NEG_Y, &b).unwrap();
        assert!((hit.toi - 6.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec2::Y);
    }

    #[test]
    fn test_ray_aabb_parallel_miss_and_behind() {
        let b = Aabb::new(-1.0, -1.0, 2.0, 2.0);
        assert!(Narrowphase::ray_aabb(Vec2::new(-5.0, 2.0), Vec2::X, &b).is_none());
        assert!(Narrowphase::ray_aabb(Vec2::new(5.0, 0.0), Vec2::X, &b).is_none());
    }

    #[test]
    fn test_ray_aabb_origin_inside() {
        let b = Aabb::new(-1.0, -1.0, 2.0, 2.0);
        let hit = Narrowphase::ray_aabb(Vec2::ZERO, Vec2::new(1.0, 1.0), &b).unwrap();
        assert_eq!(hit.toi, 0.0);
        assert_eq!(hit.normal, Vec2::ZERO);
    }

    #[test]
    fn test_push_out_opposes_travel() {
        let moving = Aabb::new(10.0, 0.0, 10.0, 10.0);
        let wall = Aabb::new(15.0, -5.0, 10.0, 20.0);
        assert_eq!(Narrowphase::push_out(Axis::X, &moving, 3.0, &wall), 5.0);
        assert_eq!(Narrowphase::push_out(Axis::X, &moving, -3.0, &wall), 25.0);
        assert_eq!(Narrowphase::push_out(Axis::Y, &moving, 1.0, &wall), -15.0);
        assert_eq!(Narrowphase::push_out(Axis::Y, &moving, -1.0, &wall), 15.0);
    }

    #[test]
    fn test_push_out_never_leaves_rounding_overlap() {
        // 14.11 - 1.94 + 1.94 rounds past 14.11 in f32
        let floor = Aabb::new(-1000.0, 14.11, 2000.0, 10.0);
        let body = Aabb::new(0.0, 13.0, 1.0, 1.94);
        let y = Narrowphase::push_out(Axis::Y, &body, 0.5, &floor);
        assert!(y + 1.94 <= 14.11);
        assert!(14.11 - y - 1.94 < 1e-5);

        for i in 0..200u16 {
            for j in 1..60u16 {
                let edge = -37.3 + f32::from(i) * 0.731;
                let size = f32::from(j) * 0.173;
                let fixed = Aabb::new(edge, edge, 50.0, 50.0);
                let moving = Aabb::new(edge - size, edge - size, size, size);
                let x = Narrowphase::push_out(Axis::X, &moving, 1.0, &fixed);
                let y = Narrowphase::push_out(Axis::Y, &moving, 1.0, &fixed);
                let placed = Aabb::new(x, y, size, size);
                assert!(!placed.overlaps(&fixed), "edge {edge} size {size}");
                assert!(edge - (x + size) < 1e-4);
            }
        }
    }
}
