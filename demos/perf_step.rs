use glam::Vec2;
use nohop::*;
use std::time::Instant;

fn lcg(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

fn unit(seed: &mut u32) -> f32 {
    lcg(seed) as f32 / u32::MAX as f32
}

fn main() -> Result<()> {
    let mut world = PhysicsWorld::new(WorldConfig {
        cell_size: 64.0,
        enable_timing: true,
        ..WorldConfig::default()
    })?;

    // A floor, plus scattered ledges
    world.add_static_body(StaticBodyDesc::new(Aabb::new(-4096.0, 2048.0, 8192.0, 64.0)));
    let mut seed = 1u32;
    let ledges = 5_000usize;
    for _ in 0..ledges {
        let x = unit(&mut seed) * 8000.0 - 4000.0;
        let y = unit(&mut seed) * 1900.0;
        let w = 32.0 + unit(&mut seed) * 128.0;
        world.add_static_body(StaticBodyDesc::new(Aabb::new(x, y, w, 16.0)));
    }

    let n = 10_000usize; // number of dynamic bodies
    for _ in 0..n {
        let pos = Vec2::new(unit(&mut seed) * 8000.0 - 4000.0, unit(&mut seed) * 1800.0);
        let vel = Vec2::new(unit(&mut seed) * 400.0 - 200.0, 0.0);
        world.add_dynamic_body(DynamicBodyDesc::new(pos, Vec2::new(12.0, 16.0)).with_velocity(vel));
    }

    let steps = 300;
    let dt = 1.0 / 60.0;
    let t0 = Instant::now();
    let mut worst_ms = 0.0f64;
    for _ in 0..steps {
        world.step(dt);
        if let Some(t) = world.timing() {
            worst_ms = worst_ms.max(t.step_ms);
        }
    }
    let total = t0.elapsed();
    let grounded = world.dynamic_bodies().filter(|b| b.on_ground()).count();
    let stats = world.debug_stats();
    println!(
        "N={} statics={} cells={} steps={} total={:.1}ms avg={:.3}ms worst={:.3}ms grounded={} last_candidates={} last_contacts={}",
        n,
        stats.static_bodies,
        stats.cells,
        steps,
        total.as_secs_f64() * 1000.0,
        total.as_secs_f64() * 1000.0 / steps as f64,
        worst_ms,
        grounded,
        stats.candidate_tests,
        stats.contacts
    );
    Ok(())
}
