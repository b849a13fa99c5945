use glam::Vec2;
use nohop::*;

fn main() -> Result<()> {
    let mut world = PhysicsWorld::new(WorldConfig {
        cell_size: 1.0,
        ..WorldConfig::default()
    })?;

    let near = world.add_static_body(StaticBodyDesc::new(Aabb::new(2.0, -0.25, 0.5, 0.5)).with_user_key(10));
    world.add_static_body(StaticBodyDesc::new(Aabb::new(4.0, -0.25, 0.5, 0.5)).with_user_key(20));

    match world.raycast(Vec2::ZERO, Vec2::X, 100.0) {
        Some((id, hit)) => {
            let key = world.static_body(id)?.user_key();
            println!(
                "Ray hit id={} key={:?} t={:.3} n=({:.2},{:.2}) near={}",
                id,
                key,
                hit.toi,
                hit.normal.x,
                hit.normal.y,
                id == near
            );
        }
        None => println!("No hit"),
    }
    Ok(())
}
