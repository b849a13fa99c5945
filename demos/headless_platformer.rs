use std::rc::Rc;
use std::time::Duration;

use nohop::host::{AssetTable, AudioLog, HeadlessRenderer, InputBus, ManualClock, ManualTicker};
use nohop::hud::HudSnapshot;
use nohop::level::LevelDesc;
use nohop::scene::{BLOCK_TEXTURE, PLAYER_TEXTURE, Scene, SceneContext};
use nohop::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LEVEL: &[&str] = &[
    "........................................",
    "........................................",
    ".................C......................",
    "..............#####.........C...........",
    "..P.....................#######.........",
    "########################################",
];

fn main() {
    init_tracing();
    if let Err(err) = run() {
        error!(error = %err, "demo failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run() -> Result<()> {
    let cfg = EngineConfig::default();
    let ticker = Rc::new(ManualTicker::new());
    let bus = Rc::new(InputBus::new());
    let clock = ManualClock::new();
    let view = HeadlessRenderer::new();
    let audio = AudioLog::new();

    let ctx = SceneContext {
        renderer: Box::new(view.clone()),
        audio: Box::new(audio.clone()),
        hud: Box::new(|s: &HudSnapshot| {
            if let Ok(line) = serde_json::to_string(s) {
                println!("hud {line}");
            }
        }),
    };
    let mut scene = Scene::attached(cfg.clone(), ctx, bus.clone())?;
    let level = LevelDesc::from_ascii(LEVEL, 32.0)?;
    let mut assets = AssetTable::new()
        .with_texture(PLAYER_TEXTURE, TextureHandle(1))
        .with_texture(BLOCK_TEXTURE, TextureHandle(2));
    scene.load_level(&level, &mut assets)?;

    let mut handle = start(ticker.clone(), clock.clone(), &cfg.step, scene)?;

    // Uneven frame pacing, with one long stall in the middle.
    let mut seed = 7u32;
    for frame in 0..360u32 {
        match frame {
            20 => press(&bus, "ArrowRight", true),
            90 => press(&bus, "Space", true),
            92 => press(&bus, "Space", false),
            150 => press(&bus, "KeyH", true),
            151 => press(&bus, "KeyH", false),
            240 => press(&bus, "ArrowRight", false),
            _ => {}
        }
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        let jitter_us = u64::from(seed >> 28) * 500;
        let frame_time = if frame == 200 {
            Duration::from_millis(900)
        } else {
            Duration::from_micros(14_000 + jitter_us)
        };
        clock.advance(frame_time);
        ticker.fire();
        if let Some(err) = handle.take_error() {
            return Err(err);
        }
    }

    let stats = handle.stats();
    let (ticks, player) = handle.with_simulation(|scene| {
        (scene.ticks(), scene.player_body().map(|b| (b.position, b.on_ground())))
    });
    info!(
        frames = stats.frames,
        steps = stats.total_steps,
        clamped = stats.clamped_frames,
        ticks,
        "run finished"
    );
    if let Some((pos, grounded)) = player {
        println!("player at ({:.1}, {:.1}) grounded={grounded}", pos.x, pos.y);
    }
    println!(
        "sprites={} hitboxes={} cues={:?}",
        view.state().sprites.len(),
        view.state().hitboxes_visible,
        audio.cues()
    );
    handle.detach();
    Ok(())
}

fn press(bus: &InputBus, code: &str, down: bool) {
    let code = RawCode::key(code);
    let event = if down { RawEvent::Down(code) } else { RawEvent::Up(code) };
    let propagation = bus.emit(event);
    tracing::debug!(?propagation, "key event");
}
