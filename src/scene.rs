//! Platformer scene: the per-tick glue between input, physics, the entity
//! registry, the camera and the external collaborators.
//!
//! Each step runs, in order: input poll → player control → physics step →
//! render sync → camera follow → HUD publication.

use std::rc::Rc;

use glam::Vec2;
use tracing::{debug, info, warn};

use crate::api::{
    AssetLoader, AudioSink, HudSink, PhysicsWorldApi, RawInputSource, RenderHandle, Renderer,
    TextureHandle,
};
use crate::camera::Camera;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::fixed_step::{FrameReport, Simulation};
use crate::hud::{HudBridge, HudSnapshot};
use crate::input::{Binding, InputMapper, RawCode, digital_axis};
use crate::level::LevelDesc;
use crate::registry::{EntityId, EntityRegistry};
use crate::types::{BodyId, DynamicBody, DynamicBodyDesc, StaticBodyDesc};
use crate::world::PhysicsWorld;

pub const PLAYER_TEXTURE: &str = "sprites/player";
pub const CRATE_TEXTURE: &str = "sprites/crate";
pub const BLOCK_TEXTURE: &str = "tiles/solid";

pub const JUMP_CUE: &str = "jump";
pub const LAND_CUE: &str = "land";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GameAction {
    MoveLeft,
    MoveRight,
    Jump,
    ToggleHitboxes,
}

/// Arrows and WASD on the keyboard, left stick / d-pad / south button on the
/// first gamepad. Arrow keys and space suppress page scrolling.
pub fn default_bindings() -> Vec<Binding<GameAction>> {
    use GameAction::*;
    vec![
        Binding::new(RawCode::key("ArrowLeft"), MoveLeft).prevent_default(),
        Binding::new(RawCode::key("KeyA"), MoveLeft),
        Binding::new(RawCode::key("ArrowRight"), MoveRight).prevent_default(),
        Binding::new(RawCode::key("KeyD"), MoveRight),
        Binding::new(RawCode::key("ArrowUp"), Jump).prevent_default(),
        Binding::new(RawCode::key("KeyW"), Jump),
        Binding::new(RawCode::key("Space"), Jump).prevent_default(),
        Binding::new(RawCode::key("KeyH"), ToggleHitboxes),
        Binding::new(RawCode::GamepadAxis { pad: 0, axis: 0, positive: false }, MoveLeft),
        Binding::new(RawCode::GamepadAxis { pad: 0, axis: 0, positive: true }, MoveRight),
        Binding::new(RawCode::GamepadButton { pad: 0, button: 14 }, MoveLeft),
        Binding::new(RawCode::GamepadButton { pad: 0, button: 15 }, MoveRight),
        Binding::new(RawCode::GamepadButton { pad: 0, button: 0 }, Jump),
        Binding::new(RawCode::GamepadButton { pad: 0, button: 8 }, ToggleHitboxes),
    ]
}

/// Registry payload, one variant per entity kind.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EntityData {
    Player { body: BodyId, render: RenderHandle },
    Crate { body: BodyId, render: RenderHandle },
    Block { body: BodyId, render: RenderHandle },
}

impl EntityData {
    pub fn body(&self) -> BodyId {
        match *self {
            EntityData::Player { body, .. }
            | EntityData::Crate { body, .. }
            | EntityData::Block { body, .. } => body,
        }
    }

    pub fn render(&self) -> RenderHandle {
        match *self {
            EntityData::Player { render, .. }
            | EntityData::Crate { render, .. }
            | EntityData::Block { render, .. } => render,
        }
    }

    /// Whether the body lives in the world's dynamic set.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, EntityData::Block { .. })
    }
}

/// Collaborators the scene owns for its whole life.
pub struct SceneContext {
    pub renderer: Box<dyn Renderer>,
    pub audio: Box<dyn AudioSink>,
    pub hud: Box<dyn HudSink>,
}

pub struct Scene {
    cfg: EngineConfig,
    ctx: SceneContext,
    world: PhysicsWorld,
    registry: EntityRegistry<EntityData>,
    input: InputMapper<GameAction>,
    camera: Camera,
    hud: HudBridge,
    player: Option<EntityId>,
    hitboxes_visible: bool,
    ticks: u64,
}

impl Scene {
    pub fn new(cfg: EngineConfig, ctx: SceneContext, input: InputMapper<GameAction>) -> Result<Self> {
        cfg.validate()?;
        let world = PhysicsWorld::new(cfg.world.clone())?;
        let camera = Camera::new(cfg.camera.clone());
        let hud = HudBridge::new(&cfg.hud);
        Ok(Self {
            cfg,
            ctx,
            world,
            registry: EntityRegistry::new(),
            input,
            camera,
            hud,
            player: None,
            hitboxes_visible: false,
            ticks: 0,
        })
    }

    /// Build a scene whose input mapper listens to `source` with
    /// [`default_bindings`].
    pub fn attached(
        cfg: EngineConfig,
        ctx: SceneContext,
        source: Rc<dyn RawInputSource>,
    ) -> Result<Self> {
        let input = InputMapper::attach(source, default_bindings(), &cfg.input);
        Self::new(cfg, ctx, input)
    }

    /// Replace whatever is loaded with `level`. Missing textures fall back to
    /// the placeholder.
    pub fn load_level(&mut self, level: &LevelDesc, assets: &mut dyn AssetLoader) -> Result<()> {
        self.unload();

        let block_tex = texture_or_placeholder(assets, BLOCK_TEXTURE);
        let crate_tex = texture_or_placeholder(assets, CRATE_TEXTURE);
        let player_tex = texture_or_placeholder(assets, PLAYER_TEXTURE);

        for aabb in &level.blocks {
            let body = self.world.add_static_body(StaticBodyDesc::new(*aabb));
            let render = self.ctx.renderer.create_sprite(block_tex, aabb.size());
            self.ctx.renderer.place(render, aabb.min(), false);
            let id = self.registry.spawn("block", EntityData::Block { body, render }, &["solid"]);
            debug!(entity = %id, body = %body, "block spawned");
        }

        let crate_size = Vec2::splat(level.tile_size);
        for &at in &level.crates {
            let body = self.world.add_dynamic_body(DynamicBodyDesc::new(at, crate_size));
            let render = self.ctx.renderer.create_sprite(crate_tex, crate_size);
            let id = self
                .registry
                .spawn("crate", EntityData::Crate { body, render }, &["pushable"]);
            self.world.dynamic_body_mut(body)?.user_key = Some(id.0);
        }

        // Stand the player on the bottom edge of its spawn tile.
        let size = self.cfg.player.size;
        let spawn = level.player_spawn + Vec2::new(0.0, level.tile_size - size.y);
        let body = self.world.add_dynamic_body(DynamicBodyDesc::new(spawn, size));
        let render = self.ctx.renderer.create_sprite(player_tex, size);
        let player = self.registry.spawn(
            "player",
            EntityData::Player { body, render },
            &["controllable", "camera-target"],
        );
        self.world.dynamic_body_mut(body)?.user_key = Some(player.0);
        self.player = Some(player);

        self.camera.set_bounds(Some(level.bounds));
        self.camera.snap_to(spawn + size * 0.5);
        self.ctx.renderer.set_camera(self.camera.position);
        self.sync_render()?;

        info!(
            blocks = level.blocks.len(),
            crates = level.crates.len(),
            entities = self.registry.len(),
            "level loaded"
        );
        Ok(())
    }

    /// Release every entity's render handle and body, then forget it.
    pub fn unload(&mut self) {
        for entity in self.registry.drain() {
            self.ctx.renderer.destroy(entity.data.render());
        }
        self.world.clear();
        self.player = None;
    }

    /// Remove one entity: render handle first, then its body, then the record.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        let data = self.registry.get(id)?.data;
        self.ctx.renderer.destroy(data.render());
        if data.is_dynamic() {
            self.world.remove_dynamic_body(data.body())?;
        } else {
            self.world.remove_static_body(data.body())?;
        }
        self.registry.remove(id)?;
        if self.player == Some(id) {
            self.player = None;
        }
        debug!(entity = %id, "despawned");
        Ok(())
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    pub fn registry(&self) -> &EntityRegistry<EntityData> {
        &self.registry
    }

    pub fn input(&self) -> &InputMapper<GameAction> {
        &self.input
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn player(&self) -> Option<EntityId> {
        self.player
    }

    pub fn player_body(&self) -> Option<&DynamicBody> {
        let id = self.player?;
        let body = self.registry.get(id).ok()?.data.body();
        self.world.dynamic_body(body).ok()
    }

    pub fn hitboxes_visible(&self) -> bool {
        self.hitboxes_visible
    }

    /// Simulation steps taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn player_body_id(&self) -> Option<BodyId> {
        let id = self.player?;
        self.registry.get(id).ok().map(|e| e.data.body())
    }

    fn sync_render(&mut self) -> Result<()> {
        for entity in self.registry.iter() {
            if !entity.data.is_dynamic() {
                continue;
            }
            let body = self.world.dynamic_body(entity.data.body())?;
            self.ctx
                .renderer
                .place(entity.data.render(), body.position, body.on_ground());
        }
        Ok(())
    }

    fn tick(&mut self, dt: f32) -> Result<()> {
        let input = self.input.poll();

        if input.was_pressed(GameAction::ToggleHitboxes) {
            self.hitboxes_visible = !self.hitboxes_visible;
            self.ctx.renderer.set_hitboxes_visible(self.hitboxes_visible);
        }

        let player_body = self.player_body_id();
        let mut was_grounded = false;
        if let Some(body_id) = player_body {
            let dir = digital_axis(&self.input, GameAction::MoveLeft, GameAction::MoveRight);
            let body = self.world.dynamic_body_mut(body_id)?;
            was_grounded = body.on_ground();
            body.velocity.x = f32::from(dir) * self.cfg.player.move_speed;
            if input.was_pressed(GameAction::Jump) && body.on_ground() {
                body.velocity.y = -self.cfg.player.jump_speed;
                self.ctx.audio.play(JUMP_CUE);
            }
        }

        self.world.step(dt);
        self.sync_render()?;

        let mut player_state = None;
        if let Some(body_id) = player_body {
            let body = self.world.dynamic_body(body_id)?;
            if body.on_ground() && !was_grounded {
                self.ctx.audio.play(LAND_CUE);
            }
            self.camera.follow(body.aabb().center(), dt);
            self.ctx.renderer.set_camera(self.camera.position);
            player_state = Some((body.position, body.on_ground()));
        }

        let (player_pos, grounded) = player_state.unwrap_or((Vec2::ZERO, false));
        let camera = self.camera.position;
        let entity_count = self.registry.len();
        let hitboxes_visible = self.hitboxes_visible;
        self.hud.advance(dt, &mut *self.ctx.hud, |m| HudSnapshot {
            camera_x: camera.x,
            camera_y: camera.y,
            player_x: player_pos.x,
            player_y: player_pos.y,
            fps: m.fps,
            step_ms: m.step_ms,
            entity_count,
            grounded,
            hitboxes_visible,
        });
        Ok(())
    }
}

impl Simulation for Scene {
    // Registry and world are updated together, so a lookup failure here
    // means that pairing was broken from outside; the scheduler stops on it.
    fn step(&mut self, dt: f32) -> Result<()> {
        self.ticks += 1;
        self.tick(dt)
    }

    fn end_frame(&mut self, report: &FrameReport) {
        self.hud
            .record_frame(report.frame_time, report.stats.last_step_ms() as f32);
    }
}

fn texture_or_placeholder(assets: &mut dyn AssetLoader, id: &str) -> TextureHandle {
    match assets.texture(id) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(asset = id, %err, "texture unavailable, using placeholder");
            TextureHandle::PLACEHOLDER
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("entities", &self.registry.len())
            .field("player", &self.player)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
