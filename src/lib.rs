//! nohop: fixed-step 2D kinematic micro-runtime (AABB bodies, axis-separated
//! resolution, uniform-grid broadphase, action mapping, throttled HUD)

pub mod types;
pub mod api;
pub mod error;
pub mod narrowphase;
pub mod spatial_hash;
pub mod world;
pub mod fixed_step;
pub mod input;
pub mod registry;
pub mod hud;
pub mod camera;
pub mod level;
pub mod config;
pub mod scene;
pub mod host;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::error::{AssetError, Error, Result};
pub use crate::world::PhysicsWorld;
pub use crate::spatial_hash::SpatialHash;
pub use crate::fixed_step::{
    FixedStep, FixedStepConfig, FixedStepHandle, FixedStepStats, FrameReport, Simulation, start,
};
pub use crate::input::{
    Action, Binding, InputConfig, InputMapper, InputSnapshot, RawCode, RawEvent, digital_axis,
};
pub use crate::registry::{Entity, EntityId, EntityRegistry};
pub use crate::config::EngineConfig;
