//! Aggregate engine configuration.
//!
//! Every section has defaults, so a JSON document only needs the fields it
//! changes:
//!
//! ```
//! let cfg = nohop::config::EngineConfig::from_json_str(r#"{ "step": { "hz": 120.0 } }"#).unwrap();
//! assert_eq!(cfg.step.hz, 120.0);
//! assert_eq!(cfg.world.cell_size, 64.0);
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::camera::CameraConfig;
use crate::error::{Error, Result};
use crate::fixed_step::FixedStepConfig;
use crate::hud::HudConfig;
use crate::input::InputConfig;
use crate::types::WorldConfig;

/// Player controller feel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    /// Horizontal speed while a move action is held (units/s).
    pub move_speed: f32,
    /// Upward speed set by a jump (units/s).
    pub jump_speed: f32,
    pub size: Vec2,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            move_speed: 220.0,
            jump_speed: 560.0,
            size: Vec2::new(24.0, 32.0),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldConfig,
    pub step: FixedStepConfig,
    pub input: InputConfig,
    pub hud: HudConfig,
    pub camera: CameraConfig,
    pub player: PlayerTuning,
}

impl EngineConfig {
    /// Parse and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let cell = self.world.cell_size;
        if !(cell > 0.0 && cell.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "world.cell_size must be positive and finite, got {cell}"
            )));
        }
        if !self.world.gravity.is_finite() {
            return Err(Error::InvalidConfig("world.gravity must be finite".to_owned()));
        }
        self.step.validate()?;
        if !(0.0..1.0).contains(&self.input.axis_deadzone) {
            return Err(Error::InvalidConfig(format!(
                "input.axis_deadzone must be in [0, 1), got {}",
                self.input.axis_deadzone
            )));
        }
        if !(self.hud.interval >= 0.0 && self.hud.interval.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "hud.interval must be non-negative, got {}",
                self.hud.interval
            )));
        }
        if !(self.camera.viewport.cmpgt(Vec2::ZERO).all() && self.camera.viewport.is_finite()) {
            return Err(Error::InvalidConfig("camera.viewport must be positive".to_owned()));
        }
        if !(self.player.size.cmpgt(Vec2::ZERO).all() && self.player.size.is_finite()) {
            return Err(Error::InvalidConfig("player.size must be positive".to_owned()));
        }
        if !(self.player.move_speed.is_finite() && self.player.jump_speed.is_finite()) {
            return Err(Error::InvalidConfig("player speeds must be finite".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "world": { "gravity": [0.0, 900.0] }, "player": { "jump_speed": 400.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.world.gravity, Vec2::new(0.0, 900.0));
        assert_eq!(cfg.world.cell_size, 64.0);
        assert_eq!(cfg.player.jump_speed, 400.0);
        assert_eq!(cfg.player.move_speed, 220.0);
        assert_eq!(cfg.step.hz, 60.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "step": { "hz": 0.0 } }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "world": { "cell_size": -4.0 } }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "input": { "axis_deadzone": 1.5 } }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut cfg = EngineConfig::default();
        cfg.step.hz = 30.0;
        let json = cfg.to_json_pretty().unwrap();
        let back = EngineConfig::from_json_str(&json).unwrap();
        assert_eq!(back.step.hz, 30.0);
    }
}
