use thiserror::Error;

use crate::registry::EntityId;
use crate::types::BodyId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("body {0} not found")]
    BodyNotFound(BodyId),
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("entity {0} is already registered")]
    DuplicateEntity(EntityId),
    #[error("fixed-step controller has been detached")]
    Detached,
    #[error("invalid level: {0}")]
    InvalidLevel(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Failure reported by an [`AssetLoader`](crate::api::AssetLoader). The scene
/// degrades these to a placeholder texture; they never reach the step loop.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset `{0}` is unknown")]
    Unknown(String),
    #[error("asset `{id}` failed to load: {reason}")]
    Load { id: String, reason: String },
}
