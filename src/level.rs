//! Level layout: solid geometry, a player spawn and crate spawns.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Aabb;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelDesc {
    pub tile_size: f32,
    /// Top-left of the player's spawn tile.
    pub player_spawn: Vec2,
    /// Static geometry.
    pub blocks: Vec<Aabb>,
    /// Top-left of each crate's spawn tile.
    pub crates: Vec<Vec2>,
    pub bounds: Aabb,
}

impl LevelDesc {
    /// Parse a tile map, one string per row:
    ///
    /// - `#` solid tile
    /// - `P` player spawn (exactly one)
    /// - `C` crate spawn
    /// - `.` or space: empty
    ///
    /// Horizontal runs of `#` become a single static box.
    pub fn from_ascii(rows: &[&str], tile_size: f32) -> Result<Self> {
        if !(tile_size > 0.0 && tile_size.is_finite()) {
            return Err(Error::InvalidLevel(format!(
                "tile size must be positive, got {tile_size}"
            )));
        }

        let mut player_spawn = None;
        let mut blocks = Vec::new();
        let mut crates = Vec::new();
        let mut columns = 0usize;

        for (row, line) in rows.iter().enumerate() {
            let y = row as f32 * tile_size;
            let mut run_start: Option<usize> = None;
            let mut col = 0usize;
            for ch in line.chars() {
                match ch {
                    '#' => {
                        run_start.get_or_insert(col);
                    }
                    other => {
                        if let Some(start) = run_start.take() {
                            blocks.push(run_box(start, col, y, tile_size));
                        }
                        let at = Vec2::new(col as f32 * tile_size, y);
                        match other {
                            'P' => {
                                if player_spawn.replace(at).is_some() {
                                    return Err(Error::InvalidLevel(format!(
                                        "second player spawn at row {row}, column {col}"
                                    )));
                                }
                            }
                            'C' => crates.push(at),
                            '.' | ' ' => {}
                            unknown => {
                                return Err(Error::InvalidLevel(format!(
                                    "unknown tile {unknown:?} at row {row}, column {col}"
                                )));
                            }
                        }
                    }
                }
                col += 1;
            }
            if let Some(start) = run_start {
                blocks.push(run_box(start, col, y, tile_size));
            }
            columns = columns.max(col);
        }

        let player_spawn =
            player_spawn.ok_or_else(|| Error::InvalidLevel("no player spawn".to_owned()))?;
        let bounds = Aabb::new(
            0.0,
            0.0,
            columns as f32 * tile_size,
            rows.len() as f32 * tile_size,
        );
        debug!(
            blocks = blocks.len(),
            crates = crates.len(),
            width = bounds.width,
            height = bounds.height,
            "level parsed"
        );
        Ok(Self {
            tile_size,
            player_spawn,
            blocks,
            crates,
            bounds,
        })
    }
}

fn run_box(start: usize, end: usize, y: f32, tile: f32) -> Aabb {
    Aabb::new(start as f32 * tile, y, (end - start) as f32 * tile, tile)
}
