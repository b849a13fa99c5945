//! Uniform-grid broadphase.
//!
//! Items are binned into every cell their box touches, computed by flooring
//! `x / cell_size` through `(x + width) / cell_size` inclusive (same for y).
//! Queries return candidates sharing a cell; callers still run an exact test.
//! Both area queries and ray walks are clipped to the populated extent of the
//! grid, so their cost does not grow with how far past the content they reach.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use glam::Vec2;

use crate::error::{Error, Result};
use crate::types::Aabb;

/// Inclusive cell rectangle `(ix0, iy0) ..= (ix1, iy1)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub min: (i32, i32),
    pub max: (i32, i32),
}

impl CellRange {
    pub fn cells(self) -> impl Iterator<Item = (i32, i32)> {
        (self.min.1..=self.max.1)
            .flat_map(move |iy| (self.min.0..=self.max.0).map(move |ix| (ix, iy)))
    }

    pub fn union(self, other: CellRange) -> CellRange {
        CellRange {
            min: (self.min.0.min(other.min.0), self.min.1.min(other.min.1)),
            max: (self.max.0.max(other.max.0), self.max.1.max(other.max.1)),
        }
    }

    pub fn intersect(self, other: CellRange) -> Option<CellRange> {
        let min = (self.min.0.max(other.min.0), self.min.1.max(other.min.1));
        let max = (self.max.0.min(other.max.0), self.max.1.min(other.max.1));
        (min.0 <= max.0 && min.1 <= max.1).then_some(CellRange { min, max })
    }

    pub fn contains(self, cell: (i32, i32)) -> bool {
        (self.min.0..=self.max.0).contains(&cell.0) && (self.min.1..=self.max.1).contains(&cell.1)
    }
}

pub struct SpatialHash<T> {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<T>>,
    // Range recorded at insertion so removal touches exactly the same cells
    ranges: HashMap<T, CellRange>,
    // Union of all recorded ranges
    extent: Option<CellRange>,
}

impl<T: Copy + Eq + Hash + Ord> SpatialHash<T> {
    pub fn new(cell_size: f32) -> Result<Self> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "cell size must be positive and finite, got {cell_size}"
            )));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            ranges: HashMap::new(),
            extent: None,
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_range(&self, area: &Aabb) -> CellRange {
        CellRange {
            min: self.world_to_cell(area.min()),
            max: self.world_to_cell(area.max()),
        }
    }

    fn world_to_cell(&self, p: Vec2) -> (i32, i32) {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
        )
    }

    /// Insert `item` into every cell `aabb` overlaps. Re-adding an item first
    /// removes its previous insertion.
    pub fn add(&mut self, item: T, aabb: &Aabb) {
        self.remove(item);
        let range = self.cell_range(aabb);
        for cell in range.cells() {
            self.cells.entry(cell).or_default().push(item);
        }
        self.ranges.insert(item, range);
        self.extent = Some(self.extent.map_or(range, |e| e.union(range)));
    }

    /// Undo the insertion performed by [`add`](Self::add). Returns false if
    /// the item was not present.
    pub fn remove(&mut self, item: T) -> bool {
        let Some(range) = self.ranges.remove(&item) else {
            return false;
        };
        for cell in range.cells() {
            if let Some(list) = self.cells.get_mut(&cell) {
                list.retain(|&other| other != item);
                if list.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        self.extent = self.ranges.values().copied().reduce(CellRange::union);
        true
    }

    /// Deduplicated candidates from every cell `area` touches, in ascending
    /// order so callers iterate deterministically.
    pub fn query(&self, area: &Aabb) -> Vec<T> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let Some(range) = self
            .extent
            .and_then(|extent| self.cell_range(area).intersect(extent))
        else {
            return out;
        };
        for cell in range.cells() {
            if let Some(list) = self.cells.get(&cell) {
                for &item in list {
                    if seen.insert(item) {
                        out.push(item);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Walk the cells crossed by `origin + dir * t` for `t` in `[0, max_t]`
    /// in order of travel (a grid DDA), clipped to the populated extent, so
    /// `max_t` may be infinite. `visit` receives each non-empty cell's items
    /// and the `t` at which the ray leaves that cell; returning false stops
    /// the walk. Items spanning several cells are seen once per cell.
    pub fn walk_ray<F>(&self, origin: Vec2, dir: Vec2, max_t: f32, mut visit: F)
    where
        F: FnMut(&[T], f32) -> bool,
    {
        let Some(extent) = self.extent else {
            return;
        };
        if dir == Vec2::ZERO || !(max_t >= 0.0) || !origin.is_finite() || !dir.is_finite() {
            return;
        }
        let cs = self.cell_size;
        let lo = Vec2::new(extent.min.0 as f32, extent.min.1 as f32) * cs;
        let hi = Vec2::new(extent.max.0 as f32 + 1.0, extent.max.1 as f32 + 1.0) * cs;

        // Clip [0, max_t] to the populated rectangle
        let (mut t0, mut t1) = (0.0f32, max_t);
        for (o, d, lo, hi) in [(origin.x, dir.x, lo.x, hi.x), (origin.y, dir.y, lo.y, hi.y)] {
            if d == 0.0 {
                if o < lo || o > hi {
                    return;
                }
                continue;
            }
            let (a, b) = ((lo - o) / d, (hi - o) / d);
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
        }
        if !(t0 <= t1) {
            return;
        }

        let (cx, cy) = self.world_to_cell(origin + dir * t0);
        let mut cell = (
            cx.clamp(extent.min.0, extent.max.0),
            cy.clamp(extent.min.1, extent.max.1),
        );
        // (cell step, t of the next boundary crossing, t per cell)
        let axis = |o: f32, d: f32, i: i32| -> (i32, f32, f32) {
            if d > 0.0 {
                (1, ((i as f32 + 1.0) * cs - o) / d, cs / d)
            } else if d < 0.0 {
                (-1, (i as f32 * cs - o) / d, -cs / d)
            } else {
                (0, f32::INFINITY, f32::INFINITY)
            }
        };
        let (step_x, mut next_x, per_x) = axis(origin.x, dir.x, cell.0);
        let (step_y, mut next_y, per_y) = axis(origin.y, dir.y, cell.1);

        loop {
            let leave = next_x.min(next_y).min(t1);
            if let Some(items) = self.cells.get(&cell) {
                if !visit(items, leave) {
                    return;
                }
            }
            if leave >= t1 {
                return;
            }
            if next_x < next_y {
                cell.0 += step_x;
                next_x += per_x;
            } else {
                cell.1 += step_y;
                next_y += per_y;
            }
            if !extent.contains(cell) {
                return;
            }
        }
    }

    pub fn query_point(&self, p: Vec2) -> Vec<T> {
        let mut out = self
            .cells
            .get(&self.world_to_cell(p))
            .cloned()
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn contains(&self, item: T) -> bool {
        self.ranges.contains_key(&item)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.ranges.clear();
        self.extent = None;
    }
}
