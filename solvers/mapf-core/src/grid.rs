//! Rectangular grid of cells with walkability and neighbour lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One grid square. Identity is the `(x, y)` pair; `walkable` and
/// `traversal_cost` are the only mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Chebyshev (king-move) distance to another cell.
    pub fn chebyshev_distance(&self, other: &Cell) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs() as u32;
        let dy = (self.y as i64 - other.y as i64).unsigned_abs() as u32;
        dx.max(dy)
    }

    /// True if `self` and `other` are axis-aligned neighbours (not a wait).
    pub fn is_adjacent(&self, other: &Cell) -> bool {
        let dx = (self.x as i64 - other.x as i64).abs();
        let dy = (self.y as i64 - other.y as i64).abs();
        (dx == 1 && dy == 0) || (dx == 0 && dy == 1)
    }
}

/// A world-space point, floored and clamped into a `Cell` by `Grid::cell_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangular `W x H` grid of cells. Created once at startup and never
/// destroyed; bounds never shrink. Owns per-cell walkability and cost.
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    walkable: Vec<bool>,
    traversal_cost: Vec<u32>,
}

impl Grid {
    /// Create a grid where every cell is walkable with cost 1.
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            walkable: vec![true; len],
            traversal_cost: vec![1; len],
        }
    }

    /// Create a grid from a row-major walkability bitmap.
    pub fn from_walkable(width: u32, height: u32, walkable: Vec<bool>) -> Self {
        assert_eq!(walkable.len(), (width * height) as usize);
        let len = walkable.len();
        Self {
            width,
            height,
            walkable,
            traversal_cost: vec![1; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, cell: Cell) -> usize {
        (cell.y * self.width + cell.x) as usize
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Clamp a world point into a valid in-bounds cell. Never fails.
    pub fn cell_at(&self, point: WorldPoint) -> Cell {
        let x = point.x.floor().clamp(0.0, (self.width.max(1) - 1) as f64) as u32;
        let y = point.y.floor().clamp(0.0, (self.height.max(1) - 1) as f64) as u32;
        Cell { x, y }
    }

    pub fn is_walkable(&self, cell: Cell) -> bool {
        if !self.in_bounds(cell.x as i64, cell.y as i64) {
            return false;
        }
        self.walkable[self.index(cell)]
    }

    pub fn traversal_cost(&self, cell: Cell) -> u32 {
        self.traversal_cost[self.index(cell)]
    }

    pub fn set_walkable(&mut self, cell: Cell, walkable: bool) {
        let idx = self.index(cell);
        self.walkable[idx] = walkable;
    }

    pub fn set_traversal_cost(&mut self, cell: Cell, cost: u32) {
        let idx = self.index(cell);
        self.traversal_cost[idx] = cost;
    }

    /// The four axis-aligned in-bounds neighbours, in stable N/S/W/E order
    /// so A* iteration is deterministic.
    pub fn neighbours(&self, cell: Cell) -> Vec<Cell> {
        const DIRS: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
        let mut result = Vec::with_capacity(4);
        for (dx, dy) in DIRS {
            let nx = cell.x as i64 + dx;
            let ny = cell.y as i64 + dy;
            if self.in_bounds(nx, ny) {
                result.push(Cell::new(nx as u32, ny as u32));
            }
        }
        result
    }

    /// Flip walkability of `blocks` to `false` for the duration of `f`, then
    /// restore exactly — including when `f` returns an error. Provided for
    /// migration compatibility; new code should pass an overlay block set
    /// to the Planner directly instead (see mapf-planner).
    pub fn with_temporary_blocks<T>(&mut self, blocks: &HashSet<Cell>, f: impl FnOnce(&Grid) -> T) -> T {
        let previous: Vec<(Cell, bool)> = blocks
            .iter()
            .filter(|c| self.in_bounds(c.x as i64, c.y as i64))
            .map(|&c| (c, self.is_walkable(c)))
            .collect();
        for &(cell, _) in &previous {
            self.set_walkable(cell, false);
        }

        // Restore on every exit path, including a panic unwinding through `f`.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(self)));

        for (cell, was_walkable) in previous {
            self.set_walkable(cell, was_walkable);
        }

        match result {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_at_clamps_out_of_range_points() {
        let grid = Grid::new(5, 5);
        assert_eq!(grid.cell_at(WorldPoint::new(-3.0, 100.0)), Cell::new(0, 4));
        assert_eq!(grid.cell_at(WorldPoint::new(2.7, 2.1)), Cell::new(2, 2));
    }

    #[test]
    fn neighbours_are_4_connected_and_in_order() {
        let grid = Grid::new(3, 3);
        let n = grid.neighbours(Cell::new(1, 1));
        assert_eq!(n, vec![Cell::new(1, 0), Cell::new(1, 2), Cell::new(0, 1), Cell::new(2, 1)]);
    }

    #[test]
    fn neighbours_skip_out_of_bounds() {
        let grid = Grid::new(3, 3);
        let n = grid.neighbours(Cell::new(0, 0));
        assert_eq!(n, vec![Cell::new(0, 1), Cell::new(1, 0)]);
    }

    #[test]
    fn with_temporary_blocks_restores_walkability_on_every_exit() {
        let mut grid = Grid::new(3, 3);
        let cell = Cell::new(1, 1);
        let blocks = HashSet::from([cell]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            grid.with_temporary_blocks(&blocks, |g| {
                assert!(!g.is_walkable(cell));
                panic!("simulated failure mid-closure");
            })
        }));
        assert!(result.is_err());
        assert!(grid.is_walkable(cell), "walkability must be restored even after a panic");
    }

    #[test]
    fn is_walkable_false_for_out_of_bounds() {
        let grid = Grid::new(3, 3);
        assert!(!grid.is_walkable(Cell::new(10, 10)));
    }
}
