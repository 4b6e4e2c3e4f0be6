//! Planned cell-by-cell future for an agent.

use crate::grid::{Cell, Grid};
use serde::{Deserialize, Serialize};

/// Finite ordered sequence of cells. A repeated cell at index `i` equal to
/// index `i-1` encodes a wait-in-place step. Invariants (checked by
/// [`Path::validate`], not enforced at construction so the Resolver can
/// build intermediate candidates cheaply): non-empty when assigned,
/// consecutive cells equal (wait) or 4-neighbours, all non-wait cells
/// walkable at assignment time, last cell is the current waypoint target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Path {
    pub cells: Vec<Cell>,
}

/// A broken Path invariant, as enumerated in the data model (Path entry, §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathInvariantError {
    #[error("path step {0} is neither a wait nor a 4-neighbour move")]
    NonAdjacentStep(usize),
    #[error("path step {0} lands on a non-walkable cell")]
    UnwalkableStep(usize),
}

impl Path {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn single(cell: Cell) -> Self {
        Self { cells: vec![cell] }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// The 1-based step index of `cell` within this path, if present. Steps
    /// are interpreted as the tick at which the agent occupies that cell.
    pub fn step_of(&self, cell: Cell) -> Option<usize> {
        self.cells.iter().position(|&c| c == cell).map(|i| i + 1)
    }

    /// The cell occupied at 1-based `step`, holding position past the end
    /// of the path (an agent that finished its plan stays at its last cell).
    pub fn at_step(&self, step: usize) -> Option<Cell> {
        if self.cells.is_empty() {
            return None;
        }
        let idx = (step.saturating_sub(1)).min(self.cells.len() - 1);
        Some(self.cells[idx])
    }

    pub fn last(&self) -> Option<Cell> {
        self.cells.last().copied()
    }

    /// Prefix the path with `count` wait steps at its current first cell
    /// (or a no-op if the path is empty), encoding a wait-permutation
    /// scenario (§4.4).
    pub fn with_leading_waits(&self, count: usize) -> Path {
        let Some(&first) = self.cells.first() else {
            return self.clone();
        };
        let mut cells = Vec::with_capacity(self.cells.len() + count);
        cells.extend(std::iter::repeat(first).take(count));
        cells.extend_from_slice(&self.cells);
        Path::new(cells)
    }

    /// Check the Path invariants against a grid's current walkability.
    pub fn validate(&self, grid: &Grid) -> Result<(), PathInvariantError> {
        for (i, window) in self.cells.windows(2).enumerate() {
            let (a, b) = (window[0], window[1]);
            if a != b && !a.is_adjacent(&b) {
                return Err(PathInvariantError::NonAdjacentStep(i + 1));
            }
        }
        for (i, &cell) in self.cells.iter().enumerate() {
            if i > 0 && self.cells[i - 1] == cell {
                continue; // wait step, walkability already checked on first occupancy
            }
            if !grid.is_walkable(cell) {
                return Err(PathInvariantError::UnwalkableStep(i));
            }
        }
        Ok(())
    }

    /// Total path cost under the §4.2 cost model (10 per step, 0 for a
    /// single-cell path already at goal).
    pub fn cost(&self) -> u32 {
        self.cells.len().saturating_sub(1) as u32 * 10
    }
}
