//! Single-agent A* planner (spec §4.2).
//!
//! Pure and stateless: never mutates the Grid except through
//! [`Grid::with_temporary_blocks`], kept only for migration compatibility
//! (spec §9). New code passes the transient block set as an overlay
//! parameter instead, so a caller driving many plans per tick never has to
//! reason about restoring shared state.

use mapf_core::{Cell, Grid, Path};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;

/// Step cost for an axis-aligned move, matching the teacher's decision to
/// scale Manhattan distance by 10 rather than mixing in a true-diagonal `14`
/// that this 4-connected grid never uses.
const STEP_COST: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("no path exists from start to goal under the current blocks")]
    NoPathFound,
    #[error("search exhausted its expansion budget ({0} expansions)")]
    SearchExhausted(u32),
}

/// Bounded single-agent shortest-path search over a [`Grid`].
pub struct Planner {
    expansion_cap: u32,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl Planner {
    pub fn new(expansion_cap: u32) -> Self {
        Self { expansion_cap }
    }

    /// Find the shortest cell-sequence from `start` to `goal`, treating
    /// cells in `blocked` as not walkable regardless of the Grid's own
    /// walkability. Returns [`PlannerError::NoPathFound`] if the goal is
    /// unreachable, or [`PlannerError::SearchExhausted`] if the expansion
    /// cap is hit first.
    pub fn find(&self, grid: &Grid, start: Cell, goal: Cell, blocked: &HashSet<Cell>) -> Result<Path, PlannerError> {
        let walkable = |cell: Cell| grid.is_walkable(cell) && !blocked.contains(&cell);

        if start == goal {
            return Ok(Path::single(start));
        }
        if !walkable(goal) {
            return Err(PlannerError::NoPathFound);
        }

        let mut open: BinaryHeap<Node> = BinaryHeap::new();
        let mut came_from: HashMap<Cell, Cell> = HashMap::new();
        let mut g_score: HashMap<Cell, u32> = HashMap::new();
        let mut order: u64 = 0;

        g_score.insert(start, 0);
        open.push(Node {
            cell: start,
            f_cost: heuristic(start, goal),
            h_cost: heuristic(start, goal),
            insertion_order: order,
        });

        let mut expansions: u32 = 0;

        while let Some(current) = open.pop() {
            if current.cell == goal {
                return Ok(retrace(&came_from, start, goal));
            }

            expansions += 1;
            if expansions > self.expansion_cap {
                return Err(PlannerError::SearchExhausted(self.expansion_cap));
            }

            let current_g = g_score[&current.cell];
            for neighbour in grid.neighbours(current.cell) {
                if !walkable(neighbour) {
                    continue;
                }
                let tentative_g = current_g + STEP_COST;
                if tentative_g < *g_score.get(&neighbour).unwrap_or(&u32::MAX) {
                    came_from.insert(neighbour, current.cell);
                    g_score.insert(neighbour, tentative_g);
                    order += 1;
                    let h_cost = heuristic(neighbour, goal);
                    open.push(Node {
                        cell: neighbour,
                        f_cost: tentative_g + h_cost,
                        h_cost,
                        insertion_order: order,
                    });
                }
            }
        }

        Err(PlannerError::NoPathFound)
    }
}

/// Retrace parent pointers from goal to start, then reverse.
fn retrace(came_from: &HashMap<Cell, Cell>, start: Cell, goal: Cell) -> Path {
    let mut cells = vec![goal];
    let mut current = goal;
    while current != start {
        current = came_from[&current];
        cells.push(current);
    }
    cells.reverse();
    Path::new(cells)
}

/// Manhattan distance scaled by [`STEP_COST`] — an admissible lower bound on
/// the sum-of-step cost for a 4-connected grid (spec §4.2).
fn heuristic(from: Cell, to: Cell) -> u32 {
    let dx = (from.x as i64 - to.x as i64).unsigned_abs() as u32;
    let dy = (from.y as i64 - to.y as i64).unsigned_abs() as u32;
    (dx + dy) * STEP_COST
}

/// Open-set entry. Ordered for a min-heap on `(f, h, insertion_order)` —
/// lower `f` first, ties broken by lower `h`, remaining ties broken by
/// insertion order so iteration is deterministic (spec §4.2).
#[derive(Clone, Eq, PartialEq)]
struct Node {
    cell: Cell,
    f_cost: u32,
    h_cost: u32,
    insertion_order: u64,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.h_cost.cmp(&self.h_cost))
            .then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
