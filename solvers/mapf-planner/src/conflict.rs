//! Conflict detection over a set of active assignments (spec §4.3).
//!
//! Generalizes the donor's one-shot path validator
//! (`backend/src/validation.rs`: `validate_no_vertex_collisions`,
//! `validate_no_edge_collisions`) from a flat `Vec<ValidationError>` used to
//! reject a single submitted solution into a grouped, ordered `Conflict`
//! list the Resolver consumes per conflict. Both share the same
//! past-path-end semantics: an agent with an exhausted Path holds its last
//! cell for collision purposes.

use mapf_core::{Cell, Path};
use std::collections::{BTreeMap, HashMap};

/// Kind of conflict between two or more agents' plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    Vertex,
    Swap,
    WarehouseExclusion,
}

/// One conflict, naming the cell, step and agents involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub cell: Cell,
    /// `None` encodes the warehouse-exclusion sentinel step: the condition
    /// is re-evaluated every tick rather than meaning "forever" (spec §4.3,
    /// open question resolved in DESIGN.md).
    pub step: Option<usize>,
    pub involved: Vec<String>,
    pub kind: ConflictKind,
}

/// A warehouse anchor cell and the agent currently docking there, used to
/// evaluate WarehouseExclusion conflicts for the current tick.
#[derive(Debug, Clone, Copy)]
pub struct WarehouseAnchor {
    pub anchor: Cell,
}

/// Detects Vertex, Swap and WarehouseExclusion conflicts across a set of
/// agent -> Path assignments. Pure function of its inputs; produces a new
/// owned `Vec<Conflict>` ordered by ascending step, then cell, then kind.
pub struct ConflictDetector<'a> {
    anchors: &'a [WarehouseAnchor],
}

impl<'a> ConflictDetector<'a> {
    pub fn new(anchors: &'a [WarehouseAnchor]) -> Self {
        Self { anchors }
    }

    pub fn detect(&self, assignments: &BTreeMap<String, Path>) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        conflicts.extend(self.vertex_conflicts(assignments));
        conflicts.extend(self.swap_conflicts(assignments));
        conflicts.extend(self.warehouse_conflicts(assignments));
        conflicts.sort_by(|a, b| {
            step_sort_key(a.step)
                .cmp(&step_sort_key(b.step))
                .then_with(|| (a.cell.x, a.cell.y).cmp(&(b.cell.x, b.cell.y)))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        conflicts
    }

    fn vertex_conflicts(&self, assignments: &BTreeMap<String, Path>) -> Vec<Conflict> {
        let max_step = assignments.values().map(|p| p.len()).max().unwrap_or(0);
        let mut out = Vec::new();

        for step in 1..=max_step {
            let mut occupants: HashMap<Cell, Vec<String>> = HashMap::new();
            for (agent_id, path) in assignments {
                if path.is_empty() {
                    continue;
                }
                if let Some(cell) = path.at_step(step) {
                    occupants.entry(cell).or_default().push(agent_id.clone());
                }
            }
            for (cell, agents) in occupants {
                if agents.len() >= 2 {
                    out.push(Conflict {
                        cell,
                        step: Some(step),
                        involved: agents,
                        kind: ConflictKind::Vertex,
                    });
                }
            }
        }
        out
    }

    fn swap_conflicts(&self, assignments: &BTreeMap<String, Path>) -> Vec<Conflict> {
        let ids: Vec<&String> = assignments.keys().collect();
        let max_step = assignments.values().map(|p| p.len()).max().unwrap_or(0);
        let mut out = Vec::new();

        for step in 1..=max_step.max(1) {
            if step < 1 {
                continue;
            }
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    let a = &assignments[ids[i]];
                    let b = &assignments[ids[j]];
                    if a.is_empty() || b.is_empty() {
                        continue;
                    }
                    let (Some(a_prev), Some(a_cur), Some(b_prev), Some(b_cur)) =
                        (a.at_step(step - 1), a.at_step(step), b.at_step(step - 1), b.at_step(step))
                    else {
                        continue;
                    };
                    if step >= 2 && a_prev == b_cur && b_prev == a_cur && a_prev != a_cur {
                        out.push(Conflict {
                            cell: a_cur,
                            step: Some(step),
                            involved: vec![ids[i].clone(), ids[j].clone()],
                            kind: ConflictKind::Swap,
                        });
                    }
                }
            }
        }
        out
    }

    /// Warehouse anchors reserve their 3x3 Chebyshev neighbourhood for the
    /// agent docking there, for as long as that agent is within Chebyshev
    /// distance 1 of the anchor this tick (spec §4.3, open question).
    fn warehouse_conflicts(&self, assignments: &BTreeMap<String, Path>) -> Vec<Conflict> {
        let mut out = Vec::new();

        for anchor in self.anchors {
            let docking_agent = assignments.iter().find(|(_, path)| {
                path.last() == Some(anchor.anchor)
                    && path.cells.first().map(|c| c.chebyshev_distance(&anchor.anchor) <= 1).unwrap_or(false)
            });
            let Some((docking_id, _)) = docking_agent else {
                continue;
            };
            let box_cells = reserved_box(anchor.anchor);

            // One conflict per intruding cell (not per anchor): the
            // conflict's `cell` feeds directly into the resolver's
            // single-cell block-set scenarios (§4.4), so a reroute that
            // clears one intruding cell but not another surfaces as a
            // fresh conflict on the next detection pass rather than being
            // silently left in place.
            for &box_cell in &box_cells {
                for (agent_id, path) in assignments {
                    if agent_id == docking_id {
                        continue;
                    }
                    if path.cells.contains(&box_cell) {
                        out.push(Conflict {
                            cell: box_cell,
                            step: None,
                            involved: vec![docking_id.clone(), agent_id.clone()],
                            kind: ConflictKind::WarehouseExclusion,
                        });
                    }
                }
            }
        }
        out
    }
}

pub(crate) fn reserved_box(anchor: Cell) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(9);
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let x = anchor.x as i64 + dx;
            let y = anchor.y as i64 + dy;
            if x >= 0 && y >= 0 {
                cells.push(Cell::new(x as u32, y as u32));
            }
        }
    }
    cells
}

/// Sort key putting the warehouse-exclusion sentinel step last.
fn step_sort_key(step: Option<usize>) -> usize {
    step.unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignments(pairs: Vec<(&str, Vec<Cell>)>) -> BTreeMap<String, Path> {
        pairs.into_iter().map(|(id, cells)| (id.to_string(), Path::new(cells))).collect()
    }

    #[test]
    fn detects_vertex_conflict_at_junction() {
        let a = assignments(vec![
            ("A", vec![Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]),
            ("B", vec![Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3)]),
        ]);
        let detector = ConflictDetector::new(&[]);
        let conflicts = detector.detect(&a);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Vertex);
        assert_eq!(conflicts[0].step, Some(3));
        assert_eq!(conflicts[0].cell, Cell::new(2, 2));
    }

    #[test]
    fn detects_swap_conflict() {
        let a = assignments(vec![
            ("A", vec![Cell::new(1, 0), Cell::new(2, 0)]),
            ("B", vec![Cell::new(2, 0), Cell::new(1, 0)]),
        ]);
        let detector = ConflictDetector::new(&[]);
        let conflicts = detector.detect(&a);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Swap);
    }

    #[test]
    fn no_conflict_for_disjoint_paths() {
        let a = assignments(vec![
            ("A", vec![Cell::new(0, 0), Cell::new(1, 0)]),
            ("B", vec![Cell::new(0, 5), Cell::new(1, 5)]),
        ]);
        let detector = ConflictDetector::new(&[]);
        assert!(detector.detect(&a).is_empty());
    }

    #[test]
    fn detects_warehouse_exclusion() {
        let anchors = [WarehouseAnchor { anchor: Cell::new(5, 5) }];
        let a = assignments(vec![
            ("A", vec![Cell::new(5, 4), Cell::new(5, 5)]),
            ("B", vec![Cell::new(0, 5), Cell::new(4, 5), Cell::new(5, 5), Cell::new(9, 5)]),
        ]);
        let detector = ConflictDetector::new(&anchors);
        let conflicts = detector.detect(&a);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::WarehouseExclusion));
    }

    #[test]
    fn warehouse_exclusion_does_not_trigger_while_still_far_from_the_anchor() {
        // A's path *ends* at the anchor but A hasn't moved there yet (its
        // current cell, cells[0], is still far away) — the exclusion must
        // only protect the box once A is actually within Chebyshev 1 of it.
        let anchors = [WarehouseAnchor { anchor: Cell::new(5, 5) }];
        let a = assignments(vec![
            ("A", vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0), Cell::new(5, 5)]),
            ("B", vec![Cell::new(0, 5), Cell::new(4, 5), Cell::new(5, 5), Cell::new(9, 5)]),
        ]);
        let detector = ConflictDetector::new(&anchors);
        let conflicts = detector.detect(&a);
        assert!(!conflicts.iter().any(|c| c.kind == ConflictKind::WarehouseExclusion));
    }

    #[test]
    fn deterministic_ordering_step_then_cell_then_kind() {
        let a = assignments(vec![
            ("A", vec![Cell::new(0, 0), Cell::new(1, 0)]),
            ("B", vec![Cell::new(1, 0), Cell::new(0, 0)]),
        ]);
        let detector = ConflictDetector::new(&[]);
        let conflicts = detector.detect(&a);
        // Step 1 has a vertex conflict at (1,0)/(0,0) concurrently plus the swap at step 1.
        assert!(conflicts.windows(2).all(|w| {
            let (sa, sb) = (step_sort_key(w[0].step), step_sort_key(w[1].step));
            sa < sb || (sa == sb && (w[0].cell.x, w[0].cell.y) <= (w[1].cell.x, w[1].cell.y))
        }));
    }
}
