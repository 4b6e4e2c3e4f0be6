//! Combinatorial scenario conflict resolver with recursive repair (spec §4.4).

use crate::astar::Planner;
use crate::conflict::{reserved_box, Conflict, ConflictDetector, ConflictKind, WarehouseAnchor};
use mapf_core::{Cell, Grid, Path};
use std::collections::{BTreeMap, HashSet};

/// A candidate partial reassignment restricted to the agents involved in
/// one conflict.
type Scenario = BTreeMap<String, Path>;

/// Outcome of a resolution pass.
pub struct ResolutionOutcome {
    pub assignments: BTreeMap<String, Path>,
    /// Set when the depth cap was hit with residual conflicts (spec §7
    /// `ResolutionExhausted`); residual conflicts are tolerated and
    /// re-attempted next tick.
    pub exhausted: bool,
    /// Conflicts for which no candidate scenario resolved anything, from
    /// the final iteration attempted. Empty unless `exhausted`. This crate
    /// is pure/no-IO (no `tracing` dependency); the caller owning the
    /// logging stack (the supervisor crate) is expected to log these.
    pub unresolved_conflicts: Vec<Conflict>,
    /// Set if `wait_permutations` stopped enumerating at `scenario_cap`
    /// for any conflict during this resolution pass (spec §4.4
    /// combinatorics note: "do not silently truncate"). Surfaced here
    /// rather than logged in-crate for the same reason as
    /// `unresolved_conflicts`.
    pub scenario_cap_hit: bool,
}

/// Given a Grid, the current assignments, and an ordered conflict list,
/// produces new assignments such that re-running [`ConflictDetector`] on
/// them is empty, or returns the input unchanged with `exhausted = true`
/// after reaching the recursion depth cap.
pub struct ConflictResolver {
    planner: Planner,
    depth_cap: u32,
    /// Explicit safety bound on scenarios enumerated per conflict (spec
    /// §4.4 combinatorics note: "the implementation must enumerate these
    /// lazily and may cut off if total scenarios exceed a configurable
    /// safety bound").
    scenario_cap: usize,
}

impl ConflictResolver {
    pub fn new(planner: Planner, depth_cap: u32, scenario_cap: usize) -> Self {
        Self { planner, depth_cap, scenario_cap }
    }

    pub fn resolve(&self, grid: &Grid, assignments: &BTreeMap<String, Path>, anchors: &[WarehouseAnchor]) -> ResolutionOutcome {
        let detector = ConflictDetector::new(anchors);
        let mut current = assignments.clone();

        let mut scenario_cap_hit = false;

        for _depth in 0..self.depth_cap {
            let conflicts = detector.detect(&current);
            if conflicts.is_empty() {
                return ResolutionOutcome { assignments: current, exhausted: false, unresolved_conflicts: Vec::new(), scenario_cap_hit };
            }

            let mut pending = current.clone();
            let mut made_progress = false;
            let mut unresolved = Vec::new();

            for conflict in &conflicts {
                let (scenario, truncated) = self.best_scenario(grid, &pending, conflict, &detector, anchors);
                scenario_cap_hit |= truncated;
                if let Some(scenario) = scenario {
                    for (agent_id, path) in scenario {
                        pending.insert(agent_id, path);
                    }
                    made_progress = true;
                } else {
                    // Leave this conflict unresolved and continue — the outer
                    // recursion may still make progress via other conflicts.
                    // Recorded in `unresolved`; surfaced to the caller so the
                    // supervisor crate (which owns the logging stack) can log it.
                    unresolved.push((*conflict).clone());
                }
            }

            if !made_progress {
                return ResolutionOutcome { assignments: current, exhausted: true, unresolved_conflicts: unresolved, scenario_cap_hit };
            }
            current = pending;
        }

        let final_conflicts = detector.detect(&current);
        ResolutionOutcome { assignments: current, exhausted: true, unresolved_conflicts: final_conflicts, scenario_cap_hit }
    }

    /// Enumerate all-avoid, one-allowed and wait-permutation scenarios for
    /// one conflict, score each, and return the lexicographically best
    /// `(has_conflict, total_path_length)` scenario, with deterministic
    /// tie-breaking by the sorted `(agent_id, path)` pairs.
    fn best_scenario(
        &self,
        grid: &Grid,
        assignments: &BTreeMap<String, Path>,
        conflict: &Conflict,
        detector: &ConflictDetector,
        anchors: &[WarehouseAnchor],
    ) -> (Option<Scenario>, bool) {
        let mut candidates: Vec<Scenario> = Vec::new();
        let blocked = block_set_for(conflict, anchors);

        if let Some(scenario) = self.all_avoid(grid, assignments, conflict, &blocked) {
            candidates.push(scenario);
        }
        candidates.extend(self.one_allowed(grid, assignments, conflict, &blocked));
        let (waits, truncated) = self.wait_permutations(assignments, conflict);
        candidates.extend(waits);

        if candidates.is_empty() {
            return (None, truncated);
        }

        let best = candidates
            .into_iter()
            .map(|scenario| {
                let merged = apply_scenario(assignments, &scenario);
                let has_conflict = !detector.detect(&merged).is_empty();
                let total_len: usize = conflict.involved.iter().filter_map(|id| merged.get(id)).map(|p| p.len()).sum();
                let tie_break: Vec<(String, Vec<(u32, u32)>)> = scenario
                    .iter()
                    .map(|(k, v)| (k.clone(), v.cells.iter().map(|c| (c.x, c.y)).collect()))
                    .collect();
                (has_conflict, total_len, tie_break, scenario)
            })
            .min_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)))
            .map(|(_, _, _, scenario)| scenario);
        (best, truncated)
    }

    fn all_avoid(&self, grid: &Grid, assignments: &BTreeMap<String, Path>, conflict: &Conflict, blocked: &HashSet<Cell>) -> Option<Scenario> {
        let mut scenario = Scenario::new();
        for agent_id in &conflict.involved {
            let path = assignments.get(agent_id)?;
            let (start, goal) = endpoints(path)?;
            let replanned = self.planner.find(grid, start, goal, blocked).ok()?;
            scenario.insert(agent_id.clone(), replanned);
        }
        Some(scenario)
    }

    fn one_allowed(&self, grid: &Grid, assignments: &BTreeMap<String, Path>, conflict: &Conflict, blocked: &HashSet<Cell>) -> Vec<Scenario> {
        let mut out = Vec::new();

        for allowed in &conflict.involved {
            let mut scenario = Scenario::new();
            let mut ok = true;
            for agent_id in &conflict.involved {
                let Some(path) = assignments.get(agent_id) else {
                    ok = false;
                    break;
                };
                let Some((start, goal)) = endpoints(path) else {
                    ok = false;
                    break;
                };
                let block_set = if agent_id == allowed { HashSet::new() } else { blocked.clone() };
                match self.planner.find(grid, start, goal, &block_set) {
                    Ok(replanned) => {
                        scenario.insert(agent_id.clone(), replanned);
                    }
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                out.push(scenario);
            }
        }
        out
    }

    /// Every non-empty proper subset `S` of involved agents, every
    /// injective assignment of wait-counts from `{1,...,k}` to `S`. Bounded
    /// by `scenario_cap`; stops enumerating (rather than silently
    /// truncating the conflict list) once the cap is hit, and reports that
    /// back to the caller via the returned `bool` instead of logging it
    /// in-crate (this crate carries no logging dependency by design).
    fn wait_permutations(&self, assignments: &BTreeMap<String, Path>, conflict: &Conflict) -> (Vec<Scenario>, bool) {
        let Some(step) = conflict.step else {
            return (Vec::new(), false); // warehouse-exclusion sentinel has no finite k
        };
        if step == 0 {
            return (Vec::new(), false);
        }

        let involved = &conflict.involved;
        let n = involved.len();
        let mut out = Vec::new();
        let mut truncated = false;

        'subsets: for subset_mask in 1u32..(1u32 << n) {
            if out.len() >= self.scenario_cap {
                truncated = true;
                break 'subsets;
            }
            if subset_mask.count_ones() as usize >= n {
                continue; // proper subset only
            }
            let subset: Vec<&String> = (0..n).filter(|i| subset_mask & (1 << i) != 0).map(|i| &involved[i]).collect();
            for perm in k_permutations(step, subset.len()) {
                if out.len() >= self.scenario_cap {
                    truncated = true;
                    break 'subsets;
                }
                let mut scenario = Scenario::new();
                let mut ok = true;
                for (agent_id, &wait_count) in subset.iter().zip(perm.iter()) {
                    let Some(path) = assignments.get(*agent_id) else {
                        ok = false;
                        break;
                    };
                    scenario.insert((*agent_id).clone(), path.with_leading_waits(wait_count));
                }
                if ok {
                    out.push(scenario);
                }
            }
        }
        (out, truncated)
    }
}

/// Vertex/Swap conflicts are single-cell; WarehouseExclusion conflicts are
/// reported one per intruding cell (`conflict.rs`) but must be resolved by
/// blocking the anchor's whole reserved box at once, or a reroute just
/// slips from one intruding cell into its neighbour on the next pass.
fn block_set_for(conflict: &Conflict, anchors: &[WarehouseAnchor]) -> HashSet<Cell> {
    if conflict.kind != ConflictKind::WarehouseExclusion {
        return HashSet::from([conflict.cell]);
    }
    anchors
        .iter()
        .find(|a| reserved_box(a.anchor).contains(&conflict.cell))
        .map(|a| reserved_box(a.anchor).into_iter().collect())
        .unwrap_or_else(|| HashSet::from([conflict.cell]))
}

fn endpoints(path: &Path) -> Option<(Cell, Cell)> {
    let start = *path.cells.first()?;
    let goal = *path.cells.last()?;
    Some((start, goal))
}

fn apply_scenario(assignments: &BTreeMap<String, Path>, scenario: &Scenario) -> BTreeMap<String, Path> {
    let mut merged = assignments.clone();
    for (agent_id, path) in scenario {
        merged.insert(agent_id.clone(), path.clone());
    }
    merged
}

/// All `k`-permutations (ordered, distinct) of `{1, ..., k}` of length `len`.
fn k_permutations(k: usize, len: usize) -> Vec<Vec<usize>> {
    if len == 0 || len > k {
        return Vec::new();
    }
    let pool: Vec<usize> = (1..=k).collect();
    let mut results = Vec::new();
    let mut used = vec![false; k];
    let mut current = Vec::with_capacity(len);
    permute(&pool, &mut used, &mut current, len, &mut results);
    results
}

fn permute(pool: &[usize], used: &mut [bool], current: &mut Vec<usize>, len: usize, results: &mut Vec<Vec<usize>>) {
    if current.len() == len {
        results.push(current.clone());
        return;
    }
    for (i, &value) in pool.iter().enumerate() {
        if used[i] {
            continue;
        }
        used[i] = true;
        current.push(value);
        permute(pool, used, current, len, results);
        current.pop();
        used[i] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictKind;

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(Planner::default(), 30, 4096)
    }

    #[test]
    fn already_conflict_free_is_a_no_op() {
        // R1
        let grid = Grid::new(10, 10);
        let assignments: BTreeMap<String, Path> = [
            ("A".to_string(), Path::new(vec![Cell::new(0, 0), Cell::new(1, 0)])),
            ("B".to_string(), Path::new(vec![Cell::new(0, 5), Cell::new(1, 5)])),
        ]
        .into_iter()
        .collect();
        let outcome = resolver().resolve(&grid, &assignments, &[]);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.assignments, assignments);
    }

    #[test]
    fn head_on_corridor_resolves_without_collision() {
        // Scenario 1: a parallel open row gives both agents a real detour.
        let grid = Grid::new(4, 2);
        let a_path = Path::new(vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0)]);
        let b_path = Path::new(vec![Cell::new(3, 0), Cell::new(2, 0), Cell::new(1, 0), Cell::new(0, 0)]);
        let assignments: BTreeMap<String, Path> = [("A".to_string(), a_path), ("B".to_string(), b_path)].into_iter().collect();

        let outcome = resolver().resolve(&grid, &assignments, &[]);
        let detector = ConflictDetector::new(&[]);
        assert!(detector.detect(&outcome.assignments).is_empty());
    }

    #[test]
    fn vertex_junction_uses_wait_permutation() {
        // Scenario 2.
        let grid = Grid::new(5, 5);
        let a_path = Path::new(vec![Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2), Cell::new(4, 2)]);
        let b_path = Path::new(vec![Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3), Cell::new(2, 4)]);
        let assignments: BTreeMap<String, Path> = [("A".to_string(), a_path), ("B".to_string(), b_path)].into_iter().collect();

        let outcome = resolver().resolve(&grid, &assignments, &[]);
        let detector = ConflictDetector::new(&[]);
        assert!(detector.detect(&outcome.assignments).is_empty());
    }

    #[test]
    fn impossible_swap_in_a_dead_end_is_resolution_exhausted() {
        // Scenario 3: a 2-cell corridor with no other walkable cells.
        let grid = Grid::from_walkable(2, 1, vec![true, true]);
        let a_path = Path::new(vec![Cell::new(1, 0), Cell::new(0, 0)]);
        let b_path = Path::new(vec![Cell::new(0, 0), Cell::new(1, 0)]);
        let assignments: BTreeMap<String, Path> = [("A".to_string(), a_path), ("B".to_string(), b_path)].into_iter().collect();

        let outcome = resolver().resolve(&grid, &assignments, &[]);
        // All-avoid and one-allowed both fail (no third cell to reroute
        // through); wait-permutations only shuffle which agent waits, so
        // the swap/vertex conflict in this dead end never clears and the
        // depth cap is reached.
        assert!(outcome.exhausted);
        assert!(!outcome.unresolved_conflicts.is_empty());
    }

    #[test]
    fn scenario_cap_of_one_is_reported_as_hit() {
        // A vertex conflict between two agents has more than one candidate
        // wait-permutation scenario; a cap of 1 forces `wait_permutations`
        // to stop enumerating before it otherwise would.
        let grid = Grid::new(5, 5);
        let a_path = Path::new(vec![Cell::new(0, 2), Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2), Cell::new(4, 2)]);
        let b_path = Path::new(vec![Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3), Cell::new(2, 4)]);
        let assignments: BTreeMap<String, Path> = [("A".to_string(), a_path), ("B".to_string(), b_path)].into_iter().collect();

        let capped = ConflictResolver::new(Planner::default(), 30, 1);
        let outcome = capped.resolve(&grid, &assignments, &[]);
        assert!(outcome.scenario_cap_hit);
    }

    #[test]
    fn warehouse_exclusion_reroutes_around_the_box() {
        // Scenario 4.
        let grid = Grid::new(10, 10);
        let anchors = [WarehouseAnchor { anchor: Cell::new(5, 5) }];
        let a_path = Path::new(vec![Cell::new(5, 4), Cell::new(5, 5)]);
        let b_path: Vec<Cell> = (0..10).map(|x| Cell::new(x, 5)).collect();
        let b_path = Path::new(b_path);
        let original_len = b_path.len();
        let assignments: BTreeMap<String, Path> = [("A".to_string(), a_path), ("B".to_string(), b_path)].into_iter().collect();

        let outcome = resolver().resolve(&grid, &assignments, &anchors);
        let detector = ConflictDetector::new(&anchors);
        assert!(detector.detect(&outcome.assignments).is_empty());
        assert!(outcome.assignments["B"].len() >= original_len + 2);
    }

    #[test]
    fn three_way_contention_leaves_at_most_one_agent_per_step() {
        // Scenario 6.
        let grid = Grid::new(7, 7);
        let a_path = Path::new(vec![Cell::new(1, 3), Cell::new(2, 3), Cell::new(3, 3), Cell::new(4, 3)]);
        let b_path = Path::new(vec![Cell::new(3, 1), Cell::new(3, 2), Cell::new(3, 3), Cell::new(3, 4)]);
        let c_path = Path::new(vec![Cell::new(3, 5), Cell::new(3, 4), Cell::new(3, 3), Cell::new(3, 2)]);
        let assignments: BTreeMap<String, Path> = [
            ("A".to_string(), a_path),
            ("B".to_string(), b_path),
            ("C".to_string(), c_path),
        ]
        .into_iter()
        .collect();

        let outcome = resolver().resolve(&grid, &assignments, &[]);
        let detector = ConflictDetector::new(&[]);
        let remaining = detector.detect(&outcome.assignments);
        assert!(remaining.iter().all(|c| c.kind != ConflictKind::Vertex || c.cell != Cell::new(3, 3)));
    }

    #[test]
    fn k_permutations_counts_match_the_combinatorics_note() {
        // P(k,m) = k! / (k-m)!
        assert_eq!(k_permutations(3, 1).len(), 3);
        assert_eq!(k_permutations(3, 2).len(), 6);
        assert_eq!(k_permutations(3, 3).len(), 6);
        assert_eq!(k_permutations(3, 0).len(), 0);
    }
}
