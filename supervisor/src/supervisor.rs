//! Owns agents, waypoints, active paths, lockstep phase and dynamic
//! obstacles; drives the tick loop (spec §4.5).

use crate::agent::{Agent, AgentInterface, AgentState};
use crate::ingestion::{ObstacleMessage, RouteMessage};
use mapf_core::{Cell, Grid, Path};
use mapf_planner::{ConflictResolver, Planner, PlannerError, WarehouseAnchor};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

pub struct Supervisor {
    grid: Grid,
    anchors: Vec<WarehouseAnchor>,
    waypoint_lookup: HashMap<String, Cell>,
    agents: BTreeMap<String, Agent>,
    dynamic_obstacles: HashMap<Cell, Instant>,
    global_step: u64,
    planner: Planner,
    resolver: ConflictResolver,
    obstacle_debounce: Duration,
    waypoint_hold: Duration,
    step_duration: Duration,
    waiting_since: HashMap<String, Instant>,
}

/// Read-only view of one agent for telemetry (spec §6 "Agent telemetry upstream").
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub id: String,
    pub position: Cell,
    pub state: AgentState,
    pub path: Path,
}

impl Supervisor {
    pub fn new(
        grid: Grid,
        anchors: Vec<WarehouseAnchor>,
        waypoint_lookup: HashMap<String, Cell>,
        planner_expansion_cap: u32,
        resolver_depth_cap: u32,
        resolver_scenario_cap: usize,
        obstacle_debounce: Duration,
        waypoint_hold: Duration,
        step_duration: Duration,
    ) -> Self {
        Self {
            grid,
            anchors,
            waypoint_lookup,
            agents: BTreeMap::new(),
            dynamic_obstacles: HashMap::new(),
            global_step: 0,
            planner: Planner::new(planner_expansion_cap),
            resolver: ConflictResolver::new(Planner::new(planner_expansion_cap), resolver_depth_cap, resolver_scenario_cap),
            obstacle_debounce,
            waypoint_hold,
            step_duration,
            waiting_since: HashMap::new(),
        }
    }

    pub fn spawn_agent(&mut self, id: impl Into<String>, at: Cell) {
        let id = id.into();
        self.agents.insert(id.clone(), Agent::new(id, at, self.step_duration));
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn agent_state(&self, id: &str) -> Option<AgentState> {
        self.agents.get(id).map(|a| a.state())
    }

    pub fn agent_path(&self, id: &str) -> Option<&Path> {
        self.agents.get(id).map(|a| &a.path)
    }

    pub fn agent_position(&self, id: &str) -> Option<Cell> {
        self.agents.get(id).map(|a| a.current_position())
    }

    pub fn agent_snapshot(&self, id: &str) -> Option<AgentSnapshot> {
        self.agents.get(id).map(|a| AgentSnapshot { id: a.id.clone(), position: a.current_position(), state: a.state(), path: a.path.clone() })
    }

    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents
            .values()
            .map(|a| AgentSnapshot { id: a.id.clone(), position: a.current_position(), state: a.state(), path: a.path.clone() })
            .collect()
    }

    /// Apply route ingestion (spec §6/§4.5 step 1), then immediately run
    /// idle-dispatch (spec §4.5.1) so newly-idle agents don't wait a tick.
    pub fn ingest_route(&mut self, routes: RouteMessage) {
        for (agent_id, targets) in routes {
            if !self.agents.contains_key(&agent_id) {
                tracing::warn!("unknown agent id in route message: {}", agent_id);
                continue;
            }
            for target in targets {
                let Some(&cell) = self.waypoint_lookup.get(&target) else {
                    tracing::warn!("unknown waypoint target: {}", target);
                    continue;
                };
                self.agents.get_mut(&agent_id).unwrap().waypoints.push_back(cell);
            }
        }
        self.assign_idle_agents();
        self.resolve_conflicts();
    }

    /// Apply a dynamic-obstacle report (spec §4.5.2).
    pub fn ingest_obstacle(&mut self, report: ObstacleMessage) {
        let Some(reporter_cell) = self.agents.get(&report.agent_id).map(|a| a.current_position()) else {
            tracing::warn!("unknown agent id in obstacle report: {}", report.agent_id);
            return;
        };

        for (dx, dy) in report.blocked {
            let tx = reporter_cell.x as i64 + dx;
            let ty = reporter_cell.y as i64 + dy;
            if tx < 0 || ty < 0 {
                continue;
            }
            let cell = Cell::new(tx as u32, ty as u32);
            if cell == reporter_cell {
                continue;
            }
            if !self.grid.is_walkable(cell) {
                continue; // already an obstacle
            }
            if let Some(last) = self.dynamic_obstacles.get(&cell) {
                if last.elapsed() < self.obstacle_debounce {
                    continue;
                }
            }
            self.grid.set_walkable(cell, false);
            self.dynamic_obstacles.insert(cell, Instant::now());
        }
    }

    /// Runs steps 2-7 of the per-tick procedure (spec §4.5). Ingestion
    /// (step 1) happens out-of-band via [`Self::ingest_route`] /
    /// [`Self::ingest_obstacle`], called by the driver before each tick.
    pub async fn tick(&mut self) {
        self.assign_idle_agents();
        let blocked = self.resolve_conflicts();

        let ids: Vec<String> = self.agents.keys().cloned().collect();
        for id in ids {
            let agent = self.agents.get_mut(&id).unwrap();
            if blocked.contains(&id) {
                agent.set_state(AgentState::Blocked);
            } else if agent.state() == AgentState::Blocked && !agent.path.is_empty() {
                // The conflict that blocked this agent cleared on a later
                // attempt (spec §7: residual conflicts are re-attempted
                // next tick); resume the lockstep gate.
                agent.set_state(AgentState::WaitingForStep);
            }
        }

        self.advance_ready_agents().await;
        self.complete_waypoints();
    }

    /// Step 2: assign idle agents a path to their next waypoint.
    fn assign_idle_agents(&mut self) {
        let ids: Vec<String> = self.agents.keys().cloned().collect();
        for id in ids {
            let (start, goal) = {
                let agent = &self.agents[&id];
                if !agent.path.is_empty() || agent.waypoints.is_empty() {
                    continue;
                }
                (agent.current_position(), *agent.waypoints.front().unwrap())
            };
            let mut blocked = self.currently_occupied_cells(&id);
            // A cell another agent is merely standing on right now must not
            // make `goal` permanently unreachable: if they're still there
            // when we arrive, that's a vertex conflict for the resolver to
            // fix (reroute or wait), not a reason to refuse the plan.
            blocked.remove(&goal);
            match self.planner.find(&self.grid, start, goal, &blocked) {
                Ok(path) => {
                    let agent = self.agents.get_mut(&id).unwrap();
                    agent.assign_path(path);
                    agent.waypoints.pop_front();
                    agent.set_state(AgentState::WaitingForStep);
                }
                Err(PlannerError::NoPathFound) => {
                    tracing::debug!("agent {} has no path to its next waypoint yet", id);
                }
                Err(PlannerError::SearchExhausted(cap)) => {
                    tracing::warn!("agent {} planner search exhausted ({} expansions)", id, cap);
                }
            }
        }
    }

    fn currently_occupied_cells(&self, exclude: &str) -> HashSet<Cell> {
        self.agents
            .iter()
            .filter(|(id, _)| id.as_str() != exclude)
            .map(|(_, a)| a.path.cells.first().copied().unwrap_or_else(|| a.current_position()))
            .collect()
    }

    /// Step 3: run ConflictResolver over every agent's current plan.
    /// Returns the IDs still involved in a conflict when resolution was
    /// exhausted (spec §7 `ResolutionExhausted`) — these must not be
    /// advanced into the collision this tick (spec.md §8 scenario 3).
    ///
    /// Idle/docked agents (empty Path) are represented by a synthetic
    /// single-cell Path pinned at their current position rather than
    /// dropped from `assignments`: a docked agent at a warehouse anchor
    /// must keep reserving its 3x3 box for the rest of the run (spec.md §8
    /// scenario 4), and `ConflictDetector::warehouse_conflicts` can only
    /// see agents present in `assignments`. `Planner::find` short-circuits
    /// a `start == goal` request, so replanning one of these synthetic
    /// paths in an all-avoid/one-allowed scenario is a no-op — it never
    /// moves a docked agent.
    fn resolve_conflicts(&mut self) -> HashSet<String> {
        if self.agents.is_empty() {
            return HashSet::new();
        }
        let assignments: BTreeMap<String, Path> = self
            .agents
            .iter()
            .map(|(id, a)| (id.clone(), if a.path.is_empty() { Path::single(a.current_position()) } else { a.path.clone() }))
            .collect();

        let outcome = self.resolver.resolve(&self.grid, &assignments, &self.anchors);
        for (id, path) in &outcome.assignments {
            if let Some(agent) = self.agents.get_mut(id) {
                if !agent.path.is_empty() {
                    agent.assign_path(path.clone());
                }
            }
        }

        if outcome.scenario_cap_hit {
            tracing::debug!("scenario enumeration hit the configured cap while resolving conflicts this tick");
        }

        if !outcome.exhausted {
            return HashSet::new();
        }
        tracing::warn!(
            unresolved = outcome.unresolved_conflicts.len(),
            "conflict resolution exhausted at the depth cap with residual conflicts"
        );
        outcome
            .unresolved_conflicts
            .into_iter()
            .flat_map(|c| c.involved)
            .filter(|id| self.agents.get(id).is_some_and(|a| !a.path.is_empty()))
            .collect()
    }

    /// Steps 4-6: lockstep gate, advance, and trim (trimming falls out of
    /// `advance_one_cell` dropping the consumed front cell — there is no
    /// continuous-space position to search "nearest cell" for, spec.md §1
    /// Non-goals).
    async fn advance_ready_agents(&mut self) {
        let ready: Vec<String> =
            self.agents.iter().filter(|(_, a)| a.state() == AgentState::WaitingForStep && !a.path.is_empty()).map(|(id, _)| id.clone()).collect();
        if ready.is_empty() {
            return;
        }

        let mut tickets = Vec::new();
        for id in &ready {
            let agent = self.agents.get_mut(id).unwrap();
            if agent.path.len() >= 2 {
                agent.set_state(AgentState::Moving);
                tickets.push(agent.advance_one_cell());
            }
        }
        if !tickets.is_empty() {
            for ticket in tickets {
                let _ = ticket.await;
            }
            self.global_step += 1;
        }

        for id in &ready {
            let agent = self.agents.get_mut(id).unwrap();
            if agent.path.len() <= 1 {
                if agent.state() != AgentState::WaitingAtTarget {
                    agent.set_state(AgentState::WaitingAtTarget);
                    self.waiting_since.insert(id.clone(), Instant::now());
                }
            } else {
                agent.set_state(AgentState::WaitingForStep);
            }
        }
    }

    /// Step 7: after the configured hold time at a waypoint, go Idle so a
    /// non-empty waypoint queue is picked up again next tick.
    fn complete_waypoints(&mut self) {
        let ids: Vec<String> = self.agents.iter().filter(|(_, a)| a.state() == AgentState::WaitingAtTarget).map(|(id, _)| id.clone()).collect();
        for id in ids {
            let elapsed = self.waiting_since.get(&id).map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.waypoint_hold {
                let agent = self.agents.get_mut(&id).unwrap();
                agent.assign_path(Path::new(Vec::new()));
                agent.set_state(AgentState::Idle);
                self.waiting_since.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(grid: Grid) -> Supervisor {
        Supervisor::new(
            grid,
            Vec::new(),
            HashMap::new(),
            10_000,
            30,
            4096,
            Duration::from_millis(500),
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn idle_agent_with_a_waypoint_dispatches_and_advances() {
        let mut sup = supervisor(Grid::new(5, 1));
        sup.spawn_agent("A", Cell::new(0, 0));
        sup.agents.get_mut("A").unwrap().waypoints.push_back(Cell::new(4, 0));

        sup.tick().await;
        assert_eq!(sup.agent_state("A"), Some(AgentState::WaitingForStep));
        assert_eq!(sup.global_step(), 1);
        assert_eq!(sup.agent_position("A"), Some(Cell::new(1, 0)));

        for _ in 0..3 {
            sup.tick().await;
        }
        assert_eq!(sup.agent_position("A"), Some(Cell::new(4, 0)));
    }

    #[tokio::test]
    async fn waypoint_hold_returns_agent_to_idle() {
        let mut sup = supervisor(Grid::new(2, 1));
        sup.spawn_agent("A", Cell::new(0, 0));
        sup.agents.get_mut("A").unwrap().waypoints.push_back(Cell::new(1, 0));

        sup.tick().await; // assign + advance onto (1,0), path now len 1 -> WaitingAtTarget
        assert_eq!(sup.agent_state("A"), Some(AgentState::WaitingAtTarget));

        tokio::time::sleep(Duration::from_millis(5)).await;
        sup.tick().await;
        assert_eq!(sup.agent_state("A"), Some(AgentState::Idle));
    }

    #[tokio::test]
    async fn dynamic_obstacle_blocks_a_cell_once() {
        let mut sup = supervisor(Grid::new(5, 5));
        sup.spawn_agent("A", Cell::new(0, 0));
        sup.ingest_obstacle(ObstacleMessage { agent_id: "A".to_string(), blocked: vec![(2, 0)] });
        assert!(!sup.grid().is_walkable(Cell::new(2, 0)));
    }

    #[tokio::test]
    async fn obstacle_report_from_unknown_agent_is_ignored() {
        let mut sup = supervisor(Grid::new(5, 5));
        sup.ingest_obstacle(ObstacleMessage { agent_id: "ghost".to_string(), blocked: vec![(1, 0)] });
        assert!(sup.grid().is_walkable(Cell::new(1, 0)));
    }
}
