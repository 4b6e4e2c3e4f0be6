//! Agent state machine and the capability set the Supervisor drives each
//! tick (spec §3, §4.6). Only one vehicle kind exists today; the
//! `AgentInterface` trait is the capability set §9 describes in case a
//! second kind ever appears, rather than an inheritance hierarchy.

use mapf_core::{Cell, Path};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    WaitingForStep,
    Moving,
    WaitingAtTarget,
    Blocked,
}

/// Operations the Supervisor consumes to move a vehicle one cell at a time
/// (spec §4.6). The Supervisor owns lockstep synchronization; the agent
/// neither plans nor detects conflicts.
pub trait AgentInterface {
    fn assign_path(&mut self, path: Path);
    /// Executes the kinematic move to the next Path cell and returns a
    /// move-ticket the Supervisor awaits before the next lockstep gate can
    /// pass (spec §9 "coroutine / per-step movement").
    fn advance_one_cell(&mut self) -> oneshot::Receiver<()>;
    fn current_position(&self) -> Cell;
    fn state(&self) -> AgentState;
}

/// A single AGV. Holds its current cell, FIFO waypoint queue, assigned
/// Path and FSM state (spec §3). Only the Supervisor mutates `path`.
pub struct Agent {
    pub id: String,
    position: Cell,
    pub waypoints: VecDeque<Cell>,
    pub path: Path,
    state: AgentState,
    step_duration: Duration,
}

impl Agent {
    pub fn new(id: impl Into<String>, position: Cell, step_duration: Duration) -> Self {
        Self {
            id: id.into(),
            position,
            waypoints: VecDeque::new(),
            path: Path::new(Vec::new()),
            state: AgentState::Idle,
            step_duration,
        }
    }

    pub fn set_state(&mut self, state: AgentState) {
        self.state = state;
    }
}

impl AgentInterface for Agent {
    fn assign_path(&mut self, path: Path) {
        self.path = path;
    }

    fn advance_one_cell(&mut self) -> oneshot::Receiver<()> {
        debug_assert!(self.path.len() >= 2, "advance_one_cell called with nothing left to advance to");
        self.position = self.path.cells[1];
        self.path.cells.remove(0);

        let (tx, rx) = oneshot::channel();
        let duration = self.step_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(());
        });
        rx
    }

    fn current_position(&self) -> Cell {
        self.position
    }

    fn state(&self) -> AgentState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advance_one_cell_moves_position_and_trims_front() {
        let mut agent = Agent::new("A", Cell::new(0, 0), Duration::from_millis(1));
        agent.assign_path(Path::new(vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0)]));
        let ticket = agent.advance_one_cell();
        assert_eq!(agent.current_position(), Cell::new(1, 0));
        assert_eq!(agent.path.cells, vec![Cell::new(1, 0), Cell::new(2, 0)]);
        ticket.await.unwrap();
    }
}
