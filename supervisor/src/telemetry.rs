//! Read-only telemetry HTTP surface (spec §6 "Agent telemetry upstream").

use crate::error::{AppError, Result};
use crate::supervisor::Supervisor;
use axum::{
    extract::{Path as AxumPath, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub type SharedSupervisor = Arc<Mutex<Supervisor>>;

#[derive(Debug, Serialize)]
struct AgentView {
    id: String,
    position: (u32, u32),
    state: &'static str,
    path_len: usize,
}

#[derive(Debug, Serialize)]
struct StateView {
    global_step: u64,
    agents: Vec<AgentView>,
}

pub fn router(supervisor: SharedSupervisor) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/state", get(state))
        .route("/agents/:id", get(agent))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(supervisor)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn state(State(supervisor): State<SharedSupervisor>) -> Json<StateView> {
    let supervisor = supervisor.lock().await;
    let agents = supervisor
        .snapshot()
        .into_iter()
        .map(|a| AgentView {
            id: a.id,
            position: (a.position.x, a.position.y),
            state: state_label(a.state),
            path_len: a.path.len(),
        })
        .collect();

    Json(StateView { global_step: supervisor.global_step(), agents })
}

/// Single-agent lookup (spec §6 "Agent telemetry upstream" per-agent state).
/// Unknown agent IDs are the telemetry boundary's `NotFound` (spec §7).
async fn agent(State(supervisor): State<SharedSupervisor>, AxumPath(id): AxumPath<String>) -> Result<Json<AgentView>> {
    let supervisor = supervisor.lock().await;
    let snapshot = supervisor.agent_snapshot(&id).ok_or_else(|| AppError::NotFound(format!("unknown agent: {id}")))?;

    Ok(Json(AgentView {
        id: snapshot.id,
        position: (snapshot.position.x, snapshot.position.y),
        state: state_label(snapshot.state),
        path_len: snapshot.path.len(),
    }))
}

fn state_label(state: crate::agent::AgentState) -> &'static str {
    use crate::agent::AgentState::*;
    match state {
        Idle => "idle",
        WaitingForStep => "waiting_for_step",
        Moving => "moving",
        WaitingAtTarget => "waiting_at_target",
        Blocked => "blocked",
    }
}
