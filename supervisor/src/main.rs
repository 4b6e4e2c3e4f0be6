use mapf_core::{Cell, MapDefinition};
use mapf_planner::WarehouseAnchor;
use mapf_supervisor::config::Config;
use mapf_supervisor::ingestion::{self, ObstacleMessage, RouteMessage};
use mapf_supervisor::telemetry;
use mapf_supervisor::Supervisor;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ASCII map baked into the binary until a real deployment wires in a
/// concrete `MapDefinition` source (spec §6 leaves loading out of scope).
const DEFAULT_MAP: &str = "height 10\nwidth 10\nmap\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mapf_supervisor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let map = MapDefinition::parse(DEFAULT_MAP)?;
    let grid = map.into_grid();
    let anchors: Vec<WarehouseAnchor> = Vec::new();
    let waypoint_lookup: HashMap<String, Cell> = HashMap::new();

    let supervisor = Arc::new(Mutex::new(Supervisor::new(
        grid,
        anchors,
        waypoint_lookup,
        config.planner_expansion_cap,
        config.resolver_depth_cap,
        config.resolver_scenario_cap,
        Duration::from_millis(config.obstacle_debounce_ms),
        Duration::from_millis(config.waypoint_hold_ms),
        Duration::from_millis(250),
    )));

    let (route_tx, mut route_rx) = mpsc::unbounded_channel::<RouteMessage>();
    let (obstacle_tx, mut obstacle_rx) = mpsc::unbounded_channel::<ObstacleMessage>();

    let route_listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.route_tcp_port))).await?;
    tracing::info!("route ingestion listening on {}", route_listener.local_addr()?);
    tokio::spawn(ingestion::run_listener(route_listener, route_tx));

    let obstacle_listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.obstacle_tcp_port))).await?;
    tracing::info!("obstacle ingestion listening on {}", obstacle_listener.local_addr()?);
    tokio::spawn(ingestion::run_listener(obstacle_listener, obstacle_tx));

    let telemetry_addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let telemetry_listener = TcpListener::bind(telemetry_addr).await?;
    tracing::info!("telemetry listening on {}", telemetry_addr);
    let telemetry_app = telemetry::router(supervisor.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(telemetry_listener, telemetry_app).await {
            tracing::error!("telemetry server stopped: {}", e);
        }
    });

    loop {
        {
            let mut sup = supervisor.lock().await;
            while let Ok(route) = route_rx.try_recv() {
                sup.ingest_route(route);
            }
            while let Ok(obstacle) = obstacle_rx.try_recv() {
                sup.ingest_obstacle(obstacle);
            }
            sup.tick().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
