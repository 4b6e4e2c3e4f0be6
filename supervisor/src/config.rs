use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub route_tcp_port: u16,
    pub obstacle_tcp_port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub planner_expansion_cap: u32,
    pub resolver_depth_cap: u32,
    pub resolver_scenario_cap: usize,
    pub obstacle_debounce_ms: u64,
    pub waypoint_hold_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT").unwrap_or_else(|_| "3000".to_string()).parse()?,
            route_tcp_port: env::var("ROUTE_TCP_PORT").unwrap_or_else(|_| "4000".to_string()).parse()?,
            obstacle_tcp_port: env::var("OBSTACLE_TCP_PORT").unwrap_or_else(|_| "4001".to_string()).parse()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .split(',')
                .map(String::from)
                .collect(),
            planner_expansion_cap: env::var("PLANNER_EXPANSION_CAP").unwrap_or_else(|_| "10000".to_string()).parse()?,
            resolver_depth_cap: env::var("RESOLVER_DEPTH_CAP").unwrap_or_else(|_| "30".to_string()).parse()?,
            resolver_scenario_cap: env::var("RESOLVER_SCENARIO_CAP").unwrap_or_else(|_| "4096".to_string()).parse()?,
            obstacle_debounce_ms: env::var("OBSTACLE_DEBOUNCE_MS").unwrap_or_else(|_| "500".to_string()).parse()?,
            waypoint_hold_ms: env::var("WAYPOINT_HOLD_MS").unwrap_or_else(|_| "1000".to_string()).parse()?,
        })
    }
}
