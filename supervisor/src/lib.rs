//! Fleet supervisor: owns agents, active paths and the lockstep tick loop
//! (spec §4.5), on top of the pure planner/resolver in `mapf-planner`.

pub mod agent;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod supervisor;
pub mod telemetry;

pub use agent::{Agent, AgentInterface, AgentState};
pub use config::Config;
pub use supervisor::{AgentSnapshot, Supervisor};
