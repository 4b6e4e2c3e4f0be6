//! Single-agent A* planner, conflict detection and combinatorial conflict
//! resolution for the fleet supervisor (spec §4.2-§4.4).
//!
//! Every type here is pure and synchronous: no I/O, no shared mutable
//! state. The supervisor crate owns agents and drives the tick loop; this
//! crate only computes plans and flags/repairs collisions between them.

mod astar;
mod conflict;
mod resolver;

pub use astar::{Planner, PlannerError};
pub use conflict::{Conflict, ConflictDetector, ConflictKind, WarehouseAnchor};
pub use resolver::{ConflictResolver, ResolutionOutcome};
