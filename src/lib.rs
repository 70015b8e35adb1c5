//! Fleetpace - Fleet Convergence Pacing Daemon
//!
//! A long-running daemon that spreads an idempotent "apply
//! configuration" action evenly across a fleet of managed nodes, so
//! the fleet-wide reapplication cadence stays constant regardless of
//! fleet size and no two nodes are converged at the same moment.
//!
//! # Architecture
//!
//! A single dispatch loop drives everything: it periodically re-probes
//! fleet membership, reconciles the probe result against an ordered
//! roster with an order-preserving diff, and triggers convergence on
//! one node per iteration before sleeping `run_interval / fleet_size`.
//! Exactly one convergence action is ever in flight.
//!
//! # Features
//!
//! - Stable round-robin position across membership changes
//! - Interval recomputation as nodes join and leave
//! - Pluggable fleet control (SaltStack command shape by default)
//! - Non-fatal handling of probe and convergence failures
//! - Bounded-latency graceful shutdown

pub mod config;
pub mod error;
pub mod fleet;
pub mod scheduler;

pub use config::FleetpaceConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::FleetpaceConfig;
    pub use crate::error::{Error, Result};
    pub use crate::fleet::{CommandFleet, FleetControl, NodeId};
    pub use crate::scheduler::{Dispatcher, Roster};
}
