//! Convergence Scheduler
//!
//! The core of the daemon: the roster tracks fleet membership and the
//! timing derived from its size, and the dispatcher walks it
//! round-robin, triggering convergence on one node at a time.

pub mod dispatch;
pub mod roster;

pub use dispatch::Dispatcher;
pub use roster::{ReconcileOutcome, Roster};
