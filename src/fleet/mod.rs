//! Fleet Control
//!
//! The scheduler drives the fleet through this seam: a liveness probe
//! across all nodes, and a convergence trigger on one named node.

mod command;

pub use command::CommandFleet;

use crate::error::Result;

/// Identifier of a managed node
pub type NodeId = String;

/// Contract with the external fleet-control collaborator
#[async_trait::async_trait]
pub trait FleetControl: Send + Sync {
    /// Broadcast a liveness probe and return all currently-reachable
    /// nodes. An empty result is a valid success; a failed probe is an
    /// error.
    async fn probe(&self) -> Result<Vec<NodeId>>;

    /// Trigger the convergence action on one node. Blocks until the
    /// action completes or fails.
    async fn converge(&self, node: &NodeId) -> Result<()>;
}
