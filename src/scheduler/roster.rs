//! Fleet Roster
//!
//! Tracks the ordered set of reachable nodes and the per-node dispatch
//! interval derived from its size. The roster is owned by the dispatch
//! loop and only ever touched from its iterations, so there is no
//! locking here.

use std::time::Duration;

use tokio::time::Instant;

use crate::fleet::NodeId;

/// Result of reconciling a probe against the roster
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Nodes appended to the roster
    pub added: Vec<NodeId>,
    /// Nodes dropped from the roster
    pub removed: Vec<NodeId>,
}

impl ReconcileOutcome {
    /// True if the probe matched the roster exactly
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Ordered, deduplicated roster of currently-reachable nodes
pub struct Roster {
    /// Known nodes, in dispatch order
    nodes: Vec<NodeId>,
    /// Sleep between dispatching to consecutive nodes
    interval: Duration,
    /// Time for one full pass over the fleet
    run_interval: Duration,
    /// How often membership is re-probed
    rediscover_interval: Duration,
    /// Last successful reconciliation
    last_discovery: Option<Instant>,
}

impl Roster {
    /// Create an empty roster. The first reconciliation populates it.
    pub fn new(run_interval: Duration, rediscover_interval: Duration) -> Self {
        Self {
            nodes: Vec::new(),
            interval: run_interval,
            run_interval,
            rediscover_interval,
            last_discovery: None,
        }
    }

    /// Reconcile a fresh probe result against the roster.
    ///
    /// Two-pass diff: nodes missing from the probe are removed in
    /// place, new nodes are appended in probe order. Retained nodes
    /// keep their relative order, which is what lets the dispatch loop
    /// continue from the same position afterwards.
    pub fn reconcile(&mut self, probed: Vec<NodeId>) -> ReconcileOutcome {
        // Roster uniqueness is an invariant; a probe may repeat names
        let mut deduped: Vec<NodeId> = Vec::with_capacity(probed.len());
        for node in probed {
            if !deduped.contains(&node) {
                deduped.push(node);
            }
        }

        let mut outcome = ReconcileOutcome::default();

        // Pass 1: drop roster nodes the probe no longer sees
        self.nodes.retain(|node| {
            if deduped.contains(node) {
                true
            } else {
                outcome.removed.push(node.clone());
                false
            }
        });

        // Pass 2: append probed nodes the roster does not have yet
        for node in deduped {
            if !self.nodes.contains(&node) {
                self.nodes.push(node.clone());
                outcome.added.push(node);
            }
        }

        for node in &outcome.added {
            tracing::info!("Node joined roster: {}", node);
        }
        for node in &outcome.removed {
            tracing::info!("Node left roster: {}", node);
        }

        self.recompute_interval();
        self.last_discovery = Some(Instant::now());

        outcome
    }

    /// Derive the per-node interval from the roster size. An empty
    /// roster must not divide by zero; the interval is meaningless
    /// until the roster refills, so the full run interval stands in.
    fn recompute_interval(&mut self) {
        let size = self.nodes.len().max(1) as u32;
        self.interval = self.run_interval / size;
    }

    /// Whether a membership re-probe is due
    pub fn rediscovery_due(&self, now: Instant) -> bool {
        match self.last_discovery {
            Some(last) => now.duration_since(last) > self.rediscover_interval,
            None => true,
        }
    }

    /// Current per-node dispatch interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Position of a node in the roster, if present
    pub fn position_of(&self, node: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }

    /// Node at a roster position
    pub fn get(&self, idx: usize) -> Option<&NodeId> {
        self.nodes.get(idx)
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes are known
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All known nodes, in dispatch order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}
