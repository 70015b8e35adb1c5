//! Dispatch Loop
//!
//! Drives the fleet: maybe reconcile membership, trigger convergence
//! on one node, sleep the per-node interval, advance. Exactly one
//! convergence action is in flight at any time.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::FleetpaceConfig;
use crate::error::Result;
use crate::fleet::{FleetControl, NodeId};
use crate::scheduler::roster::Roster;

/// The convergence dispatcher
pub struct Dispatcher<F: FleetControl> {
    /// Fleet-control collaborator
    fleet: F,
    /// Current membership and timing
    roster: Roster,
    /// Roster position of the next dispatch
    next_idx: usize,
    /// Identifier of the node most recently dispatched to. The cursor
    /// is re-derived from this after every reconciliation, so a roster
    /// mutation can never leave it out of range.
    last_dispatched: Option<NodeId>,
    /// Wait between reconciliation retries while the roster is empty
    empty_backoff: Duration,
    /// Shutdown signal, observed at every sleep point
    shutdown: CancellationToken,
    /// Dispatch attempts
    dispatched: u64,
    /// Dispatches that reported failure
    failures: u64,
}

impl<F: FleetControl> Dispatcher<F> {
    /// Create a new dispatcher with an empty roster
    pub fn new(fleet: F, config: &FleetpaceConfig, shutdown: CancellationToken) -> Self {
        Self {
            fleet,
            roster: Roster::new(config.run_interval(), config.rediscover_interval()),
            next_idx: 0,
            last_dispatched: None,
            empty_backoff: config.empty_roster_backoff(),
            shutdown,
            dispatched: 0,
            failures: 0,
        }
    }

    /// Run the dispatch loop until the shutdown token is cancelled.
    ///
    /// The first iteration always reconciles, so no dispatch happens
    /// before the roster has been populated at least once.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Dispatch loop started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if self.roster.rediscovery_due(Instant::now()) {
                self.reconcile().await;
            }

            if self.roster.is_empty() {
                tracing::warn!(
                    "No reachable nodes, retrying discovery in {}s",
                    self.empty_backoff.as_secs()
                );
                if !self.sleep(self.empty_backoff).await {
                    break;
                }
                // Retry discovery right away rather than waiting out
                // the full rediscovery interval with nothing to do
                self.reconcile().await;
                continue;
            }

            let node = match self.roster.get(self.next_idx) {
                Some(node) => node.clone(),
                None => {
                    self.next_idx = 0;
                    continue;
                }
            };

            if self.shutdown.is_cancelled() {
                break;
            }

            self.dispatch(&node).await;

            // Interval is read fresh: a reconciliation above may have
            // resized the roster since the previous iteration.
            if !self.sleep(self.roster.interval()).await {
                break;
            }

            self.advance_cursor();
        }

        tracing::info!(
            "Dispatch loop stopped after {} dispatches ({} failures)",
            self.dispatched,
            self.failures
        );
        Ok(())
    }

    /// Probe the fleet and reconcile the roster.
    ///
    /// A probe failure is non-fatal: the previous roster, cursor, and
    /// interval stay in effect until the next attempt succeeds.
    async fn reconcile(&mut self) {
        tracing::debug!("Probing fleet membership");

        let probed = match self.fleet.probe().await {
            Ok(probed) => probed,
            Err(e) => {
                tracing::warn!("Fleet probe failed, keeping previous roster: {}", e);
                return;
            }
        };

        let outcome = self.roster.reconcile(probed);
        if !outcome.is_unchanged() {
            tracing::info!(
                "Roster reconciled: {} nodes ({} added, {} removed), interval {}s",
                self.roster.len(),
                outcome.added.len(),
                outcome.removed.len(),
                self.roster.interval().as_secs()
            );
        } else {
            tracing::debug!("Roster unchanged: {} nodes", self.roster.len());
        }

        // Continue from where the cycle left off: the node after the
        // last one dispatched, at its position in the updated roster.
        // If that node is gone, start the cycle over.
        self.next_idx = match &self.last_dispatched {
            Some(last) => match self.roster.position_of(last) {
                Some(pos) => (pos + 1) % self.roster.len(),
                None => 0,
            },
            None => 0,
        };
    }

    /// Trigger convergence on one node. Failure is logged and the node
    /// waits for its next natural turn.
    async fn dispatch(&mut self, node: &NodeId) {
        tracing::info!("Applying state for {}", node);

        self.dispatched += 1;
        if let Err(e) = self.fleet.converge(node).await {
            self.failures += 1;
            tracing::warn!("Convergence failed on {}: {}", node, e);
        }

        self.last_dispatched = Some(node.clone());
    }

    /// Advance the cursor, wrapping against the roster length as it is
    /// right now, not as it was when the node was dispatched.
    fn advance_cursor(&mut self) {
        self.next_idx += 1;
        if self.next_idx >= self.roster.len() {
            self.next_idx = 0;
        }
    }

    /// Cancellable sleep. Returns false when shutdown was requested.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetpaceConfig;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Scripted fleet: probe results are consumed front-to-back, then
    /// `steady` repeats (None = probe error). Converging cancels the
    /// token once `stop_after` dispatches have been recorded.
    struct MockFleet {
        script: Mutex<VecDeque<Option<Vec<NodeId>>>>,
        steady: Option<Vec<NodeId>>,
        dispatched: Mutex<Vec<NodeId>>,
        fail_converge_for: Vec<NodeId>,
        stop_after: usize,
        token: CancellationToken,
    }

    impl MockFleet {
        fn new(
            script: Vec<Option<Vec<NodeId>>>,
            steady: Option<Vec<NodeId>>,
            stop_after: usize,
            token: CancellationToken,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                steady,
                dispatched: Mutex::new(Vec::new()),
                fail_converge_for: Vec::new(),
                stop_after,
                token,
            })
        }
    }

    #[async_trait::async_trait]
    impl FleetControl for Arc<MockFleet> {
        async fn probe(&self) -> crate::Result<Vec<NodeId>> {
            let step = {
                let mut script = self.script.lock().await;
                script.pop_front().unwrap_or_else(|| self.steady.clone())
            };
            step.ok_or_else(|| Error::Probe("scripted probe failure".into()))
        }

        async fn converge(&self, node: &NodeId) -> crate::Result<()> {
            let mut dispatched = self.dispatched.lock().await;
            dispatched.push(node.clone());
            if dispatched.len() >= self.stop_after {
                self.token.cancel();
            }
            if self.fail_converge_for.contains(node) {
                return Err(Error::Converge {
                    node: node.clone(),
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }
    }

    fn config(run_secs: u64, rediscover_secs: u64, backoff_secs: u64) -> FleetpaceConfig {
        FleetpaceConfig::from_str(&format!(
            "[scheduler]\n\
             run_interval_secs = {}\n\
             rediscover_interval_secs = {}\n\
             empty_roster_backoff_secs = {}\n",
            run_secs, rediscover_secs, backoff_secs
        ))
        .unwrap()
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_visits_each_node_twice() {
        let token = CancellationToken::new();
        // Rediscovery far beyond the test horizon: only the forced
        // initial probe runs.
        let fleet = MockFleet::new(vec![], Some(ids(&["a", "b", "c"])), 6, token.clone());
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&fleet), &config(300, 1_000_000, 30), token);

        dispatcher.run().await.unwrap();

        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a", "b", "c", "a", "b", "c"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_tracks_roster_size() {
        let token = CancellationToken::new();
        let fleet = MockFleet::new(vec![], Some(ids(&["a", "b", "c"])), 1, token.clone());
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&fleet), &config(300, 1_000_000, 30), token);

        dispatcher.run().await.unwrap();
        assert_eq!(dispatcher.roster.interval(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_change_continues_from_last_position() {
        let token = CancellationToken::new();
        // First probe: [a, b, c]. Second probe: b dropped, d added.
        let fleet = MockFleet::new(
            vec![Some(ids(&["a", "b", "c"]))],
            Some(ids(&["a", "c", "d"])),
            4,
            token.clone(),
        );
        // Rediscovery (60s) is shorter than the per-node interval
        // (100s), so every later iteration re-probes.
        let mut dispatcher = Dispatcher::new(Arc::clone(&fleet), &config(300, 60, 30), token);

        dispatcher.run().await.unwrap();

        // After dispatching a, the roster becomes [a, c, d]; a is
        // still present at index 0, so the next target is c, not a
        // again and not d.
        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a", "c", "d", "a"]));
        assert_eq!(dispatcher.roster.nodes(), ids(&["a", "c", "d"]).as_slice());
        assert_eq!(dispatcher.roster.interval(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_cursor_node_resets_to_start() {
        let token = CancellationToken::new();
        // a is dispatched first, then disappears from the fleet.
        let fleet = MockFleet::new(
            vec![Some(ids(&["a", "b", "c"]))],
            Some(ids(&["b", "c"])),
            3,
            token.clone(),
        );
        let mut dispatcher = Dispatcher::new(Arc::clone(&fleet), &config(300, 60, 30), token);

        dispatcher.run().await.unwrap();

        // Last-dispatched a is gone, so the cycle restarts at b.
        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a", "b", "c"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_roster_backs_off_and_recovers() {
        let token = CancellationToken::new();
        // Fleet is dark at startup, then a appears.
        let fleet = MockFleet::new(
            vec![Some(Vec::new())],
            Some(ids(&["a"])),
            1,
            token.clone(),
        );
        let mut dispatcher = Dispatcher::new(Arc::clone(&fleet), &config(300, 600, 30), token);

        dispatcher.run().await.unwrap();

        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_keeps_previous_roster() {
        let token = CancellationToken::new();
        // One good probe, then the fleet controller goes away.
        let fleet = MockFleet::new(
            vec![Some(ids(&["a", "b"]))],
            None,
            4,
            token.clone(),
        );
        let mut dispatcher = Dispatcher::new(Arc::clone(&fleet), &config(300, 60, 30), token);

        dispatcher.run().await.unwrap();

        // Dispatch keeps cycling over the last-known-good roster.
        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a", "b", "a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_converge_failure_is_non_fatal() {
        let token = CancellationToken::new();
        let mut fleet = MockFleet::new(vec![], Some(ids(&["a", "b"])), 3, token.clone());
        Arc::get_mut(&mut fleet).unwrap().fail_converge_for = ids(&["a"]);
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&fleet), &config(300, 1_000_000, 30), token);

        dispatcher.run().await.unwrap();

        // a fails every time but still gets its regular turn.
        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["a", "b", "a"]));
        assert_eq!(dispatcher.failures, 2);
        assert_eq!(dispatcher.dispatched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_pending_sleep() {
        let token = CancellationToken::new();
        // One node and a one-hour pass: the post-dispatch sleep would
        // be a full hour, but cancellation cuts it short.
        let fleet = MockFleet::new(vec![], Some(ids(&["only"])), 1, token.clone());
        let mut dispatcher =
            Dispatcher::new(Arc::clone(&fleet), &config(3600, 1_000_000, 30), token);

        dispatcher.run().await.unwrap();

        let dispatched = fleet.dispatched.lock().await;
        assert_eq!(*dispatched, ids(&["only"]));
    }

    #[tokio::test]
    async fn test_cursor_wraps_from_last_index() {
        let token = CancellationToken::new();
        let fleet = MockFleet::new(vec![], Some(ids(&["a", "b", "c"])), 1, token.clone());
        let mut dispatcher = Dispatcher::new(fleet, &config(300, 60, 30), token);
        dispatcher.roster.reconcile(ids(&["a", "b", "c"]));

        dispatcher.next_idx = 2;
        dispatcher.advance_cursor();
        assert_eq!(dispatcher.next_idx, 0);

        dispatcher.next_idx = 0;
        dispatcher.advance_cursor();
        assert_eq!(dispatcher.next_idx, 1);
    }
}
