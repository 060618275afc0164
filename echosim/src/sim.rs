//! Discrete event simulator for the echotree protocol.

use std::collections::BinaryHeap;
use std::rc::Rc;

use echotree::{
    ConfigError, Configuration, Duration, Event as NodeEvent, LatencyMatrix, NodeId,
    ProtocolParams, Timestamp,
};
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult, TokenSnapshot};
use crate::node::SimNode;
use crate::topology::Topology;

/// Discrete event simulator for echotree networks.
pub struct Simulator {
    nodes: HashMap<NodeId, SimNode>,
    sink: NodeId,
    /// Latency table shared by every node.
    oracle: Rc<LatencyMatrix>,
    params: ProtocolParams,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// Seeds per-node RNGs and link loss.
    seed: u64,
    rng_state: u64,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    pub fn new(seed: u64, sink: NodeId, oracle: LatencyMatrix) -> Self {
        Self {
            nodes: HashMap::new(),
            sink,
            oracle: Rc::new(oracle),
            params: ProtocolParams::default(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            seed,
            rng_state: seed,
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Protocol parameters for nodes added afterwards.
    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    /// Record token states at a fixed interval.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add and boot a node.
    pub fn add_node(&mut self, node_id: NodeId, config: Configuration) -> Result<(), ConfigError> {
        let node_seed = self.seed.wrapping_add(u64::from(node_id).wrapping_mul(1000));
        let mut node = SimNode::new(
            node_id,
            self.sink,
            Rc::clone(&self.oracle),
            node_seed,
            self.params,
            self.current_time,
        );
        node.configure(config, self.current_time)?;
        self.nodes.insert(node_id, node);
        self.after_activity(node_id);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SimNode> {
        self.nodes.get_mut(&id)
    }

    /// All node ids, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn oracle(&self) -> &LatencyMatrix {
        &self.oracle
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run until `end_time` or until no events are left.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        self.run_while(end_time, |_| true)
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until the sink publishes its result, giving up at `deadline`.
    pub fn run_until_converged(&mut self, deadline: Timestamp) -> SimulationResult {
        self.run_while(deadline, |sim| sim.metrics.converged_at.is_none())
    }

    fn run_while(
        &mut self,
        end_time: Timestamp,
        keep_going: impl Fn(&Self) -> bool,
    ) -> SimulationResult {
        let mut stopped_early = false;
        while let Some(next) = self.event_queue.peek() {
            if next.time > end_time {
                break;
            }
            if !keep_going(self) {
                stopped_early = true;
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        if !stopped_early && keep_going(self) {
            self.advance_time(end_time);
        }
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::MessageDelivery { to, data, from } => self.deliver_message(to, from, data),
            Event::TimerFire { node } => self.fire_timer(node),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver_message(&mut self, to: NodeId, from: NodeId, data: Vec<u8>) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };
        debug!(now_ms = now.as_millis(), from, to, len = data.len(), "deliver");
        node.handle_transport_rx(&data, now);
        self.metrics.messages_delivered += 1;
        self.after_activity(to);
    }

    fn fire_timer(&mut self, node_id: NodeId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        if node.scheduled_wake == Some(now) {
            node.scheduled_wake = None;
        }
        self.metrics.timer_fires += 1;
        node.handle_timer(now);
        self.after_activity(node_id);
    }

    /// Put the node's frames on the air, record its events and queue its
    /// next timer.
    fn after_activity(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let frames = node.take_outgoing();
        let events = node.take_events();

        let wake = node.next_wake();
        let reschedule = match wake {
            Some(w) if node.scheduled_wake != Some(w) => {
                node.scheduled_wake = Some(w);
                Some(w)
            }
            _ => None,
        };

        for frame in frames {
            self.broadcast(node_id, frame);
        }
        for event in events {
            self.record_event(node_id, event);
        }
        if let Some(w) = reschedule {
            self.schedule(w.max(self.current_time), Event::TimerFire { node: node_id });
        }
    }

    fn record_event(&mut self, node_id: NodeId, event: NodeEvent) {
        let now = self.current_time;
        match event {
            NodeEvent::Closed { best } => {
                debug!(
                    now_ms = now.as_millis(),
                    node = node_id,
                    best = ?best.map(|c| c.weight),
                    "closed"
                );
                self.metrics.closed_at.insert(node_id, now);
            }
            NodeEvent::Converged { result } => {
                match &result {
                    Some(candidate) => info!(
                        now_ms = now.as_millis(),
                        path = %candidate.path,
                        weight = candidate.weight,
                        tag = %candidate.tag,
                        "sink converged"
                    ),
                    None => info!(now_ms = now.as_millis(), "sink converged without a path"),
                }
                self.metrics.closed_at.insert(node_id, now);
                self.metrics.converged_at = Some(now);
                self.metrics.sink_result = result;
            }
        }
    }

    /// Copy a frame to every active neighbour, subject to link loss.
    fn broadcast(&mut self, sender: NodeId, data: Vec<u8>) {
        self.metrics.messages_sent += 1;
        let now = self.current_time;

        for neighbor in self.topology.neighbors(sender) {
            let Some(link) = self.topology.get_link(sender, neighbor) else {
                continue;
            };
            let (loss_rate, delay) = (link.loss_rate, link.delay);

            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                debug!(now_ms = now.as_millis(), from = sender, to = neighbor, "dropped");
                self.metrics.messages_dropped += 1;
                continue;
            }

            self.schedule(
                now + delay,
                Event::MessageDelivery {
                    to: neighbor,
                    data: data.clone(),
                    from: sender,
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        debug!(now_ms = self.current_time.as_millis(), ?action, "scenario");
        match action {
            ScenarioAction::Partition { groups } => self.topology.partition(&groups),
            ScenarioAction::HealPartition => self.topology.heal(),
            ScenarioAction::DisableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { from, to, rate } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record every node's token state and best weight.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = TokenSnapshot::new(self.current_time);
        for (&id, node) in &self.nodes {
            snapshot.record_node(id, node.token_state(), node.best_weight());
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echotree::TokenState;

    /// Scenario 7 costs: node 3 is out of budget from everyone.
    fn triangle() -> LatencyMatrix {
        LatencyMatrix::new(3)
            .unwrap()
            .with(1, 2, 5)
            .with(1, 3, 50)
            .with(2, 3, 50)
    }

    fn config(tag: &str) -> Configuration {
        Configuration::new(tag, 3, 20, 20).unwrap()
    }

    fn triangle_sim() -> Simulator {
        let mut sim =
            Simulator::new(42, 1, triangle()).with_topology(Topology::fully_connected(&[1, 2, 3]));
        sim.add_node(1, config("sink")).unwrap();
        sim.add_node(2, config("near")).unwrap();
        sim.add_node(3, config("far")).unwrap();
        sim
    }

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(42, 1, triangle());
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
        assert_eq!(sim.sink(), 1);
    }

    #[test]
    fn test_add_nodes_schedules_sink_tick() {
        let sim = triangle_sim();
        assert_eq!(sim.node_ids(), vec![1, 2, 3]);
        // Only the sink has a deadline before any traffic
        assert!(sim.node(1).unwrap().scheduled_wake.is_some());
        assert!(sim.node(2).unwrap().scheduled_wake.is_none());
        assert!(sim.node(3).unwrap().scheduled_wake.is_none());
    }

    #[test]
    fn test_add_node_rejects_bad_id() {
        let mut sim = Simulator::new(42, 1, triangle());
        assert_eq!(
            sim.add_node(0, config("x")),
            Err(ConfigError::InvalidNodeId(0))
        );
    }

    #[test]
    fn test_triangle_converges() {
        let mut sim = triangle_sim();
        let result = sim.run_until_converged(Timestamp::from_secs(600));

        assert!(result.converged());
        let answer = result.sink_answer().unwrap();
        assert_eq!(answer.path.hops(), &[1, 2]);
        assert_eq!(answer.tag.as_str(), "near");
        assert_eq!(result.closed_nodes(), vec![1, 2]);
        assert_eq!(
            sim.node(3).unwrap().token_state(),
            TokenState::NotStarted
        );
        assert!(result.metrics.messages_delivered > 0);
    }

    #[test]
    fn test_isolated_sink_closes_empty() {
        let mut sim = Simulator::new(42, 1, triangle());
        sim.add_node(1, config("sink")).unwrap();
        let result = sim.run_for(Duration::from_secs(120));

        assert!(result.converged());
        assert!(result.sink_answer().is_none());
        assert!(result.queue_exhausted);
    }

    #[test]
    fn test_partition_action() {
        let mut sim = triangle_sim();
        sim.schedule_action(
            Timestamp::from_millis(500),
            ScenarioAction::Partition {
                groups: vec![vec![1], vec![2, 3]],
            },
        );
        let result = sim.run_for(Duration::from_secs(120));

        assert!(!sim.topology().is_connected(1, 2));
        assert!(sim.topology().is_connected(2, 3));
        // The sink floods into silence and closes alone
        assert!(result.converged());
        assert!(result.sink_answer().is_none());
        assert!(sim.node(2).unwrap().best_path().is_none());
    }

    #[test]
    fn test_snapshots_at_interval() {
        let mut sim = triangle_sim().with_snapshot_interval(Duration::from_secs(1));
        let result = sim.run_for(Duration::from_secs(60));

        // One per interval plus the final snapshot
        assert!(result.metrics.snapshots.len() >= 2);
        assert!(result.metrics.weights_monotonic());
    }
}
