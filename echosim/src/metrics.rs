//! Metrics collection for simulation analysis.

use echotree::{NodeId, PathCandidate, Timestamp, TokenState};
use hashbrown::HashMap;

/// Token states and best weights of every node at one instant.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub time: Timestamp,
    pub token_states: HashMap<NodeId, TokenState>,
    /// `+inf` for nodes without a best path.
    pub best_weights: HashMap<NodeId, f64>,
}

impl TokenSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            token_states: HashMap::new(),
            best_weights: HashMap::new(),
        }
    }

    pub fn record_node(&mut self, node_id: NodeId, state: TokenState, best_weight: f64) {
        self.token_states.insert(node_id, state);
        self.best_weights.insert(node_id, best_weight);
    }

    /// Nodes that reached Closed, ascending.
    pub fn closed(&self) -> Vec<NodeId> {
        self.nodes_where(TokenState::is_closed)
    }

    /// Nodes currently lending their token to a child, ascending.
    pub fn lenders(&self) -> Vec<NodeId> {
        self.nodes_where(|s| s.admitted_child().is_some())
    }

    /// Nodes still taking part in the token cycle, ascending.
    pub fn active(&self) -> Vec<NodeId> {
        self.nodes_where(TokenState::is_active)
    }

    pub fn all_closed(&self) -> bool {
        self.token_states.values().all(TokenState::is_closed)
    }

    fn nodes_where(&self, pred: impl Fn(&TokenState) -> bool) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .token_states
            .iter()
            .filter(|(_, state)| pred(state))
            .map(|(&id, _)| id)
            .collect();
        nodes.sort_unstable();
        nodes
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames put on the air.
    pub messages_sent: u64,
    /// Per-receiver copies lost to link loss.
    pub messages_dropped: u64,
    /// Per-receiver copies handed to a node.
    pub messages_delivered: u64,
    pub timer_fires: u64,
    /// When each node closed.
    pub closed_at: HashMap<NodeId, Timestamp>,
    /// When the sink published its result.
    pub converged_at: Option<Timestamp>,
    /// Result published by the sink.
    pub sink_result: Option<PathCandidate>,
    pub snapshots: Vec<TokenSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: TokenSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&TokenSnapshot> {
        self.snapshots.last()
    }

    /// True if, in every snapshot, no node's best weight went up before it
    /// closed.
    pub fn weights_monotonic(&self) -> bool {
        self.snapshots.windows(2).all(|pair| {
            pair[1]
                .best_weights
                .iter()
                .all(|(id, &later)| match pair[0].best_weights.get(id) {
                    Some(&earlier) => later <= earlier,
                    None => true,
                })
        })
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub end_time: Timestamp,
    pub metrics: SimMetrics,
    /// Whether the run ended because no events were left (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// The sink closed and published a result.
    pub fn converged(&self) -> bool {
        self.metrics.converged_at.is_some()
    }

    /// Best path the sink converged on.
    pub fn sink_answer(&self) -> Option<&PathCandidate> {
        self.metrics.sink_result.as_ref()
    }

    /// Nodes closed at the end of the run, ascending.
    pub fn closed_nodes(&self) -> Vec<NodeId> {
        self.metrics
            .latest_snapshot()
            .map(TokenSnapshot::closed)
            .unwrap_or_default()
    }
}
