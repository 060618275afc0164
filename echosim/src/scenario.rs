//! Scenario builder for setting up and running simulations.

use std::collections::BTreeMap;

use echotree::{
    Configuration, Duration, LatencyMatrix, NodeId, PathCandidate, ProtocolParams, Timestamp,
};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::reference;
use crate::sim::Simulator;
use crate::topology::Topology;

/// Default price and resource for nodes without an explicit configuration.
const DEFAULT_PRICE: u32 = 20;
const DEFAULT_RESOURCE: u32 = 20;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    /// Nodes 1..=N in order.
    Chain,
    /// Sink is the hub.
    Star,
    Custom(Topology),
}

/// Builder for simulation scenarios.
///
/// Nodes are numbered `1..=N` where `N` is the size of the latency table.
pub struct ScenarioBuilder {
    oracle: LatencyMatrix,
    sink: NodeId,
    seed: u64,
    /// Must be explicitly specified.
    topology_type: Option<TopologyType>,
    loss_rate: f64,
    delay: Duration,
    params: ProtocolParams,
    configs: BTreeMap<NodeId, Configuration>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    snapshot_interval: Option<Duration>,
}

impl ScenarioBuilder {
    /// Create a scenario over the nodes of `oracle`, with node 1 as sink.
    ///
    /// Note: You MUST specify a topology before calling build().
    /// Use `.fully_connected()`, `.chain_topology()`, `.star_topology()`,
    /// or `.topology(custom_topology)`.
    pub fn new(oracle: LatencyMatrix) -> Self {
        Self {
            oracle,
            sink: 1,
            seed: 42,
            topology_type: None,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            params: ProtocolParams::default(),
            configs: BTreeMap::new(),
            actions: Vec::new(),
            snapshot_interval: None,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.oracle.size()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_sink(mut self, sink: NodeId) -> Self {
        self.sink = sink;
        self
    }

    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = Some(TopologyType::Custom(topo));
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = Some(TopologyType::FullyConnected);
        self
    }

    pub fn chain_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Chain);
        self
    }

    pub fn star_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Star);
        self
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_latency_budget(mut self, budget: u32) -> Self {
        self.params = self.params.with_latency_budget(budget);
        self
    }

    /// Boot configuration for one node. Others get a default one.
    pub fn with_configuration(mut self, node: NodeId, config: Configuration) -> Self {
        self.configs.insert(node, config);
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    pub fn partition_at(mut self, time: Timestamp, groups: Vec<Vec<NodeId>>) -> Self {
        self.actions.push((time, ScenarioAction::Partition { groups }));
        self
    }

    pub fn heal_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::HealPartition));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::TakeSnapshot));
        self
    }

    /// Node ids `1..=N`.
    pub fn node_ids(&self) -> Vec<NodeId> {
        (1..=self.num_nodes()).map(|i| i as NodeId).collect()
    }

    /// Configuration every node will boot with, ascending by id.
    pub fn configurations(&self) -> Vec<(NodeId, Configuration)> {
        let count = self.num_nodes() as u8;
        self.node_ids()
            .into_iter()
            .map(|id| {
                let config = self.configs.get(&id).copied().unwrap_or_else(|| {
                    Configuration::new(
                        &format!("n{}", id),
                        count,
                        DEFAULT_PRICE,
                        DEFAULT_RESOURCE,
                    )
                    .unwrap_or_else(|e| panic!("default configuration for node {}: {}", id, e))
                });
                (id, config)
            })
            .collect()
    }

    fn build_topology(&self) -> Topology {
        let ids = self.node_ids();
        let mut topo = match &self.topology_type {
            Some(TopologyType::FullyConnected) => Topology::fully_connected(&ids),
            Some(TopologyType::Chain) => Topology::chain(&ids),
            Some(TopologyType::Star) => {
                let mut order = vec![self.sink];
                order.extend(ids.iter().copied().filter(|&id| id != self.sink));
                Topology::star(&order)
            }
            Some(TopologyType::Custom(t)) => t.clone(),
            None => panic!(
                "Topology must be explicitly specified. \
                Use .fully_connected(), .chain_topology(), .star_topology(), or .topology()"
            ),
        };

        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        topo.set_global_delay(self.delay);
        topo
    }

    /// Exhaustive-search answer for this scenario's oracle, topology and
    /// configurations.
    pub fn reference_answer(&self) -> Option<PathCandidate> {
        let configs: Vec<_> = self
            .configurations()
            .into_iter()
            .filter(|&(id, _)| id != self.sink)
            .collect();
        reference::best_path(
            &self.oracle,
            &self.build_topology(),
            self.sink,
            &configs,
            self.params.latency_budget,
        )
    }

    /// Build the simulator with all nodes booted.
    pub fn build(self) -> (Simulator, Vec<NodeId>) {
        let topo = self.build_topology();
        let configs = self.configurations();

        let mut sim = Simulator::new(self.seed, self.sink, self.oracle)
            .with_topology(topo)
            .with_params(self.params);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        let mut node_ids = Vec::with_capacity(configs.len());
        for (id, config) in configs {
            if let Err(e) = sim.add_node(id, config) {
                panic!("node {} rejected its configuration: {}", id, e);
            }
            node_ids.push(id);
        }

        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }

        (sim, node_ids)
    }

    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }

    pub fn run_until(self, time: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until(time)
    }

    /// Build and run until the sink converges, giving up at `deadline`.
    pub fn run_until_converged(self, deadline: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until_converged(deadline)
    }
}

/// N-node fully connected scenario over `oracle`.
pub fn simple_scenario(oracle: LatencyMatrix) -> ScenarioBuilder {
    ScenarioBuilder::new(oracle).fully_connected()
}

/// Three nodes where only node 2 fits the default budget of 20:
/// cost(1,2)=5, cost(1,3)=50, cost(2,3)=50, price and resource 20 everywhere.
pub fn budget_scenario() -> ScenarioBuilder {
    let oracle = LatencyMatrix::from_rows(&[[0, 5, 50], [5, 0, 50], [50, 50, 0]])
        .unwrap_or_else(|e| panic!("budget scenario table: {}", e));
    simple_scenario(oracle)
}
