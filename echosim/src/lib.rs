//! echosim - Discrete event network simulator for echotree protocol testing.
//!
//! This crate provides a deterministic, discrete-event simulator for running
//! the echotree protocol on many nodes at once without real-time delays.
//!
//! # Features
//!
//! - **Discrete event simulation**: No real-time delays, deterministic ordering
//! - **Shared broadcast medium**: Every frame reaches every active neighbour
//! - **Configurable topology**: Fully connected, chain, star, or custom topologies
//! - **Link properties**: Packet loss, delay, enable/disable per link
//! - **Scenario builder**: Per-node configurations, scheduled partitions and healing
//! - **Metrics collection**: Token state snapshots, message counts, convergence time
//! - **Reference search**: Exhaustive argmin to check what the sink converged on
//!
//! # Example
//!
//! ```
//! use echosim::{budget_scenario, Timestamp};
//!
//! let result = budget_scenario()
//!     .with_seed(7)
//!     .run_until_converged(Timestamp::from_secs(600));
//!
//! assert!(result.converged());
//! assert_eq!(result.sink_answer().unwrap().path.hops(), &[1, 2]);
//! ```
//!
//! # Architecture
//!
//! The simulator keeps a priority queue of events ordered by
//! (time, sequence number). The main loop:
//! 1. Pop next event from queue
//! 2. Advance simulation time
//! 3. Deliver the frame or fire the node's timers
//! 4. Collect outgoing frames and protocol events
//! 5. Broadcast frames through the topology, queue the node's next deadline
//!
//! Handlers are called directly (`handle_transport_rx`, `handle_timer`)
//! instead of through the async `node.run()` method.

pub mod event;
pub mod metrics;
pub mod node;
pub mod reference;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use echotree::{Duration, NodeId, Timestamp};
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{SimMetrics, SimulationResult, TokenSnapshot};
pub use node::SimNode;
pub use scenario::{budget_scenario, simple_scenario, ScenarioBuilder};
pub use sim::Simulator;
pub use topology::{Link, Topology};

#[cfg(test)]
mod tests {
    use super::*;
    use echotree::{LatencyMatrix, TokenState};

    /// Equal adjacent costs of 3.
    fn line(n: usize) -> LatencyMatrix {
        let mut m = LatencyMatrix::new(n).unwrap();
        for a in 1..n {
            m.set(a as NodeId, a as NodeId + 1, 3);
        }
        m
    }

    #[test]
    fn test_single_sink_converges_empty() {
        let result = ScenarioBuilder::new(LatencyMatrix::new(1).unwrap())
            .fully_connected()
            .run_for(Duration::from_secs(60));

        assert!(result.converged());
        assert!(result.sink_answer().is_none());
        assert_eq!(result.closed_nodes(), vec![1]);
    }

    #[test]
    fn test_chain_topology_reaches_far_end() {
        let (mut sim, nodes) = ScenarioBuilder::new(line(4))
            .with_seed(42)
            .chain_topology()
            .build();
        let result = sim.run_until_converged(Timestamp::from_secs(3600));

        assert!(result.converged());
        // Same price everywhere, so the shortest path wins
        assert_eq!(result.sink_answer().unwrap().path.hops(), &[1, 2]);

        // The token walked all the way down the chain
        let far = sim.node(4).unwrap();
        assert_eq!(far.best_path().unwrap().path.hops(), &[1, 2, 3, 4]);
        for id in nodes {
            assert!(sim.node(id).unwrap().is_closed(), "node {} open", id);
        }
    }

    #[test]
    fn test_chain_prefers_cheap_far_node() {
        let builder = ScenarioBuilder::new(line(4))
            .chain_topology()
            .with_configuration(2, echotree::Configuration::new("n2", 4, 400, 20).unwrap())
            .with_configuration(3, echotree::Configuration::new("n3", 4, 400, 20).unwrap())
            .with_configuration(4, echotree::Configuration::new("n4", 4, 1, 20).unwrap());
        let expected = builder.reference_answer().unwrap();
        let result = builder.run_until_converged(Timestamp::from_secs(3600));

        let answer = result.sink_answer().unwrap();
        assert_eq!(answer.path.hops(), &[1, 2, 3, 4]);
        assert_eq!(answer.path, expected.path);
        assert_eq!(answer.tag.as_str(), "n4");
    }

    #[test]
    fn test_star_topology_single_round() {
        let oracle = LatencyMatrix::new(5)
            .unwrap()
            .with(1, 2, 4)
            .with(1, 3, 2)
            .with(1, 4, 9)
            .with(1, 5, 6);
        let (mut sim, _) = ScenarioBuilder::new(oracle).star_topology().build();
        let result = sim.run_until_converged(Timestamp::from_secs(3600));

        // Spokes cannot hear each other, so every path is one hop
        let answer = result.sink_answer().unwrap();
        assert_eq!(answer.path.hops(), &[1, 3]);
        for spoke in 2..=5 {
            let node = sim.node(spoke).unwrap();
            assert_eq!(node.token_state(), TokenState::Closed);
            assert_eq!(node.best_path().unwrap().path.len(), 2);
        }
    }
}
