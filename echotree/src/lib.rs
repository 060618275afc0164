#![forbid(unsafe_code)]
//! echotree - token-synchronized flood and echo path selection for wireless
//! sensor networks
//!
//! A sink seeds a requirement. The requirement spreads hop by hop as a
//! flood, but only one node floods at a time: a node lends its token to one
//! registered child, waits for that child's subtree to finish, then moves on.
//! Every node scores the paths that reach it on latency, price and resource
//! availability, and the best paths flow back to the sink as answers.
//!
//! This crate is `no_std` but **requires the `alloc` crate**.
//!
//! # Key Properties
//!
//! - Paths are simple and rooted at the sink
//! - Candidates over the latency budget are pruned where they arise
//! - At most one outstanding token grant per node
//! - Best paths only ever improve, and freeze when a node closes
//! - Every node that registered closes within bounded time, even under loss
//!
//! # Example
//!
//! ```ignore
//! use echotree::{Configuration, Event, LatencyMatrix, Node};
//!
//! let oracle = LatencyMatrix::from_rows(&table)?;
//! let mut node = Node::new(radio, oracle, rng, clock, my_id, SINK);
//! node.configure(Configuration::new("temp", 12, 20, 40)?, clock.now())?;
//!
//! spawn(async move { node.run().await });
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (NodeId, Tag, Configuration, Event)
//! - [`path`] - Paths and scored candidates
//! - [`score`] - Composite weight function
//! - [`registry`] - Per-node best path
//! - [`history`] - Route history for duplicate suppression
//! - [`queue`] - Pending child queue
//! - [`token`] - Token state machine and child admission
//! - [`flood`] - Flood handling and path extension
//! - [`convergecast`] - Answer propagation
//! - [`node`] - Main Node struct and public API
//! - [`wire`] - Wire format serialization
//! - [`traits`] - Transport, LinkCost, Random, Clock traits
//! - [`oracle`] - Table-backed link costs
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Memory bounds and protocol parameters

#![no_std]

// Prevent test/debug features from being used in release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It includes mock transports and clocks meant only for tests and simulation."
);

#[cfg(all(feature = "debug", not(test), not(debug_assertions)))]
compile_error!(
    "The `debug` feature must not be enabled in release builds. \
     It adds protocol tracing overhead intended only for development and simulation."
);

extern crate alloc;

#[macro_use]
pub mod debug;
pub mod config;
pub mod convergecast;
pub mod flood;
pub mod history;
pub mod node;
pub mod oracle;
pub mod path;
pub mod queue;
pub mod registry;
pub mod score;
pub mod time;
pub mod token;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{DefaultConfig, NodeConfig, ProtocolParams, SmallConfig};
pub use flood::FloodOutcome;
pub use node::Node;
pub use oracle::{LatencyMatrix, OracleError};
pub use path::{Path, PathCandidate, PathError};
pub use time::{Duration, Timestamp};
pub use token::TokenState;
pub use traits::{Clock, LinkCost, Outgoing, Random, Transport};
pub use types::{
    ConfigError, Configuration, Event, Incoming, NodeId, Priority, Tag, TransportMetrics,
};
pub use wire::{Decode, DecodeError, Encode, Message};

// Re-export constants
pub use types::{DEFAULT_LATENCY_BUDGET, MAX_NODES, MAX_PACKET_SIZE, MAX_TAG_LEN};
