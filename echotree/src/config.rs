//! Compile-time memory bounds and runtime protocol parameters.
//!
//! `NodeConfig` fixes the capacity of every bounded collection a node owns.
//! `ProtocolParams` carries the timing and pruning knobs, which a deployment
//! may tune without recompiling.
//!
//! | Config | Route history | Pending children | Outgoing queue |
//! |--------|--------------:|-----------------:|---------------:|
//! | `DefaultConfig` | 30 | 30 | 16 |
//! | `SmallConfig` | 8 | 8 | 4 |
//!
//! # Example
//!
//! ```ignore
//! use echotree::{Node, SmallConfig};
//!
//! let node = Node::<_, _, _, _, SmallConfig>::new(transport, oracle, random, clock, 4, 1);
//! ```

use crate::time::Duration;
use crate::types::{DEFAULT_LATENCY_BUDGET, ECHO_TIMEOUT, TICK_BASE, TICK_JITTER};

/// Configuration trait for compile-time memory tuning.
///
/// All bounds must be non-zero.
pub trait NodeConfig {
    /// Maximum distinct path signatures remembered for duplicate suppression.
    const MAX_ROUTE_HISTORY: usize;

    /// Maximum children waiting for the token at once.
    const MAX_PENDING_CHILDREN: usize;

    /// Capacity of the outgoing priority queue expected from the transport.
    const MAX_OUTGOING: usize;
}

/// Sized for a full 30-node deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NodeConfig for DefaultConfig {
    const MAX_ROUTE_HISTORY: usize = 30;
    const MAX_PENDING_CHILDREN: usize = 30;
    const MAX_OUTGOING: usize = 16;
}

/// For small clusters on very constrained MCUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl NodeConfig for SmallConfig {
    const MAX_ROUTE_HISTORY: usize = 8;
    const MAX_PENDING_CHILDREN: usize = 8;
    const MAX_OUTGOING: usize = 4;
}

/// Runtime protocol parameters.
///
/// Defaults reproduce the reference firmware: a latency budget of 20, a 5 s
/// echo window and a broadcast tick of 8 s plus up to 8 s of jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolParams {
    /// Candidates whose accumulated latency exceeds this are dropped.
    pub latency_budget: u32,
    /// How long a node waits for registrations after its own flood.
    pub echo_timeout: Duration,
    /// Fixed part of the scheduler period.
    pub tick_base: Duration,
    /// Upper bound (exclusive) of the random part of the scheduler period.
    pub tick_jitter: Duration,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            latency_budget: DEFAULT_LATENCY_BUDGET,
            echo_timeout: ECHO_TIMEOUT,
            tick_base: TICK_BASE,
            tick_jitter: TICK_JITTER,
        }
    }
}

impl ProtocolParams {
    pub fn with_latency_budget(mut self, budget: u32) -> Self {
        self.latency_budget = budget;
        self
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    pub fn with_tick(mut self, base: Duration, jitter: Duration) -> Self {
        self.tick_base = base;
        self.tick_jitter = jitter;
        self
    }

    /// Longest a single admitted child may hold the token: one worst-case
    /// scheduler period plus one echo window, per expected node.
    pub fn admission_timeout(&self, expected_node_count: u8) -> Duration {
        (self.tick_base + self.tick_jitter + self.echo_timeout) * u64::from(expected_node_count.max(1))
    }

    /// How long a registered node waits for a grant before closing on its own.
    pub fn registration_timeout(&self, expected_node_count: u8) -> Duration {
        self.admission_timeout(expected_node_count) * u64::from(expected_node_count.max(1))
    }
}
