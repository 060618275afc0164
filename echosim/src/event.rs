//! Simulation events and their queue order.
//!
//! Events pop earliest first; events due at the same millisecond pop in the
//! order they were scheduled, which keeps a run reproducible from its seed.

use std::cmp::Ordering;

use echotree::{NodeId, Timestamp};

/// Scheduling order, assigned by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Changes to the network applied at a scheduled time.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Cut every link that crosses between groups.
    Partition { groups: Vec<Vec<NodeId>> },
    /// Reactivate every link.
    HealPartition,
    /// Take one link down.
    DisableLink { from: NodeId, to: NodeId },
    /// Bring one link back up.
    EnableLink { from: NodeId, to: NodeId },
    /// Change one link's loss probability.
    SetLossRate { from: NodeId, to: NodeId, rate: f64 },
    /// Record every node's token state and best weight.
    TakeSnapshot,
}

/// What happens when a scheduled entry comes due.
#[derive(Debug, Clone)]
pub enum Event {
    /// A frame arrives at `to` after crossing the link from `from`.
    MessageDelivery {
        to: NodeId,
        data: Vec<u8>,
        from: NodeId,
    },
    /// The node's earliest deadline is due.
    TimerFire { node: NodeId },
    /// Apply a topology change or take a snapshot.
    ScenarioAction(ScenarioAction),
}

/// Queue entry.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Timestamp,
    /// Breaks ties between events at the same time.
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Ordering is reversed so `BinaryHeap` pops the earliest entry.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
