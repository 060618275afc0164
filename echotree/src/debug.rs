//! Debug events for protocol tracing.
//!
//! Compiled in with the `debug` feature. The simulator installs an emitter
//! per node to follow floods, token moves and answers.

use alloc::boxed::Box;

use crate::time::Timestamp;
use crate::types::NodeId;

/// Receives debug events from a node.
pub trait DebugEmitter {
    fn emit(&mut self, node: NodeId, event: DebugEvent);
}

impl<F: FnMut(NodeId, DebugEvent)> DebugEmitter for F {
    fn emit(&mut self, node: NodeId, event: DebugEvent) {
        self(node, event)
    }
}

/// Boxed emitter as stored on a node.
pub type BoxedEmitter = Box<dyn DebugEmitter>;

/// Emits a debug event if the `debug` feature is on and an emitter is
/// installed. The event expression is not evaluated otherwise.
macro_rules! emit_debug {
    ($node:expr, $event:expr) => {
        #[cfg(feature = "debug")]
        {
            if $node.has_debug_emitter() {
                let event = $event;
                $node.emit_debug(event);
            }
        }
    };
}

/// Debug events emitted by the node for protocol tracing.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// Own flood handed to the transport.
    FloodSent {
        timestamp: Timestamp,
        path_len: usize,
        latency: u32,
        echo_deadline: Timestamp,
    },
    /// Flood received and evaluated.
    FloodReceived {
        timestamp: Timestamp,
        from: NodeId,
        path_len: usize,
        incremental: u32,
    },
    /// Candidate above the latency budget.
    CandidateRejected { from: NodeId, latency: u32, budget: u32 },
    /// Flood path already contains this node.
    LoopDiscarded { from: NodeId },
    /// Extended path already registered.
    DuplicateFlood { from: NodeId },
    /// Best path replaced by a lighter one.
    BestPathImproved {
        weight: f64,
        path_len: usize,
        predecessor: Option<NodeId>,
    },
    /// Registration queued for the token.
    ChildQueued { child: NodeId, queue_len: usize },
    /// Token handed to a child.
    TokenGranted {
        timestamp: Timestamp,
        child: NodeId,
        deadline: Timestamp,
    },
    /// Grant accepted; own flood scheduled.
    TokenAccepted { from: NodeId, flood_at: Timestamp },
    /// Grant refused with an immediate return.
    TokenRefused { from: NodeId, reason: &'static str },
    /// Admitted child returned the token.
    TokenReturned { child: NodeId },
    /// Return from a node that does not hold our token.
    StaleReturn { from: NodeId },
    /// Echo window or admission window expired.
    EchoTimeout {
        timestamp: Timestamp,
        silent_child: Option<NodeId>,
    },
    /// Registered but never granted; closing alone.
    RegistrationTimeout { timestamp: Timestamp },
    /// Answer evaluated.
    AnswerReceived { from: NodeId, adopted: bool },
    /// Closed node passed an answer on without adopting it.
    AnswerRelayed { from: NodeId, to: NodeId },
    /// Node closed.
    Closed {
        timestamp: Timestamp,
        predecessor: Option<NodeId>,
        best_weight: f64,
    },
    /// A bounded structure refused an insert.
    ResourceExhausted { what: &'static str },
    /// Frame could not be decoded.
    MessageDecodeFailed { data_len: usize },
}
