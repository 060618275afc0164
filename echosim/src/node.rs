//! SimNode wrapper for simulated echotree nodes.

use std::cell::{Cell, RefCell};
use std::future::{ready, Ready};
use std::rc::Rc;

use echotree::config::DefaultConfig;
use echotree::debug::DebugEvent;
use echotree::traits::{Clock, PriorityQueue, Random, Transport, TransportInChannel};
use echotree::{
    ConfigError, Configuration, Duration, Event, Incoming, LatencyMatrix, Node, NodeId,
    PathCandidate, ProtocolParams, Timestamp, TokenState, MAX_PACKET_SIZE,
};
use embassy_sync::channel::Channel;
use tracing::trace;

/// Outgoing queue depth of a simulated radio.
const SIM_QUEUE_SIZE: usize = 32;

/// Simulated radio.
///
/// Frames queued by the protocol stay in the priority queue until the
/// simulator collects them and puts them on the air.
pub struct SimTransport {
    mtu: usize,
    outgoing: PriorityQueue,
    incoming: TransportInChannel,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::with_queue_size(SIM_QUEUE_SIZE)
    }

    pub fn with_queue_size(size: usize) -> Self {
        Self {
            mtu: MAX_PACKET_SIZE,
            outgoing: PriorityQueue::new(size),
            incoming: Channel::new(),
        }
    }

    /// Inject a frame as if received from the radio.
    pub fn inject_rx(&self, data: Vec<u8>) {
        let _ = self.incoming.try_send(Incoming::new(data));
    }

    /// Take all queued frames, most urgent first.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.outgoing.try_receive() {
            frames.push(frame);
        }
        frames
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn outgoing(&self) -> &PriorityQueue {
        &self.outgoing
    }

    fn incoming(&self) -> &TransportInChannel {
        &self.incoming
    }
}

/// Mock clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::at(Timestamp::ZERO)
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }

    pub fn advance(&self, duration: Duration) {
        self.current.set(self.current.get() + duration);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Mock random for simulation (deterministic LCG).
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn new() -> Self {
        Self { state: 12345 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Default for SimRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let range = max.saturating_sub(min);
        if range == 0 {
            return min;
        }
        min + ((self.state >> 33) % range)
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimTransport, Rc<LatencyMatrix>, SimRandom, SimClock, DefaultConfig>;

/// Wrapper around an echotree Node for simulation.
pub struct SimNode {
    /// The underlying echotree node.
    inner: SimNodeInner,
    /// Debug events captured from the node, oldest first.
    debug_log: Rc<RefCell<Vec<DebugEvent>>>,
    /// Timer event already queued in the simulator, if any.
    pub(crate) scheduled_wake: Option<Timestamp>,
}

impl SimNode {
    /// Create an unconfigured node sharing the network's latency table.
    pub fn new(
        node_id: NodeId,
        sink: NodeId,
        oracle: Rc<LatencyMatrix>,
        seed: u64,
        params: ProtocolParams,
        created_at: Timestamp,
    ) -> Self {
        let mut inner = Node::new(
            SimTransport::new(),
            oracle,
            SimRandom::with_seed(seed),
            SimClock::at(created_at),
            node_id,
            sink,
        )
        .with_params(params);

        let debug_log = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&debug_log);
        inner.set_debug_emitter(Box::new(move |node: NodeId, event: DebugEvent| {
            trace!(node, ?event, "protocol");
            log.borrow_mut().push(event);
        }));

        Self {
            inner,
            debug_log,
            scheduled_wake: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id()
    }

    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    /// Boot the node with its configuration.
    pub fn configure(&mut self, config: Configuration, now: Timestamp) -> Result<(), ConfigError> {
        self.inner.clock().set(now);
        self.inner.configure(config, now)
    }

    pub fn is_sink(&self) -> bool {
        self.inner.is_sink()
    }

    pub fn token_state(&self) -> TokenState {
        self.inner.token_state()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn best_path(&self) -> Option<&PathCandidate> {
        self.inner.best_path()
    }

    /// Weight of the best path, `+inf` when the node has none.
    pub fn best_weight(&self) -> f64 {
        self.inner.best_path().map_or(f64::INFINITY, |c| c.weight)
    }

    pub fn next_wake(&self) -> Option<Timestamp> {
        self.inner.next_wake()
    }

    /// Handle an incoming transport frame.
    pub fn handle_transport_rx(&mut self, data: &[u8], now: Timestamp) {
        // Keep clock.now() consistent for anything reading it.
        self.inner.clock().set(now);
        self.inner.handle_transport_rx(data, now);
    }

    /// Handle timer events.
    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(now);
    }

    /// Take all outgoing frames from the transport.
    pub fn take_outgoing(&self) -> Vec<Vec<u8>> {
        self.inner.transport().take_sent()
    }

    /// Take all protocol events from the node's event channel.
    pub fn take_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.events().try_receive() {
            events.push(event);
        }
        events
    }

    /// Take all debug events captured since the last call.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        std::mem::take(&mut *self.debug_log.borrow_mut())
    }
}
