//! Node implementation - the main protocol state machine.
//!
//! One `Node` owns every piece of per-device protocol state. It is driven by
//! two synchronous entry points that run to completion:
//! - `handle_transport_rx` for each received frame
//! - `handle_timer` whenever `next_wake()` is reached
//!
//! `run()` wraps both in an async loop for embassy-style executors; the
//! simulator calls them directly.
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::new(transport, oracle, random, clock, 4, 1);
//! node.configure(Configuration::new("temp", 5, 12, 40)?, clock.now());
//!
//! spawn(async move {
//!     node.run().await;
//! });
//!
//! // Sink side
//! if let Event::Converged { result } = node.events().receive().await { ... }
//! ```

use core::marker::PhantomData;

use embassy_sync::channel::Channel;

use crate::config::{DefaultConfig, NodeConfig, ProtocolParams};
use crate::history::RouteHistory;
use crate::path::PathCandidate;
use crate::queue::PendingChildQueue;
use crate::registry::PathRegistry;
use crate::time::{Duration, Timestamp};
use crate::token::TokenState;
use crate::traits::{Clock, EventChannel, LinkCost, Outgoing, Random, Transport};
use crate::types::{Configuration, ConfigError, Event, NodeId, TransportMetrics};
use crate::wire::{Decode, Directed, DirectedKind, Encode, Flood, Message};

/// Idle wake interval when no deadline is armed.
const IDLE_WAKE: Duration = Duration::from_secs(60);

/// The main protocol node.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `O`: Link cost oracle
/// - `R`: Random number generator
/// - `Clk`: Clock/timer implementation
/// - `Cfg`: Memory bounds
pub struct Node<T, O, R, Clk, Cfg = DefaultConfig> {
    // Dependencies (injected)
    transport: T,
    oracle: O,
    random: R,
    clock: Clk,

    events: EventChannel,
    #[cfg(feature = "debug")]
    debug_emitter: Option<crate::debug::BoxedEmitter>,

    // Identity
    node_id: NodeId,
    sink: NodeId,
    params: ProtocolParams,
    configuration: Option<Configuration>,

    // Protocol state
    pub(crate) token: TokenState,
    pub(crate) registry: PathRegistry,
    pub(crate) history: RouteHistory,
    pub(crate) pending: PendingChildQueue,
    /// Node whose grant we accepted.
    pub(crate) granted_by: Option<NodeId>,

    // Scheduling
    pub(crate) next_tick: Option<Timestamp>,
    pub(crate) echo_deadline: Option<Timestamp>,
    pub(crate) registration_deadline: Option<Timestamp>,

    metrics: TransportMetrics,
    _config: PhantomData<Cfg>,
}

impl<T, O, R, Clk, Cfg> Node<T, O, R, Clk, Cfg>
where
    T: Transport,
    O: LinkCost,
    R: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Create an unconfigured node. It ignores all traffic until
    /// [`configure`](Self::configure) is called.
    pub fn new(
        transport: T,
        oracle: O,
        random: R,
        clock: Clk,
        node_id: NodeId,
        sink: NodeId,
    ) -> Self {
        Self {
            transport,
            oracle,
            random,
            clock,

            events: Channel::new(),
            #[cfg(feature = "debug")]
            debug_emitter: None,

            node_id,
            sink,
            params: ProtocolParams::default(),
            configuration: None,

            token: TokenState::NotStarted,
            registry: PathRegistry::new(node_id),
            history: RouteHistory::with_capacity(Cfg::MAX_ROUTE_HISTORY),
            pending: PendingChildQueue::with_capacity(Cfg::MAX_PENDING_CHILDREN),
            granted_by: None,

            next_tick: None,
            echo_deadline: None,
            registration_deadline: None,

            metrics: TransportMetrics::default(),
            _config: PhantomData,
        }
    }

    /// Replace the default protocol parameters.
    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    /// Install the boot configuration.
    ///
    /// A configuration is set once; later calls are refused. The sink takes
    /// the token immediately and schedules its first flood.
    pub fn configure(
        &mut self,
        configuration: Configuration,
        now: Timestamp,
    ) -> Result<(), ConfigError> {
        if !crate::types::is_valid_node_id(self.node_id) {
            return Err(ConfigError::InvalidNodeId(self.node_id));
        }
        if self.configuration.is_some() {
            return Ok(());
        }
        self.configuration = Some(configuration);
        if self.is_sink() {
            self.token = TokenState::NoToken;
            self.schedule_tick(now);
        }
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn is_sink(&self) -> bool {
        self.node_id == self.sink
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn token_state(&self) -> TokenState {
        self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_closed()
    }

    /// Best path through this node so far (frozen once closed).
    pub fn best_path(&self) -> Option<&PathCandidate> {
        self.registry.best()
    }

    /// Best path ending at this node; what it floods.
    pub fn own_route(&self) -> Option<&PathCandidate> {
        self.registry.route()
    }

    /// Node this one reports to.
    pub fn predecessor(&self) -> Option<NodeId> {
        self.registry.predecessor()
    }

    /// The sink's converged answer, once it has closed.
    pub fn converged(&self) -> Option<&PathCandidate> {
        if self.is_sink() && self.is_closed() {
            self.registry.best()
        } else {
            None
        }
    }

    pub fn pending_children(&self) -> &PendingChildQueue {
        &self.pending
    }

    pub fn route_history(&self) -> &RouteHistory {
        &self.history
    }

    /// Channel for protocol events.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    /// Earliest armed deadline, if any.
    pub fn next_wake(&self) -> Option<Timestamp> {
        [self.next_tick, self.echo_deadline, self.registration_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Run the node's main loop.
    ///
    /// Waits on the incoming channel and the next deadline, whichever comes
    /// first. Never returns; a closed node simply stops reacting.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        loop {
            let wake = self
                .next_wake()
                .unwrap_or_else(|| self.clock.now() + IDLE_WAKE);

            let result = select(
                self.transport.incoming().receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            let now = self.clock.now();
            match result {
                Either::First(frame) => self.handle_transport_rx(&frame.data, now),
                Either::Second(()) => self.handle_timer(now),
            }
        }
    }

    /// Handle one received frame.
    pub fn handle_transport_rx(&mut self, data: &[u8], now: Timestamp) {
        let msg = match Message::decode_from_slice(data) {
            Ok(m) => m,
            Err(_) => {
                self.metrics.decode_failures += 1;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::MessageDecodeFailed {
                        data_len: data.len()
                    }
                );
                return;
            }
        };

        match msg {
            Message::Flood(flood) => {
                self.metrics.floods_received += 1;
                self.handle_flood(flood, now);
            }
            Message::Directed(directed) => {
                if directed.to != self.node_id {
                    self.metrics.directed_overheard += 1;
                    return;
                }
                self.metrics.directed_received += 1;
                self.handle_directed(directed, now);
            }
        }
    }

    fn handle_directed(&mut self, msg: Directed, now: Timestamp) {
        if self.configuration.is_none() {
            return;
        }
        match msg.kind {
            DirectedKind::RegisterChild => self.handle_register_child(msg.from, now),
            DirectedKind::TokenGrant => self.handle_token_grant(msg.from, now),
            DirectedKind::TokenReturn => self.handle_token_return(msg.from, now),
            DirectedKind::Answer => {
                if let Some(candidate) = msg.candidate {
                    self.handle_answer(msg.from, candidate, now);
                }
            }
        }
    }

    /// Fire every deadline that `now` has reached.
    pub fn handle_timer(&mut self, now: Timestamp) {
        if now.reached(self.next_tick) {
            self.next_tick = None;
            self.handle_tick(now);
        }

        if now.reached(self.echo_deadline) {
            self.echo_deadline = None;
            self.handle_echo_timeout(now);
        }

        if now.reached(self.registration_deadline) {
            self.registration_deadline = None;
            self.handle_registration_timeout(now);
        }
    }

    /// Periodic scheduler tick. A node holding the token floods.
    fn handle_tick(&mut self, now: Timestamp) {
        match self.token {
            TokenState::NotStarted | TokenState::Closed => {}
            TokenState::NoToken => {
                self.emit_flood(now);
                self.schedule_tick(now);
            }
            TokenState::WaitingForEcho(_) => self.schedule_tick(now),
        }
    }

    /// Arm the next tick `tick_base + U[0, tick_jitter)` from now.
    pub(crate) fn schedule_tick(&mut self, now: Timestamp) {
        let jitter = self.random.gen_range(0, self.params.tick_jitter.as_millis());
        self.next_tick = Some(now + self.params.tick_base + Duration::from_millis(jitter));
    }

    pub(crate) fn expected_node_count(&self) -> u8 {
        self.configuration.map_or(1, |c| c.expected_node_count())
    }

    pub(crate) fn admission_timeout(&self) -> Duration {
        self.params.admission_timeout(self.expected_node_count())
    }

    pub(crate) fn registration_timeout(&self) -> Duration {
        self.params.registration_timeout(self.expected_node_count())
    }

    pub(crate) fn send_flood(&mut self, flood: Flood) -> bool {
        let sent = self.send(Message::Flood(flood));
        if sent {
            self.metrics.floods_sent += 1;
        }
        sent
    }

    pub(crate) fn send_directed(&mut self, msg: Directed) -> bool {
        let sent = self.send(Message::Directed(msg));
        if sent {
            self.metrics.directed_sent += 1;
        }
        sent
    }

    fn send(&mut self, msg: Message) -> bool {
        let frame = msg.encode_to_vec();
        if frame.len() > self.transport.mtu() {
            self.metrics.oversized += 1;
            emit_debug!(
                self,
                crate::debug::DebugEvent::ResourceExhausted { what: "mtu" }
            );
            return false;
        }
        if self
            .transport
            .outgoing()
            .try_send_frame(msg.priority(), frame)
        {
            return true;
        }
        self.record_send_dropped();
        false
    }

    fn record_send_dropped(&mut self) {
        self.metrics.send_dropped += 1;
        emit_debug!(
            self,
            crate::debug::DebugEvent::ResourceExhausted {
                what: "outgoing queue"
            }
        );
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        // A full event channel means nobody is listening.
        let _ = self.events.try_send(event);
    }

    /// Install a debug emitter.
    #[cfg(feature = "debug")]
    pub fn set_debug_emitter(&mut self, emitter: crate::debug::BoxedEmitter) {
        self.debug_emitter = Some(emitter);
    }

    #[cfg(feature = "debug")]
    pub(crate) fn has_debug_emitter(&self) -> bool {
        self.debug_emitter.is_some()
    }

    #[cfg(feature = "debug")]
    pub(crate) fn emit_debug(&mut self, event: crate::debug::DebugEvent) {
        if let Some(emitter) = self.debug_emitter.as_mut() {
            emitter.emit(self.node_id, event);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::traits::test_impls::{MockClock, MockRandom, MockTransport};

    #[test]
    fn test_node_starts_idle() {
        let n = node(2, 1, triangle());
        assert_eq!(n.token_state(), TokenState::NotStarted);
        assert!(n.best_path().is_none());
        assert!(n.next_wake().is_none());
        assert!(n.converged().is_none());
    }

    #[test]
    fn test_configure_sink_takes_token() {
        let n = configured(1, 1, triangle(), 20);
        assert_eq!(n.token_state(), TokenState::NoToken);

        // First tick within [tick_base, tick_base + tick_jitter)
        let wake = n.next_wake().unwrap();
        assert!(wake >= Timestamp::from_secs(8));
        assert!(wake < Timestamp::from_secs(16));
    }

    #[test]
    fn test_configure_relay_waits() {
        let n = configured(2, 1, triangle(), 20);
        assert_eq!(n.token_state(), TokenState::NotStarted);
        assert!(n.next_wake().is_none());
    }

    #[test]
    fn test_configuration_is_immutable() {
        let mut n = configured(2, 1, triangle(), 20);
        let other = Configuration::new("other", 5, 99, 1).unwrap();
        n.configure(other, Timestamp::ZERO).unwrap();
        assert_eq!(n.configuration().unwrap().price_cost(), 20);
    }

    #[test]
    fn test_invalid_node_id_refused() {
        let mut n = node(0, 1, triangle());
        let config = Configuration::new("n", 3, 20, 20).unwrap();
        assert_eq!(
            n.configure(config, Timestamp::ZERO),
            Err(ConfigError::InvalidNodeId(0))
        );
    }

    #[test]
    fn test_unconfigured_node_ignores_traffic() {
        let mut n = node(2, 1, triangle());
        n.handle_transport_rx(&control(DirectedKind::TokenGrant, 1, 2), Timestamp::ZERO);
        assert_eq!(n.token_state(), TokenState::NotStarted);
        assert!(n.transport().take_sent().is_empty());
    }

    #[test]
    fn test_garbage_is_counted_not_fatal() {
        let mut n = configured(2, 1, triangle(), 20);
        n.handle_transport_rx(&[0xde, 0xad], Timestamp::ZERO);
        n.handle_transport_rx(&[], Timestamp::ZERO);
        assert_eq!(n.metrics().decode_failures, 2);
        assert_eq!(n.token_state(), TokenState::NotStarted);
    }

    #[test]
    fn test_directed_for_others_is_overheard() {
        let mut n = configured(2, 1, triangle(), 20);
        n.handle_transport_rx(&control(DirectedKind::TokenGrant, 1, 3), Timestamp::ZERO);
        assert_eq!(n.metrics().directed_overheard, 1);
        assert_eq!(n.metrics().directed_received, 0);
        assert_eq!(n.token_state(), TokenState::NotStarted);
    }

    #[test]
    fn test_sink_with_no_neighbours_converges_empty() {
        let mut sink = configured(1, 1, triangle(), 20);
        let flood = tick_until_flood(&mut sink);
        assert_eq!(flood.path.hops(), &[1]);
        assert!(matches!(sink.token_state(), TokenState::WaitingForEcho(None)));

        // Nobody registers; the echo window expires
        let deadline = sink.echo_deadline.unwrap();
        sink.handle_timer(deadline);
        assert!(sink.is_closed());
        assert!(sink.converged().is_none());
        assert_eq!(
            sink.events().try_receive().ok(),
            Some(Event::Converged { result: None })
        );
        assert!(sink.next_wake().is_none());
    }

    #[test]
    fn test_frame_over_mtu_not_queued() {
        let mut sink: TestNode = Node::new(
            MockTransport::new().with_mtu(4),
            triangle(),
            MockRandom::new(),
            MockClock::new(),
            1,
            1,
        );
        sink.configure(Configuration::new("sink", 3, 20, 20).unwrap(), Timestamp::ZERO)
            .unwrap();
        let wake = sink.next_wake().unwrap();
        sink.handle_timer(wake);

        assert_eq!(sink.metrics().oversized, 1);
        assert_eq!(sink.metrics().floods_sent, 0);
        assert!(sink.transport().take_sent().is_empty());
        // The echo window still opens
        assert_eq!(sink.token_state(), TokenState::WaitingForEcho(None));
    }

    #[test]
    fn test_next_wake_is_earliest_deadline() {
        let mut n = configured(2, 1, triangle(), 20);
        n.next_tick = Some(Timestamp::from_secs(30));
        n.echo_deadline = Some(Timestamp::from_secs(12));
        n.registration_deadline = Some(Timestamp::from_secs(50));
        assert_eq!(n.next_wake(), Some(Timestamp::from_secs(12)));
    }
}
