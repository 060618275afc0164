//! Core traits for transport, link cost, time, and randomness abstraction.
//!
//! These traits allow the protocol to be used with different:
//! - Radio backends (802.15.4, LoRa, simulation)
//! - Link cost sources (measured tables, injected test fixtures)
//! - Time sources (hardware timers, simulated time)
//! - Random number generators

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::{Event, Incoming, NodeId, Priority};

/// Queue size for transport channels.
pub(crate) const TRANSPORT_QUEUE_SIZE: usize = 8;

/// Queue size for event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 4;

/// Mutex type used for channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// Incoming transport message channel type.
pub type TransportInChannel = Channel<ChannelMutex, Incoming, TRANSPORT_QUEUE_SIZE>;

/// Protocol event channel.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Trait for messages that can be sent via the priority queue.
pub trait Outgoing {
    fn priority(&self) -> Priority;

    fn encode(&self) -> Vec<u8>;
}

/// Priority queue for outgoing frames.
///
/// Frames are ordered by priority and then by insertion, so token control
/// traffic overtakes queued floods while frames of equal priority keep their
/// order. When full, the lowest-priority frame is evicted to make room,
/// unless the new frame is itself no more urgent than everything queued.
///
/// Guarded by a `CriticalSectionRawMutex`, so a radio driver may drain it
/// from an interrupt while the protocol task fills it.
pub struct PriorityQueue {
    inner:
        embassy_sync::blocking_mutex::Mutex<ChannelMutex, core::cell::RefCell<PriorityQueueInner>>,
    signal: embassy_sync::signal::Signal<ChannelMutex, ()>,
}

struct PriorityQueueInner {
    items: alloc::collections::BTreeMap<(Priority, u64), Vec<u8>>,
    next_seq: u64,
    max_size: usize,
}

impl PriorityQueueInner {
    /// Frees a slot for `priority` if possible.
    fn make_room(&mut self, priority: Priority) -> bool {
        if self.items.len() < self.max_size {
            return true;
        }
        match self.items.last_key_value() {
            Some((&(lowest, _), _)) if priority < lowest => {
                self.items.pop_last();
                true
            }
            _ => false,
        }
    }
}

impl PriorityQueue {
    pub const fn new(max_size: usize) -> Self {
        Self {
            inner: embassy_sync::blocking_mutex::Mutex::new(core::cell::RefCell::new(
                PriorityQueueInner {
                    items: alloc::collections::BTreeMap::new(),
                    next_seq: 0,
                    max_size,
                },
            )),
            signal: embassy_sync::signal::Signal::new(),
        }
    }

    /// Queues `msg`. Returns false if it was rejected.
    ///
    /// Encoding happens outside the critical section.
    pub fn try_send<T: Outgoing>(&self, msg: T) -> bool {
        self.try_send_frame(msg.priority(), msg.encode())
    }

    /// Queues an already encoded frame.
    pub fn try_send_frame(&self, priority: Priority, data: Vec<u8>) -> bool {
        let accepted = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            if !inner.make_room(priority) {
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq = inner.next_seq.wrapping_add(1);
            inner.items.insert((priority, seq), data);
            true
        });

        if accepted {
            self.signal.signal(());
        }
        accepted
    }

    /// Highest-priority frame, if any.
    pub fn try_receive(&self) -> Option<Vec<u8>> {
        self.inner
            .lock(|cell| cell.borrow_mut().items.pop_first().map(|(_, data)| data))
    }

    /// Wait for and receive the highest-priority frame.
    pub async fn receive(&self) -> Vec<u8> {
        loop {
            if let Some(data) = self.try_receive() {
                return data;
            }
            self.signal.wait().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Radio backend.
///
/// The medium is a shared broadcast channel. Every frame, including directed
/// ones, is transmitted to all neighbours in range; receivers filter
/// directed frames by destination.
///
/// - `outgoing()`: priority queue drained by the radio driver
/// - `incoming()`: frames received from the air
pub trait Transport {
    /// Largest frame the radio can carry.
    fn mtu(&self) -> usize;

    fn outgoing(&self) -> &PriorityQueue;

    /// - Radio ISR or simulator calls `incoming().try_send(frame)`
    /// - `Node::run` awaits `incoming().receive()`
    fn incoming(&self) -> &TransportInChannel;
}

/// Static, symmetric link latency between two nodes.
///
/// A pair that cannot communicate should report `u32::MAX`.
pub trait LinkCost {
    fn cost(&self, from: NodeId, to: NodeId) -> u32;
}

impl<L: LinkCost + ?Sized> LinkCost for &L {
    fn cost(&self, from: NodeId, to: NodeId) -> u32 {
        (**self).cost(from, to)
    }
}

impl<L: LinkCost + ?Sized> LinkCost for Rc<L> {
    fn cost(&self, from: NodeId, to: NodeId) -> u32 {
        (**self).cost(from, to)
    }
}

/// Time source trait for real or simulated time.
///
/// # Example (embedded with embassy)
///
/// ```text
/// struct EmbassyClock;
///
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = embassy_time::Timer;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_millis(embassy_time::Instant::now().as_millis())
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         embassy_time::Timer::at(embassy_time::Instant::from_millis(time.as_millis()))
///     }
/// }
/// ```
pub trait Clock {
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    fn now(&self) -> Timestamp;

    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Random number generator trait. Used for scheduler jitter.
pub trait Random {
    /// Random u64 in `[min, max)`. Returns `min` when the range is empty.
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;
    use crate::config::{DefaultConfig, NodeConfig};
    use crate::wire::{Decode, Message};

    /// Default queue size for MockTransport.
    pub const MOCK_QUEUE_SIZE: usize = DefaultConfig::MAX_OUTGOING;

    /// Mock transport for testing using priority queue.
    pub struct MockTransport {
        mtu: usize,
        outgoing: PriorityQueue,
        incoming: TransportInChannel,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::with_queue_size(MOCK_QUEUE_SIZE)
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_queue_size(size: usize) -> Self {
            Self {
                mtu: crate::types::MAX_PACKET_SIZE,
                outgoing: PriorityQueue::new(size),
                incoming: Channel::new(),
            }
        }

        pub fn with_mtu(mut self, mtu: usize) -> Self {
            self.mtu = mtu;
            self
        }

        /// Inject a frame as if it was received.
        pub fn inject_rx(&self, data: Vec<u8>) {
            let _ = self.incoming.try_send(Incoming::new(data));
        }

        /// Take all sent frames in priority order.
        pub fn take_sent(&self) -> Vec<Vec<u8>> {
            let mut msgs = Vec::new();
            while let Some(msg) = self.outgoing.try_receive() {
                msgs.push(msg);
            }
            msgs
        }

        /// Take all sent frames, decoded.
        pub fn take_messages(&self) -> Vec<Message> {
            self.take_sent()
                .iter()
                .filter_map(|frame| Message::decode_from_slice(frame).ok())
                .collect()
        }
    }

    impl Transport for MockTransport {
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

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            // Tests advance time by hand.
            ready(())
        }
    }

    /// Mock random for testing (deterministic LCG).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max.saturating_sub(min);
            if range == 0 {
                return min;
            }
            min + (self.state % range)
        }
    }

    /// Every link costs the same.
    #[derive(Clone, Copy, Debug)]
    pub struct FixedCost(pub u32);

    impl LinkCost for FixedCost {
        fn cost(&self, _from: NodeId, _to: NodeId) -> u32 {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    struct Frame(Priority, u8);

    impl Outgoing for Frame {
        fn priority(&self) -> Priority {
            self.0
        }

        fn encode(&self) -> Vec<u8> {
            vec![self.1]
        }
    }

    #[test]
    fn test_priority_then_fifo() {
        let q = PriorityQueue::new(8);
        q.try_send(Frame(Priority::Flood, 1));
        q.try_send(Frame(Priority::Answer, 2));
        q.try_send(Frame(Priority::TokenControl, 3));
        q.try_send(Frame(Priority::Answer, 4));

        assert_eq!(q.try_receive(), Some(vec![2]));
        assert_eq!(q.try_receive(), Some(vec![4]));
        assert_eq!(q.try_receive(), Some(vec![3]));
        assert_eq!(q.try_receive(), Some(vec![1]));
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_evicts_lowest() {
        let q = PriorityQueue::new(2);
        assert!(q.try_send(Frame(Priority::Flood, 1)));
        assert!(q.try_send(Frame(Priority::TokenControl, 2)));
        // Same priority as the lowest queued: rejected
        assert!(!q.try_send(Frame(Priority::Flood, 3)));
        // An answer evicts the flood
        assert!(q.try_send(Frame(Priority::Answer, 4)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_receive(), Some(vec![4]));
        assert_eq!(q.try_receive(), Some(vec![2]));
    }

    #[test]
    fn test_link_cost_through_references() {
        let fixed = test_impls::FixedCost(7);
        let by_ref: &dyn LinkCost = &fixed;
        assert_eq!(by_ref.cost(1, 2), 7);
        assert_eq!(Rc::new(fixed).cost(2, 1), 7);
    }

    #[test]
    fn test_mock_random_in_range() {
        let mut rng = test_impls::MockRandom::new();
        for _ in 0..100 {
            let v = rng.gen_range(10, 20);
            assert!((10..20).contains(&v));
        }
        assert_eq!(rng.gen_range(5, 5), 5);
    }
}
