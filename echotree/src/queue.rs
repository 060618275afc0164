//! FIFO of children waiting for the token.

use alloc::collections::VecDeque;

use crate::types::NodeId;

/// Result of [`PendingChildQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Already waiting; position unchanged.
    AlreadyQueued,
    /// At capacity; the child was dropped.
    Full,
}

/// Bounded FIFO of node ids without duplicates.
///
/// Registrations arrive in bursts right after a flood and then drain one by
/// one as the token moves, so the backing deque is shrunk after enough
/// consecutive pops without a push.
#[derive(Debug, Clone)]
pub struct PendingChildQueue {
    inner: VecDeque<NodeId>,
    capacity: usize,
    pops_since_push: u8,
    shrink_threshold: u8,
}

impl PendingChildQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: VecDeque::new(),
            capacity,
            pops_since_push: 0,
            shrink_threshold: (capacity / 4).clamp(1, u8::MAX as usize) as u8,
        }
    }

    pub fn push(&mut self, child: NodeId) -> Enqueue {
        if self.inner.contains(&child) {
            return Enqueue::AlreadyQueued;
        }
        if self.inner.len() >= self.capacity {
            return Enqueue::Full;
        }
        self.pops_since_push = 0;
        self.inner.push_back(child);
        Enqueue::Queued
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        let child = self.inner.pop_front()?;
        self.pops_since_push = self.pops_since_push.saturating_add(1);
        if self.pops_since_push >= self.shrink_threshold {
            self.inner.shrink_to_fit();
            self.pops_since_push = 0;
        }
        Some(child)
    }

    pub fn contains(&self, child: NodeId) -> bool {
        self.inner.contains(&child)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inner.iter().copied()
    }
}
