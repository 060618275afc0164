//! Paths rooted at the sink and the candidates built from them.

use alloc::vec::Vec;
use core::fmt;

use crate::types::{NodeId, Tag, MAX_NODES};

/// Why a hop sequence is not a valid path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathError {
    /// A node appears twice.
    RepeatedNode(NodeId),
    /// More than `MAX_NODES` hops.
    TooLong,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::RepeatedNode(id) => write!(f, "node {} repeated in path", id),
            PathError::TooLong => write!(f, "path longer than {} hops", MAX_NODES),
        }
    }
}

/// Ordered, simple sequence of hops starting at the sink.
///
/// Paths are never mutated in place: extending one yields a new value, so a
/// path already stored in a registry or history is never affected.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    hops: Vec<NodeId>,
}

impl Path {
    /// Single-hop path holding only the sink.
    pub fn root(sink: NodeId) -> Self {
        Self {
            hops: alloc::vec![sink],
        }
    }

    /// Validates and wraps a hop sequence.
    pub fn from_hops(hops: &[NodeId]) -> Result<Self, PathError> {
        if hops.len() > MAX_NODES {
            return Err(PathError::TooLong);
        }
        for (i, hop) in hops.iter().enumerate() {
            if hops[..i].contains(hop) {
                return Err(PathError::RepeatedNode(*hop));
            }
        }
        Ok(Self {
            hops: hops.to_vec(),
        })
    }

    /// New path with `id` appended.
    pub fn extended(&self, id: NodeId) -> Result<Self, PathError> {
        if self.contains(id) {
            return Err(PathError::RepeatedNode(id));
        }
        if self.hops.len() >= MAX_NODES {
            return Err(PathError::TooLong);
        }
        let mut hops = Vec::with_capacity(self.hops.len() + 1);
        hops.extend_from_slice(&self.hops);
        hops.push(id);
        Ok(Self { hops })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.hops.contains(&id)
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.hops.iter().position(|&hop| hop == id)
    }

    /// Hop immediately before `id`, if `id` is on the path and not first.
    pub fn predecessor_of(&self, id: NodeId) -> Option<NodeId> {
        match self.position(id) {
            Some(i) if i > 0 => Some(self.hops[i - 1]),
            _ => None,
        }
    }

    pub fn hops(&self) -> &[NodeId] {
        &self.hops
    }

    pub fn first(&self) -> Option<NodeId> {
        self.hops.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.hops.last().copied()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

/// Hops joined with `-`, e.g. `1-2-4`.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{}", hop)?;
        }
        Ok(())
    }
}

/// A scored path. `tag` and `weight` belong to the path's last node.
#[derive(Clone, Debug, PartialEq)]
pub struct PathCandidate {
    pub path: Path,
    /// Accumulated latency from the sink.
    pub latency: u32,
    pub weight: f64,
    pub tag: Tag,
}

impl PathCandidate {
    /// Strict comparison; equal weights keep the incumbent.
    pub fn is_better_than(&self, weight: f64) -> bool {
        self.weight < weight
    }
}
