//! Table-backed link cost oracle.

use alloc::vec::Vec;
use core::fmt;

use crate::traits::LinkCost;
use crate::types::{NodeId, MAX_NODES};

/// Why a latency table was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleError {
    /// A row length differs from the number of rows.
    NotSquare,
    /// More rows than `MAX_NODES`.
    TooLarge,
    /// `cost(a, b) != cost(b, a)`.
    Asymmetric(NodeId, NodeId),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::NotSquare => write!(f, "latency table is not square"),
            OracleError::TooLarge => write!(f, "latency table exceeds {} nodes", MAX_NODES),
            OracleError::Asymmetric(a, b) => {
                write!(f, "latency between {} and {} is not symmetric", a, b)
            }
        }
    }
}

/// Symmetric pairwise latency table indexed by node id.
///
/// Row `i` holds the costs from node `i + 1`. Pairs outside the table cost
/// `u32::MAX`, which no latency budget admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyMatrix {
    size: usize,
    costs: Vec<u32>,
}

impl LatencyMatrix {
    /// All-zero table for nodes `1..=size`.
    pub fn new(size: usize) -> Result<Self, OracleError> {
        if size > MAX_NODES {
            return Err(OracleError::TooLarge);
        }
        Ok(Self {
            size,
            costs: alloc::vec![0; size * size],
        })
    }

    pub fn from_rows<R: AsRef<[u32]>>(rows: &[R]) -> Result<Self, OracleError> {
        let mut matrix = Self::new(rows.len())?;
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != matrix.size {
                return Err(OracleError::NotSquare);
            }
            matrix.costs[i * matrix.size..(i + 1) * matrix.size].copy_from_slice(row);
        }
        for a in 0..matrix.size {
            for b in (a + 1)..matrix.size {
                if matrix.costs[a * matrix.size + b] != matrix.costs[b * matrix.size + a] {
                    return Err(OracleError::Asymmetric(a as NodeId + 1, b as NodeId + 1));
                }
            }
        }
        Ok(matrix)
    }

    /// Sets the cost in both directions. Out-of-range pairs are ignored.
    pub fn set(&mut self, a: NodeId, b: NodeId, cost: u32) {
        if let (Some(i), Some(j)) = (self.index(a, b), self.index(b, a)) {
            self.costs[i] = cost;
            self.costs[j] = cost;
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, a: NodeId, b: NodeId, cost: u32) -> Self {
        self.set(a, b, cost);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, from: NodeId, to: NodeId) -> Option<usize> {
        let (from, to) = (from as usize, to as usize);
        if from == 0 || to == 0 || from > self.size || to > self.size {
            return None;
        }
        Some((from - 1) * self.size + (to - 1))
    }
}

impl LinkCost for LatencyMatrix {
    fn cost(&self, from: NodeId, to: NodeId) -> u32 {
        self.index(from, to).map_or(u32::MAX, |i| self.costs[i])
    }
}
