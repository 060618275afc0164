//! Set of path signatures this node has already registered for.

use hashbrown::HashSet;

use crate::path::Path;

/// Result of [`RouteHistory::record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Record {
    /// New signature, registration should go out.
    Recorded,
    /// Seen before.
    Duplicate,
    /// At capacity and unseen; nothing recorded.
    Full,
}

/// Bounded, append-only set of extended paths.
///
/// The same flood may reach a node several times (retransmissions, multiple
/// senders repeating one route). Only the first arrival of each extended
/// path triggers a registration.
#[derive(Debug, Clone)]
pub struct RouteHistory {
    seen: HashSet<Path>,
    capacity: usize,
}

impl RouteHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, path: &Path) -> Record {
        if self.seen.contains(path) {
            return Record::Duplicate;
        }
        if self.seen.len() >= self.capacity {
            return Record::Full;
        }
        self.seen.insert(path.clone());
        Record::Recorded
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_once() {
        let mut h = RouteHistory::with_capacity(4);
        let p = Path::from_hops(&[1, 2]).unwrap();
        assert_eq!(h.record(&p), Record::Recorded);
        assert_eq!(h.record(&p), Record::Duplicate);
        assert_eq!(h.len(), 1);
        assert!(h.contains(&p));
    }

    #[test]
    fn test_same_nodes_different_order_are_distinct() {
        let mut h = RouteHistory::with_capacity(4);
        h.record(&Path::from_hops(&[1, 2, 3]).unwrap());
        assert_eq!(
            h.record(&Path::from_hops(&[1, 3, 2]).unwrap()),
            Record::Recorded
        );
    }

    #[test]
    fn test_full_history_still_reports_duplicates() {
        let mut h = RouteHistory::with_capacity(2);
        let a = Path::from_hops(&[1, 2]).unwrap();
        let b = Path::from_hops(&[1, 3, 2]).unwrap();
        let c = Path::from_hops(&[1, 4, 2]).unwrap();
        h.record(&a);
        h.record(&b);
        assert_eq!(h.record(&c), Record::Full);
        assert_eq!(h.record(&a), Record::Duplicate);
        assert_eq!(h.len(), 2);
    }
}
