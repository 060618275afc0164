//! Per-node best path bookkeeping.

use crate::path::PathCandidate;
use crate::types::NodeId;

/// Outcome of offering a candidate to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// The candidate replaced the best path.
    Improved,
    /// Not strictly better than what is held.
    Kept,
    /// The candidate does not pass through this node.
    Foreign,
    /// Answer not through this node, kept to report to the granter.
    Carried,
    /// The registry is frozen.
    Frozen,
}

/// Best path known to one node.
///
/// Two slots are tracked. `route` is the best path *ending* at this node,
/// which is what the node floods. `best` is the best path overall that passes
/// through this node, which may be a deeper path adopted from an answer. Both
/// start at weight +inf and are only ever replaced by strictly lighter
/// candidates. Answers that bypass this node cannot become `best`; the
/// lightest one is carried so it can be handed to whoever lent us the token.
/// After [`freeze`](Self::freeze) nothing changes.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    node_id: NodeId,
    best: Option<PathCandidate>,
    /// Position of `node_id` in `best.path`.
    best_index: usize,
    route: Option<PathCandidate>,
    carried: Option<PathCandidate>,
    frozen: bool,
}

impl PathRegistry {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            best: None,
            best_index: 0,
            route: None,
            carried: None,
            frozen: false,
        }
    }

    pub fn best(&self) -> Option<&PathCandidate> {
        self.best.as_ref()
    }

    pub fn best_weight(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |b| b.weight)
    }

    pub fn route(&self) -> Option<&PathCandidate> {
        self.route.as_ref()
    }

    /// Lightest answer seen that does not pass through this node.
    pub fn carried(&self) -> Option<&PathCandidate> {
        self.carried.as_ref()
    }

    /// Lightest candidate known here, carried or not. Ties go to `best`.
    pub fn lightest(&self) -> Option<&PathCandidate> {
        match (&self.best, &self.carried) {
            (Some(best), Some(carried)) if carried.is_better_than(best.weight) => Some(carried),
            (Some(best), _) => Some(best),
            (None, carried) => carried.as_ref(),
        }
    }

    /// Node immediately before this one on the best path.
    pub fn predecessor(&self) -> Option<NodeId> {
        let best = self.best.as_ref()?;
        if self.best_index == 0 {
            return None;
        }
        best.path.hops().get(self.best_index - 1).copied()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Offers a path this node built itself by extending a flood. The path
    /// must end at this node.
    pub fn offer_route(&mut self, candidate: PathCandidate) -> Offer {
        if self.frozen {
            return Offer::Frozen;
        }
        if candidate.path.last() != Some(self.node_id) {
            return Offer::Foreign;
        }
        let route_weight = self.route.as_ref().map_or(f64::INFINITY, |r| r.weight);
        if candidate.is_better_than(route_weight) {
            self.route = Some(candidate.clone());
        }
        self.offer(candidate)
    }

    /// Offers a path reported by a descendant.
    pub fn offer_answer(&mut self, candidate: PathCandidate) -> Offer {
        if self.frozen {
            return Offer::Frozen;
        }
        if candidate.path.contains(self.node_id) {
            return self.offer(candidate);
        }
        let lightest = self.lightest().map_or(f64::INFINITY, |c| c.weight);
        if !candidate.is_better_than(lightest) {
            return Offer::Kept;
        }
        self.carried = Some(candidate);
        Offer::Carried
    }

    fn offer(&mut self, candidate: PathCandidate) -> Offer {
        let Some(index) = candidate.path.position(self.node_id) else {
            return Offer::Foreign;
        };
        if !candidate.is_better_than(self.best_weight()) {
            return Offer::Kept;
        }
        self.best = Some(candidate);
        self.best_index = index;
        Offer::Improved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::types::Tag;

    fn candidate(hops: &[NodeId], weight: f64) -> PathCandidate {
        PathCandidate {
            path: Path::from_hops(hops).unwrap(),
            latency: 1,
            weight,
            tag: Tag::new("t").unwrap(),
        }
    }

    #[test]
    fn test_starts_empty_at_infinity() {
        let reg = PathRegistry::new(3);
        assert!(reg.best().is_none());
        assert!(reg.route().is_none());
        assert_eq!(reg.best_weight(), f64::INFINITY);
        assert_eq!(reg.predecessor(), None);
    }

    #[test]
    fn test_strictly_better_replaces() {
        let mut reg = PathRegistry::new(3);
        assert_eq!(reg.offer_route(candidate(&[1, 3], 0.5)), Offer::Improved);
        // Tie keeps the first candidate
        assert_eq!(reg.offer_route(candidate(&[1, 2, 3], 0.5)), Offer::Kept);
        assert_eq!(reg.best().unwrap().path.hops(), &[1, 3]);
        assert_eq!(reg.predecessor(), Some(1));

        assert_eq!(reg.offer_route(candidate(&[1, 2, 3], 0.4)), Offer::Improved);
        assert_eq!(reg.predecessor(), Some(2));
        // Worse is ignored
        assert_eq!(reg.offer_route(candidate(&[1, 4, 3], 0.9)), Offer::Kept);
        assert_eq!(reg.best_weight(), 0.4);
    }

    #[test]
    fn test_answer_keeps_own_route() {
        let mut reg = PathRegistry::new(2);
        reg.offer_route(candidate(&[1, 2], 0.6));
        assert_eq!(reg.offer_answer(candidate(&[1, 2, 4], 0.3)), Offer::Improved);

        // Best is the deeper path, predecessor still comes from our position
        assert_eq!(reg.best().unwrap().path.hops(), &[1, 2, 4]);
        assert_eq!(reg.predecessor(), Some(1));
        // Flooded route is untouched
        assert_eq!(reg.route().unwrap().path.hops(), &[1, 2]);
    }

    #[test]
    fn test_route_slot_independent_of_best() {
        let mut reg = PathRegistry::new(2);
        reg.offer_answer(candidate(&[1, 2, 4], 0.1));
        // Not better than best, but still our best own route
        assert_eq!(reg.offer_route(candidate(&[1, 2], 0.6)), Offer::Kept);
        assert_eq!(reg.route().unwrap().weight, 0.6);
        assert_eq!(reg.best_weight(), 0.1);
    }

    #[test]
    fn test_foreign_route_rejected() {
        let mut reg = PathRegistry::new(2);
        assert_eq!(reg.offer_route(candidate(&[1, 2, 3], 0.1)), Offer::Foreign);
        assert!(reg.best().is_none());
    }

    #[test]
    fn test_bypassing_answer_is_carried() {
        let mut reg = PathRegistry::new(2);
        reg.offer_route(candidate(&[1, 2], 0.6));

        assert_eq!(reg.offer_answer(candidate(&[1, 3, 4], 0.7)), Offer::Kept);
        assert!(reg.carried().is_none());
        assert_eq!(reg.offer_answer(candidate(&[1, 3, 4], 0.2)), Offer::Carried);
        assert_eq!(reg.offer_answer(candidate(&[1, 4], 0.3)), Offer::Kept);

        // Best and predecessor untouched, report is the carried path
        assert_eq!(reg.best().unwrap().path.hops(), &[1, 2]);
        assert_eq!(reg.predecessor(), Some(1));
        assert_eq!(reg.lightest().unwrap().path.hops(), &[1, 3, 4]);

        // A lighter path through us takes over the report
        assert_eq!(reg.offer_answer(candidate(&[1, 2, 4], 0.1)), Offer::Improved);
        assert_eq!(reg.lightest().unwrap().path.hops(), &[1, 2, 4]);
    }

    #[test]
    fn test_frozen_registry_ignores_offers() {
        let mut reg = PathRegistry::new(2);
        reg.offer_route(candidate(&[1, 2], 0.6));
        reg.freeze();
        assert_eq!(reg.offer_answer(candidate(&[1, 2, 4], 0.1)), Offer::Frozen);
        assert_eq!(reg.best_weight(), 0.6);
    }

    #[test]
    fn test_sink_has_no_predecessor() {
        let mut reg = PathRegistry::new(1);
        reg.offer_answer(candidate(&[1, 2], 0.2));
        assert_eq!(reg.predecessor(), None);
        assert_eq!(reg.best_weight(), 0.2);
    }
}
