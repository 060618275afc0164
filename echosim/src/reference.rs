//! Exhaustive search over every simple path rooted at the sink.
//!
//! Small fixtures only: the search is exponential in the node count. It
//! scores paths exactly as the protocol does, so its argmin is what a
//! converged sink should report on a network where the protocol gets to
//! explore the winning path.

use echotree::{Configuration, LinkCost, NodeId, Path, PathCandidate};

use crate::topology::Topology;

/// Best candidate over all simple paths from `sink` whose accumulated
/// latency stays within `budget`, or `None` if no path qualifies.
///
/// A path is only walked over active topology links. Equal weights keep the
/// path found first.
pub fn best_path<L: LinkCost>(
    oracle: &L,
    topology: &Topology,
    sink: NodeId,
    configs: &[(NodeId, Configuration)],
    budget: u32,
) -> Option<PathCandidate> {
    let mut best: Option<PathCandidate> = None;
    let mut hops = vec![sink];
    let mut keep_best = |c: PathCandidate| {
        if best.as_ref().map_or(true, |b| c.is_better_than(b.weight)) {
            best = Some(c);
        }
    };
    walk(oracle, topology, configs, budget, &mut hops, 0, &mut keep_best);
    best
}

/// Every candidate within budget, in search order.
pub fn all_candidates<L: LinkCost>(
    oracle: &L,
    topology: &Topology,
    sink: NodeId,
    configs: &[(NodeId, Configuration)],
    budget: u32,
) -> Vec<PathCandidate> {
    let mut found = Vec::new();
    let mut hops = vec![sink];
    let mut collect = |c: PathCandidate| found.push(c);
    walk(oracle, topology, configs, budget, &mut hops, 0, &mut collect);
    found
}

fn walk<L: LinkCost>(
    oracle: &L,
    topology: &Topology,
    configs: &[(NodeId, Configuration)],
    budget: u32,
    hops: &mut Vec<NodeId>,
    latency: u32,
    visit: &mut dyn FnMut(PathCandidate),
) {
    let Some(&tail) = hops.last() else {
        return;
    };
    for &(next, config) in configs {
        if hops.contains(&next) || !topology.is_connected(tail, next) {
            continue;
        }
        let total = latency.saturating_add(oracle.cost(tail, next));
        if total > budget {
            continue;
        }

        hops.push(next);
        if let Ok(path) = Path::from_hops(hops) {
            visit(PathCandidate {
                path,
                latency: total,
                weight: config.weight(total),
                tag: config.tag(),
            });
        }
        walk(oracle, topology, configs, budget, hops, total, visit);
        hops.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echotree::LatencyMatrix;

    fn config(price: u32) -> Configuration {
        Configuration::new("n", 4, price, 20).unwrap()
    }

    fn four_nodes() -> (LatencyMatrix, Topology, Vec<(NodeId, Configuration)>) {
        let oracle = LatencyMatrix::new(4)
            .unwrap()
            .with(1, 2, 2)
            .with(1, 3, 9)
            .with(1, 4, 12)
            .with(2, 3, 3)
            .with(2, 4, 7)
            .with(3, 4, 2);
        let topo = Topology::fully_connected(&[1, 2, 3, 4]);
        let configs = vec![(2, config(200)), (3, config(200)), (4, config(1))];
        (oracle, topo, configs)
    }

    #[test]
    fn test_enumerates_every_simple_path() {
        let (oracle, topo, configs) = four_nodes();
        let all = all_candidates(&oracle, &topo, 1, &configs, 100);

        // 3 one-hop + 6 two-hop + 6 three-hop
        assert_eq!(all.len(), 15);
        assert!(all.iter().all(|c| c.path.first() == Some(1)));
    }

    #[test]
    fn test_argmin_prefers_cheap_endpoint() {
        let (oracle, topo, configs) = four_nodes();
        let best = best_path(&oracle, &topo, 1, &configs, 100).unwrap();

        assert_eq!(best.path.hops(), &[1, 2, 3, 4]);
        assert_eq!(best.latency, 7);
    }

    #[test]
    fn test_budget_prunes_subtrees() {
        let oracle = LatencyMatrix::new(3)
            .unwrap()
            .with(1, 2, 5)
            .with(1, 3, 50)
            .with(2, 3, 50);
        let topo = Topology::fully_connected(&[1, 2, 3]);
        let configs = vec![(2, config(20)), (3, config(20))];

        let all = all_candidates(&oracle, &topo, 1, &configs, 20);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].path.hops(), &[1, 2]);
    }

    #[test]
    fn test_respects_topology() {
        let (oracle, _, configs) = four_nodes();
        let topo = Topology::chain(&[1, 2, 3, 4]);

        let all = all_candidates(&oracle, &topo, 1, &configs, 100);
        let paths: Vec<&[NodeId]> = all.iter().map(|c| c.path.hops()).collect();
        assert_eq!(paths, vec![&[1, 2][..], &[1, 2, 3][..], &[1, 2, 3, 4][..]]);
    }

    #[test]
    fn test_nothing_within_budget() {
        let (oracle, topo, configs) = four_nodes();
        assert!(best_path(&oracle, &topo, 1, &configs, 1).is_none());
    }
}
