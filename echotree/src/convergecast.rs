//! Convergecast: best paths flow back toward the sink.
//!
//! Each answer carries the sender's best path. The receiver adopts it if it
//! is strictly lighter, and a relay immediately passes its own best on to
//! its predecessor, so every improvement climbs hop by hop until the sink
//! holds the overall minimum.
//!
//! Two fallbacks keep an improvement from stalling at a node that already
//! closed. Closed relays pass answers one hop further along the answer's own
//! path. On close, every node also reports its lightest candidate, carried
//! answers included, to the node that lent it the token; grants form a chain
//! back to the sink and each granter is open until its token comes back.

use crate::config::NodeConfig;
use crate::node::Node;
use crate::path::PathCandidate;
use crate::registry::Offer;
use crate::time::Timestamp;
use crate::token::TokenState;
use crate::traits::{Clock, LinkCost, Random, Transport};
use crate::types::NodeId;
use crate::wire::Directed;

impl<T, O, R, Clk, Cfg> Node<T, O, R, Clk, Cfg>
where
    T: Transport,
    O: LinkCost,
    R: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    pub(crate) fn handle_answer(
        &mut self,
        from: NodeId,
        candidate: PathCandidate,
        now: Timestamp,
    ) {
        if self.token.is_closed() {
            self.relay_answer(from, candidate);
            return;
        }

        let adopted = self.registry.offer_answer(candidate) == Offer::Improved;
        emit_debug!(
            self,
            crate::debug::DebugEvent::AnswerReceived { from, adopted }
        );
        if adopted {
            emit_debug!(self, {
                let best = self.registry.best();
                crate::debug::DebugEvent::BestPathImproved {
                    weight: self.registry.best_weight(),
                    path_len: best.map_or(0, |b| b.path.len()),
                    predecessor: self.registry.predecessor(),
                }
            });
        }

        // The subtree is still busy; keep the admission window open.
        if let TokenState::WaitingForEcho(Some(_)) = self.token {
            self.echo_deadline = Some(now + self.admission_timeout());
        }

        if !self.is_sink() {
            self.forward_best();
        }
    }

    /// A closed node keeps its frozen best but still passes answers on,
    /// one hop closer to the sink along the answer's own path. The sink has
    /// already published its result and drops them.
    fn relay_answer(&mut self, from: NodeId, candidate: PathCandidate) {
        if self.is_sink() {
            return;
        }
        let Some(to) = candidate.path.predecessor_of(self.node_id()) else {
            return;
        };
        emit_debug!(
            self,
            crate::debug::DebugEvent::AnswerRelayed { from, to }
        );
        let msg = Directed::answer(self.node_id(), to, candidate);
        self.send_directed(msg);
    }

    /// Send our current best path to our predecessor.
    pub(crate) fn forward_best(&mut self) {
        let (Some(best), Some(pred)) = (self.registry.best(), self.registry.predecessor()) else {
            return;
        };
        let msg = Directed::answer(self.node_id(), pred, best.clone());
        self.send_directed(msg);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::node::testing::*;
    use crate::path::Path;
    use crate::types::{Event, Tag};
    use crate::wire::{DirectedKind, Flood, Message, RequirementKind};

    fn answer_frame(from: NodeId, to: NodeId, hops: &[NodeId], weight: f64) -> Vec<u8> {
        let candidate = PathCandidate {
            path: Path::from_hops(hops).unwrap(),
            latency: 9,
            weight,
            tag: Tag::new("deep").unwrap(),
        };
        frame(Message::Directed(Directed::answer(from, to, candidate)))
    }

    /// Relay 2 holding route [1, 2] with child 3 admitted.
    fn relay_with_child() -> TestNode {
        let mut n2 = configured(2, 1, triangle(), 20);
        n2.handle_flood(
            Flood {
                kind: RequirementKind::Request,
                from: 1,
                latency: 0,
                tag: Tag::new("sink").unwrap(),
                path: Path::root(1),
            },
            Timestamp::ZERO,
        );
        n2.handle_transport_rx(&control(DirectedKind::TokenGrant, 1, 2), Timestamp::ZERO);
        tick_until_flood(&mut n2);
        let registered_at = Timestamp::from_secs(20);
        n2.handle_transport_rx(&control(DirectedKind::RegisterChild, 3, 2), registered_at);
        let _ = n2.transport().take_sent();
        n2
    }

    #[test]
    fn test_relay_adopts_and_forwards() {
        let mut n2 = relay_with_child();
        let own = n2.best_path().unwrap().weight;

        let answer = answer_frame(3, 2, &[1, 2, 3], own / 2.0);
        n2.handle_transport_rx(&answer, Timestamp::from_secs(25));
        let best = n2.best_path().unwrap();
        assert_eq!(best.path.hops(), &[1, 2, 3]);
        assert_eq!(best.tag.as_str(), "deep");
        // Predecessor is still the hop before us
        assert_eq!(n2.predecessor(), Some(1));

        let sent = n2.transport().take_messages();
        assert_eq!(sent.len(), 1);
        let Message::Directed(d) = &sent[0] else {
            panic!("expected answer");
        };
        assert_eq!((d.kind, d.to), (DirectedKind::Answer, 1));
        assert_eq!(d.candidate.as_ref().unwrap().path.hops(), &[1, 2, 3]);
    }

    #[test]
    fn test_worse_answer_forwards_current_best() {
        let mut n2 = relay_with_child();
        let own = n2.best_path().unwrap().weight;

        let answer = answer_frame(3, 2, &[1, 2, 3], own * 2.0);
        n2.handle_transport_rx(&answer, Timestamp::from_secs(25));
        assert_eq!(n2.best_path().unwrap().path.hops(), &[1, 2]);
        assert_eq!(sent_directed(&n2), vec![(DirectedKind::Answer, 1)]);
    }

    #[test]
    fn test_answer_rearms_admission_window() {
        let mut n2 = relay_with_child();
        let at = Timestamp::from_secs(40);
        n2.handle_transport_rx(&answer_frame(3, 2, &[1, 2, 3], 0.01), at);
        assert_eq!(n2.echo_deadline, Some(at + n2.params().admission_timeout(3)));
    }

    #[test]
    fn test_answer_without_self_ignored() {
        let mut n2 = relay_with_child();
        let answer = answer_frame(3, 2, &[1, 3], 0.0);
        n2.handle_transport_rx(&answer, Timestamp::from_secs(25));
        assert_eq!(n2.best_path().unwrap().path.hops(), &[1, 2]);
    }

    #[test]
    fn test_sink_keeps_answer_and_publishes_on_close() {
        let mut sink = configured(1, 1, triangle(), 20);
        tick_until_flood(&mut sink);
        let now = Timestamp::from_secs(20);
        sink.handle_transport_rx(&control(DirectedKind::RegisterChild, 2, 1), now);
        let _ = sink.transport().take_sent();

        sink.handle_transport_rx(&answer_frame(2, 1, &[1, 2], 0.2), now);
        sink.handle_transport_rx(&answer_frame(2, 1, &[1, 2, 3], 0.3), now);
        // The sink never forwards
        assert!(sink.transport().take_sent().is_empty());

        sink.handle_transport_rx(&control(DirectedKind::TokenReturn, 2, 1), now);
        assert!(sink.is_closed());
        let result = sink.converged().unwrap();
        assert_eq!(result.path.hops(), &[1, 2]);
        assert_eq!(result.weight, 0.2);
        assert_eq!(
            sink.events().try_receive().ok(),
            Some(Event::Converged {
                result: Some(result.clone())
            })
        );
    }

    #[test]
    fn test_closed_relay_passes_answer_along_its_path() {
        let mut n2 = relay_with_child();
        let deadline = n2.echo_deadline.unwrap();
        n2.handle_timer(deadline);
        assert!(n2.is_closed());
        let _ = n2.transport().take_sent();

        // Lighter path found below us, routed through 3 rather than our own predecessor
        let answer = answer_frame(4, 2, &[1, 3, 2, 4], 0.001);
        n2.handle_transport_rx(&answer, deadline);

        assert_eq!(n2.best_path().unwrap().path.hops(), &[1, 2]);
        let sent = n2.transport().take_messages();
        assert_eq!(sent.len(), 1);
        let Message::Directed(d) = &sent[0] else {
            panic!("expected answer");
        };
        assert_eq!((d.kind, d.from, d.to), (DirectedKind::Answer, 2, 3));
        assert_eq!(d.candidate.as_ref().unwrap().path.hops(), &[1, 3, 2, 4]);
        assert_eq!(d.candidate.as_ref().unwrap().weight, 0.001);
    }

    #[test]
    fn test_closed_relay_drops_foreign_answer() {
        let mut n2 = relay_with_child();
        let deadline = n2.echo_deadline.unwrap();
        n2.handle_timer(deadline);
        let _ = n2.transport().take_sent();

        n2.handle_transport_rx(&answer_frame(3, 2, &[1, 3], 0.001), deadline);
        assert!(n2.transport().take_sent().is_empty());
    }

    #[test]
    fn test_closed_node_ignores_answers() {
        let mut sink = configured(1, 1, triangle(), 20);
        tick_until_flood(&mut sink);
        let deadline = sink.echo_deadline.unwrap();
        sink.handle_timer(deadline);
        assert!(sink.is_closed());

        sink.handle_transport_rx(&answer_frame(2, 1, &[1, 2], 0.2), deadline);
        assert!(sink.best_path().is_none());
    }
}
