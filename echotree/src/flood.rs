//! Flood propagation and path extension.
//!
//! A node holding the token floods its best own route. Every receiver
//! extends the route by itself, prunes it against the latency budget,
//! scores it and, the first time it sees that extended path, registers with
//! the sender as a pending child.

use crate::config::NodeConfig;
use crate::history::Record;
use crate::node::Node;
use crate::path::{Path, PathCandidate};
use crate::registry::Offer;
use crate::time::Timestamp;
use crate::token::TokenState;
use crate::traits::{Clock, LinkCost, Random, Transport};
use crate::wire::{Directed, DirectedKind, Flood, RequirementKind};

/// What a received flood did to the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodOutcome {
    /// No configuration yet.
    NotConfigured,
    /// Node already closed.
    Closed,
    /// The flood's path already contains this node.
    LoopDetected,
    /// Accumulated latency above the budget.
    Rejected { latency: u32 },
    /// The path is already at maximum length.
    Unextendable,
    /// New extended path; registration sent to the flooder.
    Registered { improved: bool },
    /// Extended path seen before; no registration.
    Duplicate { improved: bool },
    /// Route history full; no registration.
    HistoryFull { improved: bool },
}

impl FloodOutcome {
    /// True if the flood produced a usable candidate.
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            FloodOutcome::Registered { .. }
                | FloodOutcome::Duplicate { .. }
                | FloodOutcome::HistoryFull { .. }
        )
    }
}

impl<T, O, R, Clk, Cfg> Node<T, O, R, Clk, Cfg>
where
    T: Transport,
    O: LinkCost,
    R: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Broadcast the requirement and open the echo window.
    ///
    /// The sink seeds `[sink]` at zero latency; relays flood their best own
    /// route.
    pub(crate) fn emit_flood(&mut self, now: Timestamp) {
        let me = self.node_id();
        let flood = if self.is_sink() {
            self.configuration().map(|config| Flood {
                kind: RequirementKind::Request,
                from: me,
                latency: 0,
                tag: config.tag(),
                path: Path::root(me),
            })
        } else {
            self.registry.route().map(|route| Flood {
                kind: RequirementKind::Retransmit,
                from: me,
                latency: route.latency,
                tag: route.tag,
                path: route.path.clone(),
            })
        };

        let echo_deadline = now + self.params().echo_timeout;
        if let Some(flood) = flood {
            emit_debug!(
                self,
                crate::debug::DebugEvent::FloodSent {
                    timestamp: now,
                    path_len: flood.path.len(),
                    latency: flood.latency,
                    echo_deadline,
                }
            );
            self.send_flood(flood);
        }
        self.token = TokenState::WaitingForEcho(None);
        self.echo_deadline = Some(echo_deadline);
    }

    /// Evaluate a received flood.
    pub(crate) fn handle_flood(&mut self, flood: Flood, now: Timestamp) -> FloodOutcome {
        let Some(config) = self.configuration().copied() else {
            return FloodOutcome::NotConfigured;
        };
        if self.token.is_closed() {
            return FloodOutcome::Closed;
        }

        let me = self.node_id();
        if flood.path.contains(me) {
            emit_debug!(
                self,
                crate::debug::DebugEvent::LoopDiscarded { from: flood.from }
            );
            return FloodOutcome::LoopDetected;
        }

        // Root-seeded floods carry no latency of their own.
        let link = self.oracle().cost(flood.from, me);
        let latency = match flood.kind {
            RequirementKind::Request => link,
            RequirementKind::Retransmit => flood.latency.saturating_add(link),
        };
        emit_debug!(
            self,
            crate::debug::DebugEvent::FloodReceived {
                timestamp: now,
                from: flood.from,
                path_len: flood.path.len(),
                incremental: latency,
            }
        );

        let budget = self.params().latency_budget;
        if latency > budget {
            emit_debug!(
                self,
                crate::debug::DebugEvent::CandidateRejected {
                    from: flood.from,
                    latency,
                    budget,
                }
            );
            return FloodOutcome::Rejected { latency };
        }

        let Ok(path) = flood.path.extended(me) else {
            return FloodOutcome::Unextendable;
        };
        let record = self.history.record(&path);
        let candidate = PathCandidate {
            path,
            latency,
            weight: config.weight(latency),
            tag: config.tag(),
        };

        let improved = self.registry.offer_route(candidate) == Offer::Improved;
        if improved {
            emit_debug!(self, {
                let best = self.registry.best();
                crate::debug::DebugEvent::BestPathImproved {
                    weight: self.registry.best_weight(),
                    path_len: best.map_or(0, |b| b.path.len()),
                    predecessor: self.registry.predecessor(),
                }
            });
        }

        // A node that never gets the token still has to close eventually.
        if self.token == TokenState::NotStarted
            && self.registration_deadline.is_none()
            && self.registry.route().is_some()
        {
            self.registration_deadline = Some(now + self.registration_timeout());
        }

        match record {
            Record::Recorded => {
                self.send_directed(Directed::control(
                    DirectedKind::RegisterChild,
                    me,
                    flood.from,
                ));
                FloodOutcome::Registered { improved }
            }
            Record::Duplicate => {
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::DuplicateFlood { from: flood.from }
                );
                FloodOutcome::Duplicate { improved }
            }
            Record::Full => {
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::ResourceExhausted {
                        what: "route history"
                    }
                );
                FloodOutcome::HistoryFull { improved }
            }
        }
    }
}
