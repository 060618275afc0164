//! Token-synchronized child admission.
//!
//! Only the node holding the token may flood, and a node lends its token to
//! one pending child at a time. That serialises floods across the network,
//! which is the protocol's only congestion control.
//!
//! ```text
//! NotStarted --configure (sink) / grant (relay)--> NoToken
//! NoToken --tick: flood--> WaitingForEcho(None)
//! WaitingForEcho(_) --registration / return / timeout--> WaitingForEcho(Some(child))
//! WaitingForEcho(_) --queue empty--> Closed
//! ```

use crate::config::NodeConfig;
use crate::node::Node;
use crate::queue::Enqueue;
use crate::time::Timestamp;
use crate::traits::{Clock, LinkCost, Random, Transport};
use crate::types::{Event, NodeId};
use crate::wire::{Directed, DirectedKind};

/// Where a node stands in the token cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    /// Never held the token.
    NotStarted,
    /// Holds the token; floods on the next tick.
    NoToken,
    /// Flooded. `None` while the echo window is open with no child admitted,
    /// `Some(child)` while `child` holds the token.
    WaitingForEcho(Option<NodeId>),
    /// Done. Best path frozen and reported.
    Closed,
}

impl TokenState {
    pub fn is_closed(&self) -> bool {
        matches!(self, TokenState::Closed)
    }

    /// Child currently holding our token.
    pub fn admitted_child(&self) -> Option<NodeId> {
        match self {
            TokenState::WaitingForEcho(child) => *child,
            _ => None,
        }
    }

    /// True while the node takes part in the cycle.
    pub fn is_active(&self) -> bool {
        matches!(self, TokenState::NoToken | TokenState::WaitingForEcho(_))
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
    /// A neighbour extended our flood and wants the token.
    pub(crate) fn handle_register_child(&mut self, child: NodeId, now: Timestamp) {
        if !self.token.is_active() || child == self.node_id() {
            return;
        }

        if self.token.admitted_child() == Some(child) {
            self.echo_deadline = Some(now + self.admission_timeout());
            return;
        }

        match self.pending.push(child) {
            Enqueue::Queued => {
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::ChildQueued {
                        child,
                        queue_len: self.pending.len(),
                    }
                );
            }
            Enqueue::AlreadyQueued => {}
            Enqueue::Full => {
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::ResourceExhausted {
                        what: "pending children"
                    }
                );
            }
        }

        match self.token {
            // Own flood still pending: the child waits for our echo window.
            TokenState::NoToken => {}
            TokenState::WaitingForEcho(None) => {
                self.grant_next(now);
            }
            // Registrations keep the admission window open.
            _ => self.echo_deadline = Some(now + self.admission_timeout()),
        }
    }

    /// Someone lends us their token.
    pub(crate) fn handle_token_grant(&mut self, from: NodeId, now: Timestamp) {
        match self.token {
            TokenState::NotStarted if self.registry.route().is_some() => {
                self.token = TokenState::NoToken;
                self.granted_by = Some(from);
                self.registration_deadline = None;
                self.schedule_tick(now);
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::TokenAccepted {
                        from,
                        flood_at: self.next_tick.unwrap_or(now),
                    }
                );
            }
            // Repeated grant from our own granter.
            _ if self.token.is_active() && self.granted_by == Some(from) => {}
            _ => {
                emit_debug!(self, {
                    let reason = match self.token {
                        TokenState::NotStarted => "no route",
                        TokenState::Closed => "closed",
                        _ => "busy",
                    };
                    crate::debug::DebugEvent::TokenRefused { from, reason }
                });
                self.send_directed(Directed::control(
                    DirectedKind::TokenReturn,
                    self.node_id(),
                    from,
                ));
            }
        }
    }

    /// A child gives our token back.
    pub(crate) fn handle_token_return(&mut self, from: NodeId, now: Timestamp) {
        if self.token.admitted_child() != Some(from) {
            emit_debug!(self, crate::debug::DebugEvent::StaleReturn { from });
            return;
        }
        emit_debug!(
            self,
            crate::debug::DebugEvent::TokenReturned { child: from }
        );
        self.advance_token(now);
    }

    /// Echo window or admission window ran out. Same as a return from the
    /// silent child.
    pub(crate) fn handle_echo_timeout(&mut self, now: Timestamp) {
        if let TokenState::WaitingForEcho(_silent_child) = self.token {
            emit_debug!(
                self,
                crate::debug::DebugEvent::EchoTimeout {
                    timestamp: now,
                    silent_child: _silent_child,
                }
            );
            self.advance_token(now);
        }
    }

    /// Registered somewhere but never granted.
    pub(crate) fn handle_registration_timeout(&mut self, now: Timestamp) {
        if self.token == TokenState::NotStarted && self.registry.best().is_some() {
            emit_debug!(
                self,
                crate::debug::DebugEvent::RegistrationTimeout { timestamp: now }
            );
            self.close(now);
        }
    }

    /// Lend the token to the next pending child. Returns false if none is
    /// waiting.
    pub(crate) fn grant_next(&mut self, now: Timestamp) -> bool {
        let Some(child) = self.pending.pop() else {
            return false;
        };
        let deadline = now + self.admission_timeout();
        self.token = TokenState::WaitingForEcho(Some(child));
        self.echo_deadline = Some(deadline);
        self.send_directed(Directed::control(
            DirectedKind::TokenGrant,
            self.node_id(),
            child,
        ));
        emit_debug!(
            self,
            crate::debug::DebugEvent::TokenGranted {
                timestamp: now,
                child,
                deadline,
            }
        );
        true
    }

    fn advance_token(&mut self, now: Timestamp) {
        if !self.grant_next(now) {
            self.close(now);
        }
    }

    /// Freeze the best path and report it upward.
    ///
    /// A relay sends its answers first and then returns the token to its
    /// predecessor, plus to its granter if that is a different node. The sink
    /// publishes the converged result instead.
    pub(crate) fn close(&mut self, now: Timestamp) {
        self.token = TokenState::Closed;
        self.next_tick = None;
        self.echo_deadline = None;
        self.registration_deadline = None;
        self.registry.freeze();

        let me = self.node_id();
        let predecessor = self.registry.predecessor();
        emit_debug!(
            self,
            crate::debug::DebugEvent::Closed {
                timestamp: now,
                predecessor,
                best_weight: self.registry.best_weight(),
            }
        );

        let best = self.registry.best().cloned();
        if self.is_sink() {
            self.push_event(Event::Converged { result: best });
            return;
        }

        if let Some(pred) = predecessor {
            self.forward_best();
            self.send_directed(Directed::control(DirectedKind::TokenReturn, me, pred));
        }
        // The predecessor may have closed already. The granter is still
        // waiting for its token, so it always hears our lightest candidate.
        if let Some(granter) = self.granted_by.take() {
            let report = self.registry.lightest().cloned();
            let separate = Some(granter) != predecessor;
            if let Some(report) = report.filter(|r| separate || Some(r) != best.as_ref()) {
                self.send_directed(Directed::answer(me, granter, report));
            }
            if separate {
                self.send_directed(Directed::control(DirectedKind::TokenReturn, me, granter));
            }
        }
        self.push_event(Event::Closed { best });
    }
}
