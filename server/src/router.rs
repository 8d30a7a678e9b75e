//! Decoding, authentication and dispatch of inbound frames

use crate::auth::Authenticator;
use crate::tempo_clock::TempoClock;
use crate::utils::preview;
use log::{debug, info, warn};
use shared::{CodeKind, InboundMessage, OutboundMessage};
use std::net::SocketAddr;

/// Why a frame produced no broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    Unrecognized,
    Unauthorized,
    /// A bare `Tempo` field; tempo can only be changed by `TempoChange`
    TempoSetRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Broadcast(OutboundMessage),
    Dropped(DropReason),
}

/// Turns each inbound frame into at most one outbound message.
///
/// Stateless across frames apart from the tempo clock, which only a
/// successful `TempoChange` mutates.
#[derive(Debug)]
pub struct MessageRouter {
    authenticator: Authenticator,
    clock: TempoClock,
}

impl MessageRouter {
    pub fn new(authenticator: Authenticator, clock: TempoClock) -> Self {
        Self {
            authenticator,
            clock,
        }
    }

    pub fn clock(&self) -> &TempoClock {
        &self.clock
    }

    pub fn route(&mut self, raw: &str, from: SocketAddr, now_micros: i64) -> RouteOutcome {
        let message = match InboundMessage::try_decode(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("decode error from {}: {} (payload: {})", from, e, preview(raw, 80));
                InboundMessage::Malformed
            }
        };

        // Nothing is read from a frame that failed to parse
        match message {
            InboundMessage::Malformed => {
                warn!(
                    "exception in processing incoming message from {} (possibly incorrectly formatted JSON)",
                    from
                );
                return RouteOutcome::Dropped(DropReason::Malformed);
            }
            InboundMessage::Unrecognized => {
                warn!("message from {} has no recognized tag", from);
                return RouteOutcome::Dropped(DropReason::Unrecognized);
            }
            _ => {}
        }

        if !self.authenticator.check(message.credential()) {
            warn!(
                "request with invalid password from {} ({} dropped)",
                from,
                message.name()
            );
            return RouteOutcome::Dropped(DropReason::Unauthorized);
        }

        let outbound = match message {
            InboundMessage::TextEdit(update) => OutboundMessage::code(CodeKind::TextEdit, update),
            InboundMessage::TextEval(update) => OutboundMessage::code(CodeKind::TextEval, update),
            InboundMessage::EstuaryEdit(update) => {
                OutboundMessage::code(CodeKind::EstuaryEdit, update)
            }
            InboundMessage::TempoChange { new_cps, .. } => {
                info!("TempoChange {} from {}", new_cps, from);
                OutboundMessage::Tempo(self.clock.apply_tempo_change(new_cps, now_micros))
            }
            InboundMessage::TempoSet { .. } => {
                warn!(
                    "received Tempo message from {} but tempo can only be changed by TempoChange",
                    from
                );
                return RouteOutcome::Dropped(DropReason::TempoSetRejected);
            }
            InboundMessage::Malformed | InboundMessage::Unrecognized => {
                unreachable!("rejected before authentication")
            }
        };

        if let OutboundMessage::Code { kind, .. } = &outbound {
            info!("{} from {}", kind, from);
        }
        RouteOutcome::Broadcast(outbound)
    }
}
