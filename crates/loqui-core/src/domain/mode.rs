//! The client mode state machine, encoded as data.
//!
//! Exactly one [`Mode`] value exists at any instant. All mode changes flow
//! through [`arbitrate`], a pure function of the current mode, the tracked
//! session, and the incoming [`ModeRequest`]. The controller that applies
//! the result lives in the client crate; this module owns only the rules.

use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

/// The client's global interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Idle. Microphone closed, no session tracked.
    Sleeping,
    /// Push-to-talk key held, microphone recording.
    Listening,
    /// A request is in flight or playback is running.
    Processing,
}

impl Mode {
    /// Lowercase label used in the persisted state file and log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sleeping => "sleeping",
            Self::Listening => "listening",
            Self::Processing => "processing",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Well-known `ModeRequest::source` tags.
///
/// Sources are free-form strings on the wire, but every component in this
/// workspace uses one of these. Only [`source::INTERRUPT`] carries special
/// arbitration weight.
pub mod source {
    /// Short key press or explicit interrupt; always wins if reachable.
    pub const INTERRUPT: &str = "interrupt";
    /// Long press of the activation key.
    pub const KEYBOARD: &str = "keyboard";
    /// Activation key released with recognised text present.
    pub const KEYBOARD_RELEASE: &str = "keyboard_release";
    /// Activation key released but recognition produced nothing.
    pub const RECOGNITION_EMPTY: &str = "recognition_empty";
    /// Playback of the server response drained naturally.
    pub const PLAYBACK_COMPLETED: &str = "playback_completed";
    /// Playback could not start or died mid-stream.
    pub const PLAYBACK_FAILED: &str = "playback_failed";
    /// The gRPC request failed or was refused.
    pub const GRPC_FAILURE: &str = "grpc_failure";
    /// Greeting flow entering processing without listening first.
    pub const GREETING: &str = "greeting";
    /// Watchdog expiry inside the controller itself.
    pub const MODE_MANAGEMENT: &str = "mode_management";
}

/// A request to change the current [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRequest {
    /// Desired mode.
    pub target: Mode,
    /// Free-form source tag; see [`source`].
    pub source: String,
    /// Requester priority, informational only (delivery order is handled
    /// by the event bus priority class).
    pub priority: i32,
    /// Session this request belongs to, when it belongs to one.
    pub session_id: Option<SessionId>,
}

impl ModeRequest {
    /// Build a request with the given target and source and no session.
    #[must_use]
    pub fn new(target: Mode, source: &str) -> Self {
        Self {
            target,
            source: source.to_string(),
            priority: 0,
            session_id: None,
        }
    }

    /// Attach a session id.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Whether this request carries the interrupt source tag.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        self.source == source::INTERRUPT
    }
}

/// The allowed transitions, as a directed edge list.
///
/// `Processing -> Listening` is deliberately absent: a new utterance always
/// goes through `Sleeping` first.
pub const ALLOWED_TRANSITIONS: &[(Mode, Mode)] = &[
    (Mode::Sleeping, Mode::Listening),
    (Mode::Listening, Mode::Processing),
    (Mode::Processing, Mode::Sleeping),
    (Mode::Sleeping, Mode::Processing),
    (Mode::Listening, Mode::Sleeping),
];

/// Whether `from -> to` appears in [`ALLOWED_TRANSITIONS`].
#[must_use]
pub fn transition_allowed(from: Mode, to: Mode) -> bool {
    ALLOWED_TRANSITIONS.iter().any(|&(f, t)| f == from && t == to)
}

/// Why a request was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The transition is not in the allowed set.
    ForbiddenTransition,
    /// The request's session does not match the tracked one.
    SessionMismatch,
    /// An interrupt asked for a mode unreachable from the current one.
    InterruptUnreachable,
}

/// Outcome of arbitrating a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// Apply the transition to the request's target.
    Apply,
    /// The target equals the current mode; drop silently.
    NoOp,
    /// The request is refused for the stated reason.
    Rejected(RejectReason),
}

/// Decide what to do with `request` given the current mode and the tracked
/// session.
///
/// Rules, in order:
/// 1. Same-mode requests are no-ops, interrupt or not.
/// 2. An interrupt is applied whenever the transition exists; an interrupt
///    towards an unreachable mode is rejected as
///    [`RejectReason::InterruptUnreachable`].
/// 3. Any other request must name an allowed transition, and when both it
///    and the controller carry a session id the two must agree.
#[must_use]
pub fn arbitrate(
    current: Mode,
    tracked_session: Option<SessionId>,
    request: &ModeRequest,
) -> Arbitration {
    if request.target == current {
        return Arbitration::NoOp;
    }

    if request.is_interrupt() {
        return if transition_allowed(current, request.target) {
            Arbitration::Apply
        } else {
            Arbitration::Rejected(RejectReason::InterruptUnreachable)
        };
    }

    if !transition_allowed(current, request.target) {
        return Arbitration::Rejected(RejectReason::ForbiddenTransition);
    }

    if let (Some(tracked), Some(requested)) = (tracked_session, request.session_id) {
        if tracked != requested {
            return Arbitration::Rejected(RejectReason::SessionMismatch);
        }
    }

    Arbitration::Apply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(target: Mode, src: &str) -> ModeRequest {
        ModeRequest::new(target, src)
    }

    #[test]
    fn same_mode_request_is_noop() {
        let r = req(Mode::Sleeping, source::KEYBOARD);
        assert_eq!(arbitrate(Mode::Sleeping, None, &r), Arbitration::NoOp);
    }

    #[test]
    fn same_mode_interrupt_is_noop() {
        let r = req(Mode::Sleeping, source::INTERRUPT);
        assert_eq!(arbitrate(Mode::Sleeping, None, &r), Arbitration::NoOp);
    }

    #[test]
    fn processing_to_listening_is_forbidden() {
        let r = req(Mode::Listening, source::KEYBOARD);
        assert_eq!(
            arbitrate(Mode::Processing, None, &r),
            Arbitration::Rejected(RejectReason::ForbiddenTransition)
        );
    }

    #[test]
    fn interrupt_cannot_reach_forbidden_mode() {
        let r = req(Mode::Listening, source::INTERRUPT);
        assert_eq!(
            arbitrate(Mode::Processing, None, &r),
            Arbitration::Rejected(RejectReason::InterruptUnreachable)
        );
    }

    #[test]
    fn interrupt_wins_on_allowed_edge() {
        let r = req(Mode::Sleeping, source::INTERRUPT);
        assert_eq!(arbitrate(Mode::Processing, None, &r), Arbitration::Apply);
        assert_eq!(arbitrate(Mode::Listening, None, &r), Arbitration::Apply);
    }

    #[test]
    fn session_mismatch_rejected_in_processing() {
        let tracked = SessionId::from_millis(100);
        let r = req(Mode::Sleeping, source::PLAYBACK_COMPLETED)
            .with_session(SessionId::from_millis(200));
        assert_eq!(
            arbitrate(Mode::Processing, Some(tracked), &r),
            Arbitration::Rejected(RejectReason::SessionMismatch)
        );
    }

    #[test]
    fn matching_session_applies() {
        let tracked = SessionId::from_millis(100);
        let r = req(Mode::Processing, source::KEYBOARD_RELEASE).with_session(tracked);
        assert_eq!(arbitrate(Mode::Listening, Some(tracked), &r), Arbitration::Apply);
    }

    #[test]
    fn sessionless_request_passes_session_check() {
        let tracked = SessionId::from_millis(100);
        let r = req(Mode::Sleeping, source::MODE_MANAGEMENT);
        assert_eq!(arbitrate(Mode::Processing, Some(tracked), &r), Arbitration::Apply);
    }

    #[test]
    fn greeting_enters_processing_from_sleeping() {
        let r = req(Mode::Processing, source::GREETING);
        assert_eq!(arbitrate(Mode::Sleeping, None, &r), Arbitration::Apply);
    }

    #[test]
    fn every_table_edge_is_reported_allowed() {
        for &(from, to) in ALLOWED_TRANSITIONS {
            assert!(transition_allowed(from, to), "{from} -> {to} should be allowed");
        }
        assert!(!transition_allowed(Mode::Processing, Mode::Listening));
    }
}
