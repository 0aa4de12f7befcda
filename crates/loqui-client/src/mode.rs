//! The mode controller: single authority over the client's mode.
//!
//! The controller subscribes to `mode.request`, arbitrates each request
//! with the pure rules in `loqui_core::domain::mode`, and publishes
//! `app.mode_changed` exactly when the mode actually changes. It owns the
//! active session id and the listening/processing watchdogs; nothing else
//! in the process may hold mode state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqui_core::config::ModeConfig;
use loqui_core::domain::mode::{self, Arbitration, Mode, ModeRequest, RejectReason};
use loqui_core::domain::session::SessionId;
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, ModeChangedPayload, ModeRejectedPayload,
};
use loqui_core::paths::TrayState;

use crate::bus::EventBus;

/// Reject tag used when microphone permission blocks LISTENING.
const REASON_PERMISSION: &str = "permission_denied";

struct ControllerState {
    mode: Mode,
    session: Option<SessionId>,
    microphone_permitted: bool,
    listening_watchdog: Option<tokio::task::JoinHandle<()>>,
    processing_watchdog: Option<tokio::task::JoinHandle<()>>,
}

/// The client's mode authority.
///
/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct ModeController {
    state: Arc<Mutex<ControllerState>>,
    bus: EventBus,
    config: ModeConfig,
    /// Tray/UI mirror; written best-effort on every change.
    state_file: Option<PathBuf>,
}

impl ModeController {
    /// Create a controller starting in [`Mode::Sleeping`].
    #[must_use]
    pub fn new(bus: EventBus, config: ModeConfig, state_file: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                mode: Mode::Sleeping,
                session: None,
                microphone_permitted: true,
                listening_watchdog: None,
                processing_watchdog: None,
            })),
            bus,
            config,
            state_file,
        }
    }

    /// Register the controller's subscriptions.
    pub fn attach(&self) {
        let me = self.clone();
        self.bus
            .subscribe(names::MODE_REQUEST, EventPriority::Critical, move |event| {
                if let EventPayload::ModeRequest(request) = &event.payload {
                    me.handle_request(request);
                }
                Ok(())
            });

        let me = self.clone();
        self.bus.subscribe(
            names::PERMISSIONS_CHANGED,
            EventPriority::High,
            move |event| {
                if let EventPayload::Permissions(p) = &event.payload {
                    me.state.lock().unwrap().microphone_permitted = p.microphone;
                }
                Ok(())
            },
        );

        // Greeting gates the sleeping-to-processing edge behind an explicit
        // event instead of an ambient trigger.
        let me = self.clone();
        self.bus
            .subscribe(names::GREETING_REQUEST, EventPriority::High, move |_| {
                me.handle_request(&ModeRequest::new(Mode::Processing, mode::source::GREETING));
                Ok(())
            });
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.state.lock().unwrap().mode
    }

    /// Currently tracked session, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.state.lock().unwrap().session
    }

    /// Arbitrate and, if allowed, apply one request.
    pub fn handle_request(&self, request: &ModeRequest) {
        let mut state = self.state.lock().unwrap();

        // Permission gate: LISTENING is refused while the microphone is
        // blocked, interrupt or not (an interrupt never targets LISTENING).
        if request.target == Mode::Listening
            && !state.microphone_permitted
            && state.mode != Mode::Listening
        {
            let current = state.mode;
            drop(state);
            self.reject(request, current, REASON_PERMISSION);
            return;
        }

        match mode::arbitrate(state.mode, state.session, request) {
            Arbitration::NoOp => {
                tracing::trace!(target = %request.target, "same-mode request dropped");
            }
            Arbitration::Rejected(reason) => {
                let current = state.mode;
                drop(state);
                self.reject(request, current, reject_tag(reason));
            }
            Arbitration::Apply => {
                let previous = state.mode;
                state.mode = request.target;
                self.enter(&mut state, previous, request);
                drop(state);
                self.announce(request.target, previous);
            }
        }
    }

    fn enter(&self, state: &mut ControllerState, previous: Mode, request: &ModeRequest) {
        match request.target {
            Mode::Listening => {
                state.session = request.session_id;
                Self::disarm(&mut state.listening_watchdog);
                state.listening_watchdog =
                    self.arm_watchdog(self.config.listening_watchdog(), Mode::Listening);
            }
            Mode::Processing => {
                Self::disarm(&mut state.listening_watchdog);
                if let Some(session) = request.session_id {
                    state.session = Some(session);
                }
                state.processing_watchdog =
                    self.arm_watchdog(self.config.processing_watchdog(), Mode::Processing);
            }
            Mode::Sleeping => {
                Self::disarm(&mut state.listening_watchdog);
                Self::disarm(&mut state.processing_watchdog);
                state.session = None;
            }
        }

        tracing::info!(
            previous = %previous,
            mode = %request.target,
            source = %request.source,
            session = ?state.session,
            "mode transition"
        );
    }

    fn disarm(slot: &mut Option<tokio::task::JoinHandle<()>>) {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Arm a watchdog that forces SLEEPING after `timeout`, if configured.
    fn arm_watchdog(
        &self,
        timeout: Option<Duration>,
        guarded: Mode,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let timeout = timeout?;
        let bus = self.bus.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(mode = %guarded, "watchdog expired, forcing sleep");
            bus.publish(Event::mode_request(ModeRequest::new(
                Mode::Sleeping,
                mode::source::MODE_MANAGEMENT,
            )));
        }))
    }

    fn announce(&self, mode: Mode, previous: Mode) {
        self.bus.publish(Event::new(
            names::APP_MODE_CHANGED,
            EventPayload::ModeChanged(ModeChangedPayload { mode, previous }),
            EventPriority::High,
        ));

        if let Some(path) = &self.state_file {
            if let Err(error) = TrayState::now(mode.label()).write(path) {
                tracing::warn!(%error, "failed to mirror mode to state file");
            }
        }
    }

    fn reject(&self, request: &ModeRequest, current: Mode, reason: &str) {
        tracing::warn!(
            target = %request.target,
            source = %request.source,
            current = %current,
            reason,
            "mode request rejected"
        );

        let name = if request.is_interrupt() {
            names::INTERRUPT_IGNORED
        } else {
            names::MODE_REQUEST_REJECTED
        };
        self.bus.publish(Event::new(
            name,
            EventPayload::ModeRejected(ModeRejectedPayload {
                requested: request.target,
                current,
                source: request.source.clone(),
                reason: reason.to_string(),
            }),
            EventPriority::High,
        ));
    }
}

fn reject_tag(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::ForbiddenTransition => "forbidden_transition",
        RejectReason::SessionMismatch => "session_mismatch",
        RejectReason::InterruptUnreachable => "interrupt_unreachable",
    }
}
