//! Push-to-talk input handling.
//!
//! The OS key hook is a black box that feeds raw [`KeyTransition`]s into
//! [`InputIntegration`]. The integration classifies them against the
//! long-press threshold and publishes the reserved `keyboard.*` events:
//!
//! - held past the threshold: `keyboard.long_press`, a LISTENING mode
//!   request, and `voice.recording_start` for a freshly minted session;
//! - released before the threshold: `keyboard.short_press` plus
//!   `interrupt.request`;
//! - released after a long press: `keyboard.release` and
//!   `voice.recording_stop`.
//!
//! [`attach_interrupt_bridge`] turns every `interrupt.request` into the
//! CRITICAL `mode.request{target=SLEEPING, source=interrupt}` that the
//! controller acts on.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use loqui_core::domain::mode::{source, Mode, ModeRequest};
use loqui_core::domain::session::{SessionClock, SessionId};
use loqui_core::events::{
    names, Event, EventPayload, EventPriority, KeyPressPayload, RecordingPayload,
};

use crate::bus::EventBus;

/// A raw key edge from the OS hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    /// Activation key went down.
    Down,
    /// Activation key came up.
    Up,
}

struct PressState {
    pressed_at: Option<Instant>,
    pressed_epoch_ms: u64,
    /// Distinguishes presses so a stale threshold timer cannot fire for a
    /// newer press.
    press_seq: u64,
    long_fired: bool,
    session: Option<SessionId>,
}

/// Classifies key edges into the reserved keyboard events.
#[derive(Clone)]
pub struct InputIntegration {
    bus: EventBus,
    clock: Arc<SessionClock>,
    threshold: Duration,
    state: Arc<Mutex<PressState>>,
}

impl InputIntegration {
    /// Create the integration.
    #[must_use]
    pub fn new(bus: EventBus, clock: Arc<SessionClock>, threshold: Duration) -> Self {
        Self {
            bus,
            clock,
            threshold,
            state: Arc::new(Mutex::new(PressState {
                pressed_at: None,
                pressed_epoch_ms: 0,
                press_seq: 0,
                long_fired: false,
                session: None,
            })),
        }
    }

    /// Feed one raw transition.
    pub fn handle(&self, transition: KeyTransition) {
        match transition {
            KeyTransition::Down => self.on_down(),
            KeyTransition::Up => self.on_up(),
        }
    }

    /// Drain a channel of transitions until the sender closes.
    pub async fn run(self, mut rx: tokio::sync::mpsc::UnboundedReceiver<KeyTransition>) {
        while let Some(transition) = rx.recv().await {
            self.handle(transition);
        }
    }

    fn on_down(&self) {
        let seq = {
            let mut state = self.state.lock().unwrap();
            if state.pressed_at.is_some() {
                return; // key-repeat noise
            }
            state.pressed_at = Some(Instant::now());
            state.pressed_epoch_ms = epoch_ms();
            state.press_seq += 1;
            state.long_fired = false;
            state.session = Some(self.clock.next());
            state.press_seq
        };

        // The long-press edge fires while the key is still held.
        let me = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(me.threshold).await;
            me.fire_long_press(seq);
        });
    }

    fn fire_long_press(&self, seq: u64) {
        let (session, epoch) = {
            let mut state = self.state.lock().unwrap();
            if state.press_seq != seq || state.pressed_at.is_none() || state.long_fired {
                return;
            }
            state.long_fired = true;
            (state.session.expect("session minted on key down"), state.pressed_epoch_ms)
        };

        tracing::debug!(%session, "long press");
        self.bus.publish(Event::new(
            names::KEYBOARD_LONG_PRESS,
            EventPayload::KeyPress(KeyPressPayload {
                duration_ms: self.threshold.as_millis() as u64,
                timestamp_ms: epoch,
            }),
            EventPriority::High,
        ));
        self.bus.publish(Event::mode_request(
            ModeRequest::new(Mode::Listening, source::KEYBOARD).with_session(session),
        ));
        self.bus.publish(Event::new(
            names::VOICE_RECORDING_START,
            EventPayload::Recording(RecordingPayload {
                session_id: session,
                source: source::KEYBOARD.to_string(),
            }),
            EventPriority::High,
        ));
    }

    fn on_up(&self) {
        let (held, long_fired, session, epoch) = {
            let mut state = self.state.lock().unwrap();
            let Some(pressed_at) = state.pressed_at.take() else {
                return;
            };
            (
                pressed_at.elapsed(),
                state.long_fired,
                state.session,
                state.pressed_epoch_ms,
            )
        };

        let key_payload = EventPayload::KeyPress(KeyPressPayload {
            duration_ms: held.as_millis() as u64,
            timestamp_ms: epoch,
        });

        if long_fired {
            let session = session.expect("long press carries a session");
            tracing::debug!(%session, held_ms = held.as_millis() as u64, "key released");
            self.bus
                .publish(Event::new(names::KEYBOARD_RELEASE, key_payload, EventPriority::High));
            self.bus.publish(Event::new(
                names::VOICE_RECORDING_STOP,
                EventPayload::Recording(RecordingPayload {
                    session_id: session,
                    source: source::KEYBOARD.to_string(),
                }),
                EventPriority::High,
            ));
        } else {
            tracing::debug!(held_ms = held.as_millis() as u64, "short press, interrupting");
            self.bus.publish(Event::new(
                names::KEYBOARD_SHORT_PRESS,
                key_payload,
                EventPriority::High,
            ));
            self.bus.publish(Event::new(
                names::INTERRUPT_REQUEST,
                EventPayload::Empty,
                EventPriority::Critical,
            ));
        }
    }
}

/// Subscribe the bridge that turns `interrupt.request` into the CRITICAL
/// sleep request.
pub fn attach_interrupt_bridge(bus: &EventBus) {
    let publisher = bus.clone();
    bus.subscribe(names::INTERRUPT_REQUEST, EventPriority::Critical, move |_| {
        publisher.publish(Event::mode_request(ModeRequest::new(
            Mode::Sleeping,
            source::INTERRUPT,
        )));
        Ok(())
    });
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
