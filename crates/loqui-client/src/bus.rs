//! The in-process event bus.
//!
//! A single [`BusDriver`] task owns the subscriber table and a priority
//! queue of undelivered events. Publishers enqueue through a cloneable
//! [`EventBus`] handle and return immediately; handlers run sequentially on
//! the driver task and must finish promptly (long work belongs on the task
//! pool, talking back through events).
//!
//! Delivery guarantees:
//! - CRITICAL drains before HIGH before MEDIUM before LOW; FIFO within a
//!   class.
//! - A handler never observes a partially published event.
//! - Events published from inside a handler are appended and drained after
//!   the current event completes.
//! - A failing handler does not stop delivery to the remaining
//!   subscribers; its error goes to the [`ErrorSink`].
//!
//! There are no retries, no persistence, and no replay.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use loqui_core::events::{Event, EventPriority};
use loqui_core::ports::{ErrorSink, EventSink};

/// Error type a handler may surface; reported to the sink, never fatal.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A subscriber callback.
pub type EventHandler = Box<dyn FnMut(&Event) -> Result<(), HandlerError> + Send>;

/// Identifies one subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Command {
    Publish(Event),
    Subscribe {
        name: String,
        priority: EventPriority,
        id: SubscriptionId,
        handler: EventHandler,
    },
    Unsubscribe(SubscriptionId),
    /// Stop the driver once the queue is drained. Needed because handlers
    /// themselves hold bus clones, so the channel never closes on its own.
    Shutdown,
}

/// Cloneable handle to the bus.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Command>,
    next_subscription: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus handle and the driver that must be run to deliver
    /// events.
    #[must_use]
    pub fn new(errors: Arc<dyn ErrorSink>) -> (Self, BusDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            tx,
            next_subscription: Arc::new(AtomicU64::new(1)),
        };
        let driver = BusDriver {
            rx,
            subscribers: HashMap::new(),
            queue: BinaryHeap::new(),
            dead: HashSet::new(),
            seq: 0,
            stopping: false,
            errors,
        };
        (bus, driver)
    }

    /// Enqueue an event. Returns as soon as the event is queued.
    pub fn publish(&self, event: Event) {
        if self.tx.send(Command::Publish(event)).is_err() {
            tracing::warn!("event published after bus shutdown");
        }
    }

    /// Register `handler` for events named `name`.
    ///
    /// Multiple handlers per name are allowed; for one event, handlers run
    /// in priority order, then registration order. The handler may publish
    /// further events and may unsubscribe itself.
    pub fn subscribe<F>(&self, name: &str, priority: EventPriority, handler: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(Command::Subscribe {
            name: name.to_string(),
            priority,
            id,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Safe to call from within a handler; takes
    /// effect once the current event finishes dispatching.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.tx.send(Command::Unsubscribe(id));
    }

    /// Ask the driver to stop after draining what is already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: Event) {
        Self::publish(self, event);
    }
}

struct Subscriber {
    id: SubscriptionId,
    priority: EventPriority,
    registration: u64,
    handler: EventHandler,
}

struct Queued {
    priority: EventPriority,
    seq: u64,
    event: Event,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Queued {}
impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

/// The single task that owns subscriptions and delivers events.
pub struct BusDriver {
    rx: mpsc::UnboundedReceiver<Command>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    queue: BinaryHeap<Reverse<Queued>>,
    /// Subscriptions removed while an event was dispatching.
    dead: HashSet<SubscriptionId>,
    seq: u64,
    stopping: bool,
    errors: Arc<dyn ErrorSink>,
}

impl BusDriver {
    /// Run until [`EventBus::shutdown`] is called or every handle is
    /// dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.apply(command);
            self.drain();
            if self.stopping {
                break;
            }
        }
        tracing::debug!("event bus driver stopped");
    }

    /// Deliver everything currently enqueued. Used directly by tests; the
    /// async loop calls it after each received command.
    pub fn drain(&mut self) {
        loop {
            // Absorb commands that arrived while dispatching so that a
            // CRITICAL event published moments ago overtakes queued LOW ones.
            while let Ok(command) = self.rx.try_recv() {
                self.apply(command);
            }

            let Some(Reverse(next)) = self.queue.pop() else {
                break;
            };
            self.dispatch(&next.event);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Publish(event) => {
                self.seq += 1;
                self.queue.push(Reverse(Queued {
                    priority: event.priority,
                    seq: self.seq,
                    event,
                }));
            }
            Command::Subscribe {
                name,
                priority,
                id,
                handler,
            } => {
                self.seq += 1;
                let list = self.subscribers.entry(name).or_default();
                list.push(Subscriber {
                    id,
                    priority,
                    registration: self.seq,
                    handler,
                });
                list.sort_by_key(|s| (s.priority, s.registration));
            }
            Command::Unsubscribe(id) => {
                self.dead.insert(id);
            }
            Command::Shutdown => {
                self.stopping = true;
            }
        }
    }

    fn dispatch(&mut self, event: &Event) {
        // Sweep unsubscriptions recorded since the last dispatch.
        if !self.dead.is_empty() {
            for list in self.subscribers.values_mut() {
                list.retain(|s| !self.dead.contains(&s.id));
            }
            self.dead.clear();
        }

        let Some(list) = self.subscribers.get_mut(&event.name) else {
            return;
        };

        let errors = Arc::clone(&self.errors);
        for subscriber in list.iter_mut() {
            if let Err(error) = (subscriber.handler)(event) {
                errors.report(&event.name, error.as_ref());
            }
        }
    }
}
