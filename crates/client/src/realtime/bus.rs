//! Message event bus
//!
//! Process-local fan-out of inbound [`MessageEvent`]s to interested handlers, e.g. an open
//! conversation screen and a background notifier.
//!
//! - Handlers run in subscription order.
//! - A handler may stop dispatch for the current event; later handlers are skipped.
//! - Dispatch iterates a point-in-time snapshot, so handlers may subscribe or unsubscribe
//!   (themselves included) while an event is being delivered.
//! - A failing handler is logged and dispatch continues with the next one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use sincronica_shared::{MessageEvent, ValidationError};

/// Identity of a registered handler
pub type SubscriptionId = u64;

/// What a handler tells the bus after seeing an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Let the event fall through to the next handler
    #[default]
    Continue,
    /// Claim the event; no further handlers see it
    Stop,
}

/// Values a handler may return
///
/// `()` and `false` continue, `true` stops, and `Err` marks the handler as failed.
pub trait IntoDispatch {
    fn into_dispatch(self) -> anyhow::Result<Dispatch>;
}

impl IntoDispatch for Dispatch {
    fn into_dispatch(self) -> anyhow::Result<Dispatch> {
        Ok(self)
    }
}

impl IntoDispatch for () {
    fn into_dispatch(self) -> anyhow::Result<Dispatch> {
        Ok(Dispatch::Continue)
    }
}

impl IntoDispatch for bool {
    fn into_dispatch(self) -> anyhow::Result<Dispatch> {
        Ok(if self {
            Dispatch::Stop
        } else {
            Dispatch::Continue
        })
    }
}

impl<T, E> IntoDispatch for Result<T, E>
where
    T: IntoDispatch,
    E: Into<anyhow::Error>,
{
    fn into_dispatch(self) -> anyhow::Result<Dispatch> {
        self.map_err(Into::into)?.into_dispatch()
    }
}

type Handler = dyn Fn(&MessageEvent) -> anyhow::Result<Dispatch> + Send + Sync;

struct Subscriber {
    id: SubscriptionId,
    active: AtomicBool,
    handler: Box<Handler>,
}

#[derive(Default)]
struct Registry {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Subscriber>>> {
        // Handlers never run under this lock, so a poisoned list is still consistent
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Summary of one `publish` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Handlers that were invoked, including failed ones
    pub invoked: usize,
    /// Handlers that returned an error
    pub failed: usize,
    /// Handler that claimed the event, if any
    pub stopped_by: Option<SubscriptionId>,
}

impl Delivery {
    pub fn is_stopped(&self) -> bool {
        self.stopped_by.is_some()
    }
}

/// Ordered, stoppable publish/subscribe registry for message events
///
/// Cheap to clone; clones share the same subscriber list. One instance is owned by the
/// application context and handed to whoever needs it.
#[derive(Clone, Default)]
pub struct MessageBus {
    registry: Arc<Registry>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at the end of the dispatch order
    pub fn subscribe<F, R>(&self, handler: F) -> Subscription
    where
        F: Fn(&MessageEvent) -> R + Send + Sync + 'static,
        R: IntoDispatch,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            handler: Box::new(move |event: &MessageEvent| handler(event).into_dispatch()),
        });

        let mut subscribers = self.registry.lock();
        subscribers.push(subscriber);

        tracing::debug!(
            subscription_id = id,
            subscribers = subscribers.len(),
            "Handler subscribed to message bus"
        );

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to the current handlers
    ///
    /// Self-conversation events are rejected before any handler runs.
    pub fn publish(&self, event: &MessageEvent) -> Result<Delivery, ValidationError> {
        if let Err(err) = event.validate() {
            tracing::warn!(
                message_id = event.id,
                conversation_id = event.conversation_id,
                error = %err,
                "Rejected invalid message event"
            );
            return Err(err);
        }

        let snapshot: Vec<Arc<Subscriber>> = self.registry.lock().clone();
        let mut delivery = Delivery::default();

        for subscriber in &snapshot {
            // Unsubscribed by an earlier handler during this dispatch
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }

            delivery.invoked += 1;
            match (subscriber.handler)(event) {
                Ok(Dispatch::Continue) => {}
                Ok(Dispatch::Stop) => {
                    delivery.stopped_by = Some(subscriber.id);
                    break;
                }
                Err(err) => {
                    delivery.failed += 1;
                    tracing::error!(
                        subscription_id = subscriber.id,
                        message_id = event.id,
                        error = ?err,
                        "Message handler failed, continuing dispatch"
                    );
                }
            }
        }

        tracing::debug!(
            message_id = event.id,
            conversation_id = event.conversation_id,
            invoked = delivery.invoked,
            failed = delivery.failed,
            stopped_by = ?delivery.stopped_by,
            "Published message event"
        );

        Ok(delivery)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Capability to remove exactly one handler from the bus
///
/// Dropping it does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };

        let mut subscribers = registry.lock();
        let Some(position) = subscribers.iter().position(|s| s.id == self.id) else {
            return false;
        };

        let removed = subscribers.remove(position);
        removed.active.store(false, Ordering::Release);

        tracing::debug!(
            subscription_id = self.id,
            subscribers = subscribers.len(),
            "Handler unsubscribed from message bus"
        );

        true
    }
}
