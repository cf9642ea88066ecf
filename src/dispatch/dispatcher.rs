//! Event fan-out to subscriptions.
//!
//! The dispatcher outlives connection epochs. The read loop of the live
//! epoch calls [`EventDispatcher::dispatch`]; queued or spawned deliveries
//! carry their epoch and are dropped if that epoch has ended by the time
//! their turn comes. A callback that already started is left to finish.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::{ConnectionId, SubscriptionId};
use crate::protocol::ServerEvent;

use super::subscription::{AsyncHandler, Delivery, DeliveryMode, EventFilter, HandlerResult};

// ============================================================================
// SubscriberFault
// ============================================================================

/// A subscriber callback returned an error or panicked.
///
/// Published on [`EventDispatcher::faults`]; the subscription stays active.
#[derive(Debug, Clone)]
pub struct SubscriberFault {
    /// Subscription whose callback failed.
    pub subscription: SubscriptionId,
    /// Epoch the event arrived on.
    pub connection: ConnectionId,
    /// Type of the event being delivered.
    pub event_kind: String,
    /// Error or panic message.
    pub message: String,
    /// `true` if the callback panicked.
    pub panicked: bool,
}

impl SubscriberFault {
    /// Converts into an [`Error::Subscriber`].
    #[must_use]
    pub fn to_error(&self) -> Error {
        Error::subscriber(self.subscription, self.message.clone())
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared with worker and per-event tasks.
struct Shared {
    /// Live epoch id, 0 when none.
    epoch: AtomicU64,
    faults: broadcast::Sender<SubscriberFault>,
}

impl Shared {
    #[inline]
    fn is_live(&self, epoch: ConnectionId) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch.as_u64()
    }

    fn report(&self, fault: SubscriberFault) {
        warn!(
            subscription = %fault.subscription,
            connection = %fault.connection,
            event = %fault.event_kind,
            panicked = fault.panicked,
            error = %fault.message,
            "Subscriber callback failed"
        );
        let _ = self.faults.send(fault);
    }
}

/// An event tagged with the epoch it arrived on.
struct Queued {
    epoch: ConnectionId,
    event: ServerEvent,
}

// ============================================================================
// SubscriptionEntry
// ============================================================================

struct SubscriptionEntry {
    id: SubscriptionId,
    filter: EventFilter,
    delivery: Delivery,
    active: Arc<AtomicBool>,
    /// Sequential queue, created on first delivery.
    queue: OnceLock<mpsc::UnboundedSender<Queued>>,
    /// Concurrency cap for `Concurrent` delivery.
    permits: Option<Arc<Semaphore>>,
}

impl SubscriptionEntry {
    #[inline]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// ============================================================================
// EventDispatcher
// ============================================================================

struct DispatcherInner {
    subscriptions: RwLock<Vec<Arc<SubscriptionEntry>>>,
    shared: Arc<Shared>,
}

/// Routes server events to subscriptions.
///
/// Cheap to clone; clones share the subscription set.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    /// Creates a dispatcher whose fault channel holds `fault_capacity` items.
    #[must_use]
    pub fn new(fault_capacity: usize) -> Self {
        let (faults, _) = broadcast::channel(fault_capacity.max(1));

        Self {
            inner: Arc::new(DispatcherInner {
                subscriptions: RwLock::new(Vec::new()),
                shared: Arc::new(Shared {
                    epoch: AtomicU64::new(ConnectionId::NONE.as_u64()),
                    faults,
                }),
            }),
        }
    }

    /// Adds a subscription.
    ///
    /// The subscription sees only events dispatched after this returns.
    pub fn subscribe(&self, filter: EventFilter, delivery: Delivery) -> SubscriptionHandle {
        let id = SubscriptionId::next();
        let mode = delivery.mode();
        let permits = match &delivery {
            Delivery::Concurrent {
                max_in_flight: Some(max),
                ..
            } => Some(Arc::new(Semaphore::new(*max))),
            _ => None,
        };

        let entry = Arc::new(SubscriptionEntry {
            id,
            filter,
            delivery,
            active: Arc::new(AtomicBool::new(true)),
            queue: OnceLock::new(),
            permits,
        });

        self.inner.subscriptions.write().push(entry);
        debug!(subscription = %id, ?mode, "Subscription added");

        SubscriptionHandle {
            id,
            mode,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscription.
    ///
    /// Queued deliveries that have not started are dropped. Returns `false`
    /// if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_subscription(&self.inner, id)
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Subscribes to subscriber faults.
    #[must_use]
    pub fn faults(&self) -> broadcast::Receiver<SubscriberFault> {
        self.inner.shared.faults.subscribe()
    }

    /// Marks `epoch` as the live epoch.
    pub fn begin_epoch(&self, epoch: ConnectionId) {
        self.inner.shared.epoch.store(epoch.as_u64(), Ordering::Release);
        trace!(connection = %epoch, "Epoch live for delivery");
    }

    /// Ends `epoch` if it is still the live one.
    pub fn end_epoch(&self, epoch: ConnectionId) {
        let ended = self
            .inner
            .shared
            .epoch
            .compare_exchange(
                epoch.as_u64(),
                ConnectionId::NONE.as_u64(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if ended {
            trace!(connection = %epoch, "Epoch closed for delivery");
        }
    }

    /// Returns `true` if `epoch` is the live epoch.
    #[inline]
    #[must_use]
    pub fn is_live(&self, epoch: ConnectionId) -> bool {
        self.inner.shared.is_live(epoch)
    }

    /// Delivers `event`, which arrived on `epoch`, to every matching
    /// subscription.
    ///
    /// Synchronous subscriptions run before this returns.
    pub fn dispatch(&self, epoch: ConnectionId, event: ServerEvent) {
        let shared = &self.inner.shared;
        if !shared.is_live(epoch) {
            trace!(connection = %epoch, event = %event.kind(), "Dropping event from ended epoch");
            return;
        }

        let snapshot: Vec<Arc<SubscriptionEntry>> = self.inner.subscriptions.read().clone();

        for entry in snapshot {
            if !entry.is_active() || !entry.filter.matches(&event) {
                continue;
            }

            match &entry.delivery {
                Delivery::Sequential(handler) => {
                    let queue = entry
                        .queue
                        .get_or_init(|| spawn_worker(&entry, handler.clone(), Arc::clone(shared)));

                    let queued = Queued {
                        epoch,
                        event: event.clone(),
                    };
                    if queue.send(queued).is_err() {
                        trace!(subscription = %entry.id, "Sequential worker gone");
                    }
                }

                Delivery::Concurrent { handler, .. } => {
                    let handler = handler.clone();
                    let shared = Arc::clone(shared);
                    let permits = entry.permits.clone();
                    let active = Arc::clone(&entry.active);
                    let subscription = entry.id;
                    let event = event.clone();

                    tokio::spawn(async move {
                        let _permit = match permits {
                            Some(permits) => match permits.acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(_) => return,
                            },
                            None => None,
                        };

                        if !active.load(Ordering::Acquire) || !shared.is_live(epoch) {
                            return;
                        }

                        let kind = event.kind().to_string();
                        if let Err((message, panicked)) = invoke(&handler, event).await {
                            shared.report(SubscriberFault {
                                subscription,
                                connection: epoch,
                                event_kind: kind,
                                message,
                                panicked,
                            });
                        }
                    });
                }

                Delivery::Synchronous(handler) => {
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                    let failure = match outcome {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some((e.to_string(), false)),
                        Err(panic) => Some((panic_message(panic.as_ref()), true)),
                    };

                    if let Some((message, panicked)) = failure {
                        shared.report(SubscriberFault {
                            subscription: entry.id,
                            connection: epoch,
                            event_kind: event.kind().to_string(),
                            message,
                            panicked,
                        });
                    }
                }
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NOTIFICATION_CAPACITY)
    }
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Handle to a registered subscription.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    mode: DeliveryMode,
    dispatcher: Weak<DispatcherInner>,
}

impl SubscriptionHandle {
    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the delivery mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Removes the subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|inner| remove_subscription(&inner, self.id))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn remove_subscription(inner: &DispatcherInner, id: SubscriptionId) -> bool {
    let removed = {
        let mut subscriptions = inner.subscriptions.write();
        let position = subscriptions.iter().position(|entry| entry.id == id);
        position.map(|index| subscriptions.remove(index))
    };

    match removed {
        Some(entry) => {
            entry.active.store(false, Ordering::Release);
            debug!(subscription = %id, "Subscription removed");
            true
        }
        None => false,
    }
}

/// Starts the worker draining a sequential subscription's queue.
///
/// The worker ends when the entry, and with it the sender, is dropped.
fn spawn_worker(
    entry: &SubscriptionEntry,
    handler: AsyncHandler,
    shared: Arc<Shared>,
) -> mpsc::UnboundedSender<Queued> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Queued>();
    let active = Arc::clone(&entry.active);
    let subscription = entry.id;

    tokio::spawn(async move {
        while let Some(Queued { epoch, event }) = rx.recv().await {
            if !active.load(Ordering::Acquire) {
                break;
            }
            if !shared.is_live(epoch) {
                trace!(%subscription, connection = %epoch, "Skipping event from ended epoch");
                continue;
            }

            let kind = event.kind().to_string();
            if let Err((message, panicked)) = invoke(&handler, event).await {
                shared.report(SubscriberFault {
                    subscription,
                    connection: epoch,
                    event_kind: kind,
                    message,
                    panicked,
                });
            }
        }
        trace!(%subscription, "Sequential worker stopped");
    });

    tx
}

/// Runs an async callback, turning errors and panics into `(message, panicked)`.
async fn invoke(handler: &AsyncHandler, event: ServerEvent) -> Result<(), (String, bool)> {
    let outcome: std::thread::Result<HandlerResult> =
        AssertUnwindSafe(async { handler(event).await }).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err((e.to_string(), false)),
        Err(panic) => Err((panic_message(panic.as_ref()), true)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
