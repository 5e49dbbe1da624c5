//! Generic subscription dispatcher.
//!
//! A [`Dispatcher`] owns the subscriptions of one inbound channel and a
//! thread-safe push queue. The backend's delivery callbacks (on arbitrary
//! threads) push [`PendingEntry`]s through a [`Pusher`]; the tick thread
//! calls [`Dispatcher::drain`] once per tick to hand them to the
//! application in FIFO order.
//!
//! What a subscription means for a given channel (which backend call, which
//! handler) is supplied by a [`ChannelBinding`].

mod queue;
mod registry;

pub use queue::{PendingEntry, Pusher};
pub use registry::Subscription;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::{BackendError, BridgeError, HandlerError};
use crate::event::{BridgeEvent, ChannelKind, EventEmitter};
use crate::id::{SubscriptionId, UserToken};
use queue::PushQueue;
use registry::Registry;

/// Channel-specific behavior plugged into a [`Dispatcher`].
pub trait ChannelBinding {
    /// Payload carried by each delivery.
    type Payload: Send + 'static;

    /// Application-supplied parameters for one subscription.
    type Params;

    /// Channel this binding serves, for logs and events.
    const KIND: ChannelKind;

    /// Derives the subscription id from its parameters.
    fn subscription_id(params: &Self::Params) -> SubscriptionId;

    /// Token to register the subscription with.
    fn subscription_token(params: &Self::Params) -> UserToken {
        let _ = params;
        UserToken::default()
    }

    /// Registers `id` with the backend, arranging for deliveries to go
    /// through `pusher`.
    fn subscribe(
        &mut self,
        id: &SubscriptionId,
        token: UserToken,
        pusher: &Pusher<Self::Payload>,
    ) -> Result<(), BackendError>;

    /// Removes `id` from the backend.
    fn unsubscribe(&mut self, id: &SubscriptionId, token: UserToken) -> Result<(), BackendError>;

    /// Hands one queued delivery to the application.
    ///
    /// `subscription` is `None` when the id was unsubscribed after the
    /// delivery was queued.
    fn dispatch(
        &mut self,
        subscription: Option<&Subscription<Self::Params>>,
        entry: PendingEntry<Self::Payload>,
    ) -> Result<(), HandlerError>;
}

/// Outcome of [`Dispatcher::initialize`].
#[derive(Debug, Default)]
pub struct InitReport {
    /// Ids the backend accepted.
    pub subscribed: Vec<SubscriptionId>,
    /// One error per refused id.
    pub failed: Vec<BridgeError>,
}

impl InitReport {
    /// Returns `true` if every subscription succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of one [`Dispatcher::drain`].
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Entries whose handler returned successfully.
    pub dispatched: usize,
    /// One `DispatchFault` per entry whose handler failed or panicked.
    pub faults: Vec<BridgeError>,
}

/// Subscription registry plus push queue for one inbound channel.
///
/// # Example
///
/// ```
/// use stream_bridge::{
///     CommandBinding, CommandParams, CommandResult, Dispatcher, MockBackend,
/// };
/// use std::sync::Arc;
///
/// let backend = Arc::new(MockBackend::new());
/// let mut dispatcher = Dispatcher::new(CommandBinding::new(backend.clone()));
///
/// let report = dispatcher.initialize(vec![CommandParams::new("jump", |cmd| {
///     println!("jump: {}", cmd.result.value);
///     Ok(())
/// })]);
/// assert!(report.is_complete());
///
/// backend.deliver_command(CommandResult::new("jump", "high"));
/// assert_eq!(dispatcher.drain().dispatched, 1);
/// ```
pub struct Dispatcher<B: ChannelBinding> {
    binding: B,
    registry: Registry<B::Params>,
    queue: Arc<PushQueue<B::Payload>>,
    initialized: bool,
    emitter: EventEmitter,
    verbose: bool,
}

impl<B: ChannelBinding> Dispatcher<B> {
    /// Creates an uninitialized dispatcher.
    pub fn new(binding: B) -> Self {
        Self {
            binding,
            registry: Registry::new(),
            queue: Arc::new(PushQueue::new()),
            initialized: false,
            emitter: EventEmitter::default(),
            verbose: false,
        }
    }

    pub(crate) fn set_reporting(&mut self, emitter: EventEmitter, verbose: bool) {
        self.emitter = emitter;
        self.verbose = verbose;
    }

    /// Subscribes every entry of `params`.
    ///
    /// A refused id is logged, kept as an inactive subscription and reported
    /// in [`InitReport::failed`]; the others are unaffected. Calling this
    /// again before [`terminate`](Dispatcher::terminate) does nothing.
    pub fn initialize(&mut self, params: Vec<B::Params>) -> InitReport {
        let mut report = InitReport::default();
        if self.initialized {
            return report;
        }
        self.initialized = true;

        for p in params {
            match self.subscribe(p) {
                Ok(id) => report.subscribed.push(id),
                Err(err) => report.failed.push(err),
            }
        }
        report
    }

    /// Subscribes one id.
    ///
    /// Subscribing an id that is already active is a no-op returning its id.
    /// An id previously refused by the backend is retried.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotInitialized`] before [`initialize`](Dispatcher::initialize),
    /// [`BridgeError::SubscribeFailed`] if the backend refuses.
    pub fn subscribe(&mut self, params: B::Params) -> Result<SubscriptionId, BridgeError> {
        if !self.initialized {
            return Err(BridgeError::NotInitialized {
                component: B::KIND.as_str(),
            });
        }

        let id = B::subscription_id(&params);
        if self.registry.get(&id).is_some_and(Subscription::is_active) {
            return Ok(id);
        }

        let token = B::subscription_token(&params);
        let pusher = self.pusher();
        let result = self.binding.subscribe(&id, token, &pusher);

        let mut sub = Subscription::new(id.clone(), params, token);
        sub.set_active(result.is_ok());
        self.registry.insert(sub);

        match result {
            Ok(()) => {
                verbose!(self.verbose, channel = %B::KIND, id = %id, "subscribed");
                Ok(id)
            }
            Err(err) => {
                let reason = err.to_string();
                error!(channel = %B::KIND, id = %id, %reason, "subscribe failed");
                self.emitter.emit(BridgeEvent::SubscribeFailed {
                    channel: B::KIND,
                    id: id.to_string(),
                    reason: reason.clone(),
                });
                Err(BridgeError::SubscribeFailed {
                    id: id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Unsubscribes one id. Unknown ids are a no-op.
    ///
    /// The subscription is removed even if the backend reports a failure.
    /// Entries already queued for the id are still dispatched, as no-ops.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnsubscribeFailed`] if the backend refuses.
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), BridgeError> {
        match self.registry.remove(id) {
            Some(sub) if sub.is_active() => self.unsubscribe_from_backend(&sub),
            _ => Ok(()),
        }
    }

    fn unsubscribe_from_backend(
        &mut self,
        sub: &Subscription<B::Params>,
    ) -> Result<(), BridgeError> {
        let id = sub.id();
        match self.binding.unsubscribe(id, sub.token()) {
            Ok(()) => {
                verbose!(self.verbose, channel = %B::KIND, id = %id, "unsubscribed");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                error!(channel = %B::KIND, id = %id, %reason, "unsubscribe failed");
                self.emitter.emit(BridgeEvent::UnsubscribeFailed {
                    channel: B::KIND,
                    id: id.to_string(),
                    reason: reason.clone(),
                });
                Err(BridgeError::UnsubscribeFailed {
                    id: id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Unsubscribes everything and discards undispatched entries.
    ///
    /// Every active subscription is removed even when some fail.
    ///
    /// # Errors
    ///
    /// The first [`BridgeError::UnsubscribeFailed`] encountered.
    pub fn terminate(&mut self) -> Result<(), BridgeError> {
        if !self.initialized {
            return Ok(());
        }
        verbose!(
            self.verbose,
            channel = %B::KIND,
            subscriptions = self.registry.len(),
            "terminating"
        );

        let mut first_error = None;
        for id in self.registry.ids() {
            if let Some(sub) = self.registry.remove(&id) {
                if sub.is_active() {
                    if let Err(err) = self.unsubscribe_from_backend(&sub) {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        self.registry.clear();

        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!(channel = %B::KIND, dropped, "discarding undispatched entries");
        }
        self.initialized = false;

        first_error.map_or(Ok(()), Err)
    }

    /// Dispatches everything queued so far, oldest first.
    ///
    /// The queue is swapped out in one step, so entries pushed while
    /// handlers run wait for the next drain. A failing or panicking handler
    /// only faults its own entry. Before initialization nothing is
    /// dispatched and entries stay queued.
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        if !self.initialized {
            return report;
        }

        for entry in self.queue.take() {
            let id = entry.id.clone();
            let subscription = self.registry.get(&id);
            let binding = &mut self.binding;
            let outcome = catch_unwind(AssertUnwindSafe(|| binding.dispatch(subscription, entry)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))));

            match outcome {
                Ok(()) => report.dispatched += 1,
                Err(err) => {
                    let cause = err.to_string();
                    error!(channel = %B::KIND, id = %id, %cause, "handler failed");
                    self.emitter.emit(BridgeEvent::DispatchFault {
                        channel: B::KIND,
                        id: id.to_string(),
                        cause: cause.clone(),
                    });
                    report.faults.push(BridgeError::DispatchFault {
                        id: id.to_string(),
                        cause,
                    });
                }
            }
        }
        report
    }

    /// Returns a handle for queueing deliveries from any thread.
    pub fn pusher(&self) -> Pusher<B::Payload> {
        Pusher::new(Arc::clone(&self.queue))
    }

    /// Returns `true` between `initialize` and `terminate`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` if `id` is registered and accepted by the backend.
    pub fn is_subscribed(&self, id: &SubscriptionId) -> bool {
        self.registry.get(id).is_some_and(Subscription::is_active)
    }

    /// Looks up a registered subscription, active or not.
    pub fn subscription(&self, id: &SubscriptionId) -> Option<&Subscription<B::Params>> {
        self.registry.get(id)
    }

    /// Registered ids in registration order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.registry.ids()
    }

    /// Number of entries waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// The channel binding.
    pub fn binding(&self) -> &B {
        &self.binding
    }
}

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
