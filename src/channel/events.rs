//! Inbound event summaries.
//!
//! The backend aggregates viewer events server-side and delivers periodic
//! summaries: for each distinct key, a set of reduced values.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, EventDelivery};
use crate::dispatch::{ChannelBinding, PendingEntry, Pusher, Subscription};
use crate::error::{BackendError, HandlerError};
use crate::event::ChannelKind;
use crate::id::{SubscriptionId, UserToken};

/// How a value was reduced over the summarized events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// Number of events.
    Count,
    /// Sum of the event values.
    Sum,
    /// Smallest event value.
    Min,
    /// Largest event value.
    Max,
}

/// One reduced value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventValue {
    /// Reduction applied.
    pub reduction: Reduction,
    /// Result of the reduction.
    pub value: f64,
}

/// Reduced values for one key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventResult {
    /// Key fields the events were grouped by.
    pub key: Vec<String>,
    /// Reduced values for this key.
    pub values: Vec<EventValue>,
}

impl EventResult {
    /// Creates a result for `key` with no values.
    pub fn new<I, S>(key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into_iter().map(Into::into).collect(),
            values: Vec::new(),
        }
    }

    /// Adds a reduced value.
    #[must_use]
    pub fn with_value(mut self, reduction: Reduction, value: f64) -> Self {
        self.values.push(EventValue { reduction, value });
        self
    }

    /// Returns the value for a reduction, if present.
    #[must_use]
    pub fn value(&self, reduction: Reduction) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.reduction == reduction)
            .map(|v| v.value)
    }
}

/// A summary delivered by the backend for one event id.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummary {
    /// Event id; matches the subscription id.
    pub id: SubscriptionId,
    /// One result per distinct key.
    pub results: Vec<EventResult>,
}

impl EventSummary {
    /// Creates a summary.
    pub fn new(id: impl Into<SubscriptionId>, results: Vec<EventResult>) -> Self {
        Self {
            id: id.into(),
            results,
        }
    }
}

/// What an event handler receives.
#[derive(Debug, Clone, Copy)]
pub struct EventInvocation<'a> {
    /// Subscription the summary was delivered for.
    pub id: &'a SubscriptionId,
    /// The delivered summary.
    pub summary: &'a EventSummary,
    /// Token the subscription was registered with.
    pub token: UserToken,
}

/// Application callback for one event id. Runs on the tick thread.
pub type EventHandler = Arc<dyn Fn(&EventInvocation<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Parameters of one event subscription.
#[derive(Clone)]
pub struct EventParams {
    /// Event id to subscribe to.
    pub id: SubscriptionId,
    /// Handler invoked for each summary.
    pub handler: EventHandler,
    /// Token registered with the backend.
    pub token: UserToken,
}

impl EventParams {
    /// Creates parameters from an id and a closure.
    pub fn new<F>(id: impl Into<SubscriptionId>, handler: F) -> Self
    where
        F: Fn(&EventInvocation<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
            token: UserToken::default(),
        }
    }

    /// Sets the token registered with the backend.
    #[must_use]
    pub fn with_token(mut self, token: UserToken) -> Self {
        self.token = token;
        self
    }
}

impl std::fmt::Debug for EventParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventParams")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Binds a [`Dispatcher`](crate::Dispatcher) to the backend's event API.
pub struct EventBinding {
    backend: Arc<dyn Backend>,
}

impl EventBinding {
    /// Creates a binding over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl ChannelBinding for EventBinding {
    type Payload = EventSummary;
    type Params = EventParams;
    const KIND: ChannelKind = ChannelKind::Events;

    fn subscription_id(params: &EventParams) -> SubscriptionId {
        params.id.clone()
    }

    fn subscription_token(params: &EventParams) -> UserToken {
        params.token
    }

    fn subscribe(
        &mut self,
        id: &SubscriptionId,
        token: UserToken,
        pusher: &Pusher<EventSummary>,
    ) -> Result<(), BackendError> {
        let pusher = pusher.clone();
        let delivery: EventDelivery = Arc::new(move |summary: EventSummary, token: UserToken| {
            pusher.push(summary.id.clone(), summary, token);
        });
        self.backend.subscribe_event(id, delivery, token)
    }

    fn unsubscribe(&mut self, id: &SubscriptionId, token: UserToken) -> Result<(), BackendError> {
        self.backend.unsubscribe_event(id, token)
    }

    fn dispatch(
        &mut self,
        subscription: Option<&Subscription<EventParams>>,
        entry: PendingEntry<EventSummary>,
    ) -> Result<(), HandlerError> {
        match subscription {
            Some(sub) if sub.is_active() => (sub.params().handler)(&EventInvocation {
                id: &entry.id,
                summary: &entry.payload,
                token: entry.token,
            }),
            _ => {
                debug!(id = %entry.id, "no active event subscription, dropping summary");
                Ok(())
            }
        }
    }
}
