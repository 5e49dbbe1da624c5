//! Inbound commands.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, CommandDelivery};
use crate::dispatch::{ChannelBinding, PendingEntry, Pusher, Subscription};
use crate::error::{BackendError, HandlerError};
use crate::event::ChannelKind;
use crate::id::{SubscriptionId, UserToken};

/// A command delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Command id; matches the subscription id.
    pub id: SubscriptionId,
    /// Opaque command value.
    pub value: String,
}

impl CommandResult {
    /// Creates a command result.
    pub fn new(id: impl Into<SubscriptionId>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// What a command handler receives.
#[derive(Debug, Clone, Copy)]
pub struct CommandInvocation<'a> {
    /// Subscription the command was delivered for.
    pub id: &'a SubscriptionId,
    /// The delivered command.
    pub result: &'a CommandResult,
    /// Token the subscription was registered with.
    pub token: UserToken,
}

/// Application callback for one command id. Runs on the tick thread.
pub type CommandHandler =
    Arc<dyn Fn(&CommandInvocation<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Parameters of one command subscription.
#[derive(Clone)]
pub struct CommandParams {
    /// Command id to subscribe to.
    pub id: SubscriptionId,
    /// Handler invoked for each delivery.
    pub handler: CommandHandler,
    /// Token registered with the backend.
    pub token: UserToken,
}

impl CommandParams {
    /// Creates parameters from an id and a closure.
    pub fn new<F>(id: impl Into<SubscriptionId>, handler: F) -> Self
    where
        F: Fn(&CommandInvocation<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
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

impl std::fmt::Debug for CommandParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandParams")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Binds a [`Dispatcher`](crate::Dispatcher) to the backend's command API.
pub struct CommandBinding {
    backend: Arc<dyn Backend>,
}

impl CommandBinding {
    /// Creates a binding over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl ChannelBinding for CommandBinding {
    type Payload = CommandResult;
    type Params = CommandParams;
    const KIND: ChannelKind = ChannelKind::Commands;

    fn subscription_id(params: &CommandParams) -> SubscriptionId {
        params.id.clone()
    }

    fn subscription_token(params: &CommandParams) -> UserToken {
        params.token
    }

    fn subscribe(
        &mut self,
        id: &SubscriptionId,
        token: UserToken,
        pusher: &Pusher<CommandResult>,
    ) -> Result<(), BackendError> {
        let pusher = pusher.clone();
        let delivery: CommandDelivery = Arc::new(move |result: CommandResult, token: UserToken| {
            pusher.push(result.id.clone(), result, token);
        });
        self.backend.subscribe_command(id, delivery, token)
    }

    fn unsubscribe(&mut self, id: &SubscriptionId, token: UserToken) -> Result<(), BackendError> {
        self.backend.unsubscribe_command(id, token)
    }

    fn dispatch(
        &mut self,
        subscription: Option<&Subscription<CommandParams>>,
        entry: PendingEntry<CommandResult>,
    ) -> Result<(), HandlerError> {
        match subscription {
            Some(sub) if sub.is_active() => (sub.params().handler)(&CommandInvocation {
                id: &entry.id,
                result: &entry.payload,
                token: entry.token,
            }),
            _ => {
                debug!(id = %entry.id, "no active command subscription, dropping delivery");
                Ok(())
            }
        }
    }
}
