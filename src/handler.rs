//! Handlers that forward deliveries into tokio mpsc channels.
//!
//! Useful when the consumer lives in an async task rather than on the tick
//! thread. Forwarding never blocks the tick: a full channel is reported as
//! [`HandlerError::ChannelFull`] and the delivery is dropped.
//!
//! ```
//! use stream_bridge::{command_sender, CommandParams, ReceivedCommand};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel::<ReceivedCommand>(32);
//! let params = CommandParams::new("pause", command_sender(tx));
//! // Add `params` to the builder, then in an async task:
//! // while let Some(cmd) = rx.recv().await { ... }
//! # let _ = (&params, &mut rx);
//! ```

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::channel::{CommandInvocation, EventInvocation, EventSummary};
use crate::error::HandlerError;
use crate::id::{SubscriptionId, UserToken};

/// A command as forwarded by [`command_sender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Command value.
    pub value: String,
    /// Subscription token.
    pub token: UserToken,
}

/// An event summary as forwarded by [`event_sender`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    /// The delivered summary.
    pub summary: EventSummary,
    /// Subscription token.
    pub token: UserToken,
}

fn forward<T>(tx: &Sender<T>, item: T) -> Result<(), HandlerError> {
    tx.try_send(item).map_err(|err| match err {
        TrySendError::Full(_) => HandlerError::ChannelFull,
        TrySendError::Closed(_) => HandlerError::ChannelClosed,
    })
}

/// Command handler that forwards each delivery into `tx`.
pub fn command_sender(
    tx: Sender<ReceivedCommand>,
) -> impl Fn(&CommandInvocation<'_>) -> Result<(), HandlerError> + Send + Sync + 'static {
    move |cmd: &CommandInvocation<'_>| {
        forward(
            &tx,
            ReceivedCommand {
                id: cmd.id.clone(),
                value: cmd.result.value.clone(),
                token: cmd.token,
            },
        )
    }
}

/// Event handler that forwards each delivery into `tx`.
pub fn event_sender(
    tx: Sender<ReceivedEvent>,
) -> impl Fn(&EventInvocation<'_>) -> Result<(), HandlerError> + Send + Sync + 'static {
    move |event: &EventInvocation<'_>| {
        forward(
            &tx,
            ReceivedEvent {
                summary: event.summary.clone(),
                token: event.token,
            },
        )
    }
}
