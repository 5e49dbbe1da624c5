//! Runtime events for monitoring bridge health.
//!
//! Events are non-fatal notifications. The tick keeps running after an event
//! is emitted; they are for logging and metrics, not error handling.

use std::sync::Arc;

use crate::manager::LifecycleState;

/// Which adapter an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Inbound commands.
    Commands,
    /// Inbound event summaries.
    Events,
    /// Outbound game data and annotations.
    Data,
    /// Outbound video frames.
    Video,
    /// Outbound audio.
    Audio,
}

impl ChannelKind {
    /// Lowercase name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Events => "events",
            Self::Data => "data",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime events emitted while the bridge is running.
///
/// # Example
///
/// ```
/// use stream_bridge::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::DispatchFault { channel, id, cause } => {
///             eprintln!("{channel} handler '{id}' failed: {cause}");
///         }
///         BridgeEvent::SubmitFailed { stream_id, reason } => {
///             eprintln!("submit on '{stream_id}' failed: {reason}");
///         }
///         BridgeEvent::StateChanged { from, to } => {
///             eprintln!("lifecycle {from:?} -> {to:?}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A subscription was refused by the backend. Siblings were unaffected.
    SubscribeFailed {
        /// Adapter that attempted the subscription.
        channel: ChannelKind,
        /// Subscription id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// The backend refused to remove a subscription.
    UnsubscribeFailed {
        /// Adapter that attempted the removal.
        channel: ChannelKind,
        /// Subscription id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// A handler failed or panicked while dispatching one queued entry.
    DispatchFault {
        /// Adapter that dispatched the entry.
        channel: ChannelKind,
        /// Id carried by the entry.
        id: String,
        /// What went wrong.
        cause: String,
    },

    /// A periodic submission was skipped for this tick.
    SubmitFailed {
        /// Stream the submission targeted.
        stream_id: String,
        /// Why it failed.
        reason: String,
    },

    /// Polling the backend timed out. The tick still ran.
    BackendTimeout,

    /// Polling the backend failed for a reason other than a timeout.
    PollFailed {
        /// Status reported by the backend.
        reason: String,
    },

    /// The session manager moved to a new lifecycle state.
    StateChanged {
        /// Previous state.
        from: LifecycleState,
        /// New state.
        to: LifecycleState,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`SessionManagerBuilder::on_event()`].
///
/// [`SessionManagerBuilder::on_event()`]: crate::SessionManagerBuilder::on_event
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_bridge::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(BridgeEvent::BackendTimeout);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Optional event sink shared by every adapter of one session.
#[derive(Clone, Default)]
pub(crate) struct EventEmitter(Option<EventCallback>);

impl EventEmitter {
    pub(crate) fn new(callback: Option<EventCallback>) -> Self {
        Self(callback)
    }

    pub(crate) fn emit(&self, event: BridgeEvent) {
        if let Some(callback) = &self.0 {
            callback(event);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventEmitter")
            .field(&self.0.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_bridge_event_debug() {
        let event = BridgeEvent::SubmitFailed {
            stream_id: "telemetry".to_string(),
            reason: "closed".to_string(),
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("SubmitFailed"));
        assert!(debug.contains("telemetry"));
    }

    #[test]
    fn test_channel_kind_display() {
        assert_eq!(ChannelKind::Commands.to_string(), "commands");
        assert_eq!(ChannelKind::Audio.to_string(), "audio");
    }

    #[test]
    fn test_emitter_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let emitter = EventEmitter::new(Some(event_callback(move |event| {
            sink.lock().push(event);
        })));

        emitter.emit(BridgeEvent::BackendTimeout);
        emitter.emit(BridgeEvent::PollFailed {
            reason: "gone".to_string(),
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], BridgeEvent::BackendTimeout));
    }

    #[test]
    fn test_emitter_without_callback_is_silent() {
        EventEmitter::default().emit(BridgeEvent::BackendTimeout);
    }
}
