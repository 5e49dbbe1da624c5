//! Error types for stream-bridge.
//!
//! Errors are split into three categories:
//! - **Bridge errors** ([`BridgeError`]): returned by lifecycle and
//!   configuration calls. Per-id failures are aggregated, never abort siblings.
//! - **Backend errors** ([`BackendError`]): status reported by the external
//!   streaming backend. `Timeout` is recoverable and retried on the next tick.
//! - **Handler errors** ([`HandlerError`]): raised by application callbacks
//!   and isolated per dispatched entry or per submission.

use crate::manager::LifecycleState;

/// Errors returned by the bridge's lifecycle, subscription and submission calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// A rate was not finite and positive, or its period was out of range.
    #[error("invalid rate {rate}: must be positive with a period of at most one day")]
    InvalidRate {
        /// The rejected rate.
        rate: f64,
    },

    /// The backend refused a subscription.
    #[error("failed to subscribe '{id}': {reason}")]
    SubscribeFailed {
        /// Subscription id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// The backend refused to remove a subscription.
    #[error("failed to unsubscribe '{id}': {reason}")]
    UnsubscribeFailed {
        /// Subscription id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// An application handler failed while a queued entry was dispatched.
    #[error("handler for '{id}' failed: {cause}")]
    DispatchFault {
        /// Id of the faulting entry.
        id: String,
        /// What the handler reported.
        cause: String,
    },

    /// The backend did not answer within the configured timeout.
    #[error("backend timed out")]
    BackendTimeout,

    /// The backend reported an unrecoverable failure.
    #[error("backend failure: {reason}")]
    BackendFatal {
        /// Status reported by the backend.
        reason: String,
    },

    /// A lifecycle call was made in a state that does not allow it.
    #[error("cannot {operation} while {state:?}")]
    LifecycleMisuse {
        /// State the manager was in.
        state: LifecycleState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// One or more components failed during an aggregate operation.
    #[error("one or more components failed to {operation}")]
    PartialFailure {
        /// The aggregate operation.
        operation: &'static str,
    },

    /// An id was configured more than once.
    #[error("duplicate id: {id}")]
    DuplicateId {
        /// The duplicated id.
        id: String,
    },

    /// A stream id is not configured or its stream was never created.
    #[error("unknown stream: {id}")]
    UnknownStream {
        /// The unknown stream id.
        id: String,
    },

    /// The backend refused to create, configure, or destroy a stream.
    #[error("stream '{id}' failed: {reason}")]
    StreamFailed {
        /// Stream id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// A component was used before initialization.
    #[error("{component} is not initialized")]
    NotInitialized {
        /// Name of the component.
        component: &'static str,
    },

    /// The backend rejected a submission.
    #[error("submission on '{id}' failed: {reason}")]
    SubmitFailed {
        /// Stream or notification id.
        id: String,
        /// Status reported by the backend.
        reason: String,
    },

    /// A settings value violated its schema.
    #[error("invalid setting '{section}.{field}': {reason}")]
    InvalidSetting {
        /// Settings section.
        section: String,
        /// Field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No backend was supplied to the builder.
    #[error("no backend configured - call backend() before build()")]
    NoBackendConfigured,
}

impl BridgeError {
    /// Maps a backend status from a connection-level call.
    ///
    /// `Timeout` stays recoverable; everything else is fatal.
    pub(crate) fn from_backend(err: &BackendError) -> Self {
        match err {
            BackendError::Timeout => Self::BackendTimeout,
            other => Self::BackendFatal {
                reason: other.to_string(),
            },
        }
    }

    /// Returns `true` for errors the caller may simply retry next tick.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendTimeout | Self::DispatchFault { .. })
    }
}

/// Status reported by the external backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The call did not complete within its timeout.
    #[error("operation timed out")]
    Timeout,

    /// The backend refused this particular request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backend is unusable (e.g. the connection permanently failed).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl BackendError {
    /// Creates a rejection with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Creates a fatal error with the given reason.
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Returns `true` if this is a recoverable timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Errors raised by application callbacks (command/event handlers, stream
/// submitters, frame sources).
///
/// Handler errors never stop the tick: they are logged with the offending id
/// and surfaced as [`BridgeEvent`](crate::BridgeEvent)s.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The receiving channel had no free capacity.
    #[error("channel full")]
    ChannelFull,

    /// The handler panicked; the payload message is kept.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// A backend call made from inside the callback failed.
    #[error("backend rejected submission: {0}")]
    Backend(#[from] BackendError),

    /// Custom error for user-implemented handlers.
    #[error("{0}")]
    Custom(String),
}

impl HandlerError {
    /// Creates a custom handler error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}
