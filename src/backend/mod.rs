//! The external streaming backend.
//!
//! The bridge never talks to a transport directly. Everything it needs from
//! the streaming service goes through the [`Backend`] trait, which a host
//! implements over its native client library. [`MockBackend`] is a recording
//! implementation for tests and demos.

mod mock;

pub use mock::{MockBackend, MockCall, Submission};

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{CommandResult, EventSummary};
use crate::error::BackendError;
use crate::format::AudioSpec;
use crate::id::{StreamId, SubscriptionId, UserToken};

/// Called by the backend, on any thread, for each command delivery.
pub type CommandDelivery = Arc<dyn Fn(CommandResult, UserToken) + Send + Sync>;

/// Called by the backend, on any thread, for each event-summary delivery.
pub type EventDelivery = Arc<dyn Fn(EventSummary, UserToken) + Send + Sync>;

/// Operations the bridge needs from the streaming backend.
///
/// All methods take `&self`: the backend is shared between the session
/// manager and every adapter behind an `Arc`. Delivery callbacks registered
/// through the subscribe methods may be invoked from any thread, including
/// from inside [`poll_for_deliveries`](Backend::poll_for_deliveries).
///
/// Timestamps passed to submit methods are the time since the session was
/// initialized.
pub trait Backend: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "backend"
    }

    /// Opens the connection. Called once per manager initialization.
    fn connect(&self) -> Result<(), BackendError>;

    /// Closes the connection.
    fn disconnect(&self) -> Result<(), BackendError>;

    /// Lets the backend run pending deliveries, waiting at most `timeout`.
    ///
    /// Returns [`BackendError::Timeout`] when nothing arrived in time.
    fn poll_for_deliveries(&self, timeout: Duration) -> Result<(), BackendError>;

    /// Registers a command subscription.
    fn subscribe_command(
        &self,
        id: &SubscriptionId,
        delivery: CommandDelivery,
        token: UserToken,
    ) -> Result<(), BackendError>;

    /// Removes a command subscription.
    fn unsubscribe_command(&self, id: &SubscriptionId, token: UserToken)
        -> Result<(), BackendError>;

    /// Registers an event-summary subscription.
    fn subscribe_event(
        &self,
        id: &SubscriptionId,
        delivery: EventDelivery,
        token: UserToken,
    ) -> Result<(), BackendError>;

    /// Removes an event-summary subscription.
    fn unsubscribe_event(&self, id: &SubscriptionId, token: UserToken)
        -> Result<(), BackendError>;

    /// Creates an outbound stream.
    fn create_stream(&self, id: &StreamId) -> Result<(), BackendError>;

    /// Destroys an outbound stream.
    fn destroy_stream(&self, id: &StreamId) -> Result<(), BackendError>;

    /// Tells the backend the stream's target rate.
    fn set_stream_rate(&self, id: &StreamId, rate: f64) -> Result<(), BackendError>;

    /// Submits one game-data payload.
    fn submit_game_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Submits one annotation payload.
    fn submit_annotation(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Sends an untimed notification.
    fn submit_notification(&self, id: &str, data: &[u8]) -> Result<(), BackendError>;

    /// Submits one encoded video frame.
    fn submit_video_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Submits a block of encoded, interleaved audio.
    fn submit_audio_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        spec: AudioSpec,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Starts or stops capture performed by the backend itself.
    fn set_audio_capture(&self, id: &StreamId, enabled: bool) -> Result<(), BackendError> {
        let _ = (id, enabled);
        Ok(())
    }
}
