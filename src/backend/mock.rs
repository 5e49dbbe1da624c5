//! Recording backend for tests and demos.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Backend, CommandDelivery, EventDelivery};
use crate::channel::{CommandResult, EventSummary};
use crate::error::BackendError;
use crate::format::AudioSpec;
use crate::id::{StreamId, SubscriptionId, UserToken};

/// One recorded call on a [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `connect`
    Connect,
    /// `disconnect`
    Disconnect,
    /// `poll_for_deliveries` with its timeout.
    Poll(Duration),
    /// `subscribe_command`
    SubscribeCommand(String),
    /// `unsubscribe_command`
    UnsubscribeCommand(String),
    /// `subscribe_event`
    SubscribeEvent(String),
    /// `unsubscribe_event`
    UnsubscribeEvent(String),
    /// `create_stream`
    CreateStream(String),
    /// `destroy_stream`
    DestroyStream(String),
    /// `set_stream_rate`
    SetStreamRate(String, f64),
    /// `submit_game_data`
    SubmitGameData(String),
    /// `submit_annotation`
    SubmitAnnotation(String),
    /// `submit_notification`
    SubmitNotification(String),
    /// `submit_video_data`
    SubmitVideoData(String),
    /// `submit_audio_data`
    SubmitAudioData(String),
    /// `set_audio_capture`
    SetAudioCapture(String, bool),
}

/// A payload accepted by a submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Timestamp passed with the payload (zero for notifications).
    pub timestamp: Duration,
    /// The payload bytes.
    pub data: Vec<u8>,
}

enum Queued {
    Command(CommandResult),
    Event(EventSummary),
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    commands: HashMap<String, (CommandDelivery, UserToken)>,
    events: HashMap<String, (EventDelivery, UserToken)>,
    queued: Vec<Queued>,
    streams: HashSet<String>,
    submissions: HashMap<String, Vec<Submission>>,
    connect_error: Option<BackendError>,
    poll_error: Option<BackendError>,
    failing_subscribes: HashSet<String>,
    failing_unsubscribes: HashSet<String>,
    failing_submits: HashSet<String>,
    failing_captures: HashSet<String>,
}

/// An in-memory [`Backend`] that records every call.
///
/// Deliveries can be made immediately from any thread with
/// [`deliver_command`](MockBackend::deliver_command), or queued with
/// [`enqueue_command`](MockBackend::enqueue_command) and run during the next
/// poll, the way a real client library delivers.
///
/// # Example
///
/// ```
/// use stream_bridge::{Backend, MockBackend, MockCall};
///
/// let backend = MockBackend::new();
/// backend.connect().unwrap();
/// assert_eq!(backend.calls(), vec![MockCall::Connect]);
/// ```
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Creates a backend on which every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `connect` fail with `err`.
    pub fn fail_connect(&self, err: BackendError) {
        self.state.lock().connect_error = Some(err);
    }

    /// Makes every poll return `err`, or succeed again with `None`.
    pub fn set_poll_result(&self, err: Option<BackendError>) {
        self.state.lock().poll_error = err;
    }

    /// Makes subscribing `id` (command or event) fail.
    pub fn fail_subscribe(&self, id: &str) {
        self.state.lock().failing_subscribes.insert(id.to_string());
    }

    /// Makes unsubscribing `id` (command or event) fail.
    pub fn fail_unsubscribe(&self, id: &str) {
        self.state.lock().failing_unsubscribes.insert(id.to_string());
    }

    /// Makes every submission to `id` fail until cleared.
    pub fn fail_submit(&self, id: &str) {
        self.state.lock().failing_submits.insert(id.to_string());
    }

    /// Lets submissions to `id` succeed again.
    pub fn clear_submit_failure(&self, id: &str) {
        self.state.lock().failing_submits.remove(id);
    }

    /// Makes enabling backend audio capture on `id` fail.
    pub fn fail_audio_capture(&self, id: &str) {
        self.state.lock().failing_captures.insert(id.to_string());
    }

    /// Returns every recorded call, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Counts recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Returns the payloads accepted for a stream or notification id.
    pub fn submissions(&self, id: &str) -> Vec<Submission> {
        self.state
            .lock()
            .submissions
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns `true` if the stream has been created and not destroyed.
    pub fn has_stream(&self, id: &str) -> bool {
        self.state.lock().streams.contains(id)
    }

    /// Returns `true` if a command subscription for `id` is registered.
    pub fn has_command_subscription(&self, id: &str) -> bool {
        self.state.lock().commands.contains_key(id)
    }

    /// Returns `true` if an event subscription for `id` is registered.
    pub fn has_event_subscription(&self, id: &str) -> bool {
        self.state.lock().events.contains_key(id)
    }

    /// Invokes the command delivery for `result.id` on the calling thread.
    ///
    /// Returns `false` if nothing is subscribed to that id.
    pub fn deliver_command(&self, result: CommandResult) -> bool {
        let target = self.state.lock().commands.get(result.id.as_str()).cloned();
        match target {
            Some((delivery, token)) => {
                delivery(result, token);
                true
            }
            None => false,
        }
    }

    /// Invokes the event delivery for `summary.id` on the calling thread.
    ///
    /// Returns `false` if nothing is subscribed to that id.
    pub fn deliver_event(&self, summary: EventSummary) -> bool {
        let target = self.state.lock().events.get(summary.id.as_str()).cloned();
        match target {
            Some((delivery, token)) => {
                delivery(summary, token);
                true
            }
            None => false,
        }
    }

    /// Queues a command to be delivered during the next poll.
    pub fn enqueue_command(&self, result: CommandResult) {
        self.state.lock().queued.push(Queued::Command(result));
    }

    /// Queues an event summary to be delivered during the next poll.
    pub fn enqueue_event(&self, summary: EventSummary) {
        self.state.lock().queued.push(Queued::Event(summary));
    }

    fn record(&self, call: MockCall) {
        self.state.lock().calls.push(call);
    }

    fn subscribe_result(&self, id: &SubscriptionId) -> Result<(), BackendError> {
        if self.state.lock().failing_subscribes.contains(id.as_str()) {
            return Err(BackendError::rejected(format!("subscription '{id}' refused")));
        }
        Ok(())
    }

    fn unsubscribe_result(&self, id: &SubscriptionId) -> Result<(), BackendError> {
        if self.state.lock().failing_unsubscribes.contains(id.as_str()) {
            return Err(BackendError::rejected(format!("'{id}' could not be removed")));
        }
        Ok(())
    }

    fn accept(
        &self,
        id: &str,
        timestamp: Duration,
        data: &[u8],
        needs_stream: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failing_submits.contains(id) {
            return Err(BackendError::rejected(format!("submission to '{id}' refused")));
        }
        if needs_stream && !state.streams.contains(id) {
            return Err(BackendError::rejected(format!("stream '{id}' does not exist")));
        }
        state
            .submissions
            .entry(id.to_string())
            .or_default()
            .push(Submission {
                timestamp,
                data: data.to_vec(),
            });
        Ok(())
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockBackend")
            .field("calls", &state.calls.len())
            .field("streams", &state.streams)
            .finish_non_exhaustive()
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&self) -> Result<(), BackendError> {
        self.record(MockCall::Connect);
        match self.state.lock().connect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        self.record(MockCall::Disconnect);
        Ok(())
    }

    fn poll_for_deliveries(&self, timeout: Duration) -> Result<(), BackendError> {
        self.record(MockCall::Poll(timeout));

        // Deliveries run without the state lock held, as a real client would.
        let queued = std::mem::take(&mut self.state.lock().queued);
        for item in queued {
            match item {
                Queued::Command(result) => {
                    self.deliver_command(result);
                }
                Queued::Event(summary) => {
                    self.deliver_event(summary);
                }
            }
        }

        match self.state.lock().poll_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn subscribe_command(
        &self,
        id: &SubscriptionId,
        delivery: CommandDelivery,
        token: UserToken,
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubscribeCommand(id.to_string()));
        self.subscribe_result(id)?;
        self.state
            .lock()
            .commands
            .insert(id.to_string(), (delivery, token));
        Ok(())
    }

    fn unsubscribe_command(
        &self,
        id: &SubscriptionId,
        _token: UserToken,
    ) -> Result<(), BackendError> {
        self.record(MockCall::UnsubscribeCommand(id.to_string()));
        self.unsubscribe_result(id)?;
        self.state.lock().commands.remove(id.as_str());
        Ok(())
    }

    fn subscribe_event(
        &self,
        id: &SubscriptionId,
        delivery: EventDelivery,
        token: UserToken,
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubscribeEvent(id.to_string()));
        self.subscribe_result(id)?;
        self.state
            .lock()
            .events
            .insert(id.to_string(), (delivery, token));
        Ok(())
    }

    fn unsubscribe_event(
        &self,
        id: &SubscriptionId,
        _token: UserToken,
    ) -> Result<(), BackendError> {
        self.record(MockCall::UnsubscribeEvent(id.to_string()));
        self.unsubscribe_result(id)?;
        self.state.lock().events.remove(id.as_str());
        Ok(())
    }

    fn create_stream(&self, id: &StreamId) -> Result<(), BackendError> {
        self.record(MockCall::CreateStream(id.to_string()));
        if !self.state.lock().streams.insert(id.to_string()) {
            return Err(BackendError::rejected(format!("stream '{id}' already exists")));
        }
        Ok(())
    }

    fn destroy_stream(&self, id: &StreamId) -> Result<(), BackendError> {
        self.record(MockCall::DestroyStream(id.to_string()));
        if !self.state.lock().streams.remove(id.as_str()) {
            return Err(BackendError::rejected(format!("stream '{id}' does not exist")));
        }
        Ok(())
    }

    fn set_stream_rate(&self, id: &StreamId, rate: f64) -> Result<(), BackendError> {
        self.record(MockCall::SetStreamRate(id.to_string(), rate));
        Ok(())
    }

    fn submit_game_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubmitGameData(id.to_string()));
        self.accept(id.as_str(), timestamp, data, true)
    }

    fn submit_annotation(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubmitAnnotation(id.to_string()));
        self.accept(id.as_str(), timestamp, data, true)
    }

    fn submit_notification(&self, id: &str, data: &[u8]) -> Result<(), BackendError> {
        self.record(MockCall::SubmitNotification(id.to_string()));
        self.accept(id, Duration::ZERO, data, false)
    }

    fn submit_video_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubmitVideoData(id.to_string()));
        self.accept(id.as_str(), timestamp, data, true)
    }

    fn submit_audio_data(
        &self,
        timestamp: Duration,
        id: &StreamId,
        _spec: AudioSpec,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.record(MockCall::SubmitAudioData(id.to_string()));
        self.accept(id.as_str(), timestamp, data, true)
    }

    fn set_audio_capture(&self, id: &StreamId, enabled: bool) -> Result<(), BackendError> {
        self.record(MockCall::SetAudioCapture(id.to_string(), enabled));
        if enabled && self.state.lock().failing_captures.contains(id.as_str()) {
            return Err(BackendError::rejected(format!("capture on '{id}' refused")));
        }
        Ok(())
    }
}
