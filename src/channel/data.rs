//! Outbound game-data streams.
//!
//! Each configured stream has its own rate. Once per period the stream's
//! submit callback is invoked with a [`SubmitContext`] through which it
//! sends game data or annotations, stamped with the session time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::backend::Backend;
use crate::deadline::{check_rate, Deadline, Tick};
use crate::dispatch::panic_message;
use crate::error::{BridgeError, HandlerError};
use crate::event::{BridgeEvent, EventEmitter};
use crate::id::StreamId;
use crate::session::SessionStats;

use super::Component;

/// Periodic submit callback of one data stream.
pub type SubmitFn = Box<dyn FnMut(&mut SubmitContext<'_>) -> Result<(), HandlerError> + Send>;

/// Callback run when the session starts.
pub type StartFn = Box<dyn FnMut(&StreamId) + Send>;

/// Handle given to a submit callback for the current period.
pub struct SubmitContext<'a> {
    backend: &'a dyn Backend,
    stream_id: &'a StreamId,
    timestamp: Duration,
    submitted: u64,
}

impl<'a> SubmitContext<'a> {
    fn new(backend: &'a dyn Backend, stream_id: &'a StreamId, timestamp: Duration) -> Self {
        Self {
            backend,
            stream_id,
            timestamp,
            submitted: 0,
        }
    }

    /// Stream being submitted.
    pub fn stream_id(&self) -> &StreamId {
        self.stream_id
    }

    /// Session time attached to every submission in this period.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Sends a game-data payload on this stream.
    ///
    /// # Errors
    ///
    /// [`HandlerError::Backend`] if the backend rejects the payload.
    pub fn submit_game_data(&mut self, data: &[u8]) -> Result<(), HandlerError> {
        self.backend
            .submit_game_data(self.timestamp, self.stream_id, data)?;
        self.submitted += 1;
        Ok(())
    }

    /// Sends an annotation payload on this stream.
    ///
    /// # Errors
    ///
    /// [`HandlerError::Backend`] if the backend rejects the payload.
    pub fn submit_annotation(&mut self, data: &[u8]) -> Result<(), HandlerError> {
        self.backend
            .submit_annotation(self.timestamp, self.stream_id, data)?;
        self.submitted += 1;
        Ok(())
    }
}

/// Configuration of one data stream.
pub struct DataStreamParams {
    /// Stream id.
    pub id: StreamId,
    /// Submissions per second.
    pub rate: f64,
    submit: Option<SubmitFn>,
    on_start: Option<StartFn>,
}

impl DataStreamParams {
    /// Creates a stream with no callbacks.
    pub fn new(id: impl Into<StreamId>, rate: f64) -> Self {
        Self {
            id: id.into(),
            rate,
            submit: None,
            on_start: None,
        }
    }

    /// Sets the periodic submit callback.
    #[must_use]
    pub fn on_submit<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut SubmitContext<'_>) -> Result<(), HandlerError> + Send + 'static,
    {
        self.submit = Some(Box::new(f));
        self
    }

    /// Sets the callback run when the session starts.
    #[must_use]
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&StreamId) + Send + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for DataStreamParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStreamParams")
            .field("id", &self.id)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

struct StreamState {
    params: DataStreamParams,
    deadline: Option<Deadline>,
}

impl StreamState {
    fn is_created(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Game-data adapter: one deadline per configured stream.
pub struct DataStreams {
    backend: Arc<dyn Backend>,
    streams: Vec<StreamState>,
    initialized: bool,
    last_timestamp: Duration,
    emitter: EventEmitter,
    verbose: bool,
    stats: SessionStats,
}

impl DataStreams {
    /// Creates the adapter for the given streams.
    pub fn new(backend: Arc<dyn Backend>, streams: Vec<DataStreamParams>) -> Self {
        Self {
            backend,
            streams: streams
                .into_iter()
                .map(|params| StreamState {
                    params,
                    deadline: None,
                })
                .collect(),
            initialized: false,
            last_timestamp: Duration::ZERO,
            emitter: EventEmitter::default(),
            verbose: false,
            stats: SessionStats::default(),
        }
    }

    pub(crate) fn set_reporting(&mut self, emitter: EventEmitter, verbose: bool) {
        self.emitter = emitter;
        self.verbose = verbose;
    }

    fn find_mut(&mut self, id: &StreamId) -> Result<&mut StreamState, BridgeError> {
        self.streams
            .iter_mut()
            .find(|s| s.params.id == *id)
            .ok_or_else(|| BridgeError::UnknownStream { id: id.to_string() })
    }

    /// Changes a stream's rate. Takes effect from its next period.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidRate`] (previous rate kept) or
    /// [`BridgeError::UnknownStream`].
    pub fn set_rate(&mut self, id: &StreamId, rate: f64) -> Result<(), BridgeError> {
        let backend = Arc::clone(&self.backend);
        let stream = self.find_mut(id)?;
        match stream.deadline.as_mut() {
            Some(deadline) => {
                deadline.set_rate(rate)?;
                if let Err(err) = backend.set_stream_rate(id, rate) {
                    warn!(stream_id = %id, error = %err, "backend rejected rate change");
                }
            }
            None => {
                check_rate(rate)?;
            }
        }
        stream.params.rate = rate;
        Ok(())
    }

    /// Current rate of a stream.
    pub fn rate(&self, id: &StreamId) -> Option<f64> {
        self.streams
            .iter()
            .find(|s| s.params.id == *id)
            .map(|s| s.params.rate)
    }

    /// Configured stream ids.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(|s| s.params.id.clone()).collect()
    }

    /// Sends game data on a stream outside its periodic callback, stamped
    /// with the latest tick's session time.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotInitialized`], [`BridgeError::UnknownStream`] for a
    /// stream that is not configured or was not created, or
    /// [`BridgeError::SubmitFailed`].
    pub fn submit_game_data(&mut self, id: &StreamId, data: &[u8]) -> Result<(), BridgeError> {
        self.submit_now(id, data, false)
    }

    /// Sends an annotation on a stream, stamped like
    /// [`submit_game_data`](DataStreams::submit_game_data).
    ///
    /// # Errors
    ///
    /// Same as [`submit_game_data`](DataStreams::submit_game_data).
    pub fn submit_annotation(&mut self, id: &StreamId, data: &[u8]) -> Result<(), BridgeError> {
        self.submit_now(id, data, true)
    }

    fn submit_now(
        &mut self,
        id: &StreamId,
        data: &[u8],
        annotation: bool,
    ) -> Result<(), BridgeError> {
        if !self.initialized {
            return Err(BridgeError::NotInitialized { component: "data" });
        }
        let timestamp = self.last_timestamp;
        let backend = Arc::clone(&self.backend);
        let stream = self.find_mut(id)?;
        if !stream.is_created() {
            return Err(BridgeError::UnknownStream { id: id.to_string() });
        }

        let result = if annotation {
            backend.submit_annotation(timestamp, id, data)
        } else {
            backend.submit_game_data(timestamp, id, data)
        };
        match result {
            Ok(()) => {
                self.stats.submissions += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.submit_failures += 1;
                Err(BridgeError::SubmitFailed {
                    id: id.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl Component for DataStreams {
    fn name(&self) -> &'static str {
        "data"
    }

    fn initialize(&mut self, now: Instant) -> Result<(), BridgeError> {
        if self.initialized {
            return Ok(());
        }

        let mut first_error = None;
        for stream in &mut self.streams {
            let id = &stream.params.id;
            if let Err(err) = self.backend.create_stream(id) {
                error!(stream_id = %id, error = %err, "failed to create data stream");
                first_error.get_or_insert(BridgeError::StreamFailed {
                    id: id.to_string(),
                    reason: err.to_string(),
                });
                continue;
            }
            if let Err(err) = self.backend.set_stream_rate(id, stream.params.rate) {
                warn!(stream_id = %id, error = %err, "backend rejected stream rate");
            }
            match Deadline::new(stream.params.rate, now) {
                Ok(deadline) => {
                    stream.deadline = Some(deadline);
                    verbose!(
                        self.verbose,
                        stream_id = %id,
                        rate = stream.params.rate,
                        "data stream created"
                    );
                }
                Err(err) => {
                    error!(stream_id = %id, error = %err, "invalid data stream rate");
                    // Created but never driven.
                    if let Err(cleanup) = self.backend.destroy_stream(id) {
                        warn!(stream_id = %id, error = %cleanup, "failed to destroy data stream");
                    }
                    first_error.get_or_insert(err);
                }
            }
        }

        self.initialized = true;
        first_error.map_or(Ok(()), Err)
    }

    fn start(&mut self) {
        for stream in &mut self.streams {
            if !stream.is_created() {
                continue;
            }
            if let Some(on_start) = stream.params.on_start.as_mut() {
                on_start(&stream.params.id);
            }
        }
    }

    fn update(&mut self, tick: &Tick) {
        if !self.initialized {
            return;
        }
        self.last_timestamp = tick.elapsed;

        for stream in &mut self.streams {
            let Some(deadline) = stream.deadline.as_mut() else {
                continue;
            };
            if !deadline.is_due(tick.now) {
                continue;
            }

            if let Some(submit) = stream.params.submit.as_mut() {
                let mut ctx = SubmitContext::new(&*self.backend, &stream.params.id, tick.elapsed);
                let outcome = catch_unwind(AssertUnwindSafe(|| submit(&mut ctx))).unwrap_or_else(
                    |payload| Err(HandlerError::Panicked(panic_message(&*payload))),
                );
                self.stats.submissions += ctx.submitted;

                if let Err(err) = outcome {
                    let id = &stream.params.id;
                    error!(stream_id = %id, error = %err, "data stream submission failed");
                    self.stats.submit_failures += 1;
                    self.emitter.emit(BridgeEvent::SubmitFailed {
                        stream_id: id.to_string(),
                        reason: err.to_string(),
                    });
                }
            }

            // Always advance so a failing callback is skipped for this period only.
            deadline.advance();
        }
    }

    fn terminate(&mut self) -> Result<(), BridgeError> {
        if !self.initialized {
            return Ok(());
        }

        let mut first_error = None;
        for stream in &mut self.streams {
            if stream.deadline.take().is_none() {
                continue;
            }
            let id = &stream.params.id;
            match self.backend.destroy_stream(id) {
                Ok(()) => verbose!(self.verbose, stream_id = %id, "data stream destroyed"),
                Err(err) => {
                    error!(stream_id = %id, error = %err, "failed to destroy data stream");
                    first_error.get_or_insert(BridgeError::StreamFailed {
                        id: id.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.initialized = false;
        first_error.map_or(Ok(()), Err)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn stats(&self) -> SessionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockCall};
    use crate::deadline::{Clock, ManualClock};
    use parking_lot::Mutex;

    fn telemetry(counter: Arc<Mutex<u32>>) -> DataStreamParams {
        DataStreamParams::new("telemetry", 10.0).on_submit(move |ctx| {
            *counter.lock() += 1;
            ctx.submit_game_data(b"{}")
        })
    }

    #[test]
    fn test_initialize_creates_and_sets_rate() {
        let backend = Arc::new(MockBackend::new());
        let mut data = DataStreams::new(backend.clone(), vec![DataStreamParams::new("s", 30.0)]);
        data.initialize(Instant::now()).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                MockCall::CreateStream("s".to_string()),
                MockCall::SetStreamRate("s".to_string(), 30.0)
            ]
        );
        assert!(data.is_initialized());
    }

    #[test]
    fn test_update_submits_at_rate() {
        let backend = Arc::new(MockBackend::new());
        let clock = ManualClock::new();
        let epoch = clock.now();
        let fired = Arc::new(Mutex::new(0));
        let mut data = DataStreams::new(backend.clone(), vec![telemetry(fired.clone())]);
        data.initialize(epoch).unwrap();

        for _ in 0..60 {
            data.update(&Tick::new(clock.now(), epoch));
            clock.advance(Duration::from_micros(16_667));
        }

        let fired = *fired.lock();
        assert!((9..=11).contains(&fired), "fired {fired} times");
        assert_eq!(data.stats().submissions, u64::from(fired));

        let submissions = backend.submissions("telemetry");
        assert_eq!(submissions[0].timestamp, Duration::ZERO);
        assert!(submissions[1].timestamp >= Duration::from_millis(100));
    }

    #[test]
    fn test_failing_callback_skips_only_that_period() {
        let backend = Arc::new(MockBackend::new());
        let clock = ManualClock::new();
        let epoch = clock.now();
        let fired = Arc::new(Mutex::new(0));
        let mut data = DataStreams::new(backend.clone(), vec![telemetry(fired.clone())]);
        data.initialize(epoch).unwrap();

        backend.fail_submit("telemetry");
        data.update(&Tick::new(clock.now(), epoch));
        backend.clear_submit_failure("telemetry");
        clock.advance(Duration::from_millis(100));
        data.update(&Tick::new(clock.now(), epoch));

        assert_eq!(*fired.lock(), 2);
        assert_eq!(data.stats().submit_failures, 1);
        assert_eq!(backend.submissions("telemetry").len(), 1);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let backend = Arc::new(MockBackend::new());
        let mut data = DataStreams::new(
            backend.clone(),
            vec![DataStreamParams::new("s", 10.0).on_submit(|_| panic!("boom"))],
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        data.set_reporting(
            EventEmitter::new(Some(crate::event::event_callback(move |e| sink.lock().push(e)))),
            false,
        );
        let now = Instant::now();
        data.initialize(now).unwrap();
        data.update(&Tick::new(now, now));
        assert_eq!(data.stats().submit_failures, 1);
        assert!(matches!(
            events.lock().as_slice(),
            [BridgeEvent::SubmitFailed { reason, .. }] if reason.contains("boom")
        ));
    }

    #[test]
    fn test_set_rate() {
        let backend = Arc::new(MockBackend::new());
        let mut data = DataStreams::new(backend.clone(), vec![DataStreamParams::new("s", 10.0)]);
        let id = StreamId::new("s");

        data.set_rate(&id, 20.0).unwrap();
        assert_eq!(data.rate(&id), Some(20.0));
        assert!(matches!(data.set_rate(&id, 0.0), Err(BridgeError::InvalidRate { .. })));
        assert_eq!(data.rate(&id), Some(20.0));
        assert!(matches!(
            data.set_rate(&StreamId::new("nope"), 5.0),
            Err(BridgeError::UnknownStream { .. })
        ));
    }

    #[test]
    fn test_direct_submit_uses_last_tick_time() {
        let backend = Arc::new(MockBackend::new());
        let mut data = DataStreams::new(backend.clone(), vec![DataStreamParams::new("s", 1.0)]);
        let id = StreamId::new("s");
        assert!(matches!(
            data.submit_annotation(&id, b"x"),
            Err(BridgeError::NotInitialized { .. })
        ));

        let epoch = Instant::now();
        data.initialize(epoch).unwrap();
        data.update(&Tick::new(epoch + Duration::from_millis(250), epoch));
        data.submit_annotation(&id, b"goal").unwrap();

        assert_eq!(backend.submissions("s")[0].timestamp, Duration::from_millis(250));
    }

    #[test]
    fn test_create_failure_isolated_to_stream() {
        let backend = Arc::new(MockBackend::new());
        backend.create_stream(&StreamId::new("taken")).unwrap();
        let mut data = DataStreams::new(
            backend.clone(),
            vec![DataStreamParams::new("taken", 10.0), DataStreamParams::new("ok", 10.0)],
        );

        let err = data.initialize(Instant::now()).unwrap_err();
        assert!(matches!(err, BridgeError::StreamFailed { ref id, .. } if id == "taken"));
        assert!(data.is_initialized());
        assert!(backend.has_stream("ok"));

        data.terminate().unwrap();
        assert!(!backend.has_stream("ok"));
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::DestroyStream(_))), 1);
    }

    #[test]
    fn test_out_of_range_rate_destroys_created_stream() {
        let backend = Arc::new(MockBackend::new());
        let mut data = DataStreams::new(
            backend.clone(),
            vec![DataStreamParams::new("slow", 1e-19), DataStreamParams::new("ok", 10.0)],
        );
        let now = Instant::now();

        let err = data.initialize(now).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRate { .. }));
        assert!(!backend.has_stream("slow"));
        assert!(backend.has_stream("ok"));

        // The undriven stream is skipped on update.
        data.update(&Tick::new(now, now));
        assert_eq!(
            backend.count_calls(|c| matches!(c, MockCall::DestroyStream(s) if s == "slow")),
            1
        );
    }

    #[test]
    fn test_on_start_runs_for_created_streams() {
        let backend = Arc::new(MockBackend::new());
        let started = Arc::new(Mutex::new(Vec::new()));
        let sink = started.clone();
        let mut data = DataStreams::new(
            backend,
            vec![DataStreamParams::new("s", 10.0)
                .on_start(move |id| sink.lock().push(id.to_string()))],
        );
        data.initialize(Instant::now()).unwrap();
        data.start();
        assert_eq!(*started.lock(), ["s"]);
    }
}
