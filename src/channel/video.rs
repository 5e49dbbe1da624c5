//! Outbound video stream.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use crate::backend::Backend;
use crate::deadline::{Deadline, Tick};
use crate::dispatch::panic_message;
use crate::error::{BridgeError, HandlerError};
use crate::event::{BridgeEvent, EventEmitter};
use crate::id::StreamId;
use crate::session::SessionStats;

use super::Component;

/// Produces the next encoded frame, or `None` when no frame is ready.
pub type FrameSource = Box<dyn FnMut(&StreamId) -> Result<Option<Vec<u8>>, HandlerError> + Send>;

/// Configuration of the video stream.
pub struct VideoParams {
    /// Stream id.
    pub id: StreamId,
    /// Frames per second. Default: 30
    pub rate: f64,
    source: Option<FrameSource>,
}

impl VideoParams {
    /// Creates a video stream at 30 frames per second with no frame source.
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            rate: 30.0,
            source: None,
        }
    }

    /// Sets the frame rate.
    #[must_use]
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the frame source.
    #[must_use]
    pub fn with_source<F>(mut self, f: F) -> Self
    where
        F: FnMut(&StreamId) -> Result<Option<Vec<u8>>, HandlerError> + Send + 'static,
    {
        self.source = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for VideoParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoParams")
            .field("id", &self.id)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

/// Video adapter.
///
/// With throttling on, at most one frame is submitted per period. With it
/// off, a frame is requested on every tick.
pub struct Video {
    backend: Arc<dyn Backend>,
    params: Option<VideoParams>,
    deadline: Option<Deadline>,
    throttled: bool,
    initialized: bool,
    emitter: EventEmitter,
    verbose: bool,
    stats: SessionStats,
}

impl Video {
    /// Creates the adapter. `None` configures no video stream.
    pub fn new(backend: Arc<dyn Backend>, params: Option<VideoParams>, throttled: bool) -> Self {
        Self {
            backend,
            params,
            deadline: None,
            throttled,
            initialized: false,
            emitter: EventEmitter::default(),
            verbose: false,
            stats: SessionStats::default(),
        }
    }

    pub(crate) fn set_reporting(&mut self, emitter: EventEmitter, verbose: bool) {
        self.emitter = emitter;
        self.verbose = verbose;
    }

    /// Changes the frame rate. Takes effect from the next period.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidRate`] (previous rate kept) or
    /// [`BridgeError::UnknownStream`] when no video stream is configured.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), BridgeError> {
        let params = self.params.as_mut().ok_or_else(|| BridgeError::UnknownStream {
            id: "video".to_string(),
        })?;
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.set_rate(rate)?;
                if let Err(err) = self.backend.set_stream_rate(&params.id, rate) {
                    warn!(stream_id = %params.id, error = %err, "backend rejected rate change");
                }
            }
            None => {
                crate::deadline::check_rate(rate)?;
            }
        }
        params.rate = rate;
        Ok(())
    }

    /// Current frame rate, if a stream is configured.
    pub fn rate(&self) -> Option<f64> {
        self.params.as_ref().map(|p| p.rate)
    }

    /// Turns rate gating on or off.
    pub fn set_throttled(&mut self, throttled: bool) {
        self.throttled = throttled;
    }

    /// Returns `true` if submissions are gated on the frame rate.
    pub fn is_throttled(&self) -> bool {
        self.throttled
    }
}

impl Component for Video {
    fn name(&self) -> &'static str {
        "video"
    }

    fn initialize(&mut self, now: Instant) -> Result<(), BridgeError> {
        if self.initialized {
            return Ok(());
        }
        let Some(params) = self.params.as_ref() else {
            self.initialized = true;
            return Ok(());
        };

        let deadline = Deadline::new(params.rate, now)?;
        self.backend
            .create_stream(&params.id)
            .map_err(|err| BridgeError::StreamFailed {
                id: params.id.to_string(),
                reason: err.to_string(),
            })?;
        if let Err(err) = self.backend.set_stream_rate(&params.id, params.rate) {
            warn!(stream_id = %params.id, error = %err, "backend rejected video rate");
        }

        verbose!(self.verbose, stream_id = %params.id, rate = params.rate, "video stream created");
        self.deadline = Some(deadline);
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self, tick: &Tick) {
        let (Some(params), Some(deadline)) = (self.params.as_mut(), self.deadline.as_mut()) else {
            return;
        };
        // The schedule keeps running unthrottled so re-enabling resumes in phase.
        let due = deadline.poll(tick.now);
        if self.throttled && !due {
            return;
        }
        let Some(source) = params.source.as_mut() else {
            return;
        };

        let id = &params.id;
        let frame = catch_unwind(AssertUnwindSafe(|| source(id)))
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))));
        let result = match frame {
            Ok(Some(bytes)) => self
                .backend
                .submit_video_data(tick.elapsed, id, &bytes)
                .map_err(HandlerError::from),
            Ok(None) => return,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => self.stats.submissions += 1,
            Err(err) => {
                error!(stream_id = %id, error = %err, "video submission failed");
                self.stats.submit_failures += 1;
                self.emitter.emit(BridgeEvent::SubmitFailed {
                    stream_id: id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn terminate(&mut self) -> Result<(), BridgeError> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let (Some(params), Some(_)) = (self.params.as_ref(), self.deadline.take()) else {
            return Ok(());
        };
        self.backend
            .destroy_stream(&params.id)
            .map_err(|err| BridgeError::StreamFailed {
                id: params.id.to_string(),
                reason: err.to_string(),
            })
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
    use std::time::Duration;

    fn counting_video(backend: &Arc<MockBackend>, throttled: bool) -> Video {
        let params = VideoParams::new("video")
            .with_rate(10.0)
            .with_source(|_| Ok(Some(vec![0u8; 4])));
        Video::new(backend.clone(), Some(params), throttled)
    }

    fn run_ticks(video: &mut Video, epoch: Instant, count: u32) {
        for i in 0..count {
            video.update(&Tick::new(epoch + Duration::from_millis(20) * i, epoch));
        }
    }

    #[test]
    fn test_throttled_video_follows_rate() {
        let backend = Arc::new(MockBackend::new());
        let mut video = counting_video(&backend, true);
        let epoch = Instant::now();
        video.initialize(epoch).unwrap();

        // 50 ticks at 20ms = 1s at 10 fps.
        run_ticks(&mut video, epoch, 50);
        assert_eq!(backend.submissions("video").len(), 10);
    }

    #[test]
    fn test_unthrottled_video_submits_every_tick() {
        let backend = Arc::new(MockBackend::new());
        let mut video = counting_video(&backend, false);
        let epoch = Instant::now();
        video.initialize(epoch).unwrap();

        run_ticks(&mut video, epoch, 50);
        assert_eq!(backend.submissions("video").len(), 50);
        assert!(!video.is_throttled());
    }

    #[test]
    fn test_no_frame_ready_is_not_a_failure() {
        let backend = Arc::new(MockBackend::new());
        let params = VideoParams::new("video").with_source(|_| Ok(None));
        let mut video = Video::new(backend.clone(), Some(params), true);
        let now = Instant::now();
        video.initialize(now).unwrap();
        video.update(&Tick::new(now, now));

        assert_eq!(video.stats().submissions, 0);
        assert_eq!(video.stats().submit_failures, 0);
    }

    #[test]
    fn test_panicking_frame_source_reports_message() {
        let backend = Arc::new(MockBackend::new());
        let params = VideoParams::new("video").with_source(|_| panic!("encoder {} lost", 2));
        let mut video = Video::new(backend.clone(), Some(params), true);
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        video.set_reporting(
            EventEmitter::new(Some(crate::event::event_callback(move |e| sink.lock().push(e)))),
            false,
        );
        let now = Instant::now();
        video.initialize(now).unwrap();
        video.update(&Tick::new(now, now));

        assert_eq!(video.stats().submit_failures, 1);
        assert!(matches!(
            events.lock().as_slice(),
            [BridgeEvent::SubmitFailed { reason, .. }] if reason.contains("encoder 2 lost")
        ));
    }

    #[test]
    fn test_lifecycle_creates_and_destroys_stream() {
        let backend = Arc::new(MockBackend::new());
        let mut video = counting_video(&backend, true);
        video.initialize(Instant::now()).unwrap();
        assert!(backend.has_stream("video"));

        video.terminate().unwrap();
        video.terminate().unwrap();
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::DestroyStream(_))), 1);
    }

    #[test]
    fn test_without_params_is_inert() {
        let backend = Arc::new(MockBackend::new());
        let mut video = Video::new(backend.clone(), None, true);
        let now = Instant::now();
        video.initialize(now).unwrap();
        video.update(&Tick::new(now, now));
        video.terminate().unwrap();
        assert!(backend.calls().is_empty());
        assert!(video.set_rate(5.0).is_err());
    }
}
