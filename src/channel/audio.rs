//! Outbound audio stream.
//!
//! Three capture modes:
//! - [`AudioMode::None`]: no audio stream.
//! - [`AudioMode::Backend`]: the backend captures system audio itself; the
//!   bridge only creates the stream and toggles capture.
//! - [`AudioMode::Pushed`]: the application pushes f32 samples from its audio
//!   thread through an [`AudioInput`]. Each period the bridge drains whole
//!   frames from the ring buffer, encodes them and submits them.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, warn};

use crate::backend::Backend;
use crate::deadline::{Deadline, Tick};
use crate::error::BridgeError;
use crate::event::{BridgeEvent, EventEmitter};
use crate::format::AudioSpec;
use crate::id::StreamId;
use crate::session::SessionStats;

use super::Component;

/// Where submitted audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    /// No audio stream.
    None,
    /// The backend captures audio on its own.
    Backend,
    /// The application pushes samples.
    #[default]
    Pushed,
}

impl FromStr for AudioMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::None, Self::Backend, Self::Pushed]
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BridgeError::InvalidSetting {
                section: "audio".to_string(),
                field: "mode".to_string(),
                reason: format!("'{s}' is not one of none, backend, pushed"),
            })
    }
}

impl AudioMode {
    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Backend => "backend",
            Self::Pushed => "pushed",
        }
    }
}

/// Configuration of the audio stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParams {
    /// Stream id.
    pub id: StreamId,
    /// Capture mode.
    pub mode: AudioMode,
    /// Sample format, channel count and sample rate.
    pub spec: AudioSpec,
}

impl AudioParams {
    /// Creates pushed-mode parameters with the default [`AudioSpec`].
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            mode: AudioMode::default(),
            spec: AudioSpec::default(),
        }
    }

    /// Sets the capture mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AudioMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the sample format, channel count and sample rate.
    #[must_use]
    pub fn with_spec(mut self, spec: AudioSpec) -> Self {
        self.spec = spec;
        self
    }
}

/// Producer side of the pushed-audio ring buffer.
///
/// Owned by the application's audio thread. Pushing never blocks; samples
/// that do not fit are dropped and counted.
pub struct AudioInput {
    producer: HeapProd<f32>,
    dropped: Arc<AtomicU64>,
}

impl AudioInput {
    /// Pushes interleaved samples. Returns how many were accepted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        let overflow = samples.len() - pushed;
        if overflow > 0 {
            self.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }
        pushed
    }

    /// Total samples dropped because the buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioInput")
            .field("dropped", &self.dropped_samples())
            .finish_non_exhaustive()
    }
}

/// Audio adapter.
pub struct Audio {
    backend: Arc<dyn Backend>,
    params: Option<AudioParams>,
    submit_rate: f64,
    consumer: Option<HeapCons<f32>>,
    input: Option<AudioInput>,
    dropped: Arc<AtomicU64>,
    deadline: Option<Deadline>,
    initialized: bool,
    emitter: EventEmitter,
    verbose: bool,
    stats: SessionStats,
}

impl Audio {
    /// Creates the adapter.
    ///
    /// In pushed mode the ring buffer holds `buffer` worth of samples and
    /// is drained `submit_rate` times per second.
    pub fn new(
        backend: Arc<dyn Backend>,
        params: Option<AudioParams>,
        submit_rate: f64,
        buffer: Duration,
    ) -> Self {
        let params = params.filter(|p| p.mode != AudioMode::None);
        let dropped = Arc::new(AtomicU64::new(0));

        let (input, consumer) = match &params {
            Some(p) if p.mode == AudioMode::Pushed => {
                let capacity = buffer_capacity(&p.spec, buffer);
                let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
                let input = AudioInput {
                    producer,
                    dropped: Arc::clone(&dropped),
                };
                (Some(input), Some(consumer))
            }
            _ => (None, None),
        };

        Self {
            backend,
            params,
            submit_rate,
            consumer,
            input,
            dropped,
            deadline: None,
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

    /// Takes the producer handle for pushed audio.
    ///
    /// Returns `None` outside pushed mode or if it was already taken.
    pub fn take_input(&mut self) -> Option<AudioInput> {
        self.input.take()
    }

    /// Active capture mode.
    pub fn mode(&self) -> AudioMode {
        self.params.as_ref().map_or(AudioMode::None, |p| p.mode)
    }

    /// Samples dropped so far because the ring buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Samples waiting to be submitted.
    pub fn buffered_samples(&self) -> usize {
        self.consumer.as_ref().map_or(0, |c| c.occupied_len())
    }

    /// Drains whole frames, encodes and submits them.
    fn submit_buffered(&mut self, tick: &Tick) {
        let (Some(params), Some(consumer)) = (self.params.as_ref(), self.consumer.as_mut()) else {
            return;
        };
        let channels = usize::from(params.spec.channels.max(1));
        let available = consumer.occupied_len();
        let whole = available - available % channels;
        if whole == 0 {
            return;
        }

        let mut samples = vec![0.0f32; whole];
        let read = consumer.pop_slice(&mut samples);
        samples.truncate(read);
        let bytes = params.spec.format.encode(&samples);

        match self
            .backend
            .submit_audio_data(tick.elapsed, &params.id, params.spec, &bytes)
        {
            Ok(()) => self.stats.submissions += 1,
            Err(err) => {
                error!(stream_id = %params.id, error = %err, "audio submission failed");
                self.stats.submit_failures += 1;
                self.emitter.emit(BridgeEvent::SubmitFailed {
                    stream_id: params.id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn buffer_capacity(spec: &AudioSpec, buffer: Duration) -> usize {
    let samples = f64::from(spec.sample_rate) * f64::from(spec.channels) * buffer.as_secs_f64();
    (samples.ceil() as usize).max(1)
}

impl Component for Audio {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn initialize(&mut self, now: Instant) -> Result<(), BridgeError> {
        if self.initialized {
            return Ok(());
        }
        let Some(params) = self.params.as_ref() else {
            self.initialized = true;
            return Ok(());
        };

        let deadline = Deadline::new(self.submit_rate, now)?;
        let stream_failed = |err: crate::error::BackendError| BridgeError::StreamFailed {
            id: params.id.to_string(),
            reason: err.to_string(),
        };
        self.backend.create_stream(&params.id).map_err(stream_failed)?;

        if params.mode == AudioMode::Backend {
            if let Err(err) = self.backend.set_audio_capture(&params.id, true) {
                error!(
                    stream_id = %params.id,
                    error = %err,
                    "failed to start backend audio capture"
                );
                if let Err(cleanup) = self.backend.destroy_stream(&params.id) {
                    warn!(
                        stream_id = %params.id,
                        error = %cleanup,
                        "failed to destroy audio stream"
                    );
                }
                return Err(stream_failed(err));
            }
        }

        verbose!(
            self.verbose,
            stream_id = %params.id,
            mode = params.mode.as_str(),
            "audio stream created"
        );
        self.deadline = Some(deadline);
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self, tick: &Tick) {
        if self.mode() != AudioMode::Pushed {
            return;
        }
        let Some(deadline) = self.deadline.as_mut() else {
            return;
        };
        if deadline.poll(tick.now) {
            self.submit_buffered(tick);
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
        if params.mode == AudioMode::Backend {
            if let Err(err) = self.backend.set_audio_capture(&params.id, false) {
                warn!(stream_id = %params.id, error = %err, "failed to stop backend capture");
            }
        }
        if let Some(consumer) = self.consumer.as_mut() {
            let discarded = consumer.clear();
            if discarded > 0 {
                warn!(stream_id = %params.id, discarded, "discarding unsubmitted audio");
            }
        }
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
