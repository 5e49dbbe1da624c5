//! Composition of the five channel adapters.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use crate::backend::Backend;
use crate::channel::{
    Audio, AudioParams, CommandParams, Commands, Component, DataStreamParams, DataStreams,
    EventParams, Events, Video, VideoParams,
};
use crate::config::BridgeConfig;
use crate::deadline::Tick;
use crate::error::BridgeError;
use crate::event::EventEmitter;

/// Counters aggregated over every adapter of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inbound entries whose handler returned `Ok`.
    pub dispatched: u64,
    /// Inbound entries whose handler failed or panicked.
    pub dispatch_faults: u64,
    /// Successful outbound submissions.
    pub submissions: u64,
    /// Outbound submissions that failed.
    pub submit_failures: u64,
}

impl AddAssign for SessionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.dispatched += rhs.dispatched;
        self.dispatch_faults += rhs.dispatch_faults;
        self.submissions += rhs.submissions;
        self.submit_failures += rhs.submit_failures;
    }
}

/// Channel configuration for a [`Session`].
#[derive(Default)]
pub struct SessionChannels {
    /// Command subscriptions.
    pub commands: Vec<CommandParams>,
    /// Event-summary subscriptions.
    pub events: Vec<EventParams>,
    /// Game-data streams.
    pub data: Vec<DataStreamParams>,
    /// Video stream, if any.
    pub video: Option<VideoParams>,
    /// Audio stream, if any.
    pub audio: Option<AudioParams>,
}

/// One adapter per channel kind, driven together.
///
/// Adapters are initialized and updated in the order video, audio, data,
/// events, commands and terminated in reverse. Channels disabled in the
/// [`BridgeConfig`] are never touched.
pub struct Session {
    backend: Arc<dyn Backend>,
    config: BridgeConfig,
    video: Video,
    audio: Audio,
    data: DataStreams,
    events: Events,
    commands: Commands,
    epoch: Option<Instant>,
    initialized: bool,
    started: bool,
}

impl Session {
    /// Builds the adapters for `channels` without touching the backend.
    pub fn new(backend: Arc<dyn Backend>, config: BridgeConfig, channels: SessionChannels) -> Self {
        let video = Video::new(Arc::clone(&backend), channels.video, config.video_throttling);
        let audio = Audio::new(
            Arc::clone(&backend),
            channels.audio,
            config.audio_submit_rate,
            config.audio_buffer_duration,
        );
        let data = DataStreams::new(Arc::clone(&backend), channels.data);
        let events = Events::new(Arc::clone(&backend), channels.events);
        let commands = Commands::new(Arc::clone(&backend), channels.commands);

        Self {
            backend,
            config,
            video,
            audio,
            data,
            events,
            commands,
            epoch: None,
            initialized: false,
            started: false,
        }
    }

    pub(crate) fn set_reporting(&mut self, emitter: &EventEmitter) {
        let verbose = self.config.verbose_log;
        self.video.set_reporting(emitter.clone(), verbose);
        self.audio.set_reporting(emitter.clone(), verbose);
        self.data.set_reporting(emitter.clone(), verbose);
        self.events.set_reporting(emitter.clone(), verbose);
        self.commands.set_reporting(emitter.clone(), verbose);
    }

    /// Enabled adapters in update order.
    fn components(&mut self) -> Vec<&mut dyn Component> {
        let [video, audio, data, events, commands] = self.config.channel_toggles();
        let mut enabled: Vec<&mut dyn Component> = Vec::with_capacity(5);
        if video {
            enabled.push(&mut self.video);
        }
        if audio {
            enabled.push(&mut self.audio);
        }
        if data {
            enabled.push(&mut self.data);
        }
        if events {
            enabled.push(&mut self.events);
        }
        if commands {
            enabled.push(&mut self.commands);
        }
        enabled
    }

    /// Initializes every enabled adapter.
    ///
    /// All adapters are attempted even when one fails. Returns `true` only
    /// if every adapter succeeded. Calling again retries adapters that did
    /// not come up and leaves the rest alone.
    pub fn initialize(&mut self, now: Instant) -> bool {
        self.epoch.get_or_insert(now);
        let verbose = self.config.verbose_log;

        let mut ok = true;
        for component in self.components() {
            if let Err(err) = component.initialize(now) {
                error!(component = component.name(), error = %err, "failed to initialize channel");
                ok = false;
            }
        }

        self.initialized = true;
        verbose!(verbose, complete = ok, "session initialized");
        ok
    }

    /// Runs each initialized adapter's start hook. Only the first call has
    /// an effect per initialization.
    pub fn start(&mut self) {
        if !self.initialized || self.started {
            return;
        }
        self.started = true;
        for component in self.components() {
            if component.is_initialized() {
                component.start();
            }
        }
    }

    /// Updates each initialized adapter once, in order.
    pub fn update(&mut self, now: Instant) {
        if !self.initialized {
            return;
        }
        let tick = Tick::new(now, self.epoch.unwrap_or(now));
        for component in self.components() {
            if component.is_initialized() {
                component.update(&tick);
            }
        }
    }

    /// Terminates every initialized adapter in reverse order.
    ///
    /// All adapters are attempted even when one fails. Returns `true` only
    /// if every termination succeeded.
    pub fn terminate(&mut self) -> bool {
        if !self.initialized {
            return true;
        }

        let mut ok = true;
        for component in self.components().into_iter().rev() {
            if !component.is_initialized() {
                continue;
            }
            if let Err(err) = component.terminate() {
                error!(component = component.name(), error = %err, "failed to terminate channel");
                ok = false;
            }
        }

        self.initialized = false;
        self.started = false;
        self.epoch = None;
        verbose!(self.config.verbose_log, clean = ok, "session terminated");
        ok
    }

    /// Sends a one-off notification.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotInitialized`] before [`initialize`](Self::initialize),
    /// [`BridgeError::SubmitFailed`] when the backend rejects it.
    pub fn submit_notification(&self, id: &str, data: &[u8]) -> Result<(), BridgeError> {
        if !self.initialized {
            return Err(BridgeError::NotInitialized { component: "session" });
        }
        self.backend.submit_notification(id, data).map_err(|err| {
            warn!(notification_id = id, error = %err, "notification rejected");
            BridgeError::SubmitFailed {
                id: id.to_string(),
                reason: err.to_string(),
            }
        })
    }

    /// Returns `true` between `initialize` and `terminate`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Counters summed over all adapters.
    pub fn stats(&self) -> SessionStats {
        let mut total = self.video.stats();
        total += self.audio.stats();
        total += self.data.stats();
        total += self.events.stats();
        total += self.commands.stats();
        total
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Command adapter.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Command adapter, for runtime subscriptions.
    pub fn commands_mut(&mut self) -> &mut Commands {
        &mut self.commands
    }

    /// Event-summary adapter.
    pub fn events(&self) -> &Events {
        &self.events
    }

    /// Event-summary adapter, for runtime subscriptions.
    pub fn events_mut(&mut self) -> &mut Events {
        &mut self.events
    }

    /// Game-data adapter.
    pub fn data(&self) -> &DataStreams {
        &self.data
    }

    /// Game-data adapter, for rate changes and direct submissions.
    pub fn data_mut(&mut self) -> &mut DataStreams {
        &mut self.data
    }

    /// Video adapter.
    pub fn video(&self) -> &Video {
        &self.video
    }

    /// Video adapter, for rate and throttling changes.
    pub fn video_mut(&mut self) -> &mut Video {
        &mut self.video
    }

    /// Audio adapter.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Audio adapter, to take the pushed-audio input.
    pub fn audio_mut(&mut self) -> &mut Audio {
        &mut self.audio
    }
}
