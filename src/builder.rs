//! Builder pattern for `StreamBridge`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::Backend;
use crate::channel::{AudioParams, CommandParams, DataStreamParams, EventParams, VideoParams};
use crate::config::BridgeConfig;
use crate::deadline::{check_rate, Clock, SystemClock};
use crate::error::BridgeError;
use crate::event::{event_callback, BridgeEvent, EventCallback, EventEmitter};
use crate::manager::SessionManager;
use crate::session::{Session, SessionChannels};

/// Builder for a [`SessionManager`].
///
/// Use [`StreamBridge::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_bridge::{CommandParams, DataStreamParams, MockBackend, StreamBridge};
///
/// let backend = Arc::new(MockBackend::new());
/// let mut manager = StreamBridge::builder()
///     .backend(backend.clone())
///     .add_command(CommandParams::new("pause", |cmd| {
///         println!("pause requested: {}", cmd.result.value);
///         Ok(())
///     }))
///     .add_data_stream(DataStreamParams::new("score", 10.0).on_submit(|ctx| {
///         ctx.submit_game_data(b"{\"score\":42}")
///     }))
///     .on_event(|e| eprintln!("bridge event: {e:?}"))
///     .build()
///     .unwrap();
///
/// manager.initialize().unwrap();
/// manager.update();
/// manager.shutdown().unwrap();
/// ```
///
/// [`StreamBridge::builder()`]: crate::StreamBridge::builder
#[must_use]
pub struct SessionManagerBuilder {
    backend: Option<Arc<dyn Backend>>,
    clock: Option<Arc<dyn Clock>>,
    channels: SessionChannels,
    event_callback: Option<EventCallback>,
    config: BridgeConfig,
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            clock: None,
            channels: SessionChannels::default(),
            event_callback: None,
            config: BridgeConfig::default(),
        }
    }

    /// Sets the streaming backend. Required.
    pub fn backend<B: Backend + 'static>(mut self, backend: Arc<B>) -> Self {
        self.backend = Some(backend as Arc<dyn Backend>);
        self
    }

    /// Sets the time source. Default: [`SystemClock`]
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Adds a command subscription.
    pub fn add_command(mut self, params: CommandParams) -> Self {
        self.channels.commands.push(params);
        self
    }

    /// Adds an event-summary subscription.
    pub fn add_event(mut self, params: EventParams) -> Self {
        self.channels.events.push(params);
        self
    }

    /// Adds a game-data stream.
    pub fn add_data_stream(mut self, params: DataStreamParams) -> Self {
        self.channels.data.push(params);
        self
    }

    /// Configures the video stream.
    pub fn video(mut self, params: VideoParams) -> Self {
        self.channels.video = Some(params);
        self
    }

    /// Configures the audio stream.
    pub fn audio(mut self, params: AudioParams) -> Self {
        self.channels.audio = Some(params);
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include subscription and submission failures, poll failures and
    /// lifecycle transitions.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom bridge configuration.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), BridgeError> {
        if self.backend.is_none() {
            return Err(BridgeError::NoBackendConfigured);
        }
        self.config.validate()?;

        unique_ids(self.channels.commands.iter().map(|p| p.id.as_str()))?;
        unique_ids(self.channels.events.iter().map(|p| p.id.as_str()))?;

        // Data, video and audio share the backend's stream namespace.
        let streams = self
            .channels
            .data
            .iter()
            .map(|p| p.id.as_str())
            .chain(self.channels.video.iter().map(|p| p.id.as_str()))
            .chain(self.channels.audio.iter().map(|p| p.id.as_str()));
        unique_ids(streams)?;

        for stream in &self.channels.data {
            check_rate(stream.rate)?;
        }
        if let Some(video) = &self.channels.video {
            check_rate(video.rate)?;
        }
        check_rate(self.config.audio_submit_rate)?;
        Ok(())
    }

    /// Builds the manager. Nothing touches the backend until
    /// [`SessionManager::initialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No backend is configured
    /// - An id is used twice within commands, events or streams
    /// - A stream rate is not positive
    /// - The configuration is invalid
    pub fn build(self) -> Result<SessionManager, BridgeError> {
        self.validate()?;
        let backend = self.backend.ok_or(BridgeError::NoBackendConfigured)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let session = Session::new(Arc::clone(&backend), self.config.clone(), self.channels);
        Ok(SessionManager::new(
            backend,
            session,
            clock,
            self.config,
            EventEmitter::new(self.event_callback),
        ))
    }
}

fn unique_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), BridgeError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BridgeError::DuplicateId { id: id.to_string() });
        }
    }
    Ok(())
}

/// Main entry point for stream-bridge.
///
/// Use [`StreamBridge::builder()`] to start configuring a bridge.
pub struct StreamBridge;

impl StreamBridge {
    /// Creates a new builder for configuring a bridge.
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::manager::LifecycleState;
    use std::time::Duration;

    fn with_backend() -> SessionManagerBuilder {
        StreamBridge::builder().backend(Arc::new(MockBackend::new()))
    }

    #[test]
    fn test_builder_default() {
        let builder = SessionManagerBuilder::new();
        assert!(builder.backend.is_none());
        assert!(builder.channels.commands.is_empty());
        assert_eq!(builder.config, BridgeConfig::default());
    }

    #[test]
    fn test_builder_rejects_no_backend() {
        let result = StreamBridge::builder().validate();
        assert!(matches!(result, Err(BridgeError::NoBackendConfigured)));
    }

    #[test]
    fn test_builder_rejects_duplicate_command_ids() {
        let builder = with_backend()
            .add_command(CommandParams::new("a", |_| Ok(())))
            .add_command(CommandParams::new("a", |_| Ok(())));
        assert!(matches!(
            builder.validate(),
            Err(BridgeError::DuplicateId { id }) if id == "a"
        ));
    }

    #[test]
    fn test_command_and_event_ids_are_separate() {
        let builder = with_backend()
            .add_command(CommandParams::new("a", |_| Ok(())))
            .add_event(EventParams::new("a", |_| Ok(())));
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_stream_id_shared_with_video() {
        let builder = with_backend()
            .add_data_stream(DataStreamParams::new("main", 10.0))
            .video(VideoParams::new("main"));
        assert!(matches!(builder.validate(), Err(BridgeError::DuplicateId { .. })));
    }

    #[test]
    fn test_builder_rejects_bad_rates() {
        let builder = with_backend().add_data_stream(DataStreamParams::new("d", 0.0));
        assert!(matches!(builder.validate(), Err(BridgeError::InvalidRate { .. })));

        let builder = with_backend().video(VideoParams::new("v").with_rate(f64::NAN));
        assert!(matches!(builder.validate(), Err(BridgeError::InvalidRate { .. })));
    }

    #[test]
    fn test_builder_rejects_rates_slower_than_max_interval() {
        let builder = with_backend().add_data_stream(DataStreamParams::new("slow", 1e-19));
        assert!(matches!(builder.validate(), Err(BridgeError::InvalidRate { .. })));

        let builder = with_backend().with_config(BridgeConfig {
            audio_submit_rate: 1e-19,
            ..Default::default()
        });
        assert!(matches!(builder.validate(), Err(BridgeError::InvalidRate { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let builder = with_backend().with_config(BridgeConfig {
            audio_buffer_duration: Duration::ZERO,
            ..Default::default()
        });
        assert!(matches!(builder.validate(), Err(BridgeError::InvalidSetting { .. })));
    }

    #[test]
    fn test_build_does_not_touch_backend() {
        let backend = Arc::new(MockBackend::new());
        let manager = StreamBridge::builder()
            .backend(backend.clone())
            .add_command(CommandParams::new("a", |_| Ok(())))
            .build()
            .unwrap();

        assert_eq!(manager.state(), LifecycleState::Uninitialized);
        assert!(backend.calls().is_empty());
    }
}
