//! Configuration for the bridge session.

use std::time::Duration;

use crate::error::BridgeError;
use crate::schema::{Constraint, FieldKind, FieldSpec, SectionSpec, SettingValue, SettingsSchema};

/// Names accepted by the audio `mode` setting.
pub const AUDIO_MODES: &[&str] = &["none", "backend", "pushed"];

/// Names accepted by the audio `format` setting.
pub const AUDIO_FORMATS: &[&str] = &["s16le", "f32le"];

/// Session-wide configuration.
///
/// Use [`BridgeConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_bridge::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig {
///     video_enabled: false,
///     poll_timeout: Duration::from_millis(5),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Initialize and update the video adapter. Default: true
    pub video_enabled: bool,
    /// Initialize and update the audio adapter. Default: true
    pub audio_enabled: bool,
    /// Initialize and update the game-data adapter. Default: true
    pub data_enabled: bool,
    /// Initialize and update the event-summary adapter. Default: true
    pub events_enabled: bool,
    /// Initialize and update the command adapter. Default: true
    pub commands_enabled: bool,

    /// Log successful operations at `info` instead of `debug`.
    ///
    /// Diagnostics only; never changes behavior. Default: false
    pub verbose_log: bool,

    /// How long each tick waits for backend deliveries.
    ///
    /// Default: zero (non-blocking poll)
    pub poll_timeout: Duration,

    /// Gate video submissions on the video stream's rate.
    ///
    /// When false, a frame is submitted every tick. Default: true
    pub video_throttling: bool,

    /// How many times per second pushed audio is drained and submitted.
    ///
    /// Default: 50.0
    pub audio_submit_rate: f64,

    /// Capacity of the pushed-audio ring buffer, in time.
    ///
    /// Samples pushed while the buffer is full are dropped and counted.
    /// Default: 2 seconds
    pub audio_buffer_duration: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            data_enabled: true,
            events_enabled: true,
            commands_enabled: true,
            verbose_log: false,
            poll_timeout: Duration::ZERO,
            video_throttling: true,
            audio_submit_rate: 50.0,
            audio_buffer_duration: Duration::from_secs(2),
        }
    }
}

impl BridgeConfig {
    /// Returns the schema describing every configurable section.
    ///
    /// Sections: `session`, `channels`, `video`, `audio`, `data`, `commands`,
    /// `events`.
    #[must_use]
    pub fn schema() -> SettingsSchema {
        let toggle =
            |name, description| FieldSpec::new(name, FieldKind::Bool).describe(description);
        let rate = || {
            FieldSpec::new("rate", FieldKind::Float)
                .constraint(Constraint::Positive)
                .describe("submissions per second")
        };
        let id = || {
            FieldSpec::new("id", FieldKind::Text)
                .constraint(Constraint::NonEmpty)
                .describe("identifier registered with the backend")
        };

        SettingsSchema::new()
            .section(
                SectionSpec::new("session")
                    .field(toggle("verbose_log", "log successful operations at info level"))
                    .field(
                        FieldSpec::new("poll_timeout_ms", FieldKind::Integer)
                            .constraint(Constraint::Min(0.0))
                            .describe("milliseconds each tick waits for deliveries"),
                    ),
            )
            .section(
                SectionSpec::new("channels")
                    .field(toggle("video", "enable the video adapter"))
                    .field(toggle("audio", "enable the audio adapter"))
                    .field(toggle("data", "enable the game-data adapter"))
                    .field(toggle("events", "enable the event-summary adapter"))
                    .field(toggle("commands", "enable the command adapter")),
            )
            .section(
                SectionSpec::new("video")
                    .field(id())
                    .field(rate())
                    .field(toggle("throttling", "gate frames on the stream rate")),
            )
            .section(
                SectionSpec::new("audio")
                    .field(id())
                    .field(FieldSpec::new("mode", FieldKind::Choice(AUDIO_MODES)))
                    .field(FieldSpec::new("format", FieldKind::Choice(AUDIO_FORMATS)))
                    .field(
                        FieldSpec::new("channels", FieldKind::Integer)
                            .constraint(Constraint::Min(1.0))
                            .constraint(Constraint::Max(8.0)),
                    )
                    .field(
                        FieldSpec::new("sample_rate", FieldKind::Integer)
                            .constraint(Constraint::Positive),
                    )
                    .field(
                        FieldSpec::new("submit_rate", FieldKind::Float)
                            .constraint(Constraint::Positive)
                            .describe("drains of pushed audio per second"),
                    )
                    .field(
                        FieldSpec::new("buffer_ms", FieldKind::Integer)
                            .constraint(Constraint::Min(1.0))
                            .describe("capacity of the pushed-audio buffer"),
                    ),
            )
            .section(SectionSpec::new("data").field(id()).field(rate()))
            .section(SectionSpec::new("commands").field(id()))
            .section(SectionSpec::new("events").field(id()))
    }

    /// Validates this configuration against [`BridgeConfig::schema()`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidSetting`] naming the first bad field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let schema = Self::schema();
        schema.validate(
            "session",
            &[
                ("verbose_log", self.verbose_log.into()),
                ("poll_timeout_ms", millis(self.poll_timeout)),
            ],
        )?;
        schema.validate(
            "video",
            &[("throttling", self.video_throttling.into())],
        )?;
        schema.validate(
            "audio",
            &[
                ("submit_rate", self.audio_submit_rate.into()),
                ("buffer_ms", millis(self.audio_buffer_duration)),
            ],
        )
    }

    /// Enable flags in session update order: video, audio, data, events, commands.
    #[must_use]
    pub fn channel_toggles(&self) -> [bool; 5] {
        [
            self.video_enabled,
            self.audio_enabled,
            self.data_enabled,
            self.events_enabled,
            self.commands_enabled,
        ]
    }
}

fn millis(duration: Duration) -> SettingValue {
    SettingValue::Integer(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}
