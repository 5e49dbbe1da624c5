//! # stream-bridge
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Bridges an asynchronously delivering streaming backend to a single-threaded
//! per-tick consumer.
//!
//! The backend delivers commands and event summaries on its own threads. The
//! bridge queues them and hands them to application handlers once per tick,
//! on the tick thread. In the other direction, game data, video and audio are
//! submitted to the backend, each throttled to its own rate.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stream_bridge::{
//!     CommandParams, CommandResult, DataStreamParams, ManualClock, MockBackend, StreamBridge,
//! };
//!
//! let backend = Arc::new(MockBackend::new());
//! let clock = ManualClock::new();
//!
//! let mut bridge = StreamBridge::builder()
//!     .backend(backend.clone())
//!     .clock(clock.clone())
//!     .add_command(CommandParams::new("speed", |cmd| {
//!         println!("viewer set speed to {}", cmd.result.value);
//!         Ok(())
//!     }))
//!     .add_data_stream(DataStreamParams::new("score", 10.0).on_submit(|ctx| {
//!         ctx.submit_game_data(b"42")
//!     }))
//!     .on_event(|e| eprintln!("bridge event: {e:?}"))
//!     .build()?;
//!
//! bridge.initialize()?;
//! bridge.start()?;
//!
//! // Deliveries may arrive on any thread...
//! backend.deliver_command(CommandResult::new("speed", "fast"));
//!
//! // ...and are handled on the next tick.
//! for _ in 0..60 {
//!     bridge.update();
//!     clock.advance(Duration::from_millis(16));
//! }
//!
//! bridge.shutdown()?;
//! # Ok::<(), stream_bridge::BridgeError>(())
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Delivery threads**: backend callbacks only push into a queue; they
//!   never run application code
//! - **Push queue**: a short-lived mutex around a `Vec`, swapped out whole at
//!   drain time so handlers never run under the lock
//! - **Tick thread**: polls the backend, drains every queue and fires every
//!   due outbound submission
//! - **Audio thread**: pushes samples into a lock-free ring buffer that the
//!   tick drains at the audio submit rate

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Sample and counter conversions are intentional
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

/// Logs at `info` when `$flag` is set, `debug` otherwise.
macro_rules! verbose {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}

mod backend;
mod builder;
mod channel;
mod config;
mod deadline;
pub mod dispatch;
mod error;
mod event;
mod format;
mod handler;
mod id;
mod manager;
pub mod schema;
mod session;

pub use backend::{Backend, CommandDelivery, EventDelivery, MockBackend, MockCall, Submission};
pub use builder::{SessionManagerBuilder, StreamBridge};
pub use channel::{
    Audio, AudioInput, AudioMode, AudioParams, CommandBinding, CommandHandler, CommandInvocation,
    CommandParams, CommandResult, Commands, Component, DataStreamParams, DataStreams,
    EventBinding, EventHandler, EventInvocation, EventParams, EventResult, EventSummary,
    EventValue, Events, FrameSource, ReceiveChannel, Reduction, StartFn, SubmitContext, SubmitFn,
    Video, VideoParams,
};
pub use config::{BridgeConfig, AUDIO_FORMATS, AUDIO_MODES};
pub use deadline::{check_rate, Clock, Deadline, ManualClock, SystemClock, Tick, MAX_INTERVAL};
pub use dispatch::{ChannelBinding, Dispatcher, DrainReport, InitReport, PendingEntry, Pusher};
pub use error::{BackendError, BridgeError, HandlerError};
pub use event::{event_callback, BridgeEvent, ChannelKind, EventCallback};
pub use format::{f32_to_i16, AudioFormat, AudioSpec};
pub use handler::{command_sender, event_sender, ReceivedCommand, ReceivedEvent};
pub use id::{StreamId, SubscriptionId, UserToken};
pub use manager::{LifecycleState, ManagerCommand, SessionManager};
pub use session::{Session, SessionChannels, SessionStats};
