//! Channel adapters.
//!
//! Each adapter is a [`Component`] owned by the [`Session`](crate::Session):
//!
//! - [`Commands`] and [`Events`] receive deliveries through a
//!   [`Dispatcher`](crate::Dispatcher) and drain them once per tick.
//! - [`DataStreams`], [`Video`] and [`Audio`] produce outbound data, each
//!   gated by its own [`Deadline`](crate::Deadline).

mod audio;
mod commands;
mod data;
mod events;
mod receive;
mod video;

pub use audio::{Audio, AudioInput, AudioMode, AudioParams};
pub use commands::{CommandBinding, CommandHandler, CommandInvocation, CommandParams, CommandResult};
pub use data::{DataStreamParams, DataStreams, StartFn, SubmitContext, SubmitFn};
pub use events::{
    EventBinding, EventHandler, EventInvocation, EventParams, EventResult, EventSummary,
    EventValue, Reduction,
};
pub use receive::{Commands, Events, ReceiveChannel};
pub use video::{FrameSource, Video, VideoParams};

use std::time::Instant;

use crate::deadline::Tick;
use crate::error::BridgeError;
use crate::session::SessionStats;

/// Lifecycle shared by every adapter.
///
/// `update` is only called on initialized components, and `terminate` only
/// on components that are initialized, so each is terminated at most once
/// per initialization.
pub trait Component: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Sets up backend resources. `now` anchors periodic schedules.
    ///
    /// A component may be initialized yet report an error, when some of its
    /// subscriptions or streams failed and the rest are usable.
    fn initialize(&mut self, now: Instant) -> Result<(), BridgeError>;

    /// Runs once after a successful session initialization.
    fn start(&mut self) {}

    /// Runs once per tick.
    fn update(&mut self, tick: &Tick);

    /// Releases backend resources.
    fn terminate(&mut self) -> Result<(), BridgeError>;

    /// Returns `true` between `initialize` and `terminate`.
    fn is_initialized(&self) -> bool;

    /// Counters accumulated since construction.
    fn stats(&self) -> SessionStats {
        SessionStats::default()
    }
}
