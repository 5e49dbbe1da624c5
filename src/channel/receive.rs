//! Dispatcher-backed inbound adapters.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::Backend;
use crate::deadline::Tick;
use crate::dispatch::{ChannelBinding, Dispatcher};
use crate::error::BridgeError;
use crate::event::EventEmitter;
use crate::id::SubscriptionId;
use crate::session::SessionStats;

use super::commands::{CommandBinding, CommandParams};
use super::events::{EventBinding, EventParams};
use super::Component;

/// An inbound adapter: the configured subscriptions plus their dispatcher.
///
/// Initialization subscribes every configured id; each tick drains the
/// dispatcher. Subscriptions added at runtime are remembered and restored
/// by the next initialization.
pub struct ReceiveChannel<B: ChannelBinding> {
    dispatcher: Dispatcher<B>,
    settings: Vec<B::Params>,
    stats: SessionStats,
}

/// Inbound command adapter.
pub type Commands = ReceiveChannel<CommandBinding>;

/// Inbound event-summary adapter.
pub type Events = ReceiveChannel<EventBinding>;

impl Commands {
    /// Creates a command adapter for the given subscriptions.
    pub fn new(backend: Arc<dyn Backend>, settings: Vec<CommandParams>) -> Self {
        Self::from_binding(CommandBinding::new(backend), settings)
    }
}

impl Events {
    /// Creates an event adapter for the given subscriptions.
    pub fn new(backend: Arc<dyn Backend>, settings: Vec<EventParams>) -> Self {
        Self::from_binding(EventBinding::new(backend), settings)
    }
}

impl<B> ReceiveChannel<B>
where
    B: ChannelBinding,
    B::Params: Clone,
{
    /// Creates an adapter over any binding.
    pub fn from_binding(binding: B, settings: Vec<B::Params>) -> Self {
        Self {
            dispatcher: Dispatcher::new(binding),
            settings,
            stats: SessionStats::default(),
        }
    }

    pub(crate) fn set_reporting(&mut self, emitter: EventEmitter, verbose: bool) {
        self.dispatcher.set_reporting(emitter, verbose);
    }

    /// Adds a subscription at runtime.
    ///
    /// The subscription is remembered only once the dispatcher accepts it.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::subscribe`].
    pub fn subscribe(&mut self, params: B::Params) -> Result<SubscriptionId, BridgeError> {
        let id = self.dispatcher.subscribe(params.clone())?;
        if !self.settings.iter().any(|p| B::subscription_id(p) == id) {
            self.settings.push(params);
        }
        Ok(id)
    }

    /// Removes a subscription at runtime.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::unsubscribe`].
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), BridgeError> {
        self.settings.retain(|p| B::subscription_id(p) != *id);
        self.dispatcher.unsubscribe(id)
    }

    /// Configured subscriptions.
    pub fn settings(&self) -> &[B::Params] {
        &self.settings
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }
}

impl<B> Component for ReceiveChannel<B>
where
    B: ChannelBinding + Send,
    B::Params: Clone + Send,
{
    fn name(&self) -> &'static str {
        B::KIND.as_str()
    }

    fn initialize(&mut self, _now: Instant) -> Result<(), BridgeError> {
        let report = self.dispatcher.initialize(self.settings.clone());
        match report.failed.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    fn update(&mut self, _tick: &Tick) {
        let report = self.dispatcher.drain();
        self.stats.dispatched += report.dispatched as u64;
        self.stats.dispatch_faults += report.faults.len() as u64;
    }

    fn terminate(&mut self) -> Result<(), BridgeError> {
        self.dispatcher.terminate()
    }

    fn is_initialized(&self) -> bool {
        self.dispatcher.is_initialized()
    }

    fn stats(&self) -> SessionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::channel::CommandResult;
    use crate::deadline::{Clock, ManualClock};
    use crate::error::HandlerError;

    fn tick(clock: &ManualClock) -> Tick {
        Tick::new(clock.now(), clock.now())
    }

    #[test]
    fn test_partial_subscribe_failure_still_initializes() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_subscribe("b");
        let mut commands = Commands::new(
            backend.clone(),
            vec![
                CommandParams::new("a", |_| Ok(())),
                CommandParams::new("b", |_| Ok(())),
            ],
        );

        let err = commands.initialize(Instant::now()).unwrap_err();
        assert!(matches!(err, BridgeError::SubscribeFailed { .. }));
        assert!(commands.is_initialized());
        assert!(backend.has_command_subscription("a"));
    }

    #[test]
    fn test_update_drains_and_counts() {
        let backend = Arc::new(MockBackend::new());
        let clock = ManualClock::new();
        let mut commands = Commands::new(
            backend.clone(),
            vec![CommandParams::new("a", |cmd| {
                if cmd.result.value == "bad" {
                    return Err(HandlerError::custom("bad value"));
                }
                Ok(())
            })],
        );
        commands.initialize(clock.now()).unwrap();

        backend.deliver_command(CommandResult::new("a", "ok"));
        backend.deliver_command(CommandResult::new("a", "bad"));
        commands.update(&tick(&clock));

        let stats = commands.stats();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.dispatch_faults, 1);
    }

    #[test]
    fn test_subscribe_before_initialize_is_not_remembered() {
        let backend = Arc::new(MockBackend::new());
        let mut commands = Commands::new(backend.clone(), Vec::new());

        let err = commands
            .subscribe(CommandParams::new("early", |_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotInitialized { .. }));
        assert!(commands.settings().is_empty());

        commands.initialize(Instant::now()).unwrap();
        assert!(!backend.has_command_subscription("early"));
    }

    #[test]
    fn test_rejected_subscribe_is_not_remembered() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_subscribe("vote");
        let mut commands = Commands::new(backend.clone(), Vec::new());
        commands.initialize(Instant::now()).unwrap();

        assert!(commands.subscribe(CommandParams::new("vote", |_| Ok(()))).is_err());
        assert!(commands.settings().is_empty());
    }

    #[test]
    fn test_runtime_subscription_survives_reinitialize() {
        let backend = Arc::new(MockBackend::new());
        let mut commands = Commands::new(backend.clone(), Vec::new());
        commands.initialize(Instant::now()).unwrap();
        commands.subscribe(CommandParams::new("late", |_| Ok(()))).unwrap();

        commands.terminate().unwrap();
        assert!(!backend.has_command_subscription("late"));

        commands.initialize(Instant::now()).unwrap();
        assert!(backend.has_command_subscription("late"));
        assert_eq!(commands.settings().len(), 1);
    }
}
