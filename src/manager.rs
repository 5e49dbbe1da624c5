//! Lifecycle of the backend connection and its session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::channel::AudioInput;
use crate::config::BridgeConfig;
use crate::deadline::Clock;
use crate::error::BridgeError;
use crate::event::{BridgeEvent, EventEmitter};
use crate::session::Session;

/// Where a [`SessionManager`] is in its lifecycle.
///
/// ```text
/// Uninitialized -> Initializing -> Initialized -> Uninitialized
///        \______________________________\____-> Destroying -> Destroyed
/// ```
///
/// `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not connected.
    Uninitialized,
    /// Connecting and initializing the session.
    Initializing,
    /// Connected; ticks are processed.
    Initialized,
    /// Shutting down for good.
    Destroying,
    /// Shut down. No further operations are accepted.
    Destroyed,
}

/// Commands accepted by [`SessionManager::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerCommand {
    /// Leave the tick loop and shut down.
    Stop,
}

/// Owns the backend connection and the session, and drives both per tick.
///
/// Built with [`StreamBridge::builder()`](crate::StreamBridge::builder).
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    session: Session,
    clock: Arc<dyn Clock>,
    config: BridgeConfig,
    state: LifecycleState,
    emitter: EventEmitter,
}

impl SessionManager {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        mut session: Session,
        clock: Arc<dyn Clock>,
        config: BridgeConfig,
        emitter: EventEmitter,
    ) -> Self {
        session.set_reporting(&emitter);
        Self {
            backend,
            session,
            clock,
            config,
            state: LifecycleState::Uninitialized,
            emitter,
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        verbose!(self.config.verbose_log, ?from, ?to, "lifecycle transition");
        self.emitter.emit(BridgeEvent::StateChanged { from, to });
    }

    fn misuse(&self, operation: &'static str) -> BridgeError {
        warn!(state = ?self.state, operation, "lifecycle misuse");
        BridgeError::LifecycleMisuse {
            state: self.state,
            operation,
        }
    }

    /// Connects to the backend and initializes the session.
    ///
    /// A session that only partly initialized is logged; the manager still
    /// becomes `Initialized` and the failed channels are skipped by
    /// [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// - [`BridgeError::LifecycleMisuse`] once shutdown has begun.
    /// - [`BridgeError::BackendFatal`] if the connection fails; the state
    ///   returns to `Uninitialized`.
    pub fn initialize(&mut self) -> Result<(), BridgeError> {
        match self.state {
            LifecycleState::Initialized | LifecycleState::Initializing => return Ok(()),
            LifecycleState::Destroying | LifecycleState::Destroyed => {
                return Err(self.misuse("initialize"));
            }
            LifecycleState::Uninitialized => {}
        }

        self.transition(LifecycleState::Initializing);
        if let Err(err) = self.backend.connect() {
            error!(backend = self.backend.name(), error = %err, "failed to connect");
            self.transition(LifecycleState::Uninitialized);
            return Err(BridgeError::BackendFatal {
                reason: err.to_string(),
            });
        }

        if !self.session.initialize(self.clock.now()) {
            warn!("session initialized with failures; affected channels are skipped");
        }
        self.transition(LifecycleState::Initialized);
        info!(backend = self.backend.name(), "bridge initialized");
        Ok(())
    }

    /// Runs the session's start hooks.
    ///
    /// # Errors
    ///
    /// [`BridgeError::LifecycleMisuse`] unless initialized.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.state != LifecycleState::Initialized {
            return Err(self.misuse("start"));
        }
        self.session.start();
        Ok(())
    }

    /// Processes one tick: polls the backend for deliveries, then updates
    /// the session. Does nothing unless initialized.
    pub fn update(&mut self) {
        if self.state != LifecycleState::Initialized {
            return;
        }

        match self.backend.poll_for_deliveries(self.config.poll_timeout) {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                debug!("backend poll timed out");
                self.emitter.emit(BridgeEvent::BackendTimeout);
            }
            Err(err) => {
                error!(error = %err, "backend poll failed");
                self.emitter.emit(BridgeEvent::PollFailed {
                    reason: err.to_string(),
                });
            }
        }

        self.session.update(self.clock.now());
    }

    /// Terminates the session and disconnects, returning to `Uninitialized`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::LifecycleMisuse`] after shutdown.
    /// - [`BridgeError::PartialFailure`] if any channel failed to terminate,
    ///   or the disconnect error. The state is `Uninitialized` either way.
    pub fn terminate(&mut self) -> Result<(), BridgeError> {
        match self.state {
            LifecycleState::Destroyed => Err(self.misuse("terminate")),
            LifecycleState::Initialized => {
                let result = self.teardown();
                self.transition(LifecycleState::Uninitialized);
                result
            }
            _ => Ok(()),
        }
    }

    /// Terminates if needed and enters the terminal `Destroyed` state.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`terminate`](Self::terminate); the manager is `Destroyed`
    /// regardless.
    pub fn shutdown(&mut self) -> Result<(), BridgeError> {
        if self.state == LifecycleState::Destroyed {
            return Ok(());
        }
        let was_initialized = self.state == LifecycleState::Initialized;
        self.transition(LifecycleState::Destroying);
        let result = if was_initialized { self.teardown() } else { Ok(()) };
        self.transition(LifecycleState::Destroyed);
        info!("bridge shut down");
        result
    }

    fn teardown(&mut self) -> Result<(), BridgeError> {
        let clean = self.session.terminate();
        let disconnected = self.backend.disconnect();
        if let Err(err) = &disconnected {
            error!(backend = self.backend.name(), error = %err, "failed to disconnect");
        }

        if !clean {
            return Err(BridgeError::PartialFailure {
                operation: "terminate",
            });
        }
        disconnected.map_err(|err| BridgeError::from_backend(&err))
    }

    /// Initializes, starts and ticks every `tick` until [`ManagerCommand::Stop`]
    /// arrives or the sender is dropped, then shuts down.
    ///
    /// # Errors
    ///
    /// Initialization or shutdown errors.
    pub async fn run(
        &mut self,
        tick: Duration,
        mut commands: mpsc::Receiver<ManagerCommand>,
    ) -> Result<(), BridgeError> {
        self.initialize()?;
        self.start()?;

        let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(ManagerCommand::Stop) | None => break,
                    }
                }
                _ = interval.tick() => self.update(),
            }
        }

        self.shutdown()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The session, for runtime subscriptions and rate changes.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Takes the pushed-audio producer, if the audio stream is in pushed mode.
    pub fn take_audio_input(&mut self) -> Option<AudioInput> {
        self.session.audio_mut().take_input()
    }

    /// The configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockCall};
    use crate::channel::{CommandParams, CommandResult};
    use crate::deadline::ManualClock;
    use crate::error::BackendError;
    use crate::event::event_callback;
    use crate::session::SessionChannels;
    use parking_lot::Mutex;

    fn manager(backend: &Arc<MockBackend>, channels: SessionChannels) -> SessionManager {
        let session = Session::new(backend.clone(), BridgeConfig::default(), channels);
        SessionManager::new(
            backend.clone(),
            session,
            Arc::new(ManualClock::new()),
            BridgeConfig::default(),
            EventEmitter::default(),
        )
    }

    #[test]
    fn test_initialize_connects_once() {
        let backend = Arc::new(MockBackend::new());
        let mut mgr = manager(&backend, SessionChannels::default());

        mgr.initialize().unwrap();
        mgr.initialize().unwrap();
        assert_eq!(mgr.state(), LifecycleState::Initialized);
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::Connect)), 1);
    }

    #[test]
    fn test_connect_failure_returns_to_uninitialized() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_connect(BackendError::fatal("no service"));
        let mut mgr = manager(&backend, SessionChannels::default());

        let err = mgr.initialize().unwrap_err();
        assert!(matches!(err, BridgeError::BackendFatal { .. }));
        assert_eq!(mgr.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_update_requires_initialized() {
        let backend = Arc::new(MockBackend::new());
        let mut mgr = manager(&backend, SessionChannels::default());
        mgr.update();
        assert!(backend.calls().is_empty());

        mgr.initialize().unwrap();
        mgr.update();
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::Poll(_))), 1);
    }

    #[test]
    fn test_poll_timeout_is_reported_and_tick_continues() {
        let backend = Arc::new(MockBackend::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = Session::new(
            backend.clone(),
            BridgeConfig::default(),
            SessionChannels {
                commands: vec![CommandParams::new("a", |_| Ok(()))],
                ..Default::default()
            },
        );
        let mut mgr = SessionManager::new(
            backend.clone(),
            session,
            Arc::new(ManualClock::new()),
            BridgeConfig::default(),
            EventEmitter::new(Some(event_callback(move |e| sink.lock().push(e)))),
        );
        mgr.initialize().unwrap();

        backend.set_poll_result(Some(BackendError::Timeout));
        backend.deliver_command(CommandResult::new("a", "x"));
        mgr.update();

        assert!(seen.lock().contains(&BridgeEvent::BackendTimeout));
        assert_eq!(mgr.session().stats().dispatched, 1);
    }

    #[test]
    fn test_terminate_then_reinitialize() {
        let backend = Arc::new(MockBackend::new());
        let mut mgr = manager(&backend, SessionChannels::default());
        mgr.initialize().unwrap();
        mgr.terminate().unwrap();
        assert_eq!(mgr.state(), LifecycleState::Uninitialized);
        mgr.terminate().unwrap();

        mgr.initialize().unwrap();
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::Connect)), 2);
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::Disconnect)), 1);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let backend = Arc::new(MockBackend::new());
        let mut mgr = manager(&backend, SessionChannels::default());
        mgr.initialize().unwrap();

        mgr.shutdown().unwrap();
        assert_eq!(mgr.state(), LifecycleState::Destroyed);
        mgr.shutdown().unwrap();

        assert!(matches!(
            mgr.initialize(),
            Err(BridgeError::LifecycleMisuse {
                state: LifecycleState::Destroyed,
                operation: "initialize"
            })
        ));
        assert!(mgr.terminate().is_err());
        assert_eq!(backend.count_calls(|c| matches!(c, MockCall::Disconnect)), 1);
    }

    #[test]
    fn test_state_changes_are_emitted() {
        let backend = Arc::new(MockBackend::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = Session::new(
            backend.clone(),
            BridgeConfig::default(),
            SessionChannels::default(),
        );
        let mut mgr = SessionManager::new(
            backend.clone(),
            session,
            Arc::new(ManualClock::new()),
            BridgeConfig::default(),
            EventEmitter::new(Some(event_callback(move |e| sink.lock().push(e)))),
        );
        mgr.initialize().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                BridgeEvent::StateChanged {
                    from: LifecycleState::Uninitialized,
                    to: LifecycleState::Initializing,
                },
                BridgeEvent::StateChanged {
                    from: LifecycleState::Initializing,
                    to: LifecycleState::Initialized,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_command() {
        let backend = Arc::new(MockBackend::new());
        let mut mgr = manager(&backend, SessionChannels::default());
        let (tx, rx) = mpsc::channel(1);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(95)).await;
            tx.send(ManagerCommand::Stop).await.unwrap();
        });
        mgr.run(Duration::from_millis(10), rx).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(mgr.state(), LifecycleState::Destroyed);
        assert!(backend.count_calls(|c| matches!(c, MockCall::Poll(_))) >= 9);
    }
}
