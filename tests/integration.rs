//! Integration tests for stream-bridge.
//!
//! Everything runs against `MockBackend` and a `ManualClock`, so timing is
//! simulated and deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stream_bridge::{
    check_rate, command_sender, AudioParams, BridgeConfig, BridgeError, BridgeEvent, ChannelKind,
    CommandParams, CommandResult, DataStreamParams, Deadline, EventParams, EventResult,
    EventSummary, HandlerError, LifecycleState, ManagerCommand, ManualClock, MockBackend,
    MockCall, Reduction, Session, SessionChannels, StreamBridge, SubscriptionId, UserToken,
    VideoParams,
};
use tokio::sync::mpsc;

fn recorder() -> (Arc<Mutex<Vec<BridgeEvent>>>, impl Fn(BridgeEvent) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |e: BridgeEvent| sink.lock().push(e))
}

#[test]
fn test_score_event_dispatched_once() {
    let backend = Arc::new(MockBackend::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .clock(ManualClock::new())
        .add_event(
            EventParams::new("score", move |event| {
                let value = event.summary.results[0].value(Reduction::Max);
                handler_seen
                    .lock()
                    .push((event.id.to_string(), value, event.token));
                Ok(())
            })
            .with_token(UserToken::new(77)),
        )
        .build()
        .unwrap();
    bridge.initialize().unwrap();

    let summary = EventSummary::new(
        "score",
        vec![EventResult::new(["player1"]).with_value(Reduction::Max, 42.0)],
    );
    assert!(backend.deliver_event(summary));

    bridge.update();
    assert_eq!(
        *seen.lock(),
        vec![("score".to_string(), Some(42.0), UserToken::new(77))]
    );

    bridge.update();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_concurrent_pushes_dispatch_each_entry_once_in_thread_order() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 200;

    let backend = Arc::new(MockBackend::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .add_command(CommandParams::new("input", move |cmd| {
            handler_seen.lock().push(cmd.result.value.clone());
            Ok(())
        }))
        .build()
        .unwrap();
    bridge.initialize().unwrap();

    let pusher = bridge.session().commands().dispatcher().pusher();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pusher = pusher.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    pusher.push(
                        SubscriptionId::new("input"),
                        CommandResult::new("input", format!("{t}:{i}")),
                        UserToken::default(),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    bridge.update();

    let seen = seen.lock();
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    for t in 0..THREADS {
        let prefix = format!("{t}:");
        let order: Vec<usize> = seen
            .iter()
            .filter_map(|v| v.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(order, (0..PER_THREAD).collect::<Vec<_>>());
    }
    assert_eq!(bridge.session().stats().dispatched, (THREADS * PER_THREAD) as u64);
}

#[test]
fn test_failing_data_stream_keeps_scheduling() {
    let backend = Arc::new(MockBackend::new());
    let clock = ManualClock::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let (events, on_event) = recorder();

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .clock(clock.clone())
        .add_data_stream(DataStreamParams::new("telemetry", 30.0).on_submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::custom("encoder offline"))
        }))
        .on_event(on_event)
        .build()
        .unwrap();
    bridge.initialize().unwrap();

    // 2 seconds at 100 Hz.
    for _ in 0..200 {
        bridge.update();
        clock.advance(Duration::from_millis(10));
    }

    let attempts = attempts.load(Ordering::SeqCst);
    assert!((58..=62).contains(&attempts), "attempts = {attempts}");
    assert_eq!(bridge.session().stats().submit_failures, attempts as u64);

    let failures = events
        .lock()
        .iter()
        .filter(|e| {
            matches!(e, BridgeEvent::SubmitFailed { stream_id, .. } if stream_id == "telemetry")
        })
        .count();
    assert_eq!(failures, attempts);
}

#[test]
fn test_rate_with_unrepresentable_period_is_rejected_at_build() {
    assert!(matches!(check_rate(1e-19), Err(BridgeError::InvalidRate { .. })));
    assert!(Deadline::new(1e-19, Instant::now()).is_err());

    let backend = Arc::new(MockBackend::new());
    let result = StreamBridge::builder()
        .backend(backend.clone())
        .add_data_stream(DataStreamParams::new("slow", 1e-19))
        .build();
    assert!(matches!(result, Err(BridgeError::InvalidRate { .. })));
    assert!(backend.calls().is_empty());

    // A day-long period is still accepted and ticks without incident.
    let clock = ManualClock::new();
    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .clock(clock.clone())
        .add_data_stream(DataStreamParams::new("daily", 1.0 / 86_400.0 + 1e-12))
        .build()
        .unwrap();
    bridge.initialize().unwrap();
    for _ in 0..3 {
        bridge.update();
        clock.advance(Duration::from_secs(3600));
    }
    bridge.shutdown().unwrap();
}

#[test]
fn test_subscribe_then_unsubscribe_calls_backend_once_each() {
    let backend = Arc::new(MockBackend::new());
    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .build()
        .unwrap();
    bridge.initialize().unwrap();

    let commands = bridge.session_mut().commands_mut();
    let id = commands
        .subscribe(CommandParams::new("vote", |_| Ok(())))
        .unwrap();
    commands.unsubscribe(&id).unwrap();

    assert!(!commands.dispatcher().is_subscribed(&id));
    assert!(commands.dispatcher().subscription(&id).is_none());
    assert_eq!(
        backend.count_calls(|c| matches!(c, MockCall::SubscribeCommand(s) if s == "vote")),
        1
    );
    assert_eq!(
        backend.count_calls(|c| matches!(c, MockCall::UnsubscribeCommand(s) if s == "vote")),
        1
    );
}

#[test]
fn test_double_initialize_does_not_resubscribe() {
    let backend = Arc::new(MockBackend::new());
    let channels = SessionChannels {
        commands: vec![CommandParams::new("a", |_| Ok(()))],
        events: vec![EventParams::new("b", |_| Ok(()))],
        ..Default::default()
    };
    let mut session = Session::new(backend.clone(), BridgeConfig::default(), channels);

    let now = Instant::now();
    assert!(session.initialize(now));
    assert!(session.initialize(now));

    assert_eq!(backend.count_calls(|c| matches!(c, MockCall::SubscribeCommand(_))), 1);
    assert_eq!(backend.count_calls(|c| matches!(c, MockCall::SubscribeEvent(_))), 1);
}

#[test]
fn test_one_fault_in_batch_does_not_block_the_rest() {
    let backend = Arc::new(MockBackend::new());
    let handled = Arc::new(Mutex::new(Vec::new()));
    let handler_handled = Arc::clone(&handled);
    let (events, on_event) = recorder();

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .add_command(CommandParams::new("move", move |cmd| {
            if cmd.result.value == "3" {
                return Err(HandlerError::custom("illegal move"));
            }
            handler_handled.lock().push(cmd.result.value.clone());
            Ok(())
        }))
        .on_event(on_event)
        .build()
        .unwrap();
    bridge.initialize().unwrap();

    for i in 1..=5 {
        backend.deliver_command(CommandResult::new("move", i.to_string()));
    }
    bridge.update();

    assert_eq!(*handled.lock(), vec!["1", "2", "4", "5"]);
    let stats = bridge.session().stats();
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.dispatch_faults, 1);
    assert!(events.lock().iter().any(|e| matches!(
        e,
        BridgeEvent::DispatchFault { channel: ChannelKind::Commands, id, .. } if id == "move"
    )));
}

#[test]
fn test_deadline_fires_once_per_interval_without_drift() {
    let start = Instant::now();
    let mut deadline = Deadline::new(10.0, start).unwrap();

    let mut fired = 0;
    for ms in 0..1000u64 {
        if deadline.poll(start + Duration::from_millis(ms)) {
            fired += 1;
        }
    }
    assert_eq!(fired, 10);

    // Due times are anchored to the start, not to when each poll happened.
    assert_eq!(deadline.next_due_at(), start + Duration::from_secs(1));
}

#[test]
fn test_full_lifecycle_with_outbound_streams() {
    let backend = Arc::new(MockBackend::new());
    let clock = ManualClock::new();
    let (events, on_event) = recorder();

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .clock(clock.clone())
        .video(
            VideoParams::new("video")
                .with_rate(30.0)
                .with_source(|_| Ok(Some(vec![0u8; 16]))),
        )
        .audio(AudioParams::new("audio"))
        .on_event(on_event)
        .build()
        .unwrap();

    let mut input = bridge.take_audio_input().unwrap();
    bridge.initialize().unwrap();
    bridge.start().unwrap();

    for _ in 0..100 {
        input.push(&[0.25; 96]);
        bridge.update();
        clock.advance(Duration::from_millis(10));
    }

    // One second of ticks: 30 frames, 50 audio submissions.
    assert_eq!(backend.submissions("video").len(), 30);
    assert_eq!(backend.submissions("audio").len(), 50);
    assert_eq!(input.dropped_samples(), 0);

    bridge.shutdown().unwrap();
    assert_eq!(bridge.state(), LifecycleState::Destroyed);
    assert!(!backend.has_stream("video"));
    assert!(!backend.has_stream("audio"));
    assert!(matches!(
        events.lock().last(),
        Some(BridgeEvent::StateChanged {
            to: LifecycleState::Destroyed,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_forwards_commands_until_stopped() {
    let backend = Arc::new(MockBackend::new());
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = mpsc::channel(1);

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .add_command(CommandParams::new("chat", command_sender(cmd_tx)))
        .build()
        .unwrap();

    backend.enqueue_command(CommandResult::new("chat", "hello"));
    backend.enqueue_command(CommandResult::new("chat", "world"));

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(ManagerCommand::Stop).await.unwrap();
    });
    bridge
        .run(Duration::from_millis(16), stop_rx)
        .await
        .unwrap();
    stopper.await.unwrap();

    assert_eq!(bridge.state(), LifecycleState::Destroyed);
    assert_eq!(cmd_rx.recv().await.unwrap().value, "hello");
    assert_eq!(cmd_rx.recv().await.unwrap().value, "world");
    assert!(!backend.has_command_subscription("chat"));
}
