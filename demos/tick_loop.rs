//! Tick loop example.
//!
//! Drives a bridge against the mock backend for three seconds: viewer
//! commands arrive from a background thread, a score stream is submitted at
//! 10 Hz and synthetic audio is pushed from a fake audio thread.
//!
//! Run with: RUST_LOG=stream_bridge=debug cargo run --example tick_loop

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stream_bridge::{
    AudioParams, BridgeConfig, CommandParams, CommandResult, DataStreamParams, ManagerCommand,
    MockBackend, StreamBridge,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(MockBackend::new());
    let score = Arc::new(AtomicU32::new(0));
    let handler_score = Arc::clone(&score);
    let stream_score = Arc::clone(&score);

    let mut bridge = StreamBridge::builder()
        .backend(backend.clone())
        .with_config(BridgeConfig {
            verbose_log: true,
            ..Default::default()
        })
        .add_command(CommandParams::new("cheer", move |cmd| {
            let total = handler_score.fetch_add(1, Ordering::Relaxed) + 1;
            println!("cheer from {} (total {total})", cmd.result.value);
            Ok(())
        }))
        .add_data_stream(DataStreamParams::new("score", 10.0).on_submit(move |ctx| {
            let payload = format!("{{\"score\":{}}}", stream_score.load(Ordering::Relaxed));
            ctx.submit_game_data(payload.as_bytes())
        }))
        .audio(AudioParams::new("audio"))
        .on_event(|e| tracing::warn!(?e, "bridge event"))
        .build()?;

    // Fake audio thread: 10ms of stereo silence every 10ms.
    let mut input = bridge.take_audio_input().ok_or("audio input unavailable")?;
    thread::spawn(move || loop {
        input.push(&[0.0; 960]);
        thread::sleep(Duration::from_millis(10));
    });

    // Viewer commands arrive on the backend's own thread.
    let viewers = backend.clone();
    thread::spawn(move || {
        for viewer in ["ana", "bo", "cy", "dee"] {
            thread::sleep(Duration::from_millis(500));
            viewers.enqueue_command(CommandResult::new("cheer", viewer));
        }
    });

    let (stop_tx, stop_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let _ = stop_tx.send(ManagerCommand::Stop).await;
    });

    bridge.run(Duration::from_millis(16), stop_rx).await?;

    println!("score submissions: {}", backend.submissions("score").len());
    println!("audio submissions: {}", backend.submissions("audio").len());
    println!("stats: {:?}", bridge.session().stats());

    Ok(())
}
