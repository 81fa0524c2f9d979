//! EasyRec recorder host
//!
//! Serves the recorder's method-call surface over stdin/stdout: one call per
//! input line, one JSON reply per output line. Logs go to stderr and the log
//! file so stdout stays machine-readable.

use anyhow::{Context, Result};
use serde_json::json;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use easyrec::bridge::{BridgeReply, MethodCall, RecorderBridge, CHANNEL_NAME};
use easyrec::capture::{RecorderEvent, ScreenRecorder};
use easyrec::config::Config;
use easyrec::desktop::DesktopPlatform;
use easyrec::logging;

/// Input for the host loop
#[derive(Debug)]
enum HostCommand {
    Line(String),
    Shutdown,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config_override = args
        .iter()
        .position(|a| a == "--config" || a == "-c")
        .map(|i| args.get(i + 1).map(PathBuf::from).context("--config needs a path"))
        .transpose()?;

    let _log_guard = logging::init_logging()?;
    info!("EasyRec recorder starting...");

    let config = match &config_override {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path());

    let runtime = tokio::runtime::Runtime::new()?;

    let platform = Arc::new(DesktopPlatform::new(&config));
    let recorder = Arc::new(ScreenRecorder::new(
        platform.clone(),
        config.base_directory()?,
    ));
    let bridge = RecorderBridge::new(recorder.clone());

    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_handle = runtime.handle().clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_handle.spawn(async move {
            let _ = tx.send(HostCommand::Shutdown).await;
        });
    })?;

    // Blocking stdin reads stay off the runtime so shutdown never waits on them
    let stdin_tx = cmd_tx.clone();
    std::thread::Builder::new()
        .name("easyrec-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if stdin_tx.blocking_send(HostCommand::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            let _ = stdin_tx.blocking_send(HostCommand::Shutdown);
        })?;

    runtime.spawn(log_events(recorder.subscribe()));

    info!("Serving '{}' on stdin/stdout", CHANNEL_NAME);
    runtime.block_on(serve(bridge, platform.clone(), cmd_rx));

    // Anything still waiting on consent resolves as cancelled
    platform.dismiss_consent();
    if let Some(stopped) = recorder.stop_recording() {
        match &stopped.stop_error {
            None => info!("Recording saved to {:?}", stopped.output_path),
            Some(e) => warn!("Recording {:?} stopped with error: {}", stopped.output_path, e),
        }
    }

    drop(cmd_tx);
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    info!("Shutdown complete");
    Ok(())
}

async fn serve(
    bridge: RecorderBridge,
    platform: Arc<DesktopPlatform>,
    mut cmd_rx: mpsc::Receiver<HostCommand>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let line = match cmd {
            HostCommand::Line(line) => line,
            HostCommand::Shutdown => break,
        };

        let trimmed = line.trim();
        match trimmed {
            "" => continue,
            "allow" | "deny" => {
                if !platform.answer_consent(trimmed == "allow") {
                    warn!("No consent request is waiting");
                }
                continue;
            }
            _ => {}
        }

        let call = match MethodCall::from_line(trimmed) {
            Ok(call) => call,
            Err(e) => {
                warn!("Unparseable input {:?}: {}", trimmed, e);
                emit(json!({ "error": format!("invalid input: {}", e) }));
                continue;
            }
        };

        // Calls run concurrently so a pending start does not block the rest
        let bridge = bridge.clone();
        tokio::spawn(async move {
            let method = call.method.clone();
            let reply = bridge.handle(call).await;
            emit_reply(&method, &reply);
        });
    }
}

fn emit_reply(method: &str, reply: &BridgeReply) {
    emit(json!({ "method": method, "reply": reply }));
}

fn emit(value: serde_json::Value) {
    println!("{}", value);
}

async fn log_events(mut events: broadcast::Receiver<RecorderEvent>) {
    loop {
        match events.recv().await {
            Ok(RecorderEvent::ConsentRequested { request_id }) => {
                info!(
                    "Consent request {} waiting: type 'allow' or 'deny'",
                    request_id
                );
            }
            Ok(RecorderEvent::Started {
                session_id,
                output_path,
            }) => info!("Recording {} started -> {:?}", session_id, output_path),
            Ok(RecorderEvent::Paused) => info!("Recording paused"),
            Ok(RecorderEvent::Resumed) => info!("Recording resumed"),
            Ok(RecorderEvent::Stopped {
                session_id,
                output_path,
                clean,
            }) => info!(
                "Recording {} stopped (clean: {}) -> {:?}",
                session_id, clean, output_path
            ),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event logger lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_help() {
    println!("easyrec - Screen recorder with microphone audio");
    println!();
    println!("USAGE:");
    println!("    easyrec [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -c, --config <PATH>   Use this config file instead of the default");
    println!();
    println!("INPUT (one per line on stdin):");
    println!("    startRecording {{\"width\":1280,\"height\":720,\"fps\":30,\"includeMicrophoneAudio\":true}}");
    println!("    stopRecording | pauseRecording | resumeRecording | getStatus");
    println!("    {{\"method\":\"getStatus\",\"arguments\":null}}");
    println!("    allow | deny          Answer a pending screen capture request");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG              Set log level (e.g., debug, info, warn)");
    println!("    EASYREC_LOG_PATH      Override the log directory");
}
