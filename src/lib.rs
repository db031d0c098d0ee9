pub mod capture;
pub mod connection;
pub mod controller;
pub mod logging;
pub mod preferences;
pub mod settings;
pub mod shared;
pub mod transport;
pub mod ui;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use capture::coordinator::CaptureConfig;
use capture::ffmpeg::{check_ffmpeg, FfmpegDevices};
use controller::{Controller, ControllerHandle};
use preferences::PreferenceStore;
use settings::{load_settings, AppSettings};
use transport::socket::{SocketClient, SocketConfig};
use ui::UiEvent;

pub fn run() {
    let _logging_guards = match logging::init_logging() {
        Ok(guards) => Some(guards),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(target: "system", "Failed to start runtime: {}", e);
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(load_settings()));
}

async fn serve(settings: AppSettings) {
    if let Err(e) = check_ffmpeg("ffmpeg") {
        tracing::warn!(target: "system", "{}; camera capture will fail", e);
    }

    let preferences = PreferenceStore::open_default();
    match preferences.record_visit() {
        Ok(prefs) => {
            tracing::info!(target: "system", "[PREFS] Session {} (last camera: {:?})", prefs.session_count, prefs.camera_label)
        }
        Err(e) => tracing::warn!(target: "system", "[PREFS] Failed to record visit: {}", e),
    }

    let (socket, sender, transport_rx) = SocketClient::connect(SocketConfig::new(&settings.server_url));
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let (controller, handle) = Controller::new(
        Arc::new(FfmpegDevices::new(&settings.ffmpeg_input_format)),
        Arc::new(sender),
        transport_rx,
        Arc::new(ui_tx),
        Some(preferences),
        CaptureConfig {
            period: settings.sample_period(),
            quality: settings.jpeg_quality,
            target: settings.capture_target(),
            pause_when_hidden: settings.pause_when_hidden,
        },
    );
    let controller_task = controller.spawn();
    let printer = tokio::spawn(print_events(ui_rx));

    read_commands(handle).await;

    if let Err(e) = controller_task.await {
        tracing::error!(target: "system", "[CONTROLLER] Task failed: {}", e);
    }
    socket.shutdown();
    printer.abort();
}

/// Write each UI event to stdout as one JSON line.
async fn print_events(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(target: "system", "Failed to serialize UI event: {}", e),
        }
    }
}

async fn read_commands(handle: ControllerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(target: "system", "Failed to read stdin: {}", e);
                break;
            }
        };

        let mut words = line.split_whitespace();
        let result = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("start"), device) => handle.start(device.map(str::to_string)).await,
            (Some("stop"), _) => handle.stop().await,
            (Some("toggle"), _) => handle.toggle().await,
            (Some("hide"), _) => handle.set_visible(false).await,
            (Some("show"), _) => handle.set_visible(true).await,
            (Some("devices"), _) => handle.list_devices().await.map(|devices| {
                for device in devices {
                    println!("{}\t{}", device.device_id, device.label);
                }
            }),
            (Some("status"), _) => handle.status().await.map(|status| {
                match serde_json::to_string(&status.capture) {
                    Ok(json) => println!("{:?} {}", status.connection, json),
                    Err(e) => eprintln!("{}", e),
                }
            }),
            (Some("quit" | "exit"), _) => break,
            (Some(other), _) => {
                eprintln!(
                    "Comando desconhecido: {} (start [device], stop, toggle, hide, show, devices, status, quit)",
                    other
                );
                continue;
            }
        };

        if let Err(e) = result {
            eprintln!("{}", e.readable());
        }
    }

    let _ = handle.shutdown().await;
}
