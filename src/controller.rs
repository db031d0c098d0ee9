//! Controller - single owner actor for the capture loop and connection monitor.
//!
//! Architecture:
//! - `ControllerHandle`s send [`Command`]s over `command_tx`
//! - The transport delivers [`TransportEvent`]s over its own channel
//! - Media requests report back over the acquisition channel
//! - One `select!` loop processes all three, so no state is shared between tasks

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::capture::coordinator::{Acquisition, CaptureConfig, CaptureLoop, CaptureStatus};
use crate::capture::errors::{CaptureError, MediaError};
use crate::capture::media::MediaDevices;
use crate::capture::types::DeviceInfo;
use crate::connection::{ConnectionMonitor, ConnectionState};
use crate::preferences::PreferenceStore;
use crate::transport::{FrameSender, TransportEvent};
use crate::ui::UiSink;

#[derive(Debug)]
pub enum Command {
    Start {
        device_id: Option<String>,
        response_tx: oneshot::Sender<Result<(), CaptureError>>,
    },
    Stop {
        response_tx: oneshot::Sender<()>,
    },
    /// Stop when running, start with the preferred camera otherwise.
    Toggle {
        response_tx: oneshot::Sender<Result<(), CaptureError>>,
    },
    SetVisible {
        visible: bool,
    },
    ListDevices {
        response_tx: oneshot::Sender<Result<Vec<DeviceInfo>, MediaError>>,
    },
    Status {
        response_tx: oneshot::Sender<ControllerStatus>,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub capture: CaptureStatus,
    pub connection: ConnectionState,
}

pub struct Controller {
    capture: CaptureLoop,
    monitor: ConnectionMonitor,
    command_rx: mpsc::Receiver<Command>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    acquisition_rx: mpsc::UnboundedReceiver<Acquisition>,
}

impl Controller {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        sender: Arc<dyn FrameSender>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        sink: Arc<dyn UiSink>,
        preferences: Option<PreferenceStore>,
        config: CaptureConfig,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let monitor = ConnectionMonitor::new(sink.clone());
        let (capture, acquisition_rx) = CaptureLoop::new(devices, sender, sink, preferences, config);

        let controller = Self {
            capture,
            monitor,
            command_rx,
            transport_rx,
            acquisition_rx,
        };

        (controller, ControllerHandle { command_tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Main event loop. Run this as a tokio task.
    pub async fn run(mut self) {
        tracing::info!(target: "system", "[CONTROLLER] Starting event loop");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) => {
                            tracing::info!(target: "system", "[CONTROLLER] Shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            tracing::info!(target: "system", "[CONTROLLER] All handles dropped, shutting down");
                            break;
                        }
                    }
                }
                Some(event) = self.transport_rx.recv() => {
                    self.monitor.handle(event);
                }
                Some(acquisition) = self.acquisition_rx.recv() => {
                    self.capture.on_acquisition(acquisition);
                }
            }
        }

        self.capture.stop();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start {
                device_id,
                response_tx,
            } => {
                self.capture.request_start(device_id, Some(response_tx));
            }
            Command::Stop { response_tx } => {
                self.capture.stop();
                let _ = response_tx.send(());
            }
            Command::Toggle { response_tx } => {
                if self.capture.state().is_busy() {
                    self.capture.stop();
                    let _ = response_tx.send(Ok(()));
                } else {
                    self.capture.request_start(None, Some(response_tx));
                }
            }
            Command::SetVisible { visible } => {
                self.capture.set_visible(visible);
            }
            Command::ListDevices { response_tx } => {
                let _ = response_tx.send(self.capture.list_devices());
            }
            Command::Status { response_tx } => {
                let _ = response_tx.send(ControllerStatus {
                    capture: self.capture.status(),
                    connection: self.monitor.state(),
                });
            }
            Command::Shutdown => {}
        }
    }
}

/// Cloneable front door to a running [`Controller`].
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    /// Start capturing. Resolves once the camera is streaming or the attempt failed.
    pub async fn start(&self, device_id: Option<String>) -> Result<(), CaptureError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Start {
            device_id,
            response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| CaptureError::ControllerGone)?
    }

    pub async fn stop(&self) -> Result<(), CaptureError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Stop { response_tx }).await?;
        response_rx.await.map_err(|_| CaptureError::ControllerGone)
    }

    pub async fn toggle(&self) -> Result<(), CaptureError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Toggle { response_tx }).await?;
        response_rx.await.map_err(|_| CaptureError::ControllerGone)?
    }

    pub async fn set_visible(&self, visible: bool) -> Result<(), CaptureError> {
        self.send(Command::SetVisible { visible }).await
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::ListDevices { response_tx }).await?;
        Ok(response_rx.await.map_err(|_| CaptureError::ControllerGone)??)
    }

    pub async fn status(&self) -> Result<ControllerStatus, CaptureError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Status { response_tx }).await?;
        response_rx.await.map_err(|_| CaptureError::ControllerGone)
    }

    pub async fn shutdown(&self) -> Result<(), CaptureError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, cmd: Command) -> Result<(), CaptureError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CaptureError::ControllerGone)
    }
}
