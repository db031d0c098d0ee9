//! CaptureLoop - single owner of the camera session, capture buffer and sampling timer.
//!
//! Architecture:
//! - Callers drive the loop with `request_start`, `stop` and `set_visible`
//! - Media requests run on the blocking pool and report back through an
//!   [`Acquisition`] channel; the owner feeds each outcome to `on_acquisition`
//! - Every change goes through [`transition`] and the returned [`SideEffect`]s are
//!   executed here, in order
//! - Dropping the loop performs the same teardown as `stop`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::buffer::CaptureBuffer;
use super::devices::{choose_device, video_inputs, DeviceChoice};
use super::errors::{CaptureError, MediaError};
use super::media::{MediaDevices, MediaSession, MediaStream};
use super::sampler::{lock_buffer, Sampler, SamplerStats, SamplingTimer};
use super::state::{transition, CaptureEvent, CaptureState, SideEffect};
use super::types::{
    CaptureTarget, DeviceInfo, MediaConstraints, Resolution, DEFAULT_JPEG_QUALITY,
    DEFAULT_SAMPLE_PERIOD,
};
use crate::preferences::PreferenceStore;
use crate::transport::FrameSender;
use crate::ui::{UiEvent, UiSink};

pub type StartResponder = oneshot::Sender<Result<(), CaptureError>>;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub period: Duration,
    pub quality: u8,
    pub target: CaptureTarget,
    /// Disable tracks and skip ticks while the host is hidden.
    pub pause_when_hidden: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_SAMPLE_PERIOD,
            quality: DEFAULT_JPEG_QUALITY,
            target: CaptureTarget::default(),
            pause_when_hidden: true,
        }
    }
}

/// A stream obtained for the chosen device.
pub struct AcquiredStream {
    pub stream: Arc<dyn MediaStream>,
    pub choice: DeviceChoice,
}

/// Result of one media request, tagged with the request it answers.
pub struct Acquisition {
    pub seq: u64,
    pub result: Result<AcquiredStream, MediaError>,
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match &self.result {
            Ok(acquired) => format!("Ok({})", acquired.stream.id()),
            Err(e) => format!("Err({})", e),
        };
        f.debug_struct("Acquisition")
            .field("seq", &self.seq)
            .field("result", &result)
            .finish()
    }
}

/// Capture status for the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_active: bool,
    pub is_acquiring: bool,
    pub is_paused: bool,
    pub session_id: Option<String>,
    pub device: Option<DeviceInfo>,
    pub resolution: Option<Resolution>,
    pub frames_sent: u64,
    pub failures: u64,
    pub dropped_in_flight: u64,
    pub elapsed_seconds: f64,
}

pub struct CaptureLoop {
    devices: Arc<dyn MediaDevices>,
    sender: Arc<dyn FrameSender>,
    sink: Arc<dyn UiSink>,
    preferences: Option<PreferenceStore>,
    config: CaptureConfig,
    state: CaptureState,
    session: Option<MediaSession>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    timer: Option<SamplingTimer>,
    visible: bool,
    next_seq: u64,
    pending_seq: Option<u64>,
    pending_starts: Vec<StartResponder>,
    pending_choice: Option<DeviceChoice>,
    acquisition_tx: mpsc::UnboundedSender<Acquisition>,
}

impl CaptureLoop {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        sender: Arc<dyn FrameSender>,
        sink: Arc<dyn UiSink>,
        preferences: Option<PreferenceStore>,
        config: CaptureConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Acquisition>) {
        let (acquisition_tx, acquisition_rx) = mpsc::unbounded_channel();

        let capture = Self {
            devices,
            sender,
            sink,
            preferences,
            config,
            state: CaptureState::Idle,
            session: None,
            buffer: Arc::new(Mutex::new(CaptureBuffer::empty())),
            timer: None,
            visible: true,
            next_seq: 0,
            pending_seq: None,
            pending_starts: Vec::new(),
            pending_choice: None,
            acquisition_tx,
        };

        (capture, acquisition_rx)
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn session(&self) -> Option<&MediaSession> {
        self.session.as_ref()
    }

    pub fn buffer(&self) -> Arc<Mutex<CaptureBuffer>> {
        self.buffer.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Begin a start attempt. A no-op while active on the same device or while the
    /// same request is pending; the responder then resolves with the current outcome.
    pub fn request_start(&mut self, device_id: Option<String>, responder: Option<StartResponder>) {
        tracing::info!(target: "capture", "[LOOP] Start requested (device: {:?})", device_id);

        self.apply(CaptureEvent::StartRequested { device_id });

        let Some(responder) = responder else {
            return;
        };
        // A start from any state lands in Acquiring or Active.
        if matches!(self.state, CaptureState::Active { .. }) {
            let _ = responder.send(Ok(()));
        } else {
            self.pending_starts.push(responder);
        }
    }

    /// Feed back the outcome of a media request.
    pub fn on_acquisition(&mut self, acquisition: Acquisition) {
        if self.pending_seq != Some(acquisition.seq) {
            if let Ok(acquired) = acquisition.result {
                tracing::info!(
                    target: "capture",
                    "[LOOP] Releasing late stream {} from cancelled request {}",
                    acquired.stream.id(),
                    acquisition.seq
                );
                acquired.stream.stop();
            }
            return;
        }
        self.pending_seq = None;

        match acquisition.result {
            Ok(AcquiredStream { stream, choice }) => {
                let session =
                    MediaSession::new(stream, choice.device.clone(), self.config.target);
                let event = CaptureEvent::StreamAcquired {
                    device_id: choice.device.device_id.clone(),
                    resolution: session.resolution(),
                };

                tracing::info!(
                    target: "capture",
                    "[LOOP] Stream acquired: {} at {}",
                    choice.device.label,
                    session.resolution()
                );

                if let Some(previous) = self.session.replace(session) {
                    tracing::warn!(target: "capture", "[LOOP] Replacing an unreleased session {}", previous.id());
                }
                self.pending_choice = Some(choice);
                self.apply(event);

                for responder in self.pending_starts.drain(..) {
                    let _ = responder.send(Ok(()));
                }
            }
            Err(error) => {
                tracing::error!(target: "capture", "[LOOP] Acquisition failed: {}", error);

                self.apply(CaptureEvent::AcquisitionFailed {
                    error: error.clone(),
                });

                for responder in self.pending_starts.drain(..) {
                    let _ = responder.send(Err(error.clone().into()));
                }
            }
        }
    }

    /// Stop capturing. Synchronous: once this returns no further tick starts and
    /// every track is released.
    pub fn stop(&mut self) {
        if self.state.is_busy() {
            tracing::info!(target: "capture", "[LOOP] Stop requested");
        }
        self.apply(CaptureEvent::StopRequested);
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;

        if !self.config.pause_when_hidden {
            return;
        }

        tracing::debug!(target: "capture", "[LOOP] Visibility changed (visible: {})", visible);
        self.apply_visibility();
        if self.state.is_active() {
            self.emit_state_change();
        }
    }

    /// Video inputs currently available, with fallback labels.
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        Ok(video_inputs(self.devices.enumerate_devices()?))
    }

    pub fn status(&self) -> CaptureStatus {
        self.status_for(&self.state)
    }

    fn apply(&mut self, event: CaptureEvent) {
        let (new_state, effects) = transition(self.state.clone(), event);
        self.state = new_state;

        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::AcquireStream { device_id } => self.acquire_stream(device_id),
            SideEffect::CancelAcquisition => self.cancel_acquisition(),
            SideEffect::ReleaseStream => self.release_stream(),
            SideEffect::SizeBuffer { resolution } => {
                lock_buffer(&self.buffer).resize(resolution);
            }
            SideEffect::ClearBuffer => lock_buffer(&self.buffer).clear(),
            SideEffect::BindPreview => self.bind_preview(),
            SideEffect::ClearPreview => self.sink.emit(UiEvent::PreviewCleared),
            SideEffect::StartSampling => self.start_sampling(),
            SideEffect::StopSampling => self.stop_sampling(),
            SideEffect::PersistDevice => self.persist_device(),
            SideEffect::SurfaceError { message } => self.sink.emit(UiEvent::Error(message)),
            SideEffect::EmitStateChange { .. } => self.emit_state_change(),
        }
    }

    fn acquire_stream(&mut self, device_id: Option<String>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending_seq = Some(seq);

        let devices = self.devices.clone();
        let preferences = self.preferences.clone();
        let target = self.config.target;
        let tx = self.acquisition_tx.clone();

        tracing::debug!(target: "capture", "[LOOP] Issuing media request {}", seq);

        tokio::task::spawn_blocking(move || {
            let saved = preferences.as_ref().and_then(PreferenceStore::last_camera_id);
            let result = acquire(devices.as_ref(), device_id.as_deref(), saved.as_deref(), target);

            if let Err(rejected) = tx.send(Acquisition { seq, result }) {
                if let Ok(acquired) = rejected.0.result {
                    acquired.stream.stop();
                }
            }
        });
    }

    fn cancel_acquisition(&mut self) {
        if let Some(seq) = self.pending_seq.take() {
            tracing::info!(target: "capture", "[LOOP] Cancelled media request {}", seq);
        }
        for responder in self.pending_starts.drain(..) {
            let _ = responder.send(Err(CaptureError::Cancelled));
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::info!(target: "capture", "[LOOP] Releasing session {}", session.id());
            session.release();
        }
        self.pending_choice = None;
    }

    fn bind_preview(&self) {
        let Some(session) = &self.session else {
            return;
        };
        let Some(stream) = session.stream() else {
            return;
        };
        self.sink.emit(UiEvent::PreviewBound {
            stream_id: stream.id().to_string(),
            resolution: session.resolution(),
        });
    }

    fn start_sampling(&mut self) {
        self.stop_sampling();

        let Some(stream) = self.session.as_ref().and_then(|s| s.stream()).cloned() else {
            tracing::error!(target: "capture", "[LOOP] No stream to sample");
            return;
        };

        let sampler = Sampler::new(
            stream,
            self.buffer.clone(),
            self.sender.clone(),
            self.config.quality,
        );
        self.timer = Some(SamplingTimer::spawn(sampler, self.config.period));
        self.apply_visibility();

        tracing::info!(
            target: "capture",
            "[LOOP] Sampling every {}ms at quality {}",
            self.config.period.as_millis(),
            self.config.quality
        );
    }

    fn stop_sampling(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
            let stats = timer.sampler().stats();
            tracing::info!(
                target: "capture",
                "[LOOP] Sampling stopped (sent: {}, failures: {}, dropped: {})",
                stats.frames_sent,
                stats.failures,
                stats.dropped_in_flight
            );
        }
    }

    fn apply_visibility(&self) {
        let paused = self.config.pause_when_hidden && !self.visible;

        if let Some(timer) = &self.timer {
            timer.sampler().set_paused(paused);
        }
        if let Some(session) = &self.session {
            session.set_enabled(!paused);
        }
    }

    fn persist_device(&mut self) {
        let Some(choice) = self.pending_choice.take() else {
            return;
        };

        if let Some(missing) = &choice.fell_back_from {
            tracing::warn!(target: "capture", "[LOOP] Saved camera {} not found, using {}", missing, choice.device.label);
            self.sink.emit(UiEvent::Notice(format!(
                "A câmera salva não está mais disponível, usando {}",
                choice.device.label
            )));
        }

        let Some(preferences) = &self.preferences else {
            return;
        };
        if let Err(e) = preferences.remember_camera(&choice.device) {
            tracing::warn!(target: "capture", "[LOOP] Failed to save camera preference: {}", e);
        }
    }

    fn emit_state_change(&self) {
        let status = self.status();
        tracing::debug!(target: "capture", "[LOOP] State change: {:?}", status);
        self.sink.emit(UiEvent::CaptureStateChanged(status));
    }

    fn status_for(&self, state: &CaptureState) -> CaptureStatus {
        let stats = self
            .timer
            .as_ref()
            .map(|t| t.sampler().stats())
            .unwrap_or_else(SamplerStats::default);
        let elapsed_seconds = state.elapsed().map_or(0.0, |d| d.as_secs_f64());

        match state {
            CaptureState::Idle => CaptureStatus::default(),
            CaptureState::Acquiring { .. } => CaptureStatus {
                is_acquiring: true,
                elapsed_seconds,
                ..CaptureStatus::default()
            },
            CaptureState::Active { resolution, .. } => CaptureStatus {
                is_active: true,
                is_acquiring: false,
                is_paused: self.config.pause_when_hidden && !self.visible,
                session_id: self.session.as_ref().map(|s| s.id().to_string()),
                device: self.session.as_ref().map(|s| s.device().clone()),
                resolution: Some(*resolution),
                frames_sent: stats.frames_sent,
                failures: stats.failures,
                dropped_in_flight: stats.dropped_in_flight,
                elapsed_seconds,
            },
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.state.is_busy() {
            tracing::info!(target: "capture", "[LOOP] Teardown");
        }
        self.apply(CaptureEvent::Teardown);
    }
}

/// Resolve the device and open it. Runs on the blocking pool.
fn acquire(
    devices: &dyn MediaDevices,
    requested: Option<&str>,
    saved: Option<&str>,
    target: CaptureTarget,
) -> Result<AcquiredStream, MediaError> {
    let available = video_inputs(devices.enumerate_devices()?);
    let choice = choose_device(&available, requested, saved)?;
    let constraints = MediaConstraints::new(Some(choice.device.device_id.clone()), target);
    let stream = devices.get_user_media(&constraints)?;

    Ok(AcquiredStream { stream, choice })
}
