//! In-memory camera, transport and UI fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::sync::mpsc;

use stl_lib::capture::coordinator::CaptureConfig;
use stl_lib::capture::errors::{MediaError, TransportError};
use stl_lib::capture::media::{MediaDevices, MediaStream};
use stl_lib::capture::types::{
    DeviceInfo, MediaConstraints, ReadyState, Resolution, TrackInfo, TrackState,
};
use stl_lib::controller::{Controller, ControllerHandle};
use stl_lib::preferences::PreferenceStore;
use stl_lib::transport::{FrameMessage, FrameSender, TransportEvent};
use stl_lib::ui::UiEvent;

/// Shared, ordered record of what the fakes did.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct FakeStream {
    pub id: String,
    pub resolution: Option<Resolution>,
    pub stopped: AtomicBool,
    pub enabled: AtomicBool,
    pub stop_calls: AtomicUsize,
    journal: Journal,
}

impl FakeStream {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        vec![TrackInfo {
            id: format!("{}-video", self.id),
            state: if self.is_stopped() {
                TrackState::Ended
            } else {
                TrackState::Live
            },
            enabled: self.enabled.load(Ordering::SeqCst),
        }]
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    fn ready_state(&self) -> ReadyState {
        if self.is_stopped() {
            ReadyState::HaveNothing
        } else {
            ReadyState::HaveEnoughData
        }
    }

    fn current_frame(&self) -> Result<RgbImage, MediaError> {
        let size = self.resolution.unwrap_or(Resolution::new(64, 48));
        Ok(RgbImage::from_pixel(size.width, size.height, Rgb([40, 120, 200])))
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.journal.lock().unwrap().push(format!("stop:{}", self.id));
        }
    }
}

pub struct FakeDevices {
    pub devices: Vec<DeviceInfo>,
    pub resolution: Option<Resolution>,
    pub failure: Mutex<Option<MediaError>>,
    pub requests: Mutex<Vec<MediaConstraints>>,
    pub streams: Mutex<Vec<Arc<FakeStream>>>,
    /// When set, each media request waits for one message before resolving.
    gate: Mutex<Option<std_mpsc::Receiver<()>>>,
    pub journal: Journal,
}

impl FakeDevices {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            resolution: Some(Resolution::new(64, 48)),
            failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn cameras() -> Self {
        Self::new(vec![
            DeviceInfo::video("cam-a", "Front"),
            DeviceInfo::video("cam-b", "Back"),
        ])
    }

    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn failing(self, error: MediaError) -> Self {
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    /// Hold every media request until the returned sender releases it.
    pub fn gated(self) -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        *self.gate.lock().unwrap() = Some(rx);
        (self, tx)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn stream(&self, index: usize) -> Arc<FakeStream> {
        self.streams.lock().unwrap()[index].clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl MediaDevices for FakeDevices {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        Ok(self.devices.clone())
    }

    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        let device_id = constraints.device_id().unwrap_or("default").to_string();
        self.requests.lock().unwrap().push(constraints.clone());
        self.journal
            .lock()
            .unwrap()
            .push(format!("open:{}", device_id));

        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            let _ = gate.recv();
        }

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        let stream = Arc::new(FakeStream {
            id: device_id,
            resolution: self.resolution,
            stopped: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
            journal: self.journal.clone(),
        });
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream as Arc<dyn MediaStream>)
    }
}

/// Records every frame; optionally blocks each send to simulate a slow link.
#[derive(Default)]
pub struct RecordingSender {
    pub frames: Mutex<Vec<FrameMessage>>,
    pub delay: Option<Duration>,
    pub concurrent: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl RecordingSender {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn last_frame(&self) -> Option<FrameMessage> {
        self.frames.lock().unwrap().last().cloned()
    }
}

impl FrameSender for RecordingSender {
    fn send_frame(&self, frame: FrameMessage) -> Result<(), TransportError> {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.frames.lock().unwrap().push(frame);

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub handle: ControllerHandle,
    pub devices: Arc<FakeDevices>,
    pub sender: Arc<RecordingSender>,
    pub transport: mpsc::Sender<TransportEvent>,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
}

impl Harness {
    pub fn start(devices: FakeDevices, sender: RecordingSender, config: CaptureConfig) -> Self {
        Self::start_with_preferences(devices, sender, config, None)
    }

    pub fn start_with_preferences(
        devices: FakeDevices,
        sender: RecordingSender,
        config: CaptureConfig,
        preferences: Option<PreferenceStore>,
    ) -> Self {
        let devices = Arc::new(devices);
        let sender = Arc::new(sender);
        let (transport, transport_rx) = mpsc::channel(16);
        let (ui_tx, ui) = mpsc::unbounded_channel();

        let (controller, handle) = Controller::new(
            devices.clone(),
            sender.clone(),
            transport_rx,
            Arc::new(ui_tx),
            preferences,
            config,
        );
        controller.spawn();

        Self {
            handle,
            devices,
            sender,
            transport,
            ui,
        }
    }

    /// Everything emitted so far.
    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event matching `pred`, returning everything seen on the way.
    pub async fn ui_until<F>(&mut self, pred: F) -> Vec<UiEvent>
    where
        F: Fn(&UiEvent) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.ui.recv())
                .await
                .expect("timed out waiting for UI event")
                .expect("UI channel closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

pub fn config_with_period(period: Duration) -> CaptureConfig {
    CaptureConfig {
        period,
        ..CaptureConfig::default()
    }
}

/// Poll `cond` on real time until it holds or a few seconds pass.
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
