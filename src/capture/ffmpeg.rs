//! V4L2 camera backend reading raw RGB frames from an `ffmpeg` child process.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use uuid::Uuid;

use super::errors::MediaError;
use super::media::{MediaDevices, MediaStream};
use super::types::{
    DeviceInfo, DeviceKind, MediaConstraints, ReadyState, Resolution, TrackInfo, TrackState,
};

const FIRST_FRAME_POLL: Duration = Duration::from_millis(20);
const STDERR_TAIL_LINES: usize = 8;
const EBUSY: i32 = 16;

pub fn check_ffmpeg(binary: &str) -> Result<(), MediaError> {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|_| MediaError::Other(format!("{} not found in PATH", binary)))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FfmpegDevices {
    ffmpeg: String,
    input_format: String,
    dev_dir: PathBuf,
    sysfs_dir: PathBuf,
}

impl FfmpegDevices {
    pub fn new(input_format: impl Into<String>) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            input_format: input_format.into(),
            dev_dir: PathBuf::from("/dev"),
            sysfs_dir: PathBuf::from("/sys/class/video4linux"),
        }
    }

    /// Look for device nodes and their names under other roots.
    pub fn with_roots(mut self, dev_dir: impl Into<PathBuf>, sysfs_dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dev_dir.into();
        self.sysfs_dir = sysfs_dir.into();
        self
    }

    pub fn with_binary(mut self, ffmpeg: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn device_label(&self, node: &str) -> String {
        fs::read_to_string(self.sysfs_dir.join(node).join("name"))
            .map(|name| name.trim().to_string())
            .unwrap_or_default()
    }

    fn spawn_args(&self, device: &Path, constraints: &MediaConstraints) -> Vec<String> {
        let resolution = constraints.ideal_resolution();
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
            "-input_format".to_string(),
            self.input_format.clone(),
            "-i".to_string(),
            device.to_string_lossy().into_owned(),
            "-vf".to_string(),
            format!(
                "scale={}:{},fps={}",
                resolution.width,
                resolution.height,
                constraints.ideal_frame_rate()
            ),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

impl MediaDevices for FfmpegDevices {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        let entries = match fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries,
            Err(e) => return Err(classify_io_error(&e)),
        };

        let mut nodes: Vec<(u32, String)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let index = name.strip_prefix("video")?.parse::<u32>().ok()?;
                Some((index, name))
            })
            .collect();
        nodes.sort();

        Ok(nodes
            .into_iter()
            .map(|(_, node)| DeviceInfo {
                device_id: self.dev_dir.join(&node).to_string_lossy().into_owned(),
                label: self.device_label(&node),
                kind: DeviceKind::VideoInput,
            })
            .collect())
    }

    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        let resolution = constraints.ideal_resolution();
        if resolution.width == 0 || resolution.height == 0 {
            return Err(MediaError::ConstraintsUnsupported {
                constraint: format!("resolution {}", resolution),
            });
        }

        let device = match constraints.device_id() {
            Some(id) => PathBuf::from(id),
            None => self
                .enumerate_devices()?
                .into_iter()
                .next()
                .map(|d| PathBuf::from(d.device_id))
                .ok_or(MediaError::DeviceNotFound)?,
        };

        fs::File::open(&device).map_err(|e| classify_io_error(&e))?;

        let args = self.spawn_args(&device, constraints);
        tracing::info!(target: "capture", "[FFMPEG] Spawning: {} {}", self.ffmpeg, args.join(" "));

        let child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MediaError::Other(format!("{} not found in PATH", self.ffmpeg))
                }
                _ => MediaError::Other(format!("Failed to spawn {}: {}", self.ffmpeg, e)),
            })?;

        let stream = FfmpegStream::start(child, resolution)?;
        stream.wait_for_first_frame()?;

        tracing::info!(target: "capture", "[FFMPEG] Streaming {} from {:?}", stream.resolution, device);
        Ok(Arc::new(stream))
    }
}

struct FrameSlot {
    latest: Mutex<Option<RgbImage>>,
    frames: AtomicU64,
    enabled: AtomicBool,
    stopped: AtomicBool,
    stderr_tail: Mutex<Vec<String>>,
}

pub struct FfmpegStream {
    id: String,
    resolution: Resolution,
    child: Mutex<Option<Child>>,
    slot: Arc<FrameSlot>,
}

impl FfmpegStream {
    fn start(mut child: Child, resolution: Resolution) -> Result<Self, MediaError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Other("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let slot = Arc::new(FrameSlot {
            latest: Mutex::new(None),
            frames: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            stderr_tail: Mutex::new(Vec::new()),
        });

        let reader_slot = slot.clone();
        thread::spawn(move || read_frames(stdout, resolution, &reader_slot));

        if let Some(stderr) = stderr {
            let stderr_slot = slot.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    tracing::debug!(target: "capture", "[FFMPEG] {}", line);
                    let mut tail = stderr_slot
                        .stderr_tail
                        .lock()
                        .unwrap_or_else(|p| p.into_inner());
                    tail.push(line);
                    if tail.len() > STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                }
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            resolution,
            child: Mutex::new(Some(child)),
            slot,
        })
    }

    /// Block until a frame arrives or ffmpeg exits.
    fn wait_for_first_frame(&self) -> Result<(), MediaError> {
        loop {
            if self.slot.frames.load(Ordering::Acquire) > 0 {
                return Ok(());
            }

            let exited = {
                let mut child = self.child.lock().unwrap_or_else(|p| p.into_inner());
                match child.as_mut().map(Child::try_wait) {
                    Some(Ok(Some(status))) => Some(status.to_string()),
                    Some(Ok(None)) => None,
                    Some(Err(e)) => Some(e.to_string()),
                    None => Some("stopped".to_string()),
                }
            };

            if let Some(status) = exited {
                // Give the stderr reader a moment to collect the final lines.
                thread::sleep(FIRST_FRAME_POLL);
                let tail = self
                    .slot
                    .stderr_tail
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .join("\n");
                tracing::error!(target: "capture", "[FFMPEG] Exited before first frame ({}): {}", status, tail);
                self.stop();
                return Err(classify_stderr(&tail));
            }

            thread::sleep(FIRST_FRAME_POLL);
        }
    }
}

fn read_frames(mut stdout: impl Read, resolution: Resolution, slot: &FrameSlot) {
    let frame_len = resolution.width as usize * resolution.height as usize * 3;
    if frame_len == 0 {
        tracing::error!(target: "capture", "[FFMPEG] Refusing to read frames of size {}", resolution);
        return;
    }
    let mut bytes = vec![0u8; frame_len];

    while !slot.stopped.load(Ordering::Acquire) {
        if let Err(e) = stdout.read_exact(&mut bytes) {
            tracing::debug!(target: "capture", "[FFMPEG] Frame pipe closed: {}", e);
            break;
        }
        if !slot.enabled.load(Ordering::Acquire) {
            continue;
        }

        if let Some(image) = RgbImage::from_raw(resolution.width, resolution.height, bytes.clone()) {
            *slot.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(image);
            slot.frames.fetch_add(1, Ordering::Release);
        }
    }
}

impl MediaStream for FfmpegStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        vec![TrackInfo {
            id: format!("{}-video", self.id),
            state: if self.slot.stopped.load(Ordering::Acquire) {
                TrackState::Ended
            } else {
                TrackState::Live
            },
            enabled: self.slot.enabled.load(Ordering::Acquire),
        }]
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn ready_state(&self) -> ReadyState {
        if self.slot.stopped.load(Ordering::Acquire) {
            ReadyState::HaveNothing
        } else if self.slot.frames.load(Ordering::Acquire) == 0 {
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveEnoughData
        }
    }

    fn current_frame(&self) -> Result<RgbImage, MediaError> {
        if self.slot.stopped.load(Ordering::Acquire) {
            return Err(MediaError::Other("stream stopped".to_string()));
        }
        self.slot
            .latest
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| MediaError::DeviceUnavailable("no frame received yet".to_string()))
    }

    fn set_enabled(&self, enabled: bool) {
        self.slot.enabled.store(enabled, Ordering::Release);
    }

    fn stop(&self) {
        if self.slot.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let child = self.child.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut child) = child {
            tracing::debug!(target: "capture", "[FFMPEG] Killing ffmpeg (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
        *self.slot.latest.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_io_error(error: &std::io::Error) -> MediaError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => MediaError::PermissionDenied,
        std::io::ErrorKind::NotFound => MediaError::DeviceNotFound,
        _ if error.raw_os_error() == Some(EBUSY) => MediaError::DeviceUnavailable(error.to_string()),
        _ => MediaError::Other(error.to_string()),
    }
}

/// Map ffmpeg's error output to a tagged error.
pub fn classify_stderr(stderr: &str) -> MediaError {
    let last_line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("ffmpeg exited before delivering a frame")
        .trim()
        .to_string();

    if stderr.contains("Permission denied") {
        MediaError::PermissionDenied
    } else if stderr.contains("No such file or directory") {
        MediaError::DeviceNotFound
    } else if stderr.contains("Device or resource busy") {
        MediaError::DeviceUnavailable(last_line)
    } else if stderr.contains("Invalid argument") || stderr.contains("not supported") {
        MediaError::ConstraintsUnsupported {
            constraint: "inputFormat".to_string(),
        }
    } else {
        MediaError::Other(last_line)
    }
}
