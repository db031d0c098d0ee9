//! Media source seams and the RAII session that owns an acquired stream.
//!
//! Backends implement [`MediaDevices`] (enumeration + acquisition) and hand back a
//! [`MediaStream`]. The capture loop never talks to hardware directly, so tests can
//! substitute in-memory fakes.

use std::sync::Arc;

use image::RgbImage;
use uuid::Uuid;

use super::errors::MediaError;
use super::types::{CaptureTarget, DeviceInfo, MediaConstraints, ReadyState, Resolution, TrackInfo, TrackState};

/// Provider of capture devices.
pub trait MediaDevices: Send + Sync {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError>;

    /// Acquire a stream. Blocking: may wait indefinitely on a permission prompt.
    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError>;
}

/// An acquired camera stream with one or more tracks.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<TrackInfo>;

    /// Dimensions actually delivered by the device, once known.
    fn negotiated_resolution(&self) -> Option<Resolution>;

    fn ready_state(&self) -> ReadyState;

    /// Snapshot of the most recent frame.
    fn current_frame(&self) -> Result<RgbImage, MediaError>;

    /// Disable or re-enable tracks without releasing them.
    fn set_enabled(&self, enabled: bool);

    /// Stop every track. Idempotent.
    fn stop(&self);
}

pub fn live_track_count(stream: &dyn MediaStream) -> usize {
    stream
        .tracks()
        .iter()
        .filter(|t| t.state == TrackState::Live)
        .count()
}

/// One active camera acquisition. Dropping it stops the tracks.
pub struct MediaSession {
    id: Uuid,
    stream: Option<Arc<dyn MediaStream>>,
    device: DeviceInfo,
    resolution: Resolution,
}

impl MediaSession {
    pub fn new(stream: Arc<dyn MediaStream>, device: DeviceInfo, target: CaptureTarget) -> Self {
        let resolution = stream
            .negotiated_resolution()
            .filter(|r| !r.is_empty())
            .unwrap_or(target.resolution);

        Self {
            id: Uuid::new_v4(),
            stream: Some(stream),
            device,
            resolution,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&Arc<dyn MediaStream>> {
        self.stream.as_ref()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Negotiated dimensions, or the requested hints when the device reported none.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Some(stream) = &self.stream {
            stream.set_enabled(enabled);
        }
    }

    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            tracing::debug!(target: "capture", "[SESSION] Releasing stream {} ({})", stream.id(), self.device.label);
            stream.stop();
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("resolution", &self.resolution)
            .field("active", &self.is_active())
            .finish()
    }
}
