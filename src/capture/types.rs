use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(250);
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Symbol shown when nothing was recognized.
pub const PLACEHOLDER_SYMBOL: &str = "?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// Ideal capture hints. Backends may negotiate something else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureTarget {
    pub resolution: Resolution,
    pub frame_rate: u32,
}

impl Default for CaptureTarget {
    fn default() -> Self {
        Self {
            resolution: Resolution::HD,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ideal<T> {
    pub ideal: T,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exact<T> {
    pub exact: T,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Exact<String>>,
    pub width: Ideal<u32>,
    pub height: Ideal<u32>,
    pub frame_rate: Ideal<u32>,
}

/// Media acquisition request. Video only; audio is always off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: VideoConstraints,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn new(device_id: Option<String>, target: CaptureTarget) -> Self {
        Self {
            video: VideoConstraints {
                device_id: device_id.map(|exact| Exact { exact }),
                width: Ideal {
                    ideal: target.resolution.width,
                },
                height: Ideal {
                    ideal: target.resolution.height,
                },
                frame_rate: Ideal {
                    ideal: target.frame_rate,
                },
            },
            audio: false,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.video.device_id.as_ref().map(|d| d.exact.as_str())
    }

    pub fn ideal_resolution(&self) -> Resolution {
        Resolution::new(self.video.width.ideal, self.video.height.ideal)
    }

    pub fn ideal_frame_rate(&self) -> u32 {
        self.video.frame_rate.ideal
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "videoinput")]
    VideoInput,
    #[serde(rename = "audioinput")]
    AudioInput,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }
}

/// How much data the stream can currently provide, mirroring media element ready states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveEnoughData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub state: TrackState,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constraints_shape_with_device() {
        let constraints = MediaConstraints::new(Some("cam-1".to_string()), CaptureTarget::default());
        let value = serde_json::to_value(&constraints).unwrap();

        assert_eq!(
            value,
            json!({
                "video": {
                    "deviceId": { "exact": "cam-1" },
                    "width": { "ideal": 1280 },
                    "height": { "ideal": 720 },
                    "frameRate": { "ideal": 30 }
                },
                "audio": false
            })
        );
    }

    #[test]
    fn test_constraints_shape_without_device() {
        let constraints = MediaConstraints::new(None, CaptureTarget::default());
        let value = serde_json::to_value(&constraints).unwrap();

        assert!(value["video"].get("deviceId").is_none());
        assert_eq!(constraints.device_id(), None);
        assert_eq!(constraints.ideal_resolution(), Resolution::HD);
        assert_eq!(constraints.ideal_frame_rate(), 30);
    }

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::HaveEnoughData > ReadyState::HaveCurrentData);
        assert!(ReadyState::HaveMetadata > ReadyState::HaveNothing);
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::HD.to_string(), "1280×720");
        assert!(Resolution::new(0, 720).is_empty());
    }
}
