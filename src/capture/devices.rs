use super::errors::MediaError;
use super::types::{DeviceInfo, DeviceKind};

/// Result of resolving which camera to open.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChoice {
    pub device: DeviceInfo,
    /// Saved device id that was absent, when the choice fell back to the first camera.
    pub fell_back_from: Option<String>,
}

/// Keep only video inputs, giving unlabeled devices a positional name.
pub fn video_inputs(devices: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    devices
        .into_iter()
        .filter(|d| d.kind == DeviceKind::VideoInput)
        .enumerate()
        .map(|(index, mut device)| {
            if device.label.trim().is_empty() {
                device.label = format!("Câmera {}", index + 1);
            }
            device
        })
        .collect()
}

/// Resolve the device to open: explicit request, then saved preference, then first camera.
///
/// An explicit id that is not present is a constraint failure; a saved id that is
/// not present falls back to the first camera and reports it in `fell_back_from`.
pub fn choose_device(
    devices: &[DeviceInfo],
    requested: Option<&str>,
    saved: Option<&str>,
) -> Result<DeviceChoice, MediaError> {
    let first = devices.first().ok_or(MediaError::DeviceNotFound)?;

    if let Some(id) = requested {
        return devices
            .iter()
            .find(|d| d.device_id == id)
            .map(|device| DeviceChoice {
                device: device.clone(),
                fell_back_from: None,
            })
            .ok_or_else(|| MediaError::ConstraintsUnsupported {
                constraint: "deviceId".to_string(),
            });
    }

    match saved {
        Some(id) => match devices.iter().find(|d| d.device_id == id) {
            Some(device) => Ok(DeviceChoice {
                device: device.clone(),
                fell_back_from: None,
            }),
            None => Ok(DeviceChoice {
                device: first.clone(),
                fell_back_from: Some(id.to_string()),
            }),
        },
        None => Ok(DeviceChoice {
            device: first.clone(),
            fell_back_from: None,
        }),
    }
}
