use thiserror::Error;

/// Tagged acquisition errors produced by a [`MediaDevices`](super::media::MediaDevices) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("No camera device found")]
    DeviceNotFound,
    #[error("Camera is in use or unreadable: {0}")]
    DeviceUnavailable(String),
    #[error("Camera constraints not supported: {constraint}")]
    ConstraintsUnsupported { constraint: String },
    #[error("Security error while accessing the camera")]
    Security,
    #[error("Camera error: {0}")]
    Other(String),
}

impl MediaError {
    /// Map a platform exception name (as reported by browser-style capture APIs)
    /// into the tagged error.
    pub fn from_platform_name(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => MediaError::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => MediaError::DeviceNotFound,
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                MediaError::DeviceUnavailable(message.to_string())
            }
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                MediaError::ConstraintsUnsupported {
                    constraint: message.to_string(),
                }
            }
            "SecurityError" => MediaError::Security,
            _ => MediaError::Other(if message.is_empty() {
                name.to_string()
            } else {
                message.to_string()
            }),
        }
    }

    /// Message shown to the user when a start attempt fails.
    pub fn readable(&self) -> String {
        match self {
            MediaError::PermissionDenied => {
                "Permissão de câmera negada. Por favor, permita o acesso à câmera.".to_string()
            }
            MediaError::DeviceNotFound => {
                "Nenhuma câmera encontrada no dispositivo.".to_string()
            }
            MediaError::DeviceUnavailable(_) => {
                "A câmera está em uso por outro aplicativo.".to_string()
            }
            MediaError::ConstraintsUnsupported { .. } => {
                "Configurações de câmera não suportadas.".to_string()
            }
            MediaError::Security => "Erro de segurança ao acessar a câmera.".to_string(),
            MediaError::Other(msg) if msg.is_empty() => "Erro ao acessar a câmera.".to_string(),
            MediaError::Other(msg) => msg.clone(),
        }
    }
}

/// Errors from drawing and encoding a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Capture buffer has no size")]
    EmptyBuffer,
    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
}

/// Errors from handing a payload to the transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport is not connected")]
    NotConnected,
    #[error("Transport is busy, frame dropped")]
    Backpressure,
    #[error("Transport closed")]
    Closed,
    #[error("Failed to serialize message: {0}")]
    Serialize(String),
}

/// Top-level error type for capture operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Capture controller is not running")]
    ControllerGone,
    #[error("Start cancelled")]
    Cancelled,
}

impl CaptureError {
    pub fn readable(&self) -> String {
        match self {
            CaptureError::Media(e) => e.readable(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names_map_to_tags() {
        assert_eq!(
            MediaError::from_platform_name("NotAllowedError", ""),
            MediaError::PermissionDenied
        );
        assert_eq!(
            MediaError::from_platform_name("NotFoundError", ""),
            MediaError::DeviceNotFound
        );
        assert!(matches!(
            MediaError::from_platform_name("NotReadableError", "busy"),
            MediaError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            MediaError::from_platform_name("OverconstrainedError", "width"),
            MediaError::ConstraintsUnsupported { constraint } if constraint == "width"
        ));
        assert_eq!(
            MediaError::from_platform_name("SecurityError", ""),
            MediaError::Security
        );
    }

    #[test]
    fn test_unknown_name_keeps_message() {
        let err = MediaError::from_platform_name("WeirdError", "something broke");
        assert_eq!(err, MediaError::Other("something broke".to_string()));
        assert_eq!(err.readable(), "something broke");

        let err = MediaError::from_platform_name("WeirdError", "");
        assert_eq!(err, MediaError::Other("WeirdError".to_string()));
    }

    #[test]
    fn test_readable_messages() {
        assert!(MediaError::PermissionDenied.readable().contains("Permissão de câmera negada"));
        assert!(MediaError::DeviceNotFound.readable().contains("Nenhuma câmera encontrada"));
        assert!(MediaError::DeviceUnavailable("x".into())
            .readable()
            .contains("em uso"));
        assert_eq!(
            MediaError::Other(String::new()).readable(),
            "Erro ao acessar a câmera."
        );
    }

    #[test]
    fn test_capture_error_wraps_media() {
        let err: CaptureError = MediaError::PermissionDenied.into();
        assert_eq!(err.readable(), MediaError::PermissionDenied.readable());
        assert_eq!(err.to_string(), "Camera permission denied");
    }
}
