//! Transport seam between the capture loop and the recognition backend.
//!
//! The loop only needs a fire-and-forget [`FrameSender`]; everything arriving from
//! the backend is surfaced as a [`TransportEvent`].

pub mod codec;
pub mod socket;

use serde::{Deserialize, Serialize};

use crate::capture::errors::TransportError;
use crate::capture::types::PLACEHOLDER_SYMBOL;

pub const FRAME_EVENT: &str = "video_frame";
pub const RESULT_EVENT: &str = "prediction_result";

/// Payload of the outbound frame event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    /// JPEG data URL of the capture buffer.
    pub image: String,
}

/// Payload of the inbound recognition result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(default)]
    pub letter: Option<String>,
}

impl PredictionResult {
    pub fn letter(letter: impl Into<String>) -> Self {
        Self {
            letter: Some(letter.into()),
        }
    }

    /// Parse a raw payload, degrading anything malformed to an empty result.
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value.get("letter") {
            Some(serde_json::Value::String(letter)) => Self::letter(letter.clone()),
            _ => Self::default(),
        }
    }

    /// Symbol to display: the letter, or the placeholder when absent or blank.
    pub fn symbol(&self) -> &str {
        match self.letter.as_deref().map(str::trim) {
            Some(letter) if !letter.is_empty() => letter,
            _ => PLACEHOLDER_SYMBOL,
        }
    }
}

/// Notifications from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Prediction(PredictionResult),
}

/// Hands an encoded frame to the transport. Must not block on delivery.
pub trait FrameSender: Send + Sync {
    fn send_frame(&self, frame: FrameMessage) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbol_uses_letter() {
        assert_eq!(PredictionResult::letter("A").symbol(), "A");
    }

    #[test]
    fn test_symbol_placeholder_for_missing_or_blank() {
        assert_eq!(PredictionResult::default().symbol(), "?");
        assert_eq!(PredictionResult::letter("").symbol(), "?");
        assert_eq!(PredictionResult::letter("  ").symbol(), "?");
        assert_eq!(PredictionResult::letter("?").symbol(), "?");
    }

    #[test]
    fn test_from_value_degrades_malformed_payloads() {
        assert_eq!(
            PredictionResult::from_value(&json!({"letter": "B"})).symbol(),
            "B"
        );
        assert_eq!(PredictionResult::from_value(&json!({"letter": 3})).symbol(), "?");
        assert_eq!(PredictionResult::from_value(&json!("B")).symbol(), "?");
        assert_eq!(PredictionResult::from_value(&json!(null)).symbol(), "?");
    }

    #[test]
    fn test_frame_message_shape() {
        let msg = FrameMessage {
            image: "data:image/jpeg;base64,AAAA".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"image": "data:image/jpeg;base64,AAAA"})
        );
    }
}
