//! Events pushed to whoever renders the dashboard.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::capture::coordinator::CaptureStatus;
use crate::capture::types::Resolution;
use crate::connection::ConnectionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum UiEvent {
    /// Connection indicator changed.
    ConnectionChanged(ConnectionState),
    /// Recognized symbol to display, `"?"` when nothing was recognized.
    Symbol(String),
    CaptureStateChanged(CaptureStatus),
    #[serde(rename_all = "camelCase")]
    PreviewBound {
        stream_id: String,
        resolution: Resolution,
    },
    PreviewCleared,
    /// Readable failure, e.g. a rejected camera request.
    Error(String),
    /// Informational message that needs no action.
    Notice(String),
}

/// Receiver of [`UiEvent`]s. Implementations must not block.
pub trait UiSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

impl UiSink for mpsc::UnboundedSender<UiEvent> {
    fn emit(&self, event: UiEvent) {
        if self.send(event).is_err() {
            tracing::debug!(target: "system", "[UI] Event dropped, receiver closed");
        }
    }
}
