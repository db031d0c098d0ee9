//! Connection indicator and recognized-symbol forwarding.
//!
//! Every transport notification is reflected immediately; there is no debounce, so
//! the last notification always wins.

use std::sync::Arc;

use serde::Serialize;

use crate::capture::types::PLACEHOLDER_SYMBOL;
use crate::transport::{PredictionResult, TransportEvent};
use crate::ui::{UiEvent, UiSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

pub struct ConnectionMonitor {
    state: ConnectionState,
    sink: Arc<dyn UiSink>,
}

impl ConnectionMonitor {
    /// Create a monitor and show the placeholder symbol.
    pub fn new(sink: Arc<dyn UiSink>) -> Self {
        let monitor = Self {
            state: ConnectionState::Disconnected,
            sink,
        };
        monitor.reset();
        monitor
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn on_connect(&mut self) {
        tracing::info!(target: "transport", "[MONITOR] Connected");
        self.set_state(ConnectionState::Connected);
    }

    pub fn on_disconnect(&mut self) {
        tracing::info!(target: "transport", "[MONITOR] Disconnected");
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn on_message(&self, result: &PredictionResult) {
        let symbol = result.symbol();
        tracing::trace!(target: "transport", "[MONITOR] Symbol {}", symbol);
        self.sink.emit(UiEvent::Symbol(symbol.to_string()));
    }

    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connect(),
            TransportEvent::Disconnected => self.on_disconnect(),
            TransportEvent::Prediction(result) => self.on_message(&result),
        }
    }

    /// Show the placeholder symbol.
    pub fn reset(&self) {
        self.sink.emit(UiEvent::Symbol(PLACEHOLDER_SYMBOL.to_string()));
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.sink.emit(UiEvent::ConnectionChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn monitor() -> (ConnectionMonitor, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionMonitor::new(Arc::new(tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_initial_placeholder() {
        let (monitor, mut rx) = monitor();
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        assert_eq!(drain(&mut rx), vec![UiEvent::Symbol("?".to_string())]);
    }

    #[test]
    fn test_last_notification_wins() {
        let (mut monitor, mut rx) = monitor();
        drain(&mut rx);

        monitor.handle(TransportEvent::Disconnected);
        monitor.handle(TransportEvent::Connected);

        assert_eq!(monitor.state(), ConnectionState::Connected);
        assert_eq!(
            drain(&mut rx),
            vec![
                UiEvent::ConnectionChanged(ConnectionState::Disconnected),
                UiEvent::ConnectionChanged(ConnectionState::Connected),
            ]
        );
    }

    #[test]
    fn test_missing_letter_shows_placeholder() {
        let (mut monitor, mut rx) = monitor();
        drain(&mut rx);

        monitor.handle(TransportEvent::Prediction(PredictionResult::letter("A")));
        monitor.handle(TransportEvent::Prediction(PredictionResult::default()));

        assert_eq!(
            drain(&mut rx),
            vec![
                UiEvent::Symbol("A".to_string()),
                UiEvent::Symbol("?".to_string()),
            ]
        );
    }
}
