//! Socket.IO client over a WebSocket, with automatic reconnection.
//!
//! Outbound frames go through a small bounded queue and are never retried: a frame
//! that cannot be queued right away is dropped by the caller, since a fresher one
//! follows within a period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::codec::{self, Packet, SocketPacket};
use super::{FrameMessage, FrameSender, PredictionResult, TransportEvent, FRAME_EVENT, RESULT_EVENT};
use crate::capture::errors::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Server base URL, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,
    pub outbound_capacity: usize,
    /// Delay after the first failed attempt; grows linearly per attempt.
    pub reconnect_step: Duration,
    pub reconnect_max: Duration,
}

impl SocketConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            outbound_capacity: 2,
            reconnect_step: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(10),
        }
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_step
            .saturating_mul(attempt.max(1))
            .min(self.reconnect_max)
    }
}

/// Fire-and-forget frame sender backed by the socket task.
#[derive(Clone)]
pub struct SocketSender {
    outbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl SocketSender {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl FrameSender for SocketSender {
    fn send_frame(&self, frame: FrameMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let text = codec::encode_event(FRAME_EVENT, &frame)?;
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Owns the background socket task. Dropping it closes the connection.
pub struct SocketClient {
    handle: JoinHandle<()>,
}

impl SocketClient {
    pub fn connect(config: SocketConfig) -> (Self, SocketSender, mpsc::Receiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (events_tx, events_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(false));

        let sender = SocketSender {
            outbound: outbound_tx,
            connected: connected.clone(),
        };
        let handle = tokio::spawn(run(config, outbound_rx, events_tx, connected));

        (Self { handle }, sender, events_rx)
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum SessionEnd {
    /// Connection lost; try again.
    Dropped(String),
    /// Nobody is listening any more; stop for good.
    ClientGone,
}

async fn run(
    config: SocketConfig,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    let url = codec::socket_url(&config.base_url);
    let mut attempt: u32 = 0;

    loop {
        tracing::info!(target: "transport", "[SOCKET] Connecting to {}", url);

        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                match session(socket, &mut outbound, &events, &connected).await {
                    SessionEnd::ClientGone => {
                        connected.store(false, Ordering::Release);
                        tracing::info!(target: "transport", "[SOCKET] Client gone, closing");
                        return;
                    }
                    SessionEnd::Dropped(reason) => {
                        tracing::warn!(target: "transport", "[SOCKET] Connection lost: {}", reason);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "transport", "[SOCKET] Connect attempt {} failed: {}", attempt + 1, e);
            }
        }

        if connected.swap(false, Ordering::AcqRel)
            && events.send(TransportEvent::Disconnected).await.is_err()
        {
            return;
        }
        while outbound.try_recv().is_ok() {}

        attempt = attempt.saturating_add(1);
        let delay = config.reconnect_delay(attempt);
        tracing::debug!(target: "transport", "[SOCKET] Reconnecting in {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

async fn session(
    socket: Socket,
    outbound: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<TransportEvent>,
    connected: &AtomicBool,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Dropped(format!("closed by server: {:?}", frame));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                };

                let reply = match codec::decode(text.as_str()) {
                    Some(Packet::Open(handshake)) => {
                        tracing::debug!(target: "transport", "[SOCKET] Handshake: {}", handshake);
                        Some(codec::CONNECT)
                    }
                    Some(Packet::Ping) => Some(codec::PONG),
                    Some(Packet::Close) => {
                        return SessionEnd::Dropped("engine close packet".to_string());
                    }
                    Some(Packet::Socket(SocketPacket::Connect)) => {
                        connected.store(true, Ordering::Release);
                        tracing::info!(target: "transport", "[SOCKET] Connected");
                        if events.send(TransportEvent::Connected).await.is_err() {
                            return SessionEnd::ClientGone;
                        }
                        None
                    }
                    Some(Packet::Socket(SocketPacket::Disconnect)) => {
                        return SessionEnd::Dropped("disconnected by server".to_string());
                    }
                    Some(Packet::Socket(SocketPacket::ConnectError(reason))) => {
                        return SessionEnd::Dropped(format!("connect error: {}", reason));
                    }
                    Some(Packet::Socket(SocketPacket::Event { name, payload })) if name == RESULT_EVENT => {
                        let result = PredictionResult::from_value(&payload);
                        if events.send(TransportEvent::Prediction(result)).await.is_err() {
                            return SessionEnd::ClientGone;
                        }
                        None
                    }
                    other => {
                        tracing::trace!(target: "transport", "[SOCKET] Ignoring packet: {:?}", other);
                        None
                    }
                };

                if let Some(reply) = reply {
                    if let Err(e) = write.send(Message::text(reply.to_string())).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
            }
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::ClientGone;
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    return SessionEnd::Dropped(e.to_string());
                }
            }
        }
    }
}
