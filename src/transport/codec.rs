//! Engine.IO v4 / Socket.IO v4 text packet framing.
//!
//! A WebSocket text message carries one Engine.IO packet: a type digit followed by
//! its data. Message packets (`4`) wrap a Socket.IO packet, itself a type digit
//! followed by an optional namespace and JSON payload.

use serde::Serialize;
use serde_json::Value;

use crate::capture::errors::TransportError;

/// Decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Handshake sent by the server right after the socket opens.
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Socket(SocketPacket),
}

/// Decoded Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event { name: String, payload: Value },
    ConnectError(Value),
    /// Acks and binary packets, which this client never requests.
    Unsupported(String),
}

pub const PONG: &str = "3";
pub const CONNECT: &str = "40";

pub fn decode(text: &str) -> Option<Packet> {
    let mut chars = text.chars();
    let kind = chars.next()?;
    let rest = chars.as_str();

    match kind {
        '0' => Some(Packet::Open(serde_json::from_str(rest).unwrap_or(Value::Null))),
        '1' => Some(Packet::Close),
        '2' => Some(Packet::Ping),
        '3' => Some(Packet::Pong),
        '4' => Some(Packet::Socket(decode_socket(rest)?)),
        '6' => Some(Packet::Noop),
        _ => None,
    }
}

fn decode_socket(text: &str) -> Option<SocketPacket> {
    let mut chars = text.chars();
    let kind = chars.next()?;
    let body = strip_namespace(chars.as_str());

    match kind {
        '0' => Some(SocketPacket::Connect),
        '1' => Some(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '4' => Some(SocketPacket::ConnectError(
            serde_json::from_str(body).unwrap_or(Value::Null),
        )),
        _ => Some(SocketPacket::Unsupported(text.to_string())),
    }
}

/// Drop a leading `/nsp,` prefix. Only the default namespace is used.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(index) => &body[index + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn decode_event(body: &str) -> Option<SocketPacket> {
    // An ack id may precede the array.
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let Value::Array(mut items) = serde_json::from_str(body).ok()? else {
        return None;
    };
    if items.is_empty() {
        return None;
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return None,
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };

    Some(SocketPacket::Event { name, payload })
}

/// Encode an event as `42["name",payload]`.
pub fn encode_event<T: Serialize>(name: &str, payload: &T) -> Result<String, TransportError> {
    let payload =
        serde_json::to_value(payload).map_err(|e| TransportError::Serialize(e.to_string()))?;
    let body = serde_json::to_string(&Value::Array(vec![Value::String(name.to_string()), payload]))
        .map_err(|e| TransportError::Serialize(e.to_string()))?;
    Ok(format!("42{}", body))
}

/// Build the WebSocket URL for a server base URL such as `http://host:5000`.
pub fn socket_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/socket.io/?EIO=4&transport=websocket", base)
}
