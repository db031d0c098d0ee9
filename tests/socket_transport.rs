//! Socket.IO client against a minimal in-process server.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use stl_lib::capture::errors::TransportError;
use stl_lib::transport::socket::{SocketClient, SocketConfig};
use stl_lib::transport::{FrameMessage, FrameSender, PredictionResult, TransportEvent};

async fn next_text<S>(read: &mut S) -> String
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timed out waiting for client message")
            .expect("client closed")
            .expect("read error");
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport closed")
}

#[tokio::test]
async fn test_handshake_results_frames_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = SocketConfig::new(format!("http://{}", addr));
    config.reconnect_step = Duration::from_millis(50);
    let (_client, sender, mut events) = SocketClient::connect(config);

    assert_eq!(
        sender.send_frame(FrameMessage {
            image: "data:image/jpeg;base64,AA==".to_string()
        }),
        Err(TransportError::NotConnected)
    );

    let (tcp, _) = listener.accept().await.unwrap();
    let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let (mut write, mut read) = ws.split();

    write
        .send(Message::text(
            r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_text(&mut read).await, "40");

    write
        .send(Message::text(r#"40{"sid":"n1"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
    assert!(sender.is_connected());

    write
        .send(Message::text(
            r#"42["prediction_result",{"letter":"A"}]"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Prediction(PredictionResult::letter("A"))
    );

    write.send(Message::text("2".to_string())).await.unwrap();
    assert_eq!(next_text(&mut read).await, "3");

    sender
        .send_frame(FrameMessage {
            image: "data:image/jpeg;base64,AA==".to_string(),
        })
        .unwrap();
    assert_eq!(
        next_text(&mut read).await,
        r#"42["video_frame",{"image":"data:image/jpeg;base64,AA=="}]"#
    );

    write.send(Message::Close(None)).await.unwrap();
    drop(write);
    drop(read);
    assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);
    assert!(!sender.is_connected());

    // The client comes back on its own.
    let (tcp, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let (mut write, mut read) = ws.split();
    write
        .send(Message::text(r#"0{"sid":"s2"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut read).await, "40");
    write.send(Message::text("40".to_string())).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
}
