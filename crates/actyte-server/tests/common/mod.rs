//! Shared helpers for server integration tests.
#![allow(dead_code)]

use actyte_server::app;
use actyte_server::conversation::ConversationRouter;
use actyte_voice::{Agent, Synthesizer, VoiceError};
use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A conversation router whose factories always fail. Enough for tests that
/// never open a conversation.
pub fn unavailable_conversation() -> ConversationRouter {
    ConversationRouter::new(
        || Err::<Box<dyn Agent>, _>(VoiceError::Config("no agent in tests".to_string())),
        |_| Err::<Box<dyn Synthesizer>, _>(VoiceError::Config("no synthesizer in tests".to_string())),
    )
}

/// Serves the full application on an ephemeral port.
pub async fn spawn_app(conversation: ConversationRouter) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(conversation);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Next text frame parsed as JSON. Panics on timeout or end of stream.
pub async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("frame is not JSON"),
            Message::Close(frame) => panic!("socket closed: {:?}", frame),
            _ => continue,
        }
    }
}

/// True once the server has closed the channel (close frame, error or EOF).
pub async fn closed_by_server(ws: &mut WsStream) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected reply: {}", text),
            Ok(Some(Ok(_))) => continue,
        }
    }
}
