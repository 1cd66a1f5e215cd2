//! Latency probe served on `/api/ping/`.
//!
//! A plain `GET` answers `{"message": "pong"}`. A websocket upgrade on the same
//! path echoes every `{"ping": "ping", "clientSendTime": ...}` frame with the
//! server's receive and send timestamps so the client can split the round trip.

use axum::{
    extract::ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Value of the `ping` field that marks a latency probe.
const PING_MARKER: &str = "ping";

/// Reply to one ping frame. Times are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongReply {
    pub server_receive_time: f64,
    pub server_send_time: f64,
    /// Echoed verbatim; `null` when the client omitted it.
    pub client_send_time: Value,
}

/// A frame that cannot be interpreted at all. Ends the channel.
#[derive(Debug, Error)]
pub enum PingFrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// Current time as fractional seconds since the Unix epoch.
pub fn unix_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Builds the reply for one text frame.
///
/// Returns `Ok(None)` for well-formed frames without the ping marker; those
/// are ignored. The send time is provisional and restamped right before the
/// reply goes out.
pub fn build_pong(text: &str, received_at: f64) -> Result<Option<PongReply>, PingFrameError> {
    let frame: Value = serde_json::from_str(text)?;
    let object = frame.as_object().ok_or(PingFrameError::NotAnObject)?;

    if object.get("ping").and_then(Value::as_str) != Some(PING_MARKER) {
        return Ok(None);
    }

    Ok(Some(PongReply {
        server_receive_time: received_at,
        server_send_time: received_at,
        client_send_time: object.get("clientSendTime").cloned().unwrap_or(Value::Null),
    }))
}

/// Handler for `GET /api/ping/`, both plain and websocket.
pub async fn ping_handler(ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(handle_ping_socket),
        Err(_) => Json(json!({ "message": "pong" })).into_response(),
    }
}

async fn handle_ping_socket(mut socket: WebSocket) {
    tracing::debug!("ping channel opened");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("ping channel receive error: {}", e);
                break;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Binary(_) => {
                tracing::warn!("binary frame on ping channel, closing");
                break;
            }
        };

        let received_at = unix_seconds();
        let mut reply = match build_pong(text.as_str(), received_at) {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("malformed ping frame, closing channel: {}", e);
                break;
            }
        };

        reply.server_send_time = unix_seconds().max(reply.server_receive_time);
        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to serialize pong: {}", e);
                break;
            }
        };

        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }

    tracing::debug!("ping channel closed");
}
