//! Socket Mode event stream.
//!
//! The listener opens a connection via `apps.connections.open`, reads
//! envelope frames off the WebSocket, acknowledges each envelope
//! immediately (the provider's deadline for interactive components is
//! 3 seconds) and forwards the typed payloads over a channel. On
//! `disconnect` frames or transport errors the loop reconnects with a
//! fresh URL.

use futures_util::SinkExt;
use futures_util::StreamExt;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::client::Result;
use crate::client::SlackClient;
use crate::client::SlackError;

/// One decoded Socket Mode envelope payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// `events_api` envelope: the inner `event` object (messages,
    /// mentions, reactions).
    EventsApi(Value),
    /// `interactive` envelope: the full payload (button clicks).
    Interactive(Value),
}

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Run the Socket Mode loop until `events` has no receiver left.
/// `app_client` must be authenticated with the app-level token.
pub async fn run_socket_mode(
    app_client: SlackClient,
    events: mpsc::Sender<SocketEvent>,
) -> Result<()> {
    loop {
        let url = app_client.connections_open().await?;
        info!("socket mode connected");
        match run_connection(&url, &events).await {
            Ok(()) => debug!("socket mode connection closed, reconnecting"),
            Err(e) => warn!("socket mode connection error: {e}"),
        }
        if events.is_closed() {
            return Ok(());
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_connection(url: &str, events: &mpsc::Sender<SocketEvent>) -> Result<()> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| SlackError::Unusable(format!("websocket connect failed: {e}")))?;
    let (mut write, mut read) = ws.split();

    while let Some(frame) = read.next().await {
        let frame = frame.map_err(|e| SlackError::Unusable(format!("websocket read: {e}")))?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("unparseable socket mode frame: {e}");
                continue;
            }
        };

        // Ack before dispatch so slow handlers cannot blow the
        // provider's deadline.
        if let Some(envelope_id) = envelope.get("envelope_id").and_then(Value::as_str) {
            let ack = json!({"envelope_id": envelope_id}).to_string();
            write
                .send(Message::Text(ack.into()))
                .await
                .map_err(|e| SlackError::Unusable(format!("websocket ack: {e}")))?;
        }

        match parse_envelope(&envelope) {
            Some(event) => {
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
            None => {
                if envelope.get("type").and_then(Value::as_str) == Some("disconnect") {
                    debug!("provider requested reconnect");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Decode one envelope into a [`SocketEvent`]; `hello`, `disconnect`
/// and unknown envelope types yield `None`.
pub fn parse_envelope(envelope: &Value) -> Option<SocketEvent> {
    match envelope.get("type").and_then(Value::as_str)? {
        "events_api" => envelope
            .pointer("/payload/event")
            .cloned()
            .map(SocketEvent::EventsApi),
        "interactive" => envelope.get("payload").cloned().map(SocketEvent::Interactive),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_api_envelope_yields_the_inner_event() {
        let envelope = json!({
            "type": "events_api",
            "envelope_id": "abc",
            "payload": {"event": {"type": "message", "text": "hi"}},
        });
        let event = parse_envelope(&envelope).expect("event");
        assert_eq!(
            event,
            SocketEvent::EventsApi(json!({"type": "message", "text": "hi"}))
        );
    }

    #[test]
    fn interactive_envelope_yields_the_full_payload() {
        let envelope = json!({
            "type": "interactive",
            "envelope_id": "abc",
            "payload": {"type": "block_actions", "actions": []},
        });
        let event = parse_envelope(&envelope).expect("event");
        assert_eq!(
            event,
            SocketEvent::Interactive(json!({"type": "block_actions", "actions": []}))
        );
    }

    #[test]
    fn hello_and_disconnect_envelopes_are_ignored() {
        assert_eq!(parse_envelope(&json!({"type": "hello"})), None);
        assert_eq!(parse_envelope(&json!({"type": "disconnect"})), None);
    }
}
