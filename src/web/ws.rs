use futures::{SinkExt, StreamExt};
use serde_derive::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use warp::ws::{Message, WebSocket};

use crate::global::Global;

/// Message sent by a client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    /// Sent once after connecting
    Init,
}

fn json_message(value: &serde_json::Value) -> Message {
    Message::text(value.to_string())
}

fn handle_message(message: &Message) -> Option<Message> {
    let text = message.to_str().ok()?;

    Some(match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Init) => json_message(&serde_json::json!({ "type": "initialized" })),
        Err(error) => {
            debug!(error = %error, "invalid client message");
            json_message(&serde_json::json!({ "error": error.to_string() }))
        }
    })
}

/// Forward published events to a connected client until it goes away
#[instrument(skip(websocket, global))]
pub async fn client(websocket: WebSocket, global: Global) {
    let (mut tx, mut rx) = websocket.split();
    let mut events = global.subscribe().await;

    debug!("websocket client connected");

    loop {
        let reply = tokio::select! {
            message = rx.next() => match message {
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(message)) => {
                    trace!(message = ?message, "ws message");
                    handle_message(&message)
                }
                Some(Err(error)) => {
                    warn!(error = %error, "websocket error");
                    break;
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_value(&event) {
                    Ok(value) => Some(json_message(&value)),
                    Err(error) => {
                        error!(error = %error, "failed to serialize event");
                        None
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging behind");
                    None
                }
                Err(RecvError::Closed) => break,
            },
        };

        if let Some(reply) = reply {
            if let Err(error) = tx.send(reply).await {
                warn!(error = %error, "websocket error");
                break;
            }
        }
    }

    debug!("websocket client disconnected");
}
