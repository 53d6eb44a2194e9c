//! WebSocket chat endpoint.
//!
//! Protocol: the client sends one text frame per user turn; the server sends
//! one text frame per streamed fragment. The end of an assistant turn is
//! implicit. A failed turn produces a single frame starting with `Error: `
//! and the connection stays open for the next message.
//!
//! Diagnostics share the channel with content, so an assistant fragment that
//! itself begins with `Error: ` is indistinguishable from a diagnostic and the
//! page will show it as one.
//!
//! The socket is split: while a turn is relayed the read half keeps being
//! polled, so a close from the client cancels the turn immediately. Text
//! frames that arrive meanwhile are queued and relayed afterwards in order.

use crate::relay::{FragmentSink, RelayError, SinkClosed};
use crate::routes::AppState;
use crate::session::SessionKey;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

#[async_trait]
impl FragmentSink for WsSender {
    async fn send_text(&mut self, text: String) -> Result<(), SinkClosed> {
        self.send(Message::Text(text)).await.map_err(|_| SinkClosed)
    }
}

/// Query parameters for the chat socket.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    /// Stable session key for continuity across reconnects
    #[serde(default)]
    pub session: Option<String>,
}

/// Resolve the session key; generated keys are dropped when the socket closes.
fn resolve_session(query: ChatQuery) -> (SessionKey, bool) {
    match query.session.map(|s| s.trim().to_string()) {
        Some(s) if !s.is_empty() => (SessionKey::from(s), false),
        _ => (SessionKey::generate(), true),
    }
}

/// What one inbound frame means for the loop.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    UserMessage(String),
    Ignore,
    Closed,
}

fn classify(frame: Option<Result<Message, axum::Error>>) -> Inbound {
    match frame {
        Some(Ok(Message::Text(text))) if !text.trim().is_empty() => Inbound::UserMessage(text),
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Inbound::Closed,
        Some(Ok(_)) => Inbound::Ignore,
    }
}

/// Wait for the next user message; `None` once the client is gone.
async fn next_user_message(receiver: &mut WsReceiver) -> Option<String> {
    loop {
        match classify(receiver.next().await) {
            Inbound::UserMessage(text) => return Some(text),
            Inbound::Ignore => continue,
            Inbound::Closed => return None,
        }
    }
}

/// Resolve once the client is gone, queueing any messages sent meanwhile.
async fn wait_for_close(receiver: &mut WsReceiver, queued: &mut VecDeque<String>) {
    loop {
        match classify(receiver.next().await) {
            Inbound::UserMessage(text) => queued.push_back(text),
            Inbound::Ignore => {}
            Inbound::Closed => return,
        }
    }
}

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ChatQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let (key, ephemeral) = resolve_session(query);
    ws.on_upgrade(move |socket| handle_socket(socket, state, key, ephemeral))
}

/// Receive/relay loop for one connection.
pub async fn handle_socket(socket: WebSocket, state: AppState, key: SessionKey, ephemeral: bool) {
    state.sessions.get_or_create(&key).await;
    tracing::info!(session = %key, ephemeral, "Chat client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut turns = 0usize;

    loop {
        let text = match queued.pop_front() {
            Some(text) => text,
            None => match next_user_message(&mut receiver).await {
                Some(text) => text,
                None => break,
            },
        };

        let closed = wait_for_close(&mut receiver, &mut queued);
        match state.relay.relay(&key, &text, &mut sender, closed).await {
            Ok(_) => turns += 1,
            Err(RelayError::Disconnected) => break,
            Err(RelayError::Upstream(e)) => {
                tracing::debug!(session = %key, error = %e, "Resuming after failed turn");
            }
        }
    }

    if ephemeral {
        state.sessions.remove(&key).await;
    }
    tracing::info!(session = %key, turns, "Chat client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_session_is_retained() {
        let (key, ephemeral) = resolve_session(ChatQuery {
            session: Some(" A ".into()),
        });
        assert_eq!(key.as_str(), "A");
        assert!(!ephemeral);
    }

    #[test]
    fn test_missing_or_blank_session_is_ephemeral() {
        let (_, ephemeral) = resolve_session(ChatQuery::default());
        assert!(ephemeral);

        let (key, ephemeral) = resolve_session(ChatQuery {
            session: Some("  ".into()),
        });
        assert!(ephemeral);
        assert!(!key.as_str().trim().is_empty());
    }

    #[test]
    fn test_frame_classification() {
        assert_eq!(
            classify(Some(Ok(Message::Text("hi".into())))),
            Inbound::UserMessage("hi".into())
        );
        assert_eq!(classify(Some(Ok(Message::Text("   ".into())))), Inbound::Ignore);
        assert_eq!(classify(Some(Ok(Message::Ping(vec![1])))), Inbound::Ignore);
        assert_eq!(classify(Some(Ok(Message::Close(None)))), Inbound::Closed);
        assert_eq!(classify(None), Inbound::Closed);
    }
}
