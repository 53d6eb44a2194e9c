//! Streaming conversation relay.
//!
//! A relay call appends the user's message, streams the whole transcript to
//! the completion provider, forwards every fragment to the client as it
//! arrives, and commits the concatenated assistant turn once the stream ends.
//!
//! ```text
//! user msg → SessionStore::append → provider.stream_chat(snapshot)
//!                                         ↓ fragment, fragment, ...
//!                         sink.send_text ←┘   (accumulate)
//!                                         ↓ end of stream
//!                          SessionStore::append(assistant, full text)
//! ```
//!
//! A failed call commits nothing: the transcript is rolled back to the length
//! it had before the call and the client receives a single `Error: ...` line.
//! The caller also supplies a future that resolves when the client goes away;
//! if it fires first the upstream stream is dropped and the call ends as
//! [`RelayError::Disconnected`].

use crate::provider::{ChatRequest, CompletionProvider, Message, ProviderError};
use crate::session::{Role, SessionKey, SessionStore};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tutor_common::config::Config;
use tutor_common::util::truncate_with_ellipsis;

/// The client connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client connection closed")]
pub struct SinkClosed;

/// Outbound half of a client connection.
#[async_trait]
pub trait FragmentSink: Send {
    /// Deliver one text message to the client.
    async fn send_text(&mut self, text: String) -> Result<(), SinkClosed>;
}

/// Why a relay call ended without committing an assistant turn.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The client disconnected; the receive loop should end quietly.
    #[error("client disconnected")]
    Disconnected,

    /// The upstream failed; a diagnostic was already sent and the loop may continue.
    #[error("upstream failure: {0}")]
    Upstream(#[from] ProviderError),
}

/// Fixed per-call parameters sent upstream.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f64,
    /// Bound on opening the stream and on every fragment wait
    pub upstream_timeout: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.upstream.model.clone(),
            temperature: config.upstream.temperature,
            upstream_timeout: Duration::from_secs(config.relay.upstream_timeout_secs),
        }
    }
}

/// Relays one user turn at a time between a client and the completion provider.
pub struct CompletionRelay {
    store: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    settings: RelaySettings,
}

impl CompletionRelay {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn CompletionProvider>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one user turn and return the committed assistant text.
    ///
    /// `closed` resolves when the client disconnects.
    pub async fn relay<S, C>(
        &self,
        key: &SessionKey,
        user_message: &str,
        sink: &mut S,
        closed: C,
    ) -> Result<String, RelayError>
    where
        S: FragmentSink + ?Sized,
        C: Future<Output = ()> + Send,
    {
        self.store.get_or_create(key).await;
        let checkpoint = self.store.len(key).await;
        self.store.append(key, Role::User, user_message).await;

        tracing::debug!(
            session = %key,
            message = %truncate_with_ellipsis(user_message, 80),
            "Relaying user turn"
        );

        let outcome = tokio::select! {
            result = self.stream_turn(key, sink) => result,
            () = closed => Err(RelayError::Disconnected),
        };

        match outcome {
            Ok(content) => {
                self.store.append(key, Role::Assistant, content.as_str()).await;
                Ok(content)
            }
            Err(RelayError::Disconnected) => {
                self.store.rollback(key, checkpoint).await;
                tracing::debug!(session = %key, "Client disconnected mid-turn");
                Err(RelayError::Disconnected)
            }
            Err(RelayError::Upstream(e)) => {
                self.store.rollback(key, checkpoint).await;
                tracing::warn!(session = %key, error = %e, "Upstream failure, turn discarded");
                if sink.send_text(format!("Error: {}", e)).await.is_err() {
                    return Err(RelayError::Disconnected);
                }
                Err(RelayError::Upstream(e))
            }
        }
    }

    /// Stream the current transcript upstream, forwarding fragments in order.
    async fn stream_turn<S>(&self, key: &SessionKey, sink: &mut S) -> Result<String, RelayError>
    where
        S: FragmentSink + ?Sized,
    {
        let messages: Vec<Message> = self
            .store
            .snapshot(key)
            .await
            .iter()
            .map(Message::from)
            .collect();

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: Some(self.settings.temperature),
        };

        let wait = self.settings.upstream_timeout;
        let mut stream = tokio::time::timeout(wait, self.provider.stream_chat(request))
            .await
            .map_err(|_| self.timeout_error("opening stream"))??;

        let mut content = String::new();
        let mut fragments = 0usize;

        loop {
            let next = tokio::time::timeout(wait, stream.next())
                .await
                .map_err(|_| self.timeout_error("waiting for next fragment"))?;

            let Some(item) = next else {
                break;
            };
            let fragment = item?;
            if fragment.is_empty() {
                continue;
            }

            content.push_str(&fragment);
            sink.send_text(fragment)
                .await
                .map_err(|_| RelayError::Disconnected)?;
            fragments += 1;
        }

        tracing::info!(
            session = %key,
            provider = self.provider.name(),
            fragments,
            bytes = content.len(),
            "Assistant turn completed"
        );

        Ok(content)
    }

    fn timeout_error(&self, phase: &str) -> ProviderError {
        ProviderError::new(
            self.provider.name(),
            &self.settings.model,
            format!(
                "Upstream timed out after {}s {}",
                self.settings.upstream_timeout.as_secs(),
                phase
            ),
        )
    }
}
