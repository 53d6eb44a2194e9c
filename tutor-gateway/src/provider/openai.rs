//! OpenAI-compatible provider implementation.

use super::sse::{SseDecoder, SseEvent};
use super::{
    ChatRequest, CompletionProvider, FragmentStream, ImageProvider, ImageRequest, ImageResponse,
    Message, ProviderError,
};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tutor_common::util::redact_secret;

const PROVIDER_NAME: &str = "openai";

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// OpenAI API provider (or any endpoint speaking the same API).
pub struct OpenAIProvider {
    client: reqwest::Client,
    /// No whole-request timeout; fragment waits are bounded by the caller
    stream_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create with a base URL (api.openai.com, Azure OpenAI, compatible APIs, test servers).
    ///
    /// `timeout` bounds whole non-streaming requests only.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let stream_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default();

        Self {
            client,
            stream_client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the error for a non-2xx response, preferring the API's own message.
    async fn status_error(&self, model: &str, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);

        ProviderError::new(
            PROVIDER_NAME,
            model,
            format!("API error ({}): {}", status, redact_secret(&detail, &self.api_key)),
        )
        .with_status(status.as_u16())
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = OpenAIStreamRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: true,
        };

        let response = self
            .stream_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(PROVIDER_NAME, &request.model, format!("Request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(self.status_error(&request.model, response).await);
        }

        let raw = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed();

        Ok(fragments_from_sse(raw, request.model))
    }
}

#[async_trait]
impl ImageProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, ProviderError> {
        let url = format!("{}/v1/images/generations", self.base_url);
        let model = format!("images-{}", request.size);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER_NAME, &model, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.status_error(&model, response).await);
        }

        let parsed: OpenAIImageResponse = response.json().await.map_err(|e| {
            ProviderError::new(PROVIDER_NAME, &model, format!("Failed to parse response: {}", e))
        })?;

        Ok(ImageResponse {
            urls: parsed.data.into_iter().filter_map(|d| d.url).collect(),
        })
    }
}

// ============================================================================
// Stream Adapter
// ============================================================================

struct SseState {
    raw: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ProviderError>>,
    model: String,
    done: bool,
}

impl SseState {
    /// Queue decoded events; returns true once the stream is logically over.
    fn absorb(&mut self, events: Vec<SseEvent>) -> bool {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.pending.push_back(Ok(text)),
                SseEvent::Done => return true,
                SseEvent::Error(message) => {
                    self.pending
                        .push_back(Err(ProviderError::new(PROVIDER_NAME, &self.model, message)));
                    return true;
                }
            }
        }
        false
    }
}

/// Turn a raw SSE byte stream into a stream of text fragments.
///
/// The stream ends at `[DONE]`, at end of body, or right after the first
/// error item.
pub(crate) fn fragments_from_sse(
    raw: BoxStream<'static, Result<Vec<u8>, String>>,
    model: String,
) -> FragmentStream {
    let state = SseState {
        raw,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        model,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.raw.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.done = state.absorb(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = ProviderError::new(
                        PROVIDER_NAME,
                        &state.model,
                        format!("Stream interrupted: {}", e),
                    );
                    return Some((Err(err), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIStreamRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
