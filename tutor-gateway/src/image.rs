//! Stateless prompt → image reference mapping.

use crate::provider::{ImageProvider, ImageRequest, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tutor_common::config::ImageConfig;

/// Image generation failure.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Image generation failed: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Image generation returned no image")]
    NoImage,
}

impl ImageError {
    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::Upstream(_) => "upstream_error",
            Self::NoImage => "no_image",
        }
    }

    /// HTTP status for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::EmptyPrompt => 400,
            Self::Upstream(_) | Self::NoImage => 502,
        }
    }
}

/// Sends one prompt upstream with fixed parameters and returns one reference.
pub struct ImageRequestHandler {
    provider: Arc<dyn ImageProvider>,
    size: String,
    count: u32,
}

impl ImageRequestHandler {
    pub fn new(provider: Arc<dyn ImageProvider>, config: &ImageConfig) -> Self {
        Self {
            provider,
            size: config.size.clone(),
            count: config.count,
        }
    }

    /// Generate an image and return its URL. No retry, no partial result.
    pub async fn generate(&self, prompt: &str) -> Result<String, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::EmptyPrompt);
        }

        let request = ImageRequest {
            prompt: prompt.to_string(),
            n: self.count,
            size: self.size.clone(),
        };

        let response = self.provider.generate_image(request).await.map_err(|e| {
            tracing::warn!(provider = self.provider.name(), error = %e, "Image generation failed");
            ImageError::from(e)
        })?;

        let url = response.urls.into_iter().next().ok_or(ImageError::NoImage)?;
        tracing::info!(provider = self.provider.name(), size = %self.size, "Image generated");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ImageResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubImages {
        result: Result<Vec<&'static str>, &'static str>,
        seen: Mutex<Vec<ImageRequest>>,
    }

    impl StubImages {
        fn new(result: Result<Vec<&'static str>, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ImageProvider for StubImages {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate_image(&self, request: ImageRequest) -> Result<ImageResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            match &self.result {
                Ok(urls) => Ok(ImageResponse {
                    urls: urls.iter().map(|u| u.to_string()).collect(),
                }),
                Err(msg) => Err(ProviderError::new("stub", "images", *msg).with_status(500)),
            }
        }
    }

    #[tokio::test]
    async fn test_generate_returns_reference() {
        let stub = StubImages::new(Ok(vec!["https://example/img1.png"]));
        let handler = ImageRequestHandler::new(stub.clone(), &ImageConfig::default());

        let url = handler.generate("a red circle").await.unwrap();
        assert_eq!(url, "https://example/img1.png");

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "a red circle");
        assert_eq!(seen[0].n, 1);
        assert_eq!(seen[0].size, "256x256");
    }

    #[tokio::test]
    async fn test_first_of_many_is_returned() {
        let stub = StubImages::new(Ok(vec!["https://example/a.png", "https://example/b.png"]));
        let handler = ImageRequestHandler::new(stub, &ImageConfig::default());
        assert_eq!(handler.generate("two").await.unwrap(), "https://example/a.png");
    }

    #[tokio::test]
    async fn test_empty_prompt_never_calls_upstream() {
        let stub = StubImages::new(Ok(vec!["https://example/img1.png"]));
        let handler = ImageRequestHandler::new(stub.clone(), &ImageConfig::default());

        let err = handler.generate("   ").await.unwrap_err();
        assert!(matches!(err, ImageError::EmptyPrompt));
        assert_eq!(err.status_code(), 400);
        assert!(stub.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_descriptive() {
        let stub = StubImages::new(Err("content policy violation"));
        let handler = ImageRequestHandler::new(stub, &ImageConfig::default());

        let err = handler.generate("something").await.unwrap_err();
        assert_eq!(err.code(), "upstream_error");
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("content policy violation"));
    }

    #[tokio::test]
    async fn test_empty_response_is_no_image() {
        let stub = StubImages::new(Ok(vec![]));
        let handler = ImageRequestHandler::new(stub, &ImageConfig::default());
        assert!(matches!(handler.generate("x").await, Err(ImageError::NoImage)));
    }
}
