//! Text generator seam.
//!
//! One external attempt per invocation; any retry policy belongs to the
//! caller. The HTTP implementation talks to an OpenAI-style completions
//! endpoint with a per-call timeout. Tests and offline replay use the mock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 25_000;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub temperature: f64,
    pub top_p: f64,
    pub stream: bool,
    pub timeout_ms: u64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            stream: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl GeneratorParams {
    /// Force parameters into their valid ranges before invocation.
    ///
    /// temperature ∈ [0, 2], top_p ∈ [0, 1], timeout_ms > 0. NaN collapses
    /// to the defaults.
    pub fn clamped(&self) -> Self {
        let temperature = if self.temperature.is_nan() {
            Self::default().temperature
        } else {
            self.temperature.clamp(0.0, 2.0)
        };
        let top_p = if self.top_p.is_nan() {
            Self::default().top_p
        } else {
            self.top_p.clamp(0.0, 1.0)
        };
        let timeout_ms = if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        };
        Self {
            temperature,
            top_p,
            stream: self.stream,
            timeout_ms,
        }
    }
}

/// Model and parameters for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorRequest {
    pub model: String,
    pub params: GeneratorParams,
}

/// What the generator produced, echoing what was actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorReply {
    pub text: String,
    pub model: String,
    pub params: GeneratorParams,
}

/// Infrastructure failures from the generator seam.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generation timed out after {0}ms")]
    Timeout(u64),
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("generation reply was malformed: {0}")]
    MalformedReply(String),
}

/// The one suspending seam in the whole system.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        request: &GeneratorRequest,
    ) -> Result<GeneratorReply, GeneratorError>;
}

/// OpenAI-style completions client.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTextGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        request: &GeneratorRequest,
    ) -> Result<GeneratorReply, GeneratorError> {
        let params = request.params.clamped();
        let url = format!("{}/v1/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": request.model,
            "prompt": prompt,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "stream": false,
        });

        let send = self.client.post(&url).json(&payload).send();
        let response = tokio::time::timeout(Duration::from_millis(params.timeout_ms), send)
            .await
            .map_err(|_| GeneratorError::Timeout(params.timeout_ms))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        let text = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                GeneratorError::MalformedReply("missing choices[0].text".to_string())
            })?
            .to_string();
        let model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&request.model)
            .to_string();

        tracing::debug!(model = %model, chars = text.len(), "generation completed");
        Ok(GeneratorReply {
            text,
            model,
            params,
        })
    }
}

/// Deterministic generator for tests and offline replay.
pub struct MockTextGenerator {
    reply_text: Option<String>,
    calls: AtomicUsize,
}

impl MockTextGenerator {
    /// Always replies with the given text.
    pub fn new(reply_text: impl Into<String>) -> Self {
        Self {
            reply_text: Some(reply_text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with a simulated endpoint error.
    pub fn failing() -> Self {
        Self {
            reply_text: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `generate` has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        request: &GeneratorRequest,
    ) -> Result<GeneratorReply, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply_text {
            Some(text) => Ok(GeneratorReply {
                text: text.clone(),
                model: request.model.clone(),
                params: request.params.clamped(),
            }),
            None => Err(GeneratorError::Endpoint {
                status: 503,
                body: "simulated outage".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_bounds() {
        let params = GeneratorParams {
            temperature: 9.0,
            top_p: -0.5,
            stream: true,
            timeout_ms: 0,
        };
        let clamped = params.clamped();
        assert_eq!(clamped.temperature, 2.0);
        assert_eq!(clamped.top_p, 0.0);
        assert_eq!(clamped.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(clamped.stream);
    }

    #[test]
    fn test_clamped_nan_uses_defaults() {
        let params = GeneratorParams {
            temperature: f64::NAN,
            top_p: f64::NAN,
            ..Default::default()
        };
        let clamped = params.clamped();
        assert_eq!(clamped.temperature, GeneratorParams::default().temperature);
        assert_eq!(clamped.top_p, GeneratorParams::default().top_p);
    }

    #[test]
    fn test_clamped_valid_params_unchanged() {
        let params = GeneratorParams::default();
        assert_eq!(params.clamped(), params);
    }

    #[tokio::test]
    async fn test_mock_replies_and_counts() {
        let generator = MockTextGenerator::new("hello");
        let request = GeneratorRequest {
            model: "test-model".to_string(),
            params: GeneratorParams::default(),
        };
        let reply = generator.generate("prompt", &request).await.unwrap();
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.model, "test-model");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let generator = MockTextGenerator::failing();
        let request = GeneratorRequest {
            model: "test-model".to_string(),
            params: GeneratorParams::default(),
        };
        let err = generator.generate("prompt", &request).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Endpoint { status: 503, .. }));
    }
}
