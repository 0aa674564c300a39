/// Generation Service - Model Invocation Abstraction
///
/// **Core Responsibility:**
/// Send the user's prompt plus the test case inputs to a language model and
/// return its raw text with a best-effort structured parse.
///
/// **Critical Architectural Boundary:**
/// - Knows HOW to call the model (HTTP, retries, timeouts)
/// - Does NOT know scoring rules
/// - Called once per submission, never per test case

use crate::config::GenerationConfig;
use crate::evaluator::ModelOutput;
use crate::normalizer::parse_model_response;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("failed to decode model API response: {0}")]
    Decode(String),

    #[error("model returned no choices")]
    EmptyResponse,
}

impl GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::RequestFailed(_) | GenerationError::Timeout(_) => true,
            GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
            GenerationError::Decode(_) | GenerationError::EmptyResponse => false,
        }
    }
}

/// Anything that can turn (prompt, input dataset) into model output.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str, input: &Value) -> Result<ModelOutput, GenerationError>;
}

/// A chat message in the OpenAI wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Instruction appended after the user's prompt so a single call can answer
/// every test case.
pub fn batch_instruction(total_cases: usize) -> String {
    format!(
        "The user message is a JSON array of {n} input datasets. Apply the instructions above to each \
         input independently and respond with only a JSON array of exactly {n} outputs, one per input, \
         in the same order. Do not add explanations.",
        n = total_cases
    )
}

pub fn build_messages(prompt: &str, input: &Value) -> Vec<ChatMessage> {
    let total_cases = input.as_array().map(|a| a.len()).unwrap_or(1);
    vec![
        ChatMessage::system(prompt),
        ChatMessage::system(batch_instruction(total_cases)),
        ChatMessage::user(input.to_string()),
    ]
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for OpenAI-compatible chat-completions endpoints
pub struct OpenAiGeneration {
    config: GenerationConfig,
    http_client: Client,
}

impl OpenAiGeneration {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    async fn request_once(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let body = ApiRequest {
            model: &self.config.model,
            messages,
            temperature: 0.0,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.timeout_secs)
                } else {
                    GenerationError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if status != StatusCode::OK {
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ApiResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Decode(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationService for OpenAiGeneration {
    async fn generate(&self, prompt: &str, input: &Value) -> Result<ModelOutput, GenerationError> {
        let messages = build_messages(prompt, input);
        let mut attempt = 0u32;

        loop {
            match self.request_once(&messages).await {
                Ok(raw_text) => {
                    debug!(model = %self.config.model, attempt, bytes = raw_text.len(), "Model responded");
                    let parsed = parse_model_response(&raw_text).ok();
                    return Ok(ModelOutput { raw_text, parsed });
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(500 * attempt as u64);
                    warn!(
                        model = %self.config.model,
                        attempt,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Generation request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Deterministic generator: always answers with the same text.
#[cfg(test)]
pub struct StaticGeneration {
    response: Result<String, String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StaticGeneration {
    pub fn responding(raw_text: impl Into<String>) -> Self {
        Self {
            response: Ok(raw_text.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl GenerationService for StaticGeneration {
    async fn generate(&self, _prompt: &str, _input: &Value) -> Result<ModelOutput, GenerationError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.response {
            Ok(raw_text) => Ok(ModelOutput {
                raw_text: raw_text.clone(),
                parsed: parse_model_response(raw_text).ok(),
            }),
            Err(reason) => Err(GenerationError::RequestFailed(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_messages() {
        let messages = build_messages("Keep adults only", &json!([[1], [2], [3]]));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("Keep adults only"));
        assert!(messages[1].content.contains("exactly 3 outputs"));
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "[[1],[2],[3]]");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GenerationError::Timeout(60).is_retryable());
        assert!(GenerationError::Api { code: 429, message: String::new() }.is_retryable());
        assert!(GenerationError::Api { code: 503, message: String::new() }.is_retryable());
        assert!(!GenerationError::Api { code: 401, message: String::new() }.is_retryable());
        assert!(!GenerationError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_api_response_decoding() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":" [1] "},"finish_reason":"stop"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, " [1] ");

        let err: ApiErrorResponse = serde_json::from_str(r#"{"error":{"message":"bad key","type":"auth"}}"#).unwrap();
        assert_eq!(err.error.message, "bad key");
    }

    #[tokio::test]
    async fn test_static_generation() {
        let generator = StaticGeneration::responding("```json\n[[1]]\n```");
        let output = generator.generate("p", &json!([1])).await.unwrap();
        assert_eq!(output.parsed, Some(json!([[1]])));
        assert_eq!(generator.calls(), 1);

        let generator = StaticGeneration::failing("boom");
        assert!(generator.generate("p", &json!([1])).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires LLM_API_KEY and network access
    async fn test_live_generation() {
        let config = GenerationConfig::from_env().expect("LLM_API_KEY must be set");
        let generator = OpenAiGeneration::new(config).unwrap();
        let output = generator
            .generate("Return each input number doubled.", &json!([1, 2]))
            .await
            .unwrap();
        assert!(output.parsed.is_some());
    }
}
