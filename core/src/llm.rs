//! LLM client abstraction used by the policy optimizer.
//!
//! The core depends only on the narrow contract in `LlmClient`: given an
//! instruction, the current policy, and a context, produce a JSON value.
//! `HttpLlmClient` is the concrete provider, built on `reqwest` against an
//! OpenAI-compatible `/chat/completions` endpoint. `RecordingLlmClient`
//! replays a fixed script of canned responses and exists purely for
//! deterministic tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{CoreError, CoreResult};

/// Identifies the agent and iteration a generation request is for, so a
/// provider can log or tag the request without the core leaking more than
/// this through the trait boundary.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub agent_id: String,
    pub iteration: usize,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Ask the model to produce a replacement policy. `instruction` is the
    /// full natural-language prompt (including any embedded cost/evaluation
    /// feedback); `current_policy` is the policy JSON being improved.
    /// Returns the parsed JSON response body, or a typed `CoreError::Llm`.
    async fn generate_policy(
        &self,
        instruction: &str,
        current_policy: &Json,
        context: &GenerationContext,
    ) -> CoreResult<Json>;
}

/// `provider:model`, e.g. `openai:gpt-4o-mini` or `anthropic:claude-3-5-sonnet`.
/// The provider name selects the base URL and the API-key environment
/// variable; the core itself never hardcodes a key.
struct ProviderModel {
    base_url: String,
    api_key_env: String,
    model: String,
}

fn parse_provider_model(spec: &str) -> CoreResult<ProviderModel> {
    let (provider, model) = spec.split_once(':').ok_or_else(|| {
        CoreError::Configuration(format!(
            "llm_config.model '{spec}' must be in 'provider:model' form"
        ))
    })?;

    let (base_url, api_key_env) = match provider {
        "openai" => ("https://api.openai.com/v1/chat/completions", "OPENAI_API_KEY"),
        "anthropic" => (
            "https://api.anthropic.com/v1/chat/completions",
            "ANTHROPIC_API_KEY",
        ),
        "groq" => (
            "https://api.groq.com/openai/v1/chat/completions",
            "GROQ_API_KEY",
        ),
        other => {
            return Err(CoreError::Configuration(format!(
                "unknown LLM provider '{other}' in llm_config.model"
            )))
        }
    };

    Ok(ProviderModel {
        base_url: base_url.to_string(),
        api_key_env: api_key_env.to_string(),
        model: model.to_string(),
    })
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// `reqwest`-backed `LlmClient` against an OpenAI-compatible endpoint.
/// Provider-specific knobs (thinking budget, reasoning effort) are not
/// modeled here; the core depends only on the request/response shape.
pub struct HttpLlmClient {
    client: reqwest::Client,
    model_spec: String,
    temperature: f64,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(model_spec: String, temperature: f64, timeout_seconds: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            model_spec,
            temperature,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate_policy(
        &self,
        instruction: &str,
        current_policy: &Json,
        context: &GenerationContext,
    ) -> CoreResult<Json> {
        let provider = parse_provider_model(&self.model_spec)?;
        let api_key = std::env::var(&provider.api_key_env).map_err(|_| {
            CoreError::Llm(format!(
                "missing environment variable '{}' for LLM provider",
                provider.api_key_env
            ))
        })?;

        let user_message = format!(
            "{instruction}\n\nCurrent policy:\n{}",
            serde_json::to_string_pretty(current_policy)?
        );

        let request = ChatRequest {
            model: &provider.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: user_message,
            }],
            response_format: ResponseFormat { kind: "json_object" },
        };

        tracing::debug!(
            agent_id = %context.agent_id,
            iteration = context.iteration,
            model = %provider.model,
            "requesting policy generation"
        );

        let response = self
            .client
            .post(&provider.base_url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| CoreError::Llm(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Llm(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| CoreError::Llm(format!("invalid response body: {err}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Llm("provider returned no choices".to_string()))?
            .message
            .content;

        serde_json::from_str(strip_code_fences(&content))
            .map_err(|err| CoreError::Llm(format!("response was not valid JSON: {err}")))
    }
}

/// Some providers wrap JSON responses in a markdown code fence even when
/// asked for `json_object` output. Strip a leading/trailing fence if
/// present; leave the content untouched otherwise.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open.strip_prefix("json").unwrap_or(after_open);
    let after_open = after_open.trim_start_matches(['\n', '\r']);
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

/// Replays a fixed script of canned responses, one per call, in order.
/// Exists for deterministic tests: given the same script and call
/// sequence, it always returns the same thing.
#[cfg(any(test, feature = "testing"))]
pub struct RecordingLlmClient {
    script: std::sync::Mutex<std::collections::VecDeque<Json>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingLlmClient {
    pub fn new(script: Vec<Json>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into_iter().collect()),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl LlmClient for RecordingLlmClient {
    async fn generate_policy(
        &self,
        _instruction: &str,
        _current_policy: &Json,
        _context: &GenerationContext,
    ) -> CoreResult<Json> {
        let mut script = self.script.lock().expect("script mutex poisoned");
        script
            .pop_front()
            .ok_or_else(|| CoreError::Llm("recording script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_provider_model() {
        let parsed = parse_provider_model("openai:gpt-4o-mini").unwrap();
        assert_eq!(parsed.model, "gpt-4o-mini");
        assert_eq!(parsed.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse_provider_model("gpt-4o-mini").is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(parse_provider_model("unknown:model-x").is_err());
    }

    #[test]
    fn strips_json_code_fence() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn leaves_unfenced_content_untouched() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn recording_client_replays_script_in_order() {
        let client = RecordingLlmClient::new(vec![json!({"a": 1}), json!({"a": 2})]);
        let context = GenerationContext {
            agent_id: "BANK_A".to_string(),
            iteration: 0,
        };
        let first = client
            .generate_policy("improve", &json!({}), &context)
            .await
            .unwrap();
        let second = client
            .generate_policy("improve", &json!({}), &context)
            .await
            .unwrap();
        assert_eq!(first, json!({"a": 1}));
        assert_eq!(second, json!({"a": 2}));
    }

    #[tokio::test]
    async fn recording_client_errors_when_exhausted() {
        let client = RecordingLlmClient::new(vec![]);
        let context = GenerationContext {
            agent_id: "BANK_A".to_string(),
            iteration: 0,
        };
        let result = client.generate_policy("improve", &json!({}), &context).await;
        assert!(result.is_err());
    }
}
