//! `OpenAI`-compatible [`ModelBackend`] using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible chat completions API (`OpenAI`, Azure,
//! local proxies) via the base URL override on [`OpenAiBackend::new`].
//! The schema each analysis stage supplies is embedded in the prompt
//! text rather than sent as a provider-native structured-output
//! constraint, since that feature is not portable across `OpenAI`-
//! compatible providers; JSON-object mode keeps the response at least
//! syntactically valid JSON.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::analyzer::ModelBackend;
use crate::config::ModelParams;
use crate::error::BackendError;

/// `OpenAI`-compatible backend for the Analyzer stage (spec.md §4.5).
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    provider_name: String,
    default_model: String,
    api_key_present: bool,
}

impl OpenAiBackend {
    /// Builds a backend from an API key and default model id.
    ///
    /// `base_url` lets the same backend target an `OpenAI`-compatible
    /// proxy instead of the public API; `provider_name` is the tag the
    /// analyzer's fallback chain and `AnalysisMetadata::model_provider`
    /// report for this backend (e.g. `"openai"`, `"azure"`).
    #[must_use]
    pub fn new(
        provider_name: impl Into<String>,
        api_key: &str,
        default_model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
            provider_name: provider_name.into(),
            default_model: default_model.into(),
            api_key_present: !api_key.trim().is_empty(),
        }
    }

    fn build_request(&self, model_id: &str, prompt: &str, schema: &Value, params: &ModelParams) -> CreateChatCompletionRequest {
        let model = if model_id.is_empty() {
            self.default_model.clone()
        } else {
            model_id.to_string()
        };

        let schema_block = format!(
            "Respond with a single JSON object. It must validate against this JSON Schema:\n{schema}"
        );

        CreateChatCompletionRequest {
            model,
            messages: vec![
                async_openai::types::ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(schema_block),
                    name: None,
                }),
                async_openai::types::ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                    name: None,
                }),
            ],
            temperature: params.temperature,
            top_p: params.top_p,
            response_format: Some(ResponseFormat::JsonObject),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("provider_name", &self.provider_name)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        &self.provider_name
    }

    fn is_available(&self) -> bool {
        self.api_key_present
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        schema: &Value,
        params: &ModelParams,
    ) -> std::result::Result<Value, BackendError> {
        let request = self.build_request(model_id, prompt, schema, params);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|err| classify_error(&self.provider_name, &err))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| BackendError::ServerError {
                provider: self.provider_name.clone(),
                message: "response contained no message content".to_string(),
            })?;

        serde_json::from_str(&content).map_err(|err| BackendError::SchemaMismatch {
            provider: self.provider_name.clone(),
            message: format!("response was not valid JSON: {err}"),
        })
    }
}

/// Maps an `async-openai` transport/API error onto the analyzer's
/// provider-agnostic [`BackendError`] kinds.
///
/// `async-openai`'s error enum does not expose a stable HTTP-status
/// field across every variant, so this classifies by the rendered
/// message rather than matching on enum shape, the same tolerant
/// approach the rest of this crate uses for opaque collaborator errors.
fn classify_error(provider: &str, err: &async_openai::error::OpenAIError) -> BackendError {
    classify_message(provider, &err.to_string())
}

/// Pure string classification, split out from [`classify_error`] so it
/// can be tested without constructing an `OpenAIError` directly.
fn classify_message(provider: &str, message: &str) -> BackendError {
    let message = message.to_string();
    let lower = message.to_lowercase();

    if lower.contains("429") || lower.contains("rate limit") {
        BackendError::Rate {
            provider: provider.to_string(),
            message,
        }
    } else if lower.contains("401") || lower.contains("403") || lower.contains("api key") || lower.contains("auth") {
        BackendError::Auth {
            provider: provider.to_string(),
            message,
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        BackendError::Timeout {
            provider: provider.to_string(),
            elapsed_ms: 0,
        }
    } else if lower.contains("connection") || lower.contains("dns") || lower.contains("network") {
        BackendError::Network {
            provider: provider.to_string(),
            message,
        }
    } else if lower.contains("400") || lower.contains("invalid_request") {
        BackendError::InvalidRequest {
            provider: provider.to_string(),
            message,
        }
    } else {
        BackendError::ServerError {
            provider: provider.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_without_api_key_is_unavailable() {
        let backend = OpenAiBackend::new("openai", "", "gpt-4o-mini", None);
        assert!(!backend.is_available());
    }

    #[test]
    fn backend_with_api_key_is_available() {
        let backend = OpenAiBackend::new("openai", "sk-test", "gpt-4o-mini", None);
        assert!(backend.is_available());
        assert_eq!(backend.provider(), "openai");
    }

    #[test]
    fn classify_message_recognizes_rate_limit() {
        assert!(matches!(
            classify_message("openai", "429 rate limit exceeded"),
            BackendError::Rate { .. }
        ));
    }

    #[test]
    fn classify_message_recognizes_auth_failure() {
        assert!(matches!(
            classify_message("openai", "401 invalid api key"),
            BackendError::Auth { .. }
        ));
    }

    #[test]
    fn classify_message_falls_back_to_server_error() {
        assert!(matches!(
            classify_message("openai", "something unexpected happened"),
            BackendError::ServerError { .. }
        ));
    }
}
