//! OpenAI-compatible chat completion client and model registry.
//!
//! The relay treats the model API as an external collaborator behind a
//! simple request/response contract: build a message list, POST it, read
//! one reply. Provider-specific behaviors (web search, citations) pass
//! through opaquely when present.
//!
//! Failure policy: a missing credential degrades to an explicit fallback
//! reply (never a crash); a model the provider does not recognize advances
//! to the next candidate; anything else is an [`UpstreamModelError`] whose
//! detail is logged, not shown raw to the user. Nothing is retried.

use anyhow::Result;
use std::fmt;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::models::{ChatTurn, Role, WebResult};

/// System instruction prepended to every model call.
const SYSTEM_PROMPT: &str = "You are a helpful assistant for a municipal permit research desk. \
     Answer clearly and concisely. Use Markdown formatting: headings for structure, \
     bulleted or numbered lists for enumerations, and fenced code blocks with a \
     language tag for code.";

/// Reply used when `OPENAI_API_KEY` is absent.
pub const MISSING_KEY_REPLY: &str = "The chat model is not configured. Set the OPENAI_API_KEY \
     environment variable to enable live responses.";

/// Generic user-facing message for upstream failures; the real error only
/// goes to the logs.
pub const UPSTREAM_ERROR_REPLY: &str = "Sorry, I could not process that request. Please try again.";

/// Models a caller may select via `/api/model`, besides `"default"`.
pub const SELECTABLE_MODELS: [&str; 4] = ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"];

/// Candidates tried after the preferred/default model when the provider
/// reports the model as unknown.
const FALLBACK_MODELS: [&str; 3] = ["gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"];

/// The external model call failed. Carries the logged detail; the user
/// sees only [`UPSTREAM_ERROR_REPLY`].
#[derive(Debug)]
pub struct UpstreamModelError(pub String);

impl fmt::Display for UpstreamModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream model error: {}", self.0)
    }
}

impl std::error::Error for UpstreamModelError {}

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub web_results: Vec<WebResult>,
    /// The model that actually answered (may differ from the preference
    /// after fallback).
    pub model: String,
}

pub struct ChatProvider {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatProvider {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    /// Send the transcript context upstream and return the reply.
    ///
    /// The credential is read from the environment per call, so setting it
    /// after startup takes effect without a restart. Without a credential
    /// this returns the explicit demo-mode reply instead of failing.
    pub async fn complete(
        &self,
        context: &[ChatTurn],
        preferred_model: Option<&str>,
    ) -> Result<ChatReply, UpstreamModelError> {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            return Ok(ChatReply {
                message: MISSING_KEY_REPLY.to_string(),
                web_results: Vec::new(),
                model: "none".to_string(),
            });
        };

        let messages = build_messages(context);
        let mut last_error = UpstreamModelError("no model candidates".to_string());

        let candidates = self.model_candidates(preferred_model);
        let requested = candidates.first().cloned().unwrap_or_default();
        for model in candidates {
            match self.call_model(&api_key, &model, &messages).await {
                Ok(reply) => {
                    if model != requested {
                        tracing::info!(model = %model, "fell back to alternate model");
                    }
                    return Ok(reply);
                }
                Err(error) if is_model_not_found(&error.0) => {
                    tracing::warn!(model = %model, detail = %error.0, "model unavailable");
                    last_error = error;
                }
                Err(error) => {
                    tracing::error!(model = %model, detail = %error.0, "chat completion failed");
                    return Err(error);
                }
            }
        }

        Err(last_error)
    }

    /// Preferred model first, then the configured default, then the fixed
    /// fallback list, deduplicated in order.
    fn model_candidates(&self, preferred: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::new();
        for model in preferred
            .into_iter()
            .chain(std::iter::once(self.config.model.as_str()))
            .chain(FALLBACK_MODELS)
        {
            if !model.is_empty() && !candidates.iter().any(|c| c == model) {
                candidates.push(model.to_string());
            }
        }
        candidates
    }

    async fn call_model(
        &self,
        api_key: &str,
        model: &str,
        messages: &[serde_json::Value],
    ) -> Result<ChatReply, UpstreamModelError> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": 0.7,
            "max_tokens": self.config.max_output_tokens,
        });
        if self.config.web_search {
            body["tools"] = serde_json::json!([{ "type": "web_search" }]);
        }

        let url = format!(
            "{}/v1/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamModelError(e.to_string()))?;

        let status = response.status();
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamModelError(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamModelError(format!("HTTP {}: {}", status, json)));
        }
        if let Some(error) = json.get("error") {
            return Err(UpstreamModelError(error.to_string()));
        }

        let message = json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UpstreamModelError("empty completion".to_string()))?;

        Ok(ChatReply {
            message,
            web_results: extract_web_results(&json),
            model: model.to_string(),
        })
    }
}

/// `[system] + transcript context`, in the provider's wire shape.
fn build_messages(context: &[ChatTurn]) -> Vec<serde_json::Value> {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": SYSTEM_PROMPT,
    })];
    for turn in context {
        let text = turn.text.trim();
        if text.is_empty() {
            continue;
        }
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(serde_json::json!({ "role": role, "content": text }));
    }
    messages
}

/// Liberal parse of provider-attached web citations; absent or unshaped
/// data yields an empty list rather than an error.
fn extract_web_results(json: &serde_json::Value) -> Vec<WebResult> {
    let Some(items) = json
        .get("web_results")
        .or_else(|| json["choices"][0]["message"].get("web_results"))
        .and_then(|v| v.as_array())
    else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| WebResult {
            title: item["title"].as_str().map(str::to_string),
            url: item["url"].as_str().map(str::to_string),
            snippet: item["snippet"].as_str().map(str::to_string),
            source: item["source"].as_str().map(str::to_string),
            image: item["image"].as_str().map(str::to_string),
        })
        .collect()
}

fn is_model_not_found(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    detail.contains("model_not_found") || detail.contains("does not exist")
}

/// Map a requested model name (with common synonyms) onto the canonical
/// identifier. `"default"` and `"auto"` both mean "use the configured
/// default"; unknown names pass through for the caller to reject.
pub fn normalize_requested_model(name: &str) -> String {
    let normalized = name.trim().to_lowercase();
    match normalized.as_str() {
        "" | "default" | "auto" => "default".to_string(),
        "gpt3.5" | "gpt-3.5" | "gpt 3.5" | "3.5" | "gpt-3.5-turbo" | "gpt-3.5-turbo-0125" => {
            "gpt-3.5-turbo".to_string()
        }
        other => other.to_string(),
    }
}

/// Human-readable label for a model identifier.
pub fn display_label(model: &str) -> String {
    match model {
        "gpt-4o" => "GPT-4o".to_string(),
        "gpt-4o-mini" => "GPT-4o Mini".to_string(),
        "gpt-4-turbo" => "GPT-4 Turbo".to_string(),
        "gpt-3.5-turbo" => "GPT-3.5 Turbo".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatTurn;

    #[test]
    fn candidates_start_with_preference_and_dedup() {
        let provider = ChatProvider::new(ChatConfig::default()).unwrap();
        let candidates = provider.model_candidates(Some("gpt-3.5-turbo"));
        assert_eq!(
            candidates,
            vec!["gpt-3.5-turbo", "gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]
        );

        let candidates = provider.model_candidates(None);
        assert_eq!(candidates[0], "gpt-4o");
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn messages_start_with_system_and_skip_blanks() {
        let context = vec![
            ChatTurn::new(Role::User, "hello"),
            ChatTurn::new(Role::Assistant, "   "),
            ChatTurn::new(Role::User, "anyone?"),
        ];
        let messages = build_messages(&context);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(messages[2]["content"], "anyone?");
    }

    #[test]
    fn normalizes_model_synonyms() {
        assert_eq!(normalize_requested_model("GPT-3.5"), "gpt-3.5-turbo");
        assert_eq!(normalize_requested_model("3.5"), "gpt-3.5-turbo");
        assert_eq!(normalize_requested_model("default"), "default");
        assert_eq!(normalize_requested_model("AUTO"), "default");
        assert_eq!(normalize_requested_model(""), "default");
        assert_eq!(normalize_requested_model("gpt-4o"), "gpt-4o");
        assert_eq!(normalize_requested_model("made-up"), "made-up");
    }

    #[test]
    fn model_not_found_detection() {
        assert!(is_model_not_found("code: model_not_found"));
        assert!(is_model_not_found("The model `x` does not exist"));
        assert!(!is_model_not_found("rate limit exceeded"));
    }

    #[test]
    fn web_results_parse_liberally() {
        let json = serde_json::json!({
            "web_results": [
                { "title": "T", "url": "https://x", "snippet": "S" },
                { "unexpected": true },
            ]
        });
        let results = extract_web_results(&json);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title.as_deref(), Some("T"));
        assert_eq!(results[1].title, None);

        assert!(extract_web_results(&serde_json::json!({})).is_empty());
    }

    #[tokio::test]
    async fn missing_key_degrades_to_fallback_reply() {
        // Only meaningful when no key is present in the environment.
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let provider = ChatProvider::new(ChatConfig::default()).unwrap();
        let reply = provider
            .complete(&[ChatTurn::new(Role::User, "hi")], None)
            .await
            .unwrap();
        assert_eq!(reply.message, MISSING_KEY_REPLY);
    }
}
