//! Generation backends behind the `ReplyProvider` capability trait.
//!
//! Providers are a closed interface — the fallback chain is a
//! configuration-driven ordered list of implementations, not a class
//! hierarchy. Anthropic and OpenAI ride rig-core's completion clients;
//! Gemini talks to the REST API directly.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProviderError};

/// Sampling temperature for all reply generation.
const REPLY_TEMPERATURE: f64 = 0.7;

/// A text-generation backend. One call, one bounded response; no
/// streaming, no retry. Failures advance the chain.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Stable identifier used in logs and audit records.
    fn name(&self) -> &str;

    /// Produce a reply for the rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

// ── Provider selection ──────────────────────────────────────────────

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Parse a chain entry. "claude" is accepted as an alias.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "provider_chain".into(),
                message: format!("unknown provider '{other}'"),
            }),
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

/// Create a provider of the given kind.
pub fn create_provider(
    kind: ProviderKind,
    api_key: SecretString,
    model: &str,
    max_tokens: u64,
) -> Result<Arc<dyn ReplyProvider>, ProviderError> {
    match kind {
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(api_key, model, max_tokens))),
        ProviderKind::Anthropic => create_anthropic_provider(&api_key, model, max_tokens),
        ProviderKind::OpenAi => create_openai_provider(&api_key, model, max_tokens),
    }
}

fn create_anthropic_provider(
    api_key: &SecretString,
    model: &str,
    max_tokens: u64,
) -> Result<Arc<dyn ReplyProvider>, ProviderError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
            ProviderError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let agent = client
        .agent(model)
        .temperature(REPLY_TEMPERATURE)
        .max_tokens(max_tokens)
        .build();
    tracing::info!("Using Anthropic (model: {})", model);
    Ok(Arc::new(RigProvider::new("anthropic", agent)))
}

fn create_openai_provider(
    api_key: &SecretString,
    model: &str,
    max_tokens: u64,
) -> Result<Arc<dyn ReplyProvider>, ProviderError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key.expose_secret()).map_err(|e| {
            ProviderError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let agent = client
        .agent(model)
        .temperature(REPLY_TEMPERATURE)
        .max_tokens(max_tokens)
        .build();
    tracing::info!("Using OpenAI (model: {})", model);
    Ok(Arc::new(RigProvider::new("openai", agent)))
}

// ── rig-core bridge ─────────────────────────────────────────────────

/// Bridges a rig agent to `ReplyProvider`.
pub struct RigProvider<M: CompletionModel> {
    name: String,
    agent: rig::agent::Agent<M>,
}

impl<M: CompletionModel> RigProvider<M> {
    pub fn new(name: impl Into<String>, agent: rig::agent::Agent<M>) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

#[async_trait]
impl<M: CompletionModel> ReplyProvider for RigProvider<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let text = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: e.to_string(),
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.name.clone(),
            });
        }
        Ok(text.to_string())
    }
}

// ── Gemini (direct REST) ────────────────────────────────────────────

/// Gemini backend over the generativelanguage REST API.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    max_tokens: u64,
}

impl GeminiProvider {
    pub fn new(api_key: SecretString, model: &str, max_tokens: u64) -> Self {
        tracing::info!("Using Gemini (model: {})", model);
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ReplyProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model,
            self.api_key.expose_secret()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: REPLY_TEMPERATURE,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: "gemini".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed {
                provider: "gemini".into(),
                reason: format!("{status}: {body}"),
            });
        }

        let result: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: "gemini".into(),
                    reason: e.to_string(),
                })?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: "gemini".into(),
            });
        }
        Ok(text.to_string())
    }
}

// ── Gemini API request/response types ───────────────────────────────

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u64,
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!(ProviderKind::parse("gemini").unwrap(), ProviderKind::Gemini);
        assert_eq!(
            ProviderKind::parse("claude").unwrap(),
            ProviderKind::Anthropic
        );
        assert_eq!(
            ProviderKind::parse(" OpenAI ").unwrap(),
            ProviderKind::OpenAi
        );
        assert!(ProviderKind::parse("bard").is_err());
    }

    #[test]
    fn gemini_response_extracts_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello from Gemini"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text);
        assert_eq!(text.as_deref(), Some("Hello from Gemini"));
    }

    #[test]
    fn gemini_response_without_candidates_is_empty() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }

    #[tokio::test]
    async fn create_provider_constructs_without_network() {
        // rig clients accept any string as API key at construction time;
        // auth failures surface on the first request.
        let provider = create_provider(
            ProviderKind::Anthropic,
            SecretString::from("test-key"),
            "claude-3-5-haiku-latest",
            500,
        );
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "anthropic");

        let provider = create_provider(
            ProviderKind::Gemini,
            SecretString::from("test-key"),
            "gemini-1.5-flash",
            500,
        );
        assert_eq!(provider.unwrap().name(), "gemini");
    }
}
