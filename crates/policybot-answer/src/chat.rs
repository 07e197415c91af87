//! Chat-completion clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use policybot_core::config::ChatSettings;
use policybot_core::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// A hosted chat model. Implementations return the generated text as is.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire
/// format; Groq by default.
pub struct OpenAiCompatibleChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatibleChat {
    pub fn new(settings: &ChatSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::EngineInit("chat.api_key is not set (GROQ_API_KEY or APP_CHAT__API_KEY)".to_string()))?
            .to_string();
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::EngineInit(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            timeout,
        })
    }

    /// The client timeout covers the body download too, so any stage may time out.
    fn transport_error(&self, err: &reqwest::Error, context: &str) -> Error {
        if err.is_timeout() {
            Error::Generation(format!("chat request timed out after {}s", self.timeout.as_secs()))
        } else {
            Error::Generation(format!("{context}: {err}"))
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::EngineInit("chat.api_key contains invalid header characters".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = ChatRequest { model: &self.model, temperature, messages };
        debug!(endpoint = %self.endpoint, model = %self.model, messages = messages.len(), "chat request");
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e, "chat request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!(%status, "chat endpoint returned an error");
            return Err(Error::Generation(format!("chat endpoint returned {status}: {text}")));
        }
        let parsed: ChatResponse = resp.json().await.map_err(|e| self.transport_error(&e, "malformed response"))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Generation("malformed response: no message content".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(key: Option<&str>) -> ChatSettings {
        ChatSettings { api_key: key.map(str::to_string), ..ChatSettings::default() }
    }

    #[test]
    fn missing_key_is_an_init_failure() {
        assert!(matches!(OpenAiCompatibleChat::new(&settings(None)), Err(Error::EngineInit(_))));
        assert!(matches!(OpenAiCompatibleChat::new(&settings(Some("  "))), Err(Error::EngineInit(_))));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mut s = settings(Some("gsk_test"));
        s.base_url = "http://localhost:9999/v1/".to_string();
        let chat = OpenAiCompatibleChat::new(&s).expect("client");
        assert_eq!(chat.endpoint, "http://localhost:9999/v1/chat/completions");
        assert_eq!(chat.model_id(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn request_body_uses_wire_roles() {
        let messages = [ChatMessage::system("ctx"), ChatMessage::user("q")];
        let body = serde_json::to_value(ChatRequest { model: "m", temperature: 0.3, messages: &messages }).expect("json");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q");
        assert_eq!(body["model"], "m");
    }

    #[test]
    fn response_without_choices_parses_empty() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id":"x"}"#).expect("json");
        assert!(parsed.choices.is_empty());
    }
}
