//! Text generation client (Cohere chat API).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.cohere.ai/v1/chat";
pub const DEFAULT_MODEL: &str = "command-r";

pub const DEFAULT_PERSONALITY: &str = "You are ChatPal, a playful and witty chat companion. \
Keep replies short and conversational, be helpful, and match the tone of the chat.";

/// Why a reply could not be generated.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion API key is not configured")]
    Misconfigured,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("empty response")]
    Empty,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that turns a chat message into a reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, message: &str, context: Option<&str>) -> Result<String, GenerationError>;

    /// Model name shown in `/stats`.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub personality: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 200,
            temperature: 0.8,
            personality: DEFAULT_PERSONALITY.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    preamble: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    text: Option<String>,
}

pub struct CohereClient {
    api_key: Option<String>,
    settings: CompletionSettings,
    http: reqwest::Client,
}

impl CohereClient {
    /// An empty or missing key builds a client whose every call fails with
    /// [`GenerationError::Misconfigured`].
    pub fn new(api_key: Option<String>, settings: CompletionSettings) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Self {
            api_key,
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn preamble(&self, context: Option<&str>) -> String {
        match context {
            Some(ctx) => format!("{} Context: {}", self.settings.personality, ctx),
            None => self.settings.personality.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for CohereClient {
    async fn generate(&self, message: &str, context: Option<&str>) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::Misconfigured)?;

        let request = ChatRequest {
            model: &self.settings.model,
            message,
            preamble: self.preamble(context),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        debug!("Completion response status: {status}");

        let text = parse_response(status.as_u16(), &body)?;
        info!("🧠 Generated {} chars", text.len());
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

fn parse_response(status: u16, body: &str) -> Result<String, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(GenerationError::Api { status, body: body.to_string() });
    }
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Parse(e.to_string()))?;
    match parsed.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::Empty),
    }
}
