use futures_core::stream::BoxStream;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Who produced a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the conversation, persisted as `{"Role": .., "Content": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "Role")]
    pub role: Role,
    #[serde(rename = "Content")]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// The two wire formats a local server may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Line-delimited JSON on `/api/chat` (Ollama).
    #[default]
    OllamaNative,
    /// SSE on `/v1/chat/completions` (LM Studio and friends).
    OpenAiCompatible,
}

impl ProviderKind {
    /// Lenient mapping from the identifier the UI sends. Anything unknown is
    /// the native provider.
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "lmstudio" | "openai" | "openai-compatible" => Self::OpenAiCompatible,
            _ => Self::OllamaNative,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::OllamaNative => "ollama",
            Self::OpenAiCompatible => "lmstudio",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Where and what to talk to. Replaced wholesale on reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub provider: ProviderKind,
    pub base_url: Url,
    pub model: String,
}

impl ConnectionConfig {
    /// Validate `url` as an absolute http(s) URL.
    pub fn new(provider: ProviderKind, url: &str, model: impl Into<String>) -> Result<Self, ChatError> {
        let base_url = Url::parse(url.trim()).map_err(|_| ChatError::InvalidUrl(url.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return Err(ChatError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            provider,
            base_url,
            model: model.into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    /// The enriched prompt for this turn; replaces the last history entry.
    pub prompt: String,
}

/// Shape of one message on the wire, shared by both providers.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// What one response line means to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Delta(String),
    /// Delta carried by the terminating line, possibly empty.
    Done(Option<String>),
    Skip,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("API Error: HTTP {status} - {body}")]
    Protocol { status: u16, body: String },

    #[error("generation cancelled")]
    Cancelled,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type DeltaStream = BoxStream<'static, Result<String, ChatError>>;

/// Provider capability: request shape, response-line parser, liveness path.
///
/// Selected once per connection and threaded through the client instead of
/// re-branching on the provider kind for every line.
pub trait Provider: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Lightweight GET used to check the server is up.
    fn liveness_path(&self) -> &'static str;

    fn chat_path(&self) -> &'static str;

    fn chat_body(&self, model: &str, messages: &[WireMessage<'_>]) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        })
    }

    fn parse_line(&self, line: &str) -> LineEvent;
}
