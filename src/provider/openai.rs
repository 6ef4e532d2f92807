use super::{LineEvent, Provider, ProviderKind};
use serde::Deserialize;

/// OpenAI-compatible SSE chat completions (LM Studio, llama.cpp server, ...).
#[derive(Debug, Default, Clone)]
pub struct OpenAiProvider;

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    fn liveness_path(&self) -> &'static str {
        "/v1/models"
    }

    fn chat_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn parse_line(&self, line: &str) -> LineEvent {
        // Only `data: ` lines carry payload; event:, id:, comments are ignored.
        let Some(data) = line.strip_prefix("data: ") else {
            return LineEvent::Skip;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return LineEvent::Done(None);
        }

        let Ok(chunk) = serde_json::from_str::<CompletionChunk>(data) else {
            tracing::debug!(data, "skipping unparsable SSE payload");
            return LineEvent::Skip;
        };

        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|c| !c.is_empty())
            .map_or(LineEvent::Skip, LineEvent::Delta)
    }
}
