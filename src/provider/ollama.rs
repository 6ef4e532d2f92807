use super::{LineEvent, Provider, ProviderKind};
use serde::Deserialize;

/// Native line-delimited JSON chat (`/api/chat`).
#[derive(Debug, Default, Clone)]
pub struct OllamaProvider;

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OllamaNative
    }

    fn liveness_path(&self) -> &'static str {
        "/"
    }

    fn chat_path(&self) -> &'static str {
        "/api/chat"
    }

    fn parse_line(&self, line: &str) -> LineEvent {
        let line = line.trim();
        if line.is_empty() {
            return LineEvent::Skip;
        }

        let Ok(parsed) = serde_json::from_str::<ChatLine>(line) else {
            tracing::debug!(line, "skipping unparsable line");
            return LineEvent::Skip;
        };

        let content = parsed
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty());

        match (parsed.done, content) {
            (true, content) => LineEvent::Done(content),
            (false, Some(text)) => LineEvent::Delta(text),
            (false, None) => LineEvent::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_content() {
        let p = OllamaProvider;
        assert_eq!(
            p.parse_line(r#"{"message":{"role":"assistant","content":"A"},"done":false}"#),
            LineEvent::Delta("A".into())
        );
    }

    #[test]
    fn done_terminates_and_keeps_trailing_text() {
        let p = OllamaProvider;
        assert_eq!(p.parse_line(r#"{"done":true}"#), LineEvent::Done(None));
        assert_eq!(
            p.parse_line(r#"{"message":{"content":"!"},"done":true}"#),
            LineEvent::Done(Some("!".into()))
        );
    }

    #[test]
    fn garbage_and_empty_content_are_skipped() {
        let p = OllamaProvider;
        assert_eq!(p.parse_line("keep-alive"), LineEvent::Skip);
        assert_eq!(p.parse_line(""), LineEvent::Skip);
        assert_eq!(p.parse_line(r#"{"message":{"content":""}}"#), LineEvent::Skip);
    }
}
