use crate::provider::ChatMessage;
use serde::Serialize;

/// Outbound directive for the chat surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartStream,
    StreamChunk(String),
    EndStream,
    CancelStream,
    ShowError(String),
    ConnectionResult {
        success: bool,
        model: String,
        error: Option<String>,
    },
    RestoreHistory(Vec<ChatMessage>),
    UpdateFileList(Vec<String>),
    /// Re-enables input; sent exactly once per generation.
    GenerationEnded,
}

impl Event {
    /// Render as a function call the surface can evaluate, e.g.
    /// `streamChunk("line\nbreak")`. Every argument is a JSON literal, so
    /// quotes, newlines and `</script>`-style payloads arrive escaped.
    pub fn to_directive(&self) -> String {
        match self {
            Self::StartStream => "startStream()".to_string(),
            Self::StreamChunk(text) => call("streamChunk", &[literal(text)]),
            Self::EndStream => "endStream()".to_string(),
            Self::CancelStream => "cancelStreamUI()".to_string(),
            Self::ShowError(text) => call("showError", &[literal(text)]),
            Self::ConnectionResult { success, model, error } => {
                let mut args = vec![literal(success), literal(model)];
                if let Some(e) = error {
                    args.push(literal(e));
                }
                call("onConnectionResult", &args)
            }
            Self::RestoreHistory(messages) => call("restoreHistory", &[literal(messages)]),
            Self::UpdateFileList(names) => call("updateFileList", &[literal(names)]),
            Self::GenerationEnded => "setUiState(false)".to_string(),
        }
    }
}

fn call(name: &str, args: &[String]) -> String {
    format!("{name}({})", args.join(", "))
}

fn literal<T: Serialize + ?Sized>(value: &T) -> String {
    // Plain data always serializes; the fallback only guards the signature.
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
        .replace("</", "<\\/")
}

/// Make an error message safe and short enough for the error banner.
pub fn sanitize_message(msg: &str) -> String {
    const MAX_CHARS: usize = 512;

    let mapped: String = msg
        .chars()
        .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
        .collect();
    let cleaned = mapped.trim().to_string();

    if cleaned.chars().count() > MAX_CHARS {
        let mut cut: String = cleaned.chars().take(MAX_CHARS).collect();
        cut.push('…');
        cut
    } else {
        cleaned
    }
}
