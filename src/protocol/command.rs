//! Textual command protocol spoken by the chat surface.
//!
//! Wire form, one message per string:
//!
//! - bare keywords: `CANCEL:`, `CLEAR:`
//! - prefixed commands: `CONNECT:provider|||url|||model`, `INSERT:code`,
//!   `REPLACE:code`, `APPLY:code`, `NEWFILE:name|||code`
//! - anything else is chat: `model|||prompt` or a bare prompt
//!
//! Multi-field payloads are split on the first N-1 separators only, so the
//! last field (usually code) keeps any separators it contains.

use std::fmt;
use thiserror::Error;

/// Field separator. Three pipes do not occur in file names, URLs or JSON,
/// and are rare enough in code that the last-field rule covers the rest.
pub const SEPARATOR: &str = "|||";

pub const CANCEL: &str = "CANCEL:";
pub const CLEAR: &str = "CLEAR:";
pub const CONNECT: &str = "CONNECT:";
pub const INSERT: &str = "INSERT:";
pub const REPLACE: &str = "REPLACE:";
pub const APPLY: &str = "APPLY:";
pub const NEWFILE: &str = "NEWFILE:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        provider: String,
        url: String,
        model: String,
    },
    Chat {
        model: Option<String>,
        prompt: String,
    },
    Cancel,
    Clear,
    Insert {
        code: String,
    },
    Replace {
        code: String,
    },
    Apply {
        code: String,
    },
    NewFile {
        name: String,
        code: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{prefix} needs {expected} fields, got {got}")]
    MissingFields {
        prefix: &'static str,
        expected: usize,
        got: usize,
    },
}

impl Command {
    /// Strict decode: a recognized prefix with too few fields is an error.
    pub fn try_decode(raw: &str) -> Result<Self, DecodeError> {
        if raw == CANCEL {
            return Ok(Self::Cancel);
        }
        if raw == CLEAR {
            return Ok(Self::Clear);
        }

        if let Some(payload) = raw.strip_prefix(CONNECT) {
            let [provider, url, model] = split_fields::<3>(CONNECT, payload)?;
            return Ok(Self::Connect { provider, url, model });
        }
        if let Some(code) = raw.strip_prefix(INSERT) {
            return Ok(Self::Insert { code: code.to_string() });
        }
        if let Some(code) = raw.strip_prefix(REPLACE) {
            return Ok(Self::Replace { code: code.to_string() });
        }
        if let Some(code) = raw.strip_prefix(APPLY) {
            return Ok(Self::Apply { code: code.to_string() });
        }
        if let Some(payload) = raw.strip_prefix(NEWFILE) {
            let [name, code] = split_fields::<2>(NEWFILE, payload)?;
            return Ok(Self::NewFile { name, code });
        }

        Ok(chat(raw))
    }

    /// Total decode. Malformed commands degrade to a chat prompt carrying
    /// the original text unchanged.
    pub fn decode(raw: &str) -> Self {
        Self::try_decode(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "malformed command treated as chat");
            Self::Chat {
                model: None,
                prompt: raw.to_string(),
            }
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect { provider, url, model } => {
                format!("{CONNECT}{provider}{SEPARATOR}{url}{SEPARATOR}{model}")
            }
            Self::Chat { model: Some(model), prompt } => format!("{model}{SEPARATOR}{prompt}"),
            Self::Chat { model: None, prompt } => prompt.clone(),
            Self::Cancel => CANCEL.to_string(),
            Self::Clear => CLEAR.to_string(),
            Self::Insert { code } => format!("{INSERT}{code}"),
            Self::Replace { code } => format!("{REPLACE}{code}"),
            Self::Apply { code } => format!("{APPLY}{code}"),
            Self::NewFile { name, code } => format!("{NEWFILE}{name}{SEPARATOR}{code}"),
        }
    }

    /// Short label for logs; payloads may be large.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Chat { .. } => "chat",
            Self::Cancel => "cancel",
            Self::Clear => "clear",
            Self::Insert { .. } => "insert",
            Self::Replace { .. } => "replace",
            Self::Apply { .. } => "apply",
            Self::NewFile { .. } => "newfile",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The segment before the first separator names the model; the rest is the
/// prompt, never split further.
fn chat(raw: &str) -> Command {
    match raw.split_once(SEPARATOR) {
        Some((model, prompt)) => Command::Chat {
            model: Some(model.to_string()),
            prompt: prompt.to_string(),
        },
        None => Command::Chat {
            model: None,
            prompt: raw.to_string(),
        },
    }
}

fn split_fields<const N: usize>(prefix: &'static str, payload: &str) -> Result<[String; N], DecodeError> {
    let parts: Vec<String> = payload.splitn(N, SEPARATOR).map(str::to_string).collect();
    let got = parts.len();
    parts.try_into().map_err(|_| DecodeError::MissingFields {
        prefix,
        expected: N,
        got,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_decode() {
        assert_eq!(Command::decode("CANCEL:"), Command::Cancel);
        assert_eq!(Command::decode("CLEAR:"), Command::Clear);
    }

    #[test]
    fn connect_splits_fields_in_order() {
        assert_eq!(
            Command::decode("CONNECT:lmstudio|||http://localhost:1234|||qwen2.5-coder"),
            Command::Connect {
                provider: "lmstudio".into(),
                url: "http://localhost:1234".into(),
                model: "qwen2.5-coder".into(),
            }
        );
    }

    #[test]
    fn newfile_keeps_separators_inside_code() {
        let cmd = Command::decode("NEWFILE:src/lib.rs|||let s = \"a|||b\";\n");
        assert_eq!(
            cmd,
            Command::NewFile {
                name: "src/lib.rs".into(),
                code: "let s = \"a|||b\";\n".into(),
            }
        );
    }

    #[test]
    fn code_commands_take_the_whole_payload() {
        assert_eq!(
            Command::decode("INSERT:fn main() {}\n"),
            Command::Insert { code: "fn main() {}\n".into() }
        );
        assert_eq!(Command::decode("REPLACE:x|||y"), Command::Replace { code: "x|||y".into() });
        assert_eq!(Command::decode("APPLY:"), Command::Apply { code: String::new() });
    }

    #[test]
    fn chat_splits_model_once() {
        assert_eq!(
            Command::decode("llama3|||explain a|||b"),
            Command::Chat {
                model: Some("llama3".into()),
                prompt: "explain a|||b".into(),
            }
        );
        assert_eq!(
            Command::decode("just a question"),
            Command::Chat {
                model: None,
                prompt: "just a question".into(),
            }
        );
    }

    #[test]
    fn missing_fields_degrade_to_chat_with_original_text() {
        for raw in ["CONNECT:ollama|||http://localhost:11434", "NEWFILE:only-a-name.txt"] {
            assert_eq!(
                Command::decode(raw),
                Command::Chat {
                    model: None,
                    prompt: raw.into(),
                }
            );
        }
    }

    #[test]
    fn strict_decode_reports_missing_fields() {
        assert_eq!(
            Command::try_decode("CONNECT:ollama"),
            Err(DecodeError::MissingFields {
                prefix: CONNECT,
                expected: 3,
                got: 1,
            })
        );
    }

    #[test]
    fn unknown_prefix_is_chat() {
        assert_eq!(
            Command::decode("DELETE:everything"),
            Command::Chat {
                model: None,
                prompt: "DELETE:everything".into(),
            }
        );
        assert_eq!(
            Command::decode("CANCEL: now"),
            Command::Chat {
                model: None,
                prompt: "CANCEL: now".into(),
            }
        );
    }

    #[test]
    fn encode_reproduces_decoded_fields() {
        let raws = [
            "CONNECT:ollama|||http://127.0.0.1:11434|||llama3",
            "NEWFILE:a.py|||print('hi')",
            "INSERT:x = 1",
            "REPLACE:y = 2",
            "APPLY:",
            "CANCEL:",
            "CLEAR:",
            "llama3|||hello",
            "hello",
        ];
        for raw in raws {
            assert_eq!(Command::decode(raw).encode(), raw);
        }
    }
}
