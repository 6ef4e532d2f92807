use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Provider identifier: "ollama" (default), "lmstudio" or "openai".
    pub provider: Option<String>,

    /// Server base URL, e.g. http://localhost:11434 or http://localhost:1234/v1.
    pub base_url: Option<String>,

    /// Default model (optional)
    pub model: Option<String>,

    /// Replaces the built-in coding assistant prompt.
    pub system_prompt: Option<String>,

    /// Where the conversation is persisted (default: temp dir).
    pub history_path: Option<PathBuf>,

    /// Project root scanned for `@file` references (default: cwd).
    pub workspace: Option<PathBuf>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}
