use crate::provider::ChatMessage;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// File name of the history inside the temp dir when nothing else is set.
pub const DEFAULT_FILE_NAME: &str = "local-chat_history.json";

/// Ordered conversation log backed by one JSON file.
///
/// Every mutation is followed by a full rewrite of the file. Persistence
/// failures are logged and swallowed: the in-memory log stays authoritative.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    messages: Vec<ChatMessage>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            messages: Vec::new(),
        }
    }

    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Replace the in-memory log with the stored one. A missing or
    /// unparsable file yields an empty log.
    pub async fn load(&mut self) -> &[ChatMessage] {
        self.messages = match read_messages(&self.path).await {
            Ok(Some(messages)) => messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %format!("{e:#}"), "failed to load history");
                Vec::new()
            }
        };
        tracing::debug!(count = self.messages.len(), "history loaded");
        &self.messages
    }

    pub async fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.persist().await;
    }

    pub async fn persist(&self) {
        if let Err(e) = write_atomic(&self.path, &self.messages).await {
            tracing::warn!(path = %self.path.display(), error = %format!("{e:#}"), "failed to save history");
        }
    }

    pub async fn clear(&mut self) {
        self.messages.clear();
        self.persist().await;
    }
}

async fn read_messages(path: &Path) -> anyhow::Result<Option<Vec<ChatMessage>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("failed to read history: {}", path.display()))
        }
    };

    let messages: Vec<ChatMessage> = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse JSON: {}", path.display()))?;
    Ok(Some(messages))
}

async fn write_atomic(path: &Path, messages: &[ChatMessage]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create history dir: {}", dir.display()))?;

    let tmp = tmp_path(path);
    let bytes = serde_json::to_vec(messages).context("failed to encode JSON")?;
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write: {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace: {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    p.set_file_name(format!("{file}.tmp"));
    p
}
