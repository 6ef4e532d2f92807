//! The orchestrator: decodes surface commands, owns the conversation and
//! runs at most one generation at a time.

mod generation;

pub use generation::{Generation, GenerationState, Outcome};

use crate::context::{self, FileLookup};
use crate::history::HistoryStore;
use crate::protocol::{sanitize_message, Command, Event};
use crate::provider::{
    ChatMessage, ChatRequest, ConnectionConfig, LlmClient, ProviderKind, DEFAULT_SYSTEM_PROMPT,
    PROBE_TIMEOUT,
};
use generation::GenerationTask;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Native editing capabilities of the host.
pub trait Editor: Send + Sync {
    /// Text currently selected in the active document.
    fn selection(&self) -> Option<String>;

    /// Insert at the cursor, replacing the selection if any.
    fn insert(&self, code: &str) -> anyhow::Result<()>;

    /// Open a comparison between the active document and `code`.
    fn show_diff(&self, code: &str) -> anyhow::Result<()>;

    /// Apply code the user reviewed.
    fn apply(&self, code: &str) -> anyhow::Result<()>;

    fn create_file(&self, name: &str, code: &str) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Used when neither the chat command nor the connection names a model.
    pub default_model: String,
    pub system_prompt: String,
    pub probe_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_model: "llama3".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

struct ActiveGeneration {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<GenerationState>,
}

pub struct Session {
    settings: SessionSettings,
    http: reqwest::Client,
    client: Option<LlmClient>,
    history: Arc<Mutex<HistoryStore>>,
    active: Option<ActiveGeneration>,
    next_id: u64,
    pending_review: Option<String>,
    events: mpsc::UnboundedSender<Event>,
    editor: Arc<dyn Editor>,
    files: Arc<dyn FileLookup>,
}

impl Session {
    pub fn new(
        settings: SessionSettings,
        http: reqwest::Client,
        history: HistoryStore,
        editor: Arc<dyn Editor>,
        files: Arc<dyn FileLookup>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            settings,
            http,
            client: None,
            history: Arc::new(Mutex::new(history)),
            active: None,
            next_id: 0,
            pending_review: None,
            events,
            editor,
            files,
        }
    }

    /// Restore persisted history and the file list once the surface is up.
    pub async fn start(&mut self) {
        let restored = self.history.lock().await.load().await.to_vec();
        if !restored.is_empty() {
            self.emit(Event::RestoreHistory(restored));
        }
        self.send_file_list().await;
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn connection(&self) -> Option<&ConnectionConfig> {
        self.client.as_ref().map(|c| c.config())
    }

    pub fn is_generating(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.handle.is_finished())
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.messages().to_vec()
    }

    /// Decode and dispatch one raw surface message. Commands missing
    /// required fields are dropped.
    pub async fn handle_raw(&mut self, raw: &str) {
        match Command::try_decode(raw) {
            Ok(cmd) => self.dispatch(cmd).await,
            Err(e) => tracing::warn!(error = %e, "dropping malformed command"),
        }
    }

    pub async fn dispatch(&mut self, cmd: Command) {
        tracing::debug!(kind = cmd.kind(), "dispatching command");
        match cmd {
            Command::Cancel => self.cancel(),
            Command::Clear => self.clear().await,
            Command::Connect { provider, url, model } => self.connect(&provider, &url, &model).await,
            Command::Chat { model, prompt } => self.chat(model, prompt).await,
            Command::Insert { code } => {
                let result = self.editor.insert(&code);
                self.report("Insert failed", result);
            }
            Command::Replace { code } => {
                let result = self.editor.show_diff(&code);
                self.pending_review = Some(code);
                self.report("Diff failed", result);
            }
            Command::Apply { code } => self.apply(code),
            Command::NewFile { name, code } => match self.editor.create_file(&name, &code) {
                Ok(path) => tracing::info!(path = %path.display(), "created file"),
                Err(e) => self.emit(Event::ShowError(sanitize_message(&format!(
                    "Error creating file: {e:#}"
                )))),
            },
        }
    }

    /// Request cancellation of the in-flight generation without waiting.
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            tracing::info!(id = active.id, "cancellation requested");
            active.cancel.cancel();
        }
    }

    /// Wait for the in-flight generation, if any, to flush its outcome.
    pub async fn wait_idle(&mut self) -> Option<GenerationState> {
        let active = self.active.take()?;
        match active.handle.await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(id = active.id, error = %e, "generation task failed");
                None
            }
        }
    }

    pub async fn clear(&mut self) {
        // An assistant turn landing after the clear would orphan it.
        self.supersede().await;
        self.history.lock().await.clear().await;
        tracing::info!("history cleared");
    }

    pub async fn connect(&mut self, provider: &str, url: &str, model: &str) {
        self.send_file_list().await;

        let kind = ProviderKind::from_wire(provider);
        let config = match ConnectionConfig::new(kind, url, model) {
            Ok(c) => c,
            Err(e) => {
                self.emit(Event::ConnectionResult {
                    success: false,
                    model: model.to_string(),
                    error: Some(format!("Error: {e}")),
                });
                return;
            }
        };

        let client =
            LlmClient::new(self.http.clone(), config).with_probe_timeout(self.settings.probe_timeout);
        if client.test_connection().await {
            tracing::info!(provider = %kind, url, model, "connected");
            self.client = Some(client);
            self.emit(Event::ConnectionResult {
                success: true,
                model: model.to_string(),
                error: None,
            });
        } else {
            tracing::warn!(provider = %kind, url, "connection test failed");
            self.emit(Event::ConnectionResult {
                success: false,
                model: model.to_string(),
                error: Some("Connection timed out or refused.".to_string()),
            });
        }
    }

    /// Start a generation, superseding any one still streaming.
    ///
    /// Without a connection nothing is recorded, so history never holds a
    /// user turn that no request was made for.
    pub async fn chat(&mut self, model: Option<String>, prompt: String) {
        let Some(client) = self.client.clone() else {
            self.emit(Event::ShowError("Not connected!".to_string()));
            self.emit(Event::GenerationEnded);
            return;
        };

        self.supersede().await;

        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| client.config().model.clone());
        let model = if model.trim().is_empty() {
            self.settings.default_model.clone()
        } else {
            model
        };

        let snapshot = {
            let mut history = self.history.lock().await;
            history.append(ChatMessage::user(prompt.clone())).await;
            history.messages().to_vec()
        };

        let files = Arc::clone(&self.files);
        let raw = prompt.clone();
        let enriched = tokio::task::spawn_blocking(move || context::resolve(&raw, files.as_ref()))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "context resolution failed, sending prompt as is");
                prompt
            });
        let enriched = context::with_selection(self.editor.selection().as_deref(), enriched);

        self.next_id += 1;
        let cancel = CancellationToken::new();
        let generation = Generation::new(self.next_id, cancel.clone());
        let task = GenerationTask {
            client,
            request: ChatRequest {
                model,
                system_prompt: self.settings.system_prompt.clone(),
                prompt: enriched,
            },
            snapshot,
            history: Arc::clone(&self.history),
            events: self.events.clone(),
        };

        self.active = Some(ActiveGeneration {
            id: self.next_id,
            cancel,
            handle: tokio::spawn(generation::run(task, generation)),
        });
    }

    fn apply(&mut self, code: String) {
        let code = if code.is_empty() {
            match self.pending_review.take() {
                Some(pending) => pending,
                None => {
                    self.emit(Event::ShowError("No pending changes to apply.".to_string()));
                    return;
                }
            }
        } else {
            code
        };
        let result = self.editor.apply(&code);
        self.report("Apply failed", result);
    }

    async fn supersede(&mut self) {
        if let Some(active) = self.active.take() {
            if !active.handle.is_finished() {
                tracing::info!(id = active.id, "superseding in-flight generation");
                active.cancel.cancel();
            }
            if let Err(e) = active.handle.await {
                tracing::error!(id = active.id, error = %e, "generation task failed");
            }
        }
    }

    async fn send_file_list(&self) {
        let files = Arc::clone(&self.files);
        match tokio::task::spawn_blocking(move || files.list()).await {
            Ok(names) => self.emit(Event::UpdateFileList(names)),
            Err(e) => tracing::warn!(error = %e, "failed to list workspace files"),
        }
    }

    fn report(&self, what: &str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            tracing::warn!(error = %format!("{e:#}"), "{what}");
            self.emit(Event::ShowError(sanitize_message(&format!("{what}: {e:#}"))));
        }
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::debug!("surface is gone, dropping event");
        }
    }
}
