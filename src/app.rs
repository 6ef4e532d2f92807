use crate::cli::Args;
use anyhow::Context;
use local_chat::config::{self, Config};
use local_chat::history::HistoryStore;
use local_chat::protocol::Event;
use local_chat::provider::{LlmClient, DEFAULT_SYSTEM_PROMPT};
use local_chat::session::{Session, SessionSettings};
use local_chat::workspace::{WorkspaceEditor, WorkspaceFiles};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Flags layered over the config file layered over built-in defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub history_path: PathBuf,
    pub workspace: PathBuf,
    pub active_file: Option<PathBuf>,
}

impl Resolved {
    pub fn new(args: &Args, cfg: Option<&Config>) -> anyhow::Result<Self> {
        let pick = |flag: &Option<String>, key: fn(&Config) -> Option<String>| {
            flag.clone().or_else(|| cfg.and_then(key))
        };

        let workspace = match args
            .workspace
            .clone()
            .or_else(|| cfg.and_then(|c| c.workspace.clone()))
        {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to resolve current directory")?,
        };

        Ok(Self {
            provider: pick(&args.provider, |c| c.provider.clone())
                .unwrap_or_else(|| "ollama".to_string()),
            base_url: pick(&args.url, |c| c.base_url.clone())
                .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string()),
            model: pick(&args.model, |c| c.model.clone())
                .unwrap_or_else(|| config::DEFAULT_MODEL.to_string()),
            system_prompt: cfg
                .and_then(|c| c.system_prompt.clone())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            history_path: cfg
                .and_then(|c| c.history_path.clone())
                .unwrap_or_else(HistoryStore::default_path),
            workspace,
            active_file: args.active_file.clone(),
        })
    }

    pub fn build_session(&self, events: mpsc::UnboundedSender<Event>) -> anyhow::Result<Session> {
        let settings = SessionSettings {
            default_model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            ..SessionSettings::default()
        };
        Ok(Session::new(
            settings,
            LlmClient::http_client()?,
            HistoryStore::new(&self.history_path),
            Arc::new(WorkspaceEditor::new(&self.workspace, self.active_file.clone())),
            Arc::new(WorkspaceFiles::new(&self.workspace)),
            events,
        ))
    }
}

/// Send one prompt and stream the reply to stdout. Ctrl-C cancels.
pub async fn cmd_prompt(resolved: &Resolved, prompt: String) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = resolved.build_session(tx)?;
    session.start().await;
    session
        .connect(&resolved.provider, &resolved.base_url, &resolved.model)
        .await;
    if !session.is_connected() {
        while let Ok(ev) = rx.try_recv() {
            if let Event::ConnectionResult { error: Some(e), .. } = ev {
                anyhow::bail!("{} ({} at {})", e, resolved.provider, resolved.base_url);
            }
        }
        anyhow::bail!("failed to connect to {}", resolved.base_url);
    }

    session.chat(Some(resolved.model.clone()), prompt).await;

    let mut out = std::io::stdout();
    let mut failure = None;
    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Some(Event::StreamChunk(text)) => {
                    out.write_all(text.as_bytes()).ok();
                    out.flush().ok();
                }
                Some(Event::CancelStream) => eprintln!("\n[cancelled]"),
                Some(Event::ShowError(msg)) => failure = Some(msg),
                Some(Event::GenerationEnded) | None => break,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c() => session.cancel(),
        }
    }
    writeln!(out).ok();
    session.wait_idle().await;

    match failure {
        Some(msg) => anyhow::bail!(msg),
        None => Ok(()),
    }
}

pub async fn cmd_history(resolved: &Resolved, clear: bool) -> anyhow::Result<()> {
    let mut store = HistoryStore::new(&resolved.history_path);
    if clear {
        store.clear().await;
        println!("Cleared {}", resolved.history_path.display());
        return Ok(());
    }

    let messages = store.load().await;
    if messages.is_empty() {
        println!("(no history at {})", resolved.history_path.display());
    }
    for m in messages {
        println!("{}:\n{}\n", m.role, m.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flags_override_config() {
        let cfg = Config {
            provider: Some("lmstudio".to_string()),
            base_url: Some("http://localhost:1234/v1".to_string()),
            model: Some("qwen".to_string()),
            workspace: Some(PathBuf::from("/srv/proj")),
            ..Config::default()
        };
        let args = Args::parse_from(["local-chat", "-m", "llama3.1", "hi"]);
        let r = Resolved::new(&args, Some(&cfg)).unwrap();

        assert_eq!(r.provider, "lmstudio");
        assert_eq!(r.base_url, "http://localhost:1234/v1");
        assert_eq!(r.model, "llama3.1");
        assert_eq!(r.workspace, PathBuf::from("/srv/proj"));
        assert_eq!(r.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn defaults_without_config() {
        let args = Args::parse_from(["local-chat", "hi"]);
        let r = Resolved::new(&args, None).unwrap();
        assert_eq!(r.provider, "ollama");
        assert_eq!(r.base_url, config::DEFAULT_BASE_URL);
        assert_eq!(r.model, config::DEFAULT_MODEL);
        assert_eq!(r.history_path, HistoryStore::default_path());
    }
}
