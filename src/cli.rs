use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chat with a locally hosted model server
#[derive(Debug, Parser)]
#[command(name = "local-chat")]
#[command(version)]
#[command(about = "Chat with a local LLM server (Ollama or OpenAI-compatible)", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Provider: ollama (default), lmstudio or openai
    #[arg(long = "provider", global = true)]
    pub provider: Option<String>,

    /// Server base URL (default: config/base_url or http://localhost:11434)
    #[arg(long = "url", global = true)]
    pub url: Option<String>,

    /// Project root used for @file references (default: current directory)
    #[arg(long = "workspace", value_name = "DIR", global = true)]
    pub workspace: Option<PathBuf>,

    /// File that code insertions are written to
    #[arg(long = "active-file", value_name = "FILE", global = true)]
    pub active_file: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Speak the command protocol over stdin/stdout
    Serve,

    /// Print the persisted conversation
    History {
        /// Delete the conversation instead
        #[arg(long)]
        clear: bool,
    },

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_words_are_collected() {
        let args = Args::parse_from(["local-chat", "-m", "qwen", "fix", "@main.rs"]);
        assert_eq!(args.model.as_deref(), Some("qwen"));
        assert_eq!(args.prompt, ["fix", "@main.rs"]);
        assert!(args.cmd.is_none());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let args = Args::parse_from(["local-chat", "serve", "--url", "http://localhost:1234/v1"]);
        assert!(matches!(args.cmd, Some(Command::Serve)));
        assert_eq!(args.url.as_deref(), Some("http://localhost:1234/v1"));

        let args = Args::parse_from(["local-chat", "history", "--clear"]);
        assert!(matches!(args.cmd, Some(Command::History { clear: true })));
    }
}
