mod app;
mod cli;

#[cfg(feature = "tui")]
mod tui;

use clap::Parser;
use local_chat::{bridge, config, paths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol in `serve` mode, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, ?cfg, "resolved config");

    let resolved = app::Resolved::new(&args, cfg.as_ref())?;

    match args.cmd {
        Some(cli::Command::Serve) => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let session = resolved.build_session(tx)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            return bridge::serve(session, rx, stdin, &mut stdout).await;
        }
        Some(cli::Command::History { clear }) => {
            return app::cmd_history(&resolved, clear).await;
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Tui) => {
            return tui::run_tui(&resolved).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!(
            "No prompt provided. Try: local-chat \"Explain @main.rs\" or `local-chat serve`"
        );
    }

    app::cmd_prompt(&resolved, prompt).await
}
