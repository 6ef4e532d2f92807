#![cfg(feature = "tui")]

use crate::app::Resolved;
use anyhow::Context;
use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use local_chat::protocol::{Command, Event};
use local_chat::session::Session;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use tokio::sync::mpsc;

const HELP: &str = "Enter sends. Esc cancels a reply. Commands: /quit, /clear, /apply, \
/model <name>, /connect <provider> <url> [model]";

#[derive(Debug, Clone)]
struct ChatLine {
    role: &'static str,
    text: String,
}

#[derive(Debug, PartialEq)]
enum Action {
    Quit,
    SetModel(String),
    Send(Command),
    Nothing,
}

/// Turn one line of user input into what the session should do.
fn parse_input(msg: &str, model: &str) -> Action {
    let msg = msg.trim();
    if msg.is_empty() {
        return Action::Nothing;
    }
    match msg {
        "/quit" => return Action::Quit,
        "/clear" => return Action::Send(Command::Clear),
        "/apply" => return Action::Send(Command::Apply { code: String::new() }),
        _ => {}
    }
    if let Some(rest) = msg.strip_prefix("/model ") {
        return Action::SetModel(rest.trim().to_string());
    }
    if let Some(rest) = msg.strip_prefix("/connect ") {
        let mut parts = rest.split_whitespace();
        return match (parts.next(), parts.next()) {
            (Some(provider), Some(url)) => Action::Send(Command::Connect {
                provider: provider.to_string(),
                url: url.to_string(),
                model: parts.next().unwrap_or(model).to_string(),
            }),
            _ => Action::Nothing,
        };
    }
    Action::Send(Command::Chat {
        model: Some(model.to_string()),
        prompt: msg.to_string(),
    })
}

struct View {
    lines: Vec<ChatLine>,
    input: String,
    model: String,
    file_count: usize,
    streaming: bool,
}

impl View {
    fn push(&mut self, role: &'static str, text: impl Into<String>) {
        self.lines.push(ChatLine {
            role,
            text: text.into(),
        });
    }

    fn apply(&mut self, ev: Event) {
        match ev {
            Event::RestoreHistory(messages) => {
                for m in messages {
                    let role = m.role.as_str();
                    self.push(role, m.content);
                }
            }
            Event::StartStream => {
                self.streaming = true;
                self.push("assistant", "");
            }
            Event::StreamChunk(t) => {
                if let Some(last) = self.lines.last_mut() {
                    if last.role == "assistant" {
                        last.text.push_str(&t);
                    }
                }
            }
            Event::EndStream => {}
            Event::CancelStream => self.push("system", "(cancelled)"),
            Event::ShowError(e) => self.push("error", e),
            Event::ConnectionResult { success: true, model, .. } => {
                self.push("system", format!("connected, model: {model}"));
            }
            Event::ConnectionResult { error, .. } => {
                self.push("error", error.unwrap_or_else(|| "connection failed".to_string()));
            }
            Event::UpdateFileList(files) => self.file_count = files.len(),
            Event::GenerationEnded => self.streaming = false,
        }
    }
}

pub async fn run_tui(resolved: &Resolved) -> anyhow::Result<()> {
    let (tx, mut session_rx) = mpsc::unbounded_channel();
    let mut session = resolved.build_session(tx)?;

    let mut view = View {
        lines: vec![ChatLine {
            role: "system",
            text: HELP.to_string(),
        }],
        input: String::new(),
        model: resolved.model.clone(),
        file_count: 0,
        streaming: false,
    };

    session.start().await;
    session
        .connect(&resolved.provider, &resolved.base_url, &resolved.model)
        .await;

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<TermEvent>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &view) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let TermEvent::Key(key) = ev {
                    if handle_key(key, &mut view, &mut session).await {
                        break Ok(());
                    }
                }
            }
            Some(ev) = session_rx.recv() => view.apply(ev),
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    session.cancel();
    session.wait_idle().await;
    res
}

/// Returns true when the UI should exit.
async fn handle_key(key: KeyEvent, view: &mut View, session: &mut Session) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc if view.streaming => session.dispatch(Command::Cancel).await,
        KeyCode::Esc => return true,
        KeyCode::Char(c) => view.input.push(c),
        KeyCode::Backspace => {
            view.input.pop();
        }
        KeyCode::Enter => {
            let msg = std::mem::take(&mut view.input);
            match parse_input(&msg, &view.model) {
                Action::Quit => return true,
                Action::Nothing => {}
                Action::SetModel(model) => {
                    view.push("system", format!("model set to: {model}"));
                    view.model = model;
                }
                Action::Send(cmd) => {
                    match &cmd {
                        Command::Clear => view.lines.clear(),
                        Command::Chat { prompt, .. } => view.push("user", prompt.clone()),
                        _ => {}
                    }
                    session.dispatch(cmd).await;
                }
            }
        }
        _ => {}
    }
    false
}

fn draw(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, view: &View) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        for l in &view.lines {
            let style = match l.role {
                "user" | "error" => Style::default().add_modifier(Modifier::BOLD),
                _ => Style::default(),
            };
            text.lines.push(Line::styled(format!("{}: ", l.role), style));
            text.lines.extend(Text::from(l.text.clone()).lines);
            text.lines.push(Line::from(""));
        }

        let status = if view.streaming { " (streaming)" } else { "" };
        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "local-chat | model: {} | {} files{status}",
                view.model, view.file_count
            )))
            .wrap(Wrap { trim: false });

        let input_w = Paragraph::new(view.input.clone())
            .block(Block::default().borders(Borders::ALL).title("input"));

        f.render_widget(chat, chunks[0]);
        f.render_widget(input_w, chunks[1]);

        let x = chunks[1].x + 1 + view.input.chars().count() as u16;
        let y = chunks[1].y + 1;
        f.set_cursor_position((x.min(chunks[1].x + chunks[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_chats_with_current_model() {
        assert_eq!(
            parse_input("  explain @lib.rs ", "qwen"),
            Action::Send(Command::Chat {
                model: Some("qwen".to_string()),
                prompt: "explain @lib.rs".to_string(),
            })
        );
        assert_eq!(parse_input("   ", "qwen"), Action::Nothing);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/quit", "m"), Action::Quit);
        assert_eq!(parse_input("/clear", "m"), Action::Send(Command::Clear));
        assert_eq!(parse_input("/model llama3.1", "m"), Action::SetModel("llama3.1".to_string()));
        assert_eq!(
            parse_input("/connect lmstudio http://localhost:1234/v1", "m"),
            Action::Send(Command::Connect {
                provider: "lmstudio".to_string(),
                url: "http://localhost:1234/v1".to_string(),
                model: "m".to_string(),
            })
        );
        assert_eq!(parse_input("/connect ollama", "m"), Action::Nothing);
    }
}
