//! Line-oriented stdio transport for the command protocol.
//!
//! Inbound: one message per line, either a JSON string literal (so payloads
//! may contain newlines) or the raw command text. Outbound: one directive per
//! line, e.g. `streamChunk("hi")`.

use crate::protocol::Event;
use crate::session::Session;
use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Undo the JSON framing of an inbound line, if it has one.
pub fn decode_line(line: &str) -> String {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.starts_with('"') {
        if let Ok(s) = serde_json::from_str::<String>(trimmed) {
            return s;
        }
    }
    trimmed.to_string()
}

/// Pump messages from `input` into `session` and events out to `output`
/// until the input ends and the last generation has flushed.
pub async fn serve<R, W>(
    mut session: Session,
    mut events: mpsc::UnboundedReceiver<Event>,
    input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    session.start().await;
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read from surface")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => session.handle_raw(&decode_line(&line)).await,
                    None => break,
                }
            }
            Some(ev) = events.recv() => write_event(output, &ev).await?,
        }
    }

    tracing::debug!("surface closed input, waiting for generation to finish");
    session.wait_idle().await;
    drop(session);

    while let Some(ev) = events.recv().await {
        write_event(output, &ev).await?;
    }
    Ok(())
}

async fn write_event<W: AsyncWrite + Unpin>(output: &mut W, ev: &Event) -> anyhow::Result<()> {
    let mut line = ev.to_directive();
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .context("failed to write to surface")?;
    output.flush().await.context("failed to flush surface")?;
    Ok(())
}
