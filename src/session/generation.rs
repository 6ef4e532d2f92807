use crate::history::HistoryStore;
use crate::protocol::{sanitize_message, Event};
use crate::provider::{ChatError, ChatMessage, ChatRequest, LlmClient};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl GenerationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(String),
    Cancelled,
    Errored(String),
}

/// One generation: its state, cancel handle and the text streamed so far.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    state: GenerationState,
    cancel: CancellationToken,
    accumulated: String,
}

impl Generation {
    pub fn new(id: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            state: GenerationState::Idle,
            cancel,
            accumulated: String::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.accumulated
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn begin(&mut self) {
        debug_assert_eq!(self.state, GenerationState::Idle);
        self.state = GenerationState::Streaming;
    }

    /// Accumulate a delta. Returns `false` once cancellation was requested;
    /// the delta is then discarded.
    pub fn push(&mut self, delta: &str) -> bool {
        if self.state != GenerationState::Streaming || self.cancel.is_cancelled() {
            return false;
        }
        self.accumulated.push_str(delta);
        true
    }

    /// Settle into exactly one terminal state. A requested cancellation wins
    /// over whatever error the transport produced meanwhile.
    pub fn finish(&mut self, result: Result<(), ChatError>) -> Outcome {
        let cancelled = self.cancel.is_cancelled() || matches!(&result, Err(e) if e.is_cancelled());

        let outcome = match result {
            _ if cancelled => Outcome::Cancelled,
            Ok(()) => Outcome::Completed(std::mem::take(&mut self.accumulated)),
            Err(e) => Outcome::Errored(sanitize_message(&e.to_string())),
        };

        self.state = match outcome {
            Outcome::Completed(_) => GenerationState::Completed,
            Outcome::Cancelled => GenerationState::Cancelled,
            Outcome::Errored(_) => GenerationState::Errored,
        };
        outcome
    }
}

/// Everything a spawned generation needs, moved into its task.
pub(crate) struct GenerationTask {
    pub client: LlmClient,
    pub request: ChatRequest,
    pub snapshot: Vec<ChatMessage>,
    pub history: Arc<Mutex<HistoryStore>>,
    pub events: mpsc::UnboundedSender<Event>,
}

pub(crate) async fn run(task: GenerationTask, mut generation: Generation) -> GenerationState {
    let emit = |ev: Event| {
        let _ = task.events.send(ev);
    };

    generation.begin();
    tracing::info!(id = generation.id(), model = %task.request.model, "generation started");
    emit(Event::StartStream);

    let result = relay(&task, &mut generation).await;

    match generation.finish(result) {
        Outcome::Completed(text) => {
            task.history.lock().await.append(ChatMessage::assistant(text)).await;
            emit(Event::EndStream);
        }
        Outcome::Cancelled => emit(Event::CancelStream),
        Outcome::Errored(msg) => {
            tracing::warn!(id = generation.id(), error = %msg, "generation failed");
            emit(Event::ShowError(msg));
        }
    }
    emit(Event::GenerationEnded);

    tracing::info!(id = generation.id(), state = ?generation.state(), "generation ended");
    generation.state()
}

async fn relay(task: &GenerationTask, generation: &mut Generation) -> Result<(), ChatError> {
    let mut deltas = task
        .client
        .stream_chat(task.request.clone(), &task.snapshot, generation.cancel_token())
        .await?;

    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        if !generation.push(&delta) {
            return Err(ChatError::Cancelled);
        }
        let _ = task.events.send(Event::StreamChunk(delta));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_with_accumulated_text() {
        let mut g = Generation::new(1, CancellationToken::new());
        g.begin();
        assert!(g.push("A"));
        assert!(g.push("B"));
        assert_eq!(g.finish(Ok(())), Outcome::Completed("AB".into()));
        assert_eq!(g.state(), GenerationState::Completed);
    }

    #[test]
    fn cancellation_beats_errors() {
        let token = CancellationToken::new();
        let mut g = Generation::new(2, token.clone());
        g.begin();
        assert!(g.push("partial"));
        token.cancel();
        assert!(!g.push("late"));

        let err = ChatError::Protocol {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(g.finish(Err(err)), Outcome::Cancelled);
        assert!(g.state().is_terminal());
    }

    #[test]
    fn errors_are_sanitized() {
        let mut g = Generation::new(3, CancellationToken::new());
        g.begin();
        let err = ChatError::Protocol {
            status: 404,
            body: "model \"x\" not found\u{0}".into(),
        };
        assert_eq!(
            g.finish(Err(err)),
            Outcome::Errored("API Error: HTTP 404 - model \"x\" not found".into())
        );
        assert_eq!(g.state(), GenerationState::Errored);
    }

    #[test]
    fn push_before_begin_is_ignored() {
        let mut g = Generation::new(4, CancellationToken::new());
        assert!(!g.push("x"));
        assert_eq!(g.text(), "");
        assert_eq!(g.state(), GenerationState::Idle);
    }
}
