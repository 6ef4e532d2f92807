use super::lines::LineSplitter;
use super::{
    ChatError, ChatMessage, ChatRequest, ConnectionConfig, DeltaStream, LineEvent, OllamaProvider,
    OpenAiProvider, Provider, ProviderKind, Role, WireMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Liveness probes must answer quickly; chat streams have no timeout at all.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert coding assistant integrated into the editor. \
Provide concise, correct code snippets. \
When asked to refactor, output only the improved code block if possible.";

/// HTTP client bound to one server and one provider capability.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: ConnectionConfig,
    provider: Arc<dyn Provider>,
    probe_timeout: Duration,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: ConnectionConfig) -> Self {
        let provider: Arc<dyn Provider> = match config.provider {
            ProviderKind::OllamaNative => Arc::new(OllamaProvider),
            ProviderKind::OpenAiCompatible => Arc::new(OpenAiProvider),
        };
        Self {
            http,
            config,
            provider,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Build the HTTP client every connection shares.
    ///
    /// Local servers must never be reached through a system proxy, and
    /// generation time is unbounded, so there is no request timeout.
    pub fn http_client() -> anyhow::Result<reqwest::Client> {
        use anyhow::Context;
        reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .context("failed to build HTTP client")
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Join `path` onto the base URL, dropping a doubled `/v1` segment.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        let path = if base.ends_with("/v1") {
            path.strip_prefix("/v1").unwrap_or(path)
        } else {
            path
        };
        format!("{base}{path}")
    }

    /// GET the provider's liveness path. Never fails: any error, non-2xx
    /// status or timeout is `false`.
    pub async fn test_connection(&self) -> bool {
        let url = self.endpoint(self.provider.liveness_path());
        let probe = self.http.get(&url).send();

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(resp)) => {
                let ok = resp.status().is_success();
                tracing::debug!(%url, status = %resp.status(), "liveness probe answered");
                ok
            }
            Ok(Err(e)) => {
                tracing::debug!(%url, error = %e, "liveness probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(%url, "liveness probe timed out");
                false
            }
        }
    }

    /// Stream a chat completion as a finite sequence of non-empty deltas.
    ///
    /// `history` holds the conversation including the raw user turn for this
    /// request; that last entry is replaced by `req.prompt` on the wire.
    /// Once `cancel` fires the connection is dropped and the stream yields
    /// [`ChatError::Cancelled`], whatever the transport reported.
    pub async fn stream_chat(
        &self,
        req: ChatRequest,
        history: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ChatError> {
        let prior = history.split_last().map_or(&[][..], |(_, rest)| rest);

        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(WireMessage {
            role: Role::System,
            content: &req.system_prompt,
        });
        messages.extend(prior.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        }));
        messages.push(WireMessage {
            role: Role::User,
            content: &req.prompt,
        });

        let body = self.provider.chat_body(&req.model, &messages);
        let url = self.endpoint(self.provider.chat_path());
        tracing::debug!(%url, model = %req.model, turns = messages.len(), "starting chat stream");

        let send = self.http.post(&url).json(&body).send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            resp = send => resp.map_err(|e| classify(e, &cancel))?,
        };

        let status = resp.status();
        if !status.is_success() {
            // Error bodies can stall too.
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                text = resp.text() => text.unwrap_or_default(),
            };
            return Err(ChatError::Protocol {
                status: status.as_u16(),
                body: text,
            });
        }

        let (tx, rx) = mpsc::channel::<Result<String, ChatError>>(64);
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            let mut bytes = Box::pin(resp.bytes_stream());
            let mut lines = LineSplitter::new();

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(ChatError::Cancelled)).await;
                        return;
                    }
                    item = bytes.next() => item,
                };

                let eof = item.is_none();
                let pending = match item {
                    Some(Ok(chunk)) => lines.push(&chunk),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(classify(e, &cancel))).await;
                        return;
                    }
                    None => lines.finish().into_iter().collect(),
                };

                for line in pending {
                    match provider.parse_line(&line) {
                        LineEvent::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        LineEvent::Done(tail) => {
                            if let Some(text) = tail {
                                let _ = tx.send(Ok(text)).await;
                            }
                            return;
                        }
                        LineEvent::Skip => {}
                    }
                }

                if eof {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as DeltaStream)
    }
}

fn classify(e: reqwest::Error, cancel: &CancellationToken) -> ChatError {
    if cancel.is_cancelled() {
        ChatError::Cancelled
    } else {
        ChatError::Network(e)
    }
}
