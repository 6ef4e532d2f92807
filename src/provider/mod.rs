mod client;
mod lines;
mod ollama;
mod openai;
mod types;

pub use client::{LlmClient, DEFAULT_SYSTEM_PROMPT, PROBE_TIMEOUT};
pub use lines::LineSplitter;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use types::*;
