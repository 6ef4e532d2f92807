//! Chat with a locally hosted LLM server from an editor surface.
//!
//! The surface talks to a [`session::Session`] through the textual
//! [`protocol`]: raw command strings in, function-call directives out. The
//! session streams completions through [`provider::LlmClient`], expands
//! `@file` references with [`context`], and keeps the conversation in a
//! [`history::HistoryStore`].

pub mod bridge;
pub mod config;
pub mod context;
pub mod history;
pub mod paths;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod workspace;
