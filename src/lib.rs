//! Conversational core of an in-editor MongoDB assistant.
//!
//! The host editor supplies connections, a language model, a response stream
//! and the immutable turn history; this crate routes each request to the
//! right handler, resolves the target namespace, assembles token-budgeted
//! prompts and post-processes the streamed answers.

pub mod config;
pub mod dispatch;
pub mod docs_chatbot;
pub mod enrichment;
pub mod error;
pub mod history;
pub mod metadata;
pub mod namespace;
pub mod participant;
pub mod postprocess;
pub mod prompts;
pub mod provider;
pub mod stream;
pub mod telemetry;
pub mod types;

pub use config::ParticipantConfig;
pub use participant::ParticipantController;
pub use types::{ChatRequest, ChatResult, Command, Intent, Namespace, Turn};
