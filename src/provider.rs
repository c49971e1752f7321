//! Provider traits for external collaborators
//!
//! The core never talks to an editor, a driver, or the network directly; it
//! consumes these narrow interfaces. Hosts supply real implementations, tests
//! supply fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DocsError, ModelError};
use crate::types::{Namespace, PromptMessage};

/// One item of a streamed model response. The channel closing marks the end
/// of the stream.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    Fragment(String),
    Failed(ModelError),
}

/// General-purpose language model.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Declared input-token budget of the active model.
    fn max_input_tokens(&self) -> usize;

    /// Count tokens for a piece of prompt text.
    fn count_tokens(&self, text: &str) -> usize;

    /// Send a message sequence, receiving streamed text fragments.
    /// Implementations must stop promptly when `cancel` fires.
    async fn send_request(
        &self,
        messages: Vec<PromptMessage>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ModelEvent>, ModelError>;
}

impl dyn ModelProvider + '_ {
    /// Token count for a full prompt message (role overhead is ignored; the
    /// budget is a soft invariant).
    pub fn count_message_tokens(&self, message: &PromptMessage) -> usize {
        self.count_tokens(&message.content)
    }
}

/// Active data connection, as exposed by the host's connection layer.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Display name of the active connection, if any.
    fn active_connection_name(&self) -> Option<String>;

    /// Display names of all saved connections. Used both to render connect
    /// choices and to recognize connection-selection artifacts in history.
    fn connection_names(&self) -> Vec<String>;

    /// Database names of the active connection, most recently used first.
    async fn list_databases(&self, cancel: &CancellationToken) -> anyhow::Result<Vec<String>>;

    /// Collection names of a database, most recently used first.
    async fn list_collections(
        &self,
        database: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<String>>;

    /// Sample up to `limit` documents from a namespace.
    async fn sample_documents(
        &self,
        namespace: &Namespace,
        limit: usize,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<serde_json::Value>>;
}

/// A conversation created on the docs chatbot service.
#[derive(Debug, Clone, Deserialize)]
pub struct DocsConversation {
    pub id: String,
}

/// A documentation reference attached to a docs answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsReference {
    pub title: String,
    pub url: String,
}

/// An answer message from the docs chatbot service.
#[derive(Debug, Clone, Deserialize)]
pub struct DocsMessage {
    pub content: String,
    #[serde(default)]
    pub references: Vec<DocsReference>,
}

/// Documentation-specialized answer backend. Keeps its own conversation
/// state server-side, addressed by conversation id.
#[async_trait]
pub trait DocsBackend: Send + Sync {
    async fn create_conversation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DocsConversation, DocsError>;

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DocsMessage, DocsError>;
}
