//! Shared chat types
//!
//! The host hands the core an immutable history of past turns and persists
//! only the `ChatResult` metadata the core returns. Everything the core needs
//! to remember across turns must therefore be representable here.

use serde::{Deserialize, Serialize};

/// Participant identifier turns are tagged with by the host.
pub const PARTICIPANT_ID: &str = "mongodb.participant";

/// Request-turn prefixes written by the host's namespace selection links.
/// A later turn can recover the chosen names by matching these.
pub const DATABASE_NAME_PREFIX: &str = "Database: ";
pub const COLLECTION_NAME_PREFIX: &str = "Collection: ";

/// The closed set of intents a response turn can declare. This is the sole
/// signal the history classifier uses to interpret prior turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Intent {
    Query,
    Schema,
    Docs,
    Generic,
    EmptyRequest,
    CancelledRequest,
    AskToConnect,
    AskForNamespace,
}

/// Explicit slash-command a request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Query,
    Schema,
    Docs,
    ExportToLanguage,
}

/// Target-language options for an export request. Provided by the host UI
/// alongside the command; the prompt carries the code to translate.
#[derive(Debug, Clone)]
pub struct ExportToLanguageOptions {
    pub language: String,
    pub include_driver_syntax: bool,
}

/// An inbound chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub command: Option<Command>,
    pub export_options: Option<ExportToLanguageOptions>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>, command: Option<Command>) -> Self {
        Self {
            prompt: prompt.into(),
            command,
            export_options: None,
        }
    }

    pub fn with_export_options(mut self, options: ExportToLanguageOptions) -> Self {
        self.export_options = Some(options);
        self
    }

    pub fn is_prompt_empty(&self) -> bool {
        self.prompt.trim().is_empty()
    }
}

/// Metadata attached to every produced chat result. This is the only state
/// the host persists between turns on the core's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResultMetadata {
    pub intent: Intent,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_conversation_id: Option<String>,
}

impl ChatResultMetadata {
    pub fn new(intent: Intent, chat_id: impl Into<String>) -> Self {
        Self {
            intent,
            chat_id: chat_id.into(),
            database_name: None,
            collection_name: None,
            docs_conversation_id: None,
        }
    }
}

/// Error details a response turn can carry, surfaced by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
}

/// The result of one handled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub metadata: ChatResultMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

impl ChatResult {
    pub fn new(metadata: ChatResultMetadata) -> Self {
        Self {
            metadata,
            error_details: None,
        }
    }

    pub fn with_error(metadata: ChatResultMetadata, message: impl Into<String>) -> Self {
        Self {
            metadata,
            error_details: Some(ErrorDetails {
                message: message.into(),
            }),
        }
    }
}

/// A user request turn as recorded in the host history.
#[derive(Debug, Clone)]
pub struct RequestTurn {
    pub prompt: String,
    pub command: Option<Command>,
    /// Participant that originated the turn, when the host tracks it.
    pub participant_id: Option<String>,
}

impl RequestTurn {
    pub fn new(prompt: impl Into<String>, command: Option<Command>) -> Self {
        Self {
            prompt: prompt.into(),
            command,
            participant_id: Some(PARTICIPANT_ID.to_string()),
        }
    }
}

/// An assistant response turn: ordered markdown fragments plus the result
/// the host persisted for it.
#[derive(Debug, Clone)]
pub struct ResponseTurn {
    pub fragments: Vec<String>,
    pub result: ChatResult,
}

impl ResponseTurn {
    pub fn new(fragments: Vec<String>, result: ChatResult) -> Self {
        Self { fragments, result }
    }

    pub fn intent(&self) -> Intent {
        self.result.metadata.intent
    }
}

/// One unit of the immutable turn history.
#[derive(Debug, Clone)]
pub enum Turn {
    Request(RequestTurn),
    Response(ResponseTurn),
}

impl Turn {
    pub fn as_request(&self) -> Option<&RequestTurn> {
        match self {
            Turn::Request(r) => Some(r),
            Turn::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseTurn> {
        match self {
            Turn::Response(r) => Some(r),
            Turn::Request(_) => None,
        }
    }
}

/// Role of a prompt message sent to a model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    User,
}

/// One message of the stateless sequence sent to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn content_length(&self) -> usize {
        self.content.trim().len()
    }

    pub fn is_content_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The (database, collection) pair a query or schema operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Per-chat-session record surviving across turns. Lifetime is tied to the
/// chat UI session; there is no explicit teardown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatMetadata {
    pub database_name: Option<String>,
    pub collection_name: Option<String>,
    pub docs_conversation_id: Option<String>,
}
