//! Response stream primitives
//!
//! The UI layer hands the core a stream it writes markdown chunks, clickable
//! command links, and action buttons into. The core only describes available
//! next actions; it never executes user code.

use serde::Serialize;

/// A host command a rendered link invokes when clicked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum CommandLink {
    SelectDatabase { name: String },
    SelectCollection { name: String },
    Connect { connection_id: Option<String> },
    ShowMoreDatabases,
    ShowMoreCollections { database: String },
}

/// A follow-up action button carrying extracted code as an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StreamAction {
    RunQuery { code: String },
    OpenInPlayground { code: String },
}

/// Sink for one in-flight response.
pub trait ResponseStream: Send {
    /// Append a markdown chunk.
    fn markdown(&mut self, text: &str);

    /// Append a clickable command link.
    fn command_link(&mut self, title: &str, link: CommandLink);

    /// Attach a follow-up action button.
    fn action(&mut self, action: StreamAction);
}
