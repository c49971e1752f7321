//! History classifier
//!
//! The chat host provides only an immutable history of past turns; durable
//! session state is rederived from it here. Filtering decides which turns are
//! worth replaying to a model: connection-selection artifacts, empty prompts,
//! connect/empty-request scaffolding, resolved namespace questions and
//! safety-filtered exchanges all stay out of the prompt.
//!
//! The docs flow uses a different windowing rule (turns since the last docs
//! turn, capped) because the docs backend keeps its own conversation state
//! server-side. The two policies are intentionally separate.

use tracing::debug;
use uuid::Uuid;

use crate::error::FILTERED_ERROR_MESSAGE;
use crate::provider::ModelProvider;
use crate::types::{
    COLLECTION_NAME_PREFIX, Command, DATABASE_NAME_PREFIX, Intent, PromptMessage, Turn,
};

/// Docs history window: the docs chatbot replays at most this many turns
/// since the last docs-tagged turn.
const MAX_DOCS_HISTORY_LENGTH: usize = 4;

/// Options for [`filter_history`].
pub struct HistoryFilterOptions<'a> {
    /// Connection display names, used to recognize turns that were just the
    /// user clicking a connection name.
    pub connection_names: &'a [String],
    /// Whether the current namespace is already resolved. When it is, prompts
    /// asking for it (and their answers) are hidden.
    pub namespace_is_known: bool,
    /// Remaining token budget for history, if the caller computed one.
    pub token_limit: Option<usize>,
    /// Model used to count tokens against `token_limit`.
    pub model: Option<&'a dyn ModelProvider>,
}

fn response_error_is_filtered(turn: &Turn) -> bool {
    turn.as_response()
        .and_then(|r| r.result.error_details.as_ref())
        .is_some_and(|e| e.message == FILTERED_ERROR_MESSAGE)
}

fn message_for_request_turn(
    history: &[Turn],
    index: usize,
    opts: &HistoryFilterOptions,
) -> Option<PromptMessage> {
    let request = history[index].as_request()?;

    // If the namespace is already known, skip answers to prompts asking
    // for it.
    if let Some(previous) = index.checked_sub(1).and_then(|i| history.get(i))
        && let Some(response) = previous.as_response()
        && response.intent() == Intent::AskForNamespace
        && opts.namespace_is_known
    {
        return None;
    }

    // If the response to this request was safety-filtered, the whole
    // exchange stays out of context.
    if let Some(next) = history.get(index + 1)
        && response_error_is_filtered(next)
    {
        return None;
    }

    // Empty prompts and connection names are connection-selection artifacts,
    // not real content.
    if request.prompt.trim().is_empty() || opts.connection_names.contains(&request.prompt) {
        return None;
    }

    Some(PromptMessage::user(&request.prompt))
}

fn message_for_response_turn(turn: &Turn, opts: &HistoryFilterOptions) -> Option<PromptMessage> {
    let response = turn.as_response()?;

    if response_error_is_filtered(turn) {
        return None;
    }

    // Reconstructed scaffolding the user is not meant to see replayed.
    match response.intent() {
        Intent::EmptyRequest | Intent::AskToConnect => return None,
        Intent::AskForNamespace if opts.namespace_is_known => return None,
        _ => {}
    }

    let content = if response.intent() == Intent::AskForNamespace {
        // Keep only the question asked, not the rendered name choices.
        response.fragments.first().cloned().unwrap_or_default()
    } else {
        response.fragments.concat()
    };

    Some(PromptMessage::assistant(content))
}

/// Produce the filtered, role-tagged message sequence suitable for replay to
/// a model. Iterates newest to oldest so a token budget discards older turns
/// first, then reverses into chronological order.
pub fn filter_history(history: &[Turn], opts: &HistoryFilterOptions) -> Vec<PromptMessage> {
    let mut messages: Vec<PromptMessage> = Vec::new();
    let mut used_tokens = 0usize;

    for index in (0..history.len()).rev() {
        let message = match &history[index] {
            Turn::Request(_) => message_for_request_turn(history, index, opts),
            Turn::Response(_) => message_for_response_turn(&history[index], opts),
        };

        let Some(message) = message else { continue };

        if let (Some(limit), Some(model)) = (opts.token_limit, opts.model) {
            used_tokens += model.count_message_tokens(&message);
            if used_tokens > limit {
                debug!(
                    kept = messages.len(),
                    limit, "history token budget reached, dropping older turns"
                );
                break;
            }
        }

        messages.push(message);
    }

    messages.reverse();
    messages
}

/// Turns since the last docs-tagged turn, capped at the docs window size.
/// The docs backend keeps conversation state server-side, so only this
/// recent slice is ever replayed.
pub fn docs_history_window(history: &[Turn]) -> Vec<Turn> {
    let mut since_last_docs: Vec<Turn> = Vec::new();

    for turn in history.iter().rev() {
        let is_docs_turn = turn
            .as_request()
            .is_some_and(|r| r.command == Some(Command::Docs));
        if is_docs_turn || since_last_docs.len() >= MAX_DOCS_HISTORY_LENGTH {
            break;
        }
        since_last_docs.push(turn.clone());
    }
    since_last_docs.reverse();
    since_last_docs
}

/// History for the docs chatbot: the docs window filtered with the general
/// rules.
pub fn filter_history_for_docs(
    history: &[Turn],
    connection_names: &[String],
    namespace_is_known: bool,
) -> Vec<PromptMessage> {
    filter_history(
        &docs_history_window(history),
        &HistoryFilterOptions {
            connection_names,
            namespace_is_known,
            token_limit: None,
            model: None,
        },
    )
}

/// Stable chat-session id for a history: the oldest response turn's stored
/// id, or a freshly generated one when the history has none.
pub fn chat_id_for_history(history: &[Turn]) -> String {
    history
        .iter()
        .find_map(|turn| turn.as_response())
        .map(|response| response.result.metadata.chat_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Intent the most recent response turn declared, if any.
pub fn last_response_intent(history: &[Turn]) -> Option<Intent> {
    history
        .iter()
        .rev()
        .find_map(|turn| turn.as_response())
        .map(|response| response.intent())
}

/// Namespace recovered from history and the current prompt: selection-link
/// request turns (`Database: x` / `Collection: y`) and response metadata both
/// contribute, newest value wins per field.
pub fn namespace_from_history(
    request_prompt: &str,
    history: &[Turn],
) -> (Option<String>, Option<String>) {
    let mut database_name: Option<String> = None;
    let mut collection_name: Option<String> = None;

    let mut scan_prompt = |prompt: &str, database: &mut Option<String>, collection: &mut Option<String>| {
        if let Some(rest) = prompt.strip_prefix(DATABASE_NAME_PREFIX) {
            *database = Some(rest.trim().to_string());
        }
        if let Some(rest) = prompt.strip_prefix(COLLECTION_NAME_PREFIX) {
            *collection = Some(rest.trim().to_string());
        }
    };

    for turn in history {
        match turn {
            Turn::Request(request) => {
                scan_prompt(&request.prompt, &mut database_name, &mut collection_name);
            }
            Turn::Response(response) => {
                if let Some(name) = &response.result.metadata.database_name {
                    database_name = Some(name.clone());
                }
                if let Some(name) = &response.result.metadata.collection_name {
                    collection_name = Some(name.clone());
                }
            }
        }
    }

    // The request the user just made may carry part of the namespace too.
    scan_prompt(request_prompt, &mut database_name, &mut collection_name);

    (database_name, collection_name)
}
