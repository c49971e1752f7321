//! Prompt builders
//!
//! One builder per request kind. Each supplies a fixed assistant instruction
//! and a task-specific user prompt; the shared assembly here handles the
//! reconnection rewrite, token-budgeted history filtering and stats
//! reporting so every builder behaves the same way.

mod export_to_language;
mod generic;
mod intent;
mod namespace;
mod query;
mod schema;

pub use export_to_language::ExportToLanguagePrompt;
pub use generic::GenericPrompt;
pub use intent::{IntentPrompt, PromptIntent};
pub use namespace::{NamespacePrompt, parse_namespace_response};
pub use query::{QueryPrompt, QueryPromptArgs};
pub use schema::{SchemaPrompt, SchemaPromptArgs};

use serde::Serialize;

use crate::history::{HistoryFilterOptions, filter_history};
use crate::provider::ModelProvider;
use crate::types::{ChatRequest, Command, Intent, MessageRole, PromptMessage, Turn};

/// Distinguishes machine-to-machine classification prompts from user-visible
/// ones in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalPurpose {
    Intent,
    Namespace,
}

/// Size and shape of an assembled prompt. Carries no prompt content; safe to
/// hand to telemetry as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptStats {
    pub total_message_length: usize,
    pub user_input_length: usize,
    pub has_sample_documents: bool,
    pub command: Option<Command>,
    pub history_size: usize,
    pub internal_purpose: Option<InternalPurpose>,
}

/// The complete, stateless unit sent to a backend.
#[derive(Debug)]
pub struct ModelInput {
    pub messages: Vec<PromptMessage>,
    pub stats: PromptStats,
}

/// Inputs common to every builder.
pub struct PromptContext<'a> {
    pub request: &'a ChatRequest,
    pub history: &'a [Turn],
    pub connection_names: &'a [String],
    pub model: Option<&'a dyn ModelProvider>,
}

/// A built user prompt plus whether sample documents made it in.
pub struct UserPrompt {
    pub text: String,
    pub has_sample_documents: bool,
}

impl UserPrompt {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            has_sample_documents: false,
        }
    }
}

/// True when any message carries non-empty user input. When none does, the
/// intent classifier can be skipped entirely.
pub fn messages_contain_user_input(messages: &[PromptMessage]) -> bool {
    messages
        .iter()
        .any(|m| m.role == MessageRole::User && !m.is_content_empty())
}

/// If the current prompt is a connection display name answering an
/// `askToConnect` response, resume the original question: the effective
/// prompt becomes the last real user message before the connect exchange and
/// everything after it is dropped from history.
fn resolve_reconnection<'a>(ctx: &PromptContext<'a>) -> (String, &'a [Turn]) {
    let prompt = ctx.request.prompt.clone();

    if !ctx.connection_names.contains(&prompt) {
        return (prompt, ctx.history);
    }

    let last_was_ask_to_connect = ctx
        .history
        .last()
        .and_then(|turn| turn.as_response())
        .is_some_and(|response| response.intent() == Intent::AskToConnect);

    if !last_was_ask_to_connect {
        return (prompt, ctx.history);
    }

    for index in (0..ctx.history.len()).rev() {
        if let Some(request) = ctx.history[index].as_request() {
            return (request.prompt.clone(), &ctx.history[..index]);
        }
    }

    (prompt, ctx.history)
}

/// Shared assembly: fixed assistant instruction, filtered history, then the
/// current user turn. `build_user` receives the effective prompt text after
/// the reconnection rewrite.
pub(crate) fn assemble<F>(
    assistant_text: String,
    ctx: &PromptContext,
    namespace_is_known: bool,
    internal_purpose: Option<InternalPurpose>,
    build_user: F,
) -> ModelInput
where
    F: FnOnce(&str) -> UserPrompt,
{
    let (effective_prompt, history) = resolve_reconnection(ctx);

    let user = build_user(&effective_prompt);
    let assistant = PromptMessage::assistant(assistant_text);

    // Remaining budget for history once the fixed instruction and the user
    // turn are accounted for.
    let token_limit = ctx.model.map(|model| {
        model.max_input_tokens().saturating_sub(
            model.count_tokens(&assistant.content) + model.count_tokens(&user.text),
        )
    });

    let history_messages = filter_history(
        history,
        &HistoryFilterOptions {
            connection_names: ctx.connection_names,
            namespace_is_known,
            token_limit,
            model: ctx.model,
        },
    );

    let mut messages = Vec::with_capacity(history_messages.len() + 2);
    messages.push(assistant);
    messages.extend(history_messages);
    messages.push(PromptMessage::user(&user.text));

    let stats = PromptStats {
        total_message_length: messages.iter().map(PromptMessage::content_length).sum(),
        user_input_length: effective_prompt.len(),
        has_sample_documents: user.has_sample_documents,
        command: ctx.request.command,
        history_size: ctx.history.len(),
        internal_purpose,
    };

    ModelInput { messages, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatResult, ChatResultMetadata, RequestTurn, ResponseTurn};

    fn context<'a>(
        request: &'a ChatRequest,
        history: &'a [Turn],
        connection_names: &'a [String],
    ) -> PromptContext<'a> {
        PromptContext {
            request,
            history,
            connection_names,
            model: None,
        }
    }

    #[test]
    fn test_reconnection_resumes_original_question() {
        let names = vec!["localhost:27017".to_string()];
        let history = vec![
            Turn::Request(RequestTurn::new("find all sightings in arizona", None)),
            Turn::Response(ResponseTurn::new(
                vec!["Let's get you connected first.".into()],
                ChatResult::new(ChatResultMetadata::new(Intent::AskToConnect, "chat-1")),
            )),
        ];
        let request = ChatRequest::new("localhost:27017", Some(Command::Query));
        let ctx = context(&request, &history, &names);

        let input = GenericPrompt.build_messages(&ctx);
        let user = input.messages.last().unwrap();
        assert_eq!(user.content, "find all sightings in arizona");
        // The connect exchange itself is not replayed.
        assert_eq!(input.messages.len(), 2);
    }

    #[test]
    fn test_no_rewrite_without_ask_to_connect() {
        let names = vec!["localhost:27017".to_string()];
        let history = vec![Turn::Request(RequestTurn::new("earlier question", None))];
        let request = ChatRequest::new("localhost:27017", None);
        let ctx = context(&request, &history, &names);

        let input = GenericPrompt.build_messages(&ctx);
        assert_eq!(input.messages.last().unwrap().content, "localhost:27017");
    }

    #[test]
    fn test_stats_report_shape_not_content() {
        let request = ChatRequest::new("how do indexes work?", None);
        let history = vec![];
        let names = vec![];
        let ctx = context(&request, &history, &names);

        let input = GenericPrompt.build_messages(&ctx);
        assert_eq!(input.stats.user_input_length, "how do indexes work?".len());
        assert_eq!(input.stats.history_size, 0);
        assert!(!input.stats.has_sample_documents);
        assert_eq!(input.stats.internal_purpose, None);
    }

    #[test]
    fn test_messages_contain_user_input() {
        assert!(!messages_contain_user_input(&[
            PromptMessage::assistant("instructions"),
            PromptMessage::user("  "),
        ]));
        assert!(messages_contain_user_input(&[PromptMessage::user("hi")]));
    }
}
