//! Intent-classification prompt
//!
//! Routes a free-form request to the correct handler. The response is a
//! single handler name; anything unrecognized falls back to `Default`.

use super::{InternalPurpose, ModelInput, PromptContext, UserPrompt, assemble};

/// The classifier's closed output set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptIntent {
    Query,
    Schema,
    Docs,
    Default,
}

pub struct IntentPrompt;

impl IntentPrompt {
    fn assistant_prompt(&self) -> String {
        r#"You are a MongoDB expert.
Your task is to help guide a conversation with a user to the correct handler.
You will be provided a conversation and your task is to determine the intent of the user.
The intent handlers are:
- Query
- Schema
- Docs
- Default
Rules:
1. Respond only with the intent handler.
2. Use the "Query" intent handler when the user is asking for code that relates to a specific collection.
3. Use the "Docs" intent handler when the user is asking a question that involves MongoDB documentation.
4. Use the "Schema" intent handler when the user is asking for the schema or shape of documents of a specific collection.
5. Use the "Default" intent handler when a user is asking for code that does NOT relate to a specific collection.
6. Use the "Default" intent handler for everything that may not be handled by another handler.
7. If you are uncertain of the intent, use the "Default" intent handler.

Example:
User: How do I create an index in my pineapples collection?
Response:
Query

Example:
User:
What is $vectorSearch?
Response:
Docs"#
            .to_string()
    }

    pub fn build_messages(&self, ctx: &PromptContext) -> ModelInput {
        assemble(
            self.assistant_prompt(),
            ctx,
            false,
            Some(InternalPurpose::Intent),
            |prompt| UserPrompt::plain(prompt),
        )
    }

    pub fn intent_from_response(&self, response: &str) -> PromptIntent {
        match response.trim() {
            "Query" => PromptIntent::Query,
            "Schema" => PromptIntent::Schema,
            "Docs" => PromptIntent::Docs,
            _ => PromptIntent::Default,
        }
    }
}
