//! Schema-description prompt
//!
//! The assistant instruction mandates stating the sampled document count; the
//! user turn carries the derived schema text.

use super::{ModelInput, PromptContext, UserPrompt, assemble};

/// Arguments specific to schema description.
pub struct SchemaPromptArgs<'a> {
    pub database_name: &'a str,
    pub collection_name: &'a str,
    pub schema: &'a str,
    pub amount_of_documents_sampled: usize,
}

pub struct SchemaPrompt;

impl SchemaPrompt {
    fn assistant_prompt(&self, args: &SchemaPromptArgs) -> String {
        format!(
            r#"You are a senior engineer who describes the schema of documents in a MongoDB database.
The schema is generated from a sample of documents in the user's collection.
You must follow these rules.
Rule 1: Try to be as concise as possible.
Rule 2: Pay attention to the JSON schema.
Rule 3: Mention the amount of documents sampled in your response.
Amount of documents sampled: {}."#,
            args.amount_of_documents_sampled
        )
    }

    pub fn build_messages(&self, ctx: &PromptContext, args: &SchemaPromptArgs) -> ModelInput {
        assemble(self.assistant_prompt(args), ctx, true, None, |prompt| {
            let additional = if prompt.trim().is_empty() {
                String::new()
            } else {
                format!("The user provided additional information: \"{prompt}\"\n")
            };
            UserPrompt::plain(format!(
                "{additional}Database name: {}\nCollection name: {}\nSchema:\n{}",
                args.database_name, args.collection_name, args.schema
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRequest, Command};

    fn build(prompt: &str) -> ModelInput {
        let request = ChatRequest::new(prompt, Some(Command::Schema));
        let ctx = PromptContext {
            request: &request,
            history: &[],
            connection_names: &[],
            model: None,
        };
        SchemaPrompt.build_messages(
            &ctx,
            &SchemaPromptArgs {
                database_name: "ufos",
                collection_name: "sightings",
                schema: "{ \"year\": [\"Number\"] }",
                amount_of_documents_sampled: 83,
            },
        )
    }

    #[test]
    fn test_assistant_prompt_states_sample_count() {
        let input = build("");
        assert!(
            input.messages[0]
                .content
                .contains("Amount of documents sampled: 83.")
        );
    }

    #[test]
    fn test_user_prompt_carries_namespace_and_schema() {
        let input = build("focus on the date fields");
        let user = &input.messages.last().unwrap().content;
        assert!(user.contains("additional information: \"focus on the date fields\""));
        assert!(user.contains("Database name: ufos"));
        assert!(user.contains("Schema:\n{ \"year\": [\"Number\"] }"));
    }

    #[test]
    fn test_no_additional_information_line_for_empty_prompt() {
        let input = build("   ");
        let user = &input.messages.last().unwrap().content;
        assert!(!user.contains("additional information"));
    }
}
