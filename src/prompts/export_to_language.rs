//! Export-to-language prompt: translate a playground script to a target
//! driver language.

use super::{ModelInput, PromptContext, UserPrompt, assemble};

pub struct ExportToLanguagePrompt<'a> {
    pub language: &'a str,
    pub include_driver_syntax: bool,
}

impl ExportToLanguagePrompt<'_> {
    fn assistant_prompt(&self) -> String {
        format!(
            r#"You are a MongoDB expert.
Your task is to convert a MongoDB playground script to the {language} language.
Take a user prompt as an input string and translate it to the target language.
If the user specified to include driver syntax, add required MongoDB helpers and import statements to the transpiled code.
If the user specified to not include driver syntax, transpile only what the user prompt provides without adding any MongoDB helpers or import statements.
Keep your response concise.
Respond with markdown, suggest code in a Markdown code block that begins with ```{language} and ends with ```."#,
            language = self.language
        )
    }

    pub fn build_messages(&self, ctx: &PromptContext) -> ModelInput {
        assemble(self.assistant_prompt(), ctx, false, None, |prompt| {
            let additional = if prompt.trim().is_empty() {
                String::new()
            } else {
                format!("The user provided additional information: \"{prompt}\"\n")
            };
            let driver = if self.include_driver_syntax {
                "Include driver syntax."
            } else {
                "Do not include driver syntax."
            };
            UserPrompt::plain(format!("{additional}{driver}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRequest, Command};

    #[test]
    fn test_prompt_names_target_language_and_driver_choice() {
        let request = ChatRequest::new(
            "db.sightings.find({ year: 1947 })",
            Some(Command::ExportToLanguage),
        );
        let ctx = PromptContext {
            request: &request,
            history: &[],
            connection_names: &[],
            model: None,
        };
        let prompt = ExportToLanguagePrompt {
            language: "python",
            include_driver_syntax: true,
        };
        let input = prompt.build_messages(&ctx);
        assert!(input.messages[0].content.contains("to the python language"));
        assert!(
            input
                .messages
                .last()
                .unwrap()
                .content
                .ends_with("Include driver syntax.")
        );
    }
}
