//! Generic prompt: open-ended MongoDB questions with no namespace attached.

use super::{ModelInput, PromptContext, UserPrompt, assemble};

pub struct GenericPrompt;

impl GenericPrompt {
    fn assistant_prompt(&self) -> String {
        r#"You are a MongoDB expert.
Your task is to help the user with MongoDB-related questions.
Keep your response concise.
You should suggest code that is performant and correct.
Respond with markdown. When relevant, suggest code in a Markdown code block that begins with ```javascript and ends with ```.
Respond in MongoDB shell syntax using the ```javascript code block syntax.
You can imagine the schema, collection, and database name."#
            .to_string()
    }

    pub fn build_messages(&self, ctx: &PromptContext) -> ModelInput {
        assemble(self.assistant_prompt(), ctx, false, None, |prompt| {
            UserPrompt::plain(prompt)
        })
    }
}
