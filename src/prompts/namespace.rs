//! Namespace-extraction prompt
//!
//! Machine-to-machine prompt asking the model to identify the database and
//! collection a request refers to. The response format is strict: two
//! `key: value` lines, or the sentinel `No names found.` line.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{InternalPurpose, ModelInput, PromptContext, UserPrompt, assemble};

const NO_NAMES_SENTINEL: &str = "No names found.";

static DATABASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^DATABASE_NAME:\s*(.*)\s*$").expect("valid regex"));
static COLLECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^COLLECTION_NAME:\s*(.*)\s*$").expect("valid regex"));

pub struct NamespacePrompt;

impl NamespacePrompt {
    fn assistant_prompt(&self) -> String {
        format!(
            r#"You are a MongoDB expert.
Your task is to identify the database and collection name the user's request refers to.
Look at the user's prompt and the conversation for the names.
Respond in the format:
DATABASE_NAME: X
COLLECTION_NAME: Y
where X is the database name and Y is the collection name.
If you are unable to identify one of the names, leave its line out.
Do not include any other text in your response.
If neither name can be found, respond only with:
{NO_NAMES_SENTINEL}"#
        )
    }

    pub fn build_messages(&self, ctx: &PromptContext) -> ModelInput {
        assemble(
            self.assistant_prompt(),
            ctx,
            false,
            Some(InternalPurpose::Namespace),
            |prompt| UserPrompt::plain(prompt),
        )
    }
}

/// Parse the strict extraction response. Whitespace around names is trimmed;
/// the sentinel line (or any unparseable response) yields nothing.
pub fn parse_namespace_response(response: &str) -> (Option<String>, Option<String>) {
    if response.trim() == NO_NAMES_SENTINEL {
        return (None, None);
    }

    let capture = |re: &Regex| {
        re.captures(response)
            .map(|c| c[1].trim().to_string())
            .filter(|name| !name.is_empty())
    };

    (capture(&DATABASE_RE), capture(&COLLECTION_RE))
}
