//! Response post-processing
//!
//! Pure text extraction over the model's markdown answer: locate the first
//! ```javascript fenced block and, when non-empty, describe run /
//! open-in-playground follow-up actions. The extracted code is an opaque
//! payload; nothing here executes it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::stream::{ResponseStream, StreamAction};

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```javascript\n?(.*?)```").expect("valid regex"));

/// Extract the first runnable ```javascript block, if any. Returns `None`
/// for responses with no block or an empty one.
pub fn runnable_content(response: &str) -> Option<String> {
    let code = CODE_BLOCK_RE.captures(response)?.get(1)?.as_str();
    if code.trim().is_empty() {
        return None;
    }
    Some(code.to_string())
}

/// Attach run / open-in-playground actions when the response contains
/// runnable content. Returns whether actions were attached.
pub fn attach_runnable_actions(stream: &mut dyn ResponseStream, response: &str) -> bool {
    let Some(code) = runnable_content(response) else {
        return false;
    };
    stream.action(StreamAction::RunQuery { code: code.clone() });
    stream.action(StreamAction::OpenInPlayground { code });
    true
}
