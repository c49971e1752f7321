//! Error taxonomy
//!
//! Three tiers, matching how errors are handled:
//! - `ModelError` / `DocsError`: typed failures from the two backends. Docs
//!   failures always trigger fallback; model failures are classified and
//!   either rendered inline (content filtering, off-topic) or propagated.
//! - `ParticipantError`: conditions that abort the turn with a descriptive
//!   message (nothing to resolve a namespace against).
//! User-input errors (empty prompt, unresolved namespace) are never errors at
//! this level; they are handled by re-prompting.

use thiserror::Error;

/// Sentinel recorded in a response turn's `errorDetails` when the model
/// rejected the exchange. The history classifier matches on it to keep the
/// rejected exchange out of later prompts.
pub const FILTERED_ERROR_MESSAGE: &str = "Response was filtered";

/// Failure of a general-model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("the response was filtered by the content safety system")]
    Filtered,
    #[error("the request was judged off-topic for this assistant")]
    OffTopic,
    #[error("model quota exceeded")]
    QuotaExceeded,
    #[error("no language model is available")]
    Unavailable,
    #[error("model request failed: {0}")]
    Other(String),
}

/// Failure of a docs-chatbot call. All variants trigger fallback to the
/// general model rather than surfacing to the user.
#[derive(Debug, Error)]
pub enum DocsError {
    #[error("docs service rejected the request: {0}")]
    BadRequest(String),
    #[error("docs service rate limited the request: {0}")]
    RateLimited(String),
    #[error("docs service internal error: {0}")]
    Internal(String),
    #[error("docs service returned an unparseable response")]
    InvalidResponse,
    #[error("docs service request failed")]
    Network(#[from] reqwest::Error),
    #[error("docs service call was cancelled")]
    Cancelled,
}

/// Conditions that abort the turn. Not retried, not silently swallowed.
#[derive(Debug, Error)]
pub enum ParticipantError {
    #[error("No databases were found in the connected cluster.")]
    NoDatabases,
    #[error("No collections were found in the database \"{database}\".")]
    NoCollections { database: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// The fixed set of categories failed responses are reported under.
/// Telemetry receives only this tag, never the underlying message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Filtered,
    OffTopic,
    Quota,
    ModelUnavailable,
    ModelOther,
    DocsChatbotApi,
    DataAccess,
}

impl FailureCategory {
    pub fn from_model_error(err: &ModelError) -> Self {
        match err {
            ModelError::Filtered => FailureCategory::Filtered,
            ModelError::OffTopic => FailureCategory::OffTopic,
            ModelError::QuotaExceeded => FailureCategory::Quota,
            ModelError::Unavailable => FailureCategory::ModelUnavailable,
            ModelError::Other(_) => FailureCategory::ModelOther,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_categories() {
        assert_eq!(
            FailureCategory::from_model_error(&ModelError::Filtered),
            FailureCategory::Filtered
        );
        assert_eq!(
            FailureCategory::from_model_error(&ModelError::QuotaExceeded),
            FailureCategory::Quota
        );
        assert_eq!(
            FailureCategory::from_model_error(&ModelError::Other("boom".into())),
            FailureCategory::ModelOther
        );
    }

    #[test]
    fn test_participant_error_messages_are_descriptive() {
        let err = ParticipantError::NoCollections {
            database: "sample_airbnb".into(),
        };
        assert!(err.to_string().contains("sample_airbnb"));
    }
}
