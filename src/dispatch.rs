//! Backend dispatcher
//!
//! Decides, per request kind, whether to call the documentation-specialized
//! backend or the general model. Docs failures are recorded to telemetry and
//! fall back transparently to the general model with a fixed documentation
//! citation attached. Every call is wrapped with the host cancellation
//! token; an aborted call resolves to a cancelled outcome, not an error
//! bubbling to the UI.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DocsError, FailureCategory, ModelError};
use crate::provider::{DocsBackend, DocsReference, ModelEvent, ModelProvider};
use crate::stream::ResponseStream;
use crate::telemetry::{AnswerBackend, TelemetryEvent, TelemetrySink};
use crate::types::PromptMessage;

/// Title of the fixed citation attached when a docs request is answered by
/// the general model instead of the docs service.
pub const DOCS_CITATION_TITLE: &str = "View MongoDB documentation";

/// Outcome of a dispatched model call.
#[derive(Debug)]
pub enum ModelOutcome {
    /// Full accumulated response content.
    Content(String),
    /// The host cancelled mid-flight; no complete message exists.
    Cancelled,
}

/// Outcome of a docs-type request.
#[derive(Debug)]
pub struct DocsOutcome {
    pub content: String,
    pub references: Vec<DocsReference>,
    pub backend: AnswerBackend,
    /// Conversation id to store for the next turn, when the docs backend
    /// answered.
    pub conversation_id: Option<String>,
}

pub struct BackendDispatcher {
    model: Arc<dyn ModelProvider>,
    docs: Option<Arc<dyn DocsBackend>>,
    telemetry: Arc<dyn TelemetrySink>,
    docs_link: String,
}

impl BackendDispatcher {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        docs: Option<Arc<dyn DocsBackend>>,
        telemetry: Arc<dyn TelemetrySink>,
        docs_link: String,
    ) -> Self {
        Self {
            model,
            docs,
            telemetry,
            docs_link,
        }
    }

    /// Send a prompt to the general model, forwarding fragments to the
    /// response stream while accumulating the full content.
    pub async fn answer_general(
        &self,
        messages: Vec<PromptMessage>,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> Result<ModelOutcome, ModelError> {
        let mut rx = self
            .model
            .send_request(messages, cancel.child_token())
            .await?;

        let mut content = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("model call cancelled by host");
                    return Ok(ModelOutcome::Cancelled);
                }
                event = rx.recv() => match event {
                    Some(ModelEvent::Fragment(fragment)) => {
                        stream.markdown(&fragment);
                        content.push_str(&fragment);
                    }
                    Some(ModelEvent::Failed(err)) => return Err(err),
                    None => break,
                },
            }
        }
        stream.markdown("\n\n");

        Ok(ModelOutcome::Content(content))
    }

    /// Send a prompt without streaming to the user. Used for
    /// machine-to-machine classification calls.
    pub async fn answer_silent(
        &self,
        messages: Vec<PromptMessage>,
        cancel: &CancellationToken,
    ) -> Result<ModelOutcome, ModelError> {
        let mut rx = self
            .model
            .send_request(messages, cancel.child_token())
            .await?;

        let mut content = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ModelOutcome::Cancelled),
                event = rx.recv() => match event {
                    Some(ModelEvent::Fragment(fragment)) => content.push_str(&fragment),
                    Some(ModelEvent::Failed(err)) => return Err(err),
                    None => break,
                },
            }
        }

        Ok(ModelOutcome::Content(content))
    }

    /// Answer a docs-type request: docs backend first when configured, with
    /// transparent fallback to the general model. The docs failure is
    /// reported to telemetry but never surfaced to the user directly.
    pub async fn answer_docs(
        &self,
        prompt: &str,
        conversation_id: Option<String>,
        fallback_messages: Vec<PromptMessage>,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> Result<Option<DocsOutcome>, ModelError> {
        if let Some(docs) = &self.docs {
            match self
                .try_docs_backend(docs.as_ref(), prompt, conversation_id, cancel)
                .await
            {
                Ok(outcome) => {
                    stream.markdown(&outcome.content);
                    stream.markdown("\n\n");
                    return Ok(Some(outcome));
                }
                Err(DocsError::Cancelled) => {
                    debug!("docs call cancelled by host");
                    return Ok(None);
                }
                Err(err) => {
                    warn!(error = %err, "docs chatbot failed, falling back to the general model");
                    self.telemetry.track(TelemetryEvent::ResponseFailed {
                        category: FailureCategory::DocsChatbotApi,
                    });
                }
            }
        }

        match self
            .answer_general(fallback_messages, stream, cancel)
            .await?
        {
            ModelOutcome::Cancelled => Ok(None),
            ModelOutcome::Content(content) => Ok(Some(DocsOutcome {
                content,
                references: vec![DocsReference {
                    title: DOCS_CITATION_TITLE.to_string(),
                    url: self.docs_link.clone(),
                }],
                backend: AnswerBackend::GeneralModel,
                conversation_id: None,
            })),
        }
    }

    async fn try_docs_backend(
        &self,
        docs: &dyn DocsBackend,
        prompt: &str,
        conversation_id: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<DocsOutcome, DocsError> {
        let conversation_id = match conversation_id {
            Some(id) => id,
            None => docs.create_conversation(cancel).await?.id,
        };

        let message = docs.add_message(&conversation_id, prompt, cancel).await?;

        Ok(DocsOutcome {
            content: message.content,
            references: message.references,
            backend: AnswerBackend::DocsChatbot,
            conversation_id: Some(conversation_id),
        })
    }
}
