//! Docs chatbot HTTP client
//!
//! `reqwest` implementation of the documentation-specialized backend. The
//! service keeps its own conversation state; the core only threads the
//! conversation id through. Transient HTTP failures map to typed `DocsError`
//! variants that the dispatcher turns into fallback, never a crash.

use std::future::Future;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DocsError;
use crate::provider::{DocsBackend, DocsConversation, DocsMessage, DocsReference};

const DOCS_CHATBOT_API_VERSION: &str = "v1";
const USER_AGENT: &str = concat!("mdb-participant/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ConversationBody {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: String,
    #[serde(default)]
    references: Vec<DocsReference>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

pub struct DocsChatbotClient {
    client: reqwest::Client,
    base_url: String,
}

impl DocsChatbotClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, crate::config::ParticipantConfig::default().docs_request_timeout)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/{DOCS_CHATBOT_API_VERSION}{path}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DocsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_default();

        Err(match status {
            StatusCode::BAD_REQUEST => DocsError::BadRequest(message),
            StatusCode::TOO_MANY_REQUESTS => DocsError::RateLimited(message),
            _ => DocsError::Internal(message),
        })
    }

    async fn cancellable<T>(
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, DocsError>>,
    ) -> Result<T, DocsError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DocsError::Cancelled),
            result = fut => result,
        }
    }
}

#[async_trait]
impl DocsBackend for DocsChatbotClient {
    async fn create_conversation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DocsConversation, DocsError> {
        let url = self.url("/conversations");
        Self::cancellable(cancel, async {
            let response = self.client.post(&url).send().await?;
            let response = Self::check_status(response).await?;
            let body: ConversationBody = response
                .json()
                .await
                .map_err(|_| DocsError::InvalidResponse)?;
            debug!(conversation_id = %body.id, "docs conversation created");
            Ok(DocsConversation { id: body.id })
        })
        .await
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DocsMessage, DocsError> {
        let url = self.url(&format!("/conversations/{conversation_id}/messages"));
        Self::cancellable(cancel, async {
            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "message": message }))
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            let body: MessageBody = response
                .json()
                .await
                .map_err(|_| DocsError::InvalidResponse)?;
            Ok(DocsMessage {
                content: body.content,
                references: body.references,
            })
        })
        .await
    }
}
