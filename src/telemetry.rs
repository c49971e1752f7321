//! Telemetry emission hooks
//!
//! Internal pipeline states shaped into reportable events for an external
//! transport. Fire-and-forget: `track` must never block the pipeline.
//!
//! Scrubbing is enforced by construction: events carry lengths, counts,
//! flags and category tags only — never prompt text, model output, document
//! content or namespace names.

use serde::Serialize;

use crate::error::FailureCategory;
use crate::prompts::PromptStats;
use crate::types::Intent;

/// Which backend produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerBackend {
    DocsChatbot,
    GeneralModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A prompt was assembled and submitted to a backend.
    PromptSubmitted(PromptStats),
    /// A response was produced and streamed back.
    ResponseGenerated {
        intent: Intent,
        backend: AnswerBackend,
        output_length: usize,
        has_runnable_content: bool,
    },
    /// A backend call failed; emitted once per failure, before any fallback.
    ResponseFailed { category: FailureCategory },
}

/// External telemetry transport.
pub trait TelemetrySink: Send + Sync {
    fn track(&self, event: TelemetryEvent);
}

/// Sink that drops everything. Useful for hosts that opted out and tests
/// that don't assert on telemetry.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn track(&self, _event: TelemetryEvent) {}
}
