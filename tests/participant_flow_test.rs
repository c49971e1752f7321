// tests/participant_flow_test.rs
// End-to-end controller flows against fake providers
//
// Covers the full turn pipeline: routing, connection checks, namespace
// resolution, enrichment, backend dispatch and the metadata carried back in
// each chat result.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mdb_participant::config::ParticipantConfig;
use mdb_participant::error::{DocsError, ModelError};
use mdb_participant::participant::ParticipantController;
use mdb_participant::provider::{
    ConnectionProvider, DocsBackend, DocsConversation, DocsMessage, ModelEvent, ModelProvider,
};
use mdb_participant::stream::{CommandLink, ResponseStream, StreamAction};
use mdb_participant::telemetry::{TelemetryEvent, TelemetrySink};
use mdb_participant::types::{
    ChatRequest, ChatResult, ChatResultMetadata, Command, Intent, Namespace, PromptMessage,
    RequestTurn, ResponseTurn, Turn,
};

// ============================================================================
// FAKES
// ============================================================================

#[derive(Default)]
struct RecordingStream {
    markdown: Vec<String>,
    links: Vec<(String, CommandLink)>,
    actions: Vec<StreamAction>,
}

impl RecordingStream {
    fn all_markdown(&self) -> String {
        self.markdown.concat()
    }
}

impl ResponseStream for RecordingStream {
    fn markdown(&mut self, text: &str) {
        self.markdown.push(text.to_string());
    }
    fn command_link(&mut self, title: &str, link: CommandLink) {
        self.links.push((title.to_string(), link));
    }
    fn action(&mut self, action: StreamAction) {
        self.actions.push(action);
    }
}

/// Model that answers each request with the next scripted response and
/// records every message sequence it was sent.
struct ScriptedModel {
    responses: Mutex<Vec<String>>,
    requests: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedModel {
    fn new(responses: &[&str]) -> Self {
        let mut responses: Vec<String> = responses.iter().map(|r| r.to_string()).collect();
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_at(&self, index: usize) -> Vec<PromptMessage> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    fn max_input_tokens(&self) -> usize {
        100_000
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }

    async fn send_request(
        &self,
        messages: Vec<PromptMessage>,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ModelEvent>, ModelError> {
        self.requests.lock().unwrap().push(messages);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "fallback response".to_string());
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            tx.send(ModelEvent::Fragment(response)).await.ok();
        });
        Ok(rx)
    }
}

struct FakeConnection {
    active: Option<String>,
    databases: Vec<String>,
    collections: Vec<String>,
    documents: Vec<serde_json::Value>,
}

impl FakeConnection {
    fn single_namespace() -> Self {
        Self {
            active: Some("localhost:27017".into()),
            databases: vec!["ufos".into()],
            collections: vec!["sightings".into()],
            documents: vec![json!({"year": 1947, "city": "Roswell"})],
        }
    }
}

#[async_trait]
impl ConnectionProvider for FakeConnection {
    fn active_connection_name(&self) -> Option<String> {
        self.active.clone()
    }

    fn connection_names(&self) -> Vec<String> {
        vec!["localhost:27017".into(), "Atlas staging".into()]
    }

    async fn list_databases(&self, _cancel: &CancellationToken) -> anyhow::Result<Vec<String>> {
        Ok(self.databases.clone())
    }

    async fn list_collections(
        &self,
        _database: &str,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self.collections.clone())
    }

    async fn sample_documents(
        &self,
        _namespace: &Namespace,
        limit: usize,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        Ok(self.documents.iter().take(limit).cloned().collect())
    }
}

struct FailingDocsBackend;

#[async_trait]
impl DocsBackend for FailingDocsBackend {
    async fn create_conversation(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<DocsConversation, DocsError> {
        Err(DocsError::Internal("service down".into()))
    }

    async fn add_message(
        &self,
        _conversation_id: &str,
        _message: &str,
        _cancel: &CancellationToken,
    ) -> Result<DocsMessage, DocsError> {
        Err(DocsError::Internal("service down".into()))
    }
}

struct HealthyDocsBackend;

#[async_trait]
impl DocsBackend for HealthyDocsBackend {
    async fn create_conversation(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<DocsConversation, DocsError> {
        Ok(DocsConversation { id: "conv-7".into() })
    }

    async fn add_message(
        &self,
        _conversation_id: &str,
        _message: &str,
        _cancel: &CancellationToken,
    ) -> Result<DocsMessage, DocsError> {
        Ok(DocsMessage {
            content: "Sharding distributes data across shards.".into(),
            references: vec![],
        })
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    fn failures(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::ResponseFailed { .. }))
            .cloned()
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn track(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// SETUP
// ============================================================================

fn controller(
    connection: FakeConnection,
    model: Arc<ScriptedModel>,
    docs: Option<Arc<dyn DocsBackend>>,
    telemetry: Arc<RecordingTelemetry>,
) -> ParticipantController {
    ParticipantController::new(
        Arc::new(connection),
        model,
        docs,
        telemetry,
        ParticipantConfig::default(),
    )
}

fn request_turn(prompt: &str) -> Turn {
    Turn::Request(RequestTurn::new(prompt, None))
}

fn response_turn(intent: Intent, fragments: &[&str]) -> Turn {
    Turn::Response(ResponseTurn::new(
        fragments.iter().map(|f| f.to_string()).collect(),
        ChatResult::new(ChatResultMetadata::new(intent, "chat-1")),
    ))
}

// ============================================================================
// EMPTY PROMPTS
// ============================================================================

#[tokio::test]
async fn test_empty_prompt_is_a_usage_error_without_model_call() {
    let model = Arc::new(ScriptedModel::new(&[]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("   ", Some(Command::Query));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::EmptyRequest);
    assert!(result.error_details.is_some());
    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn test_empty_prompt_after_namespace_question_re_asks_it() {
    // Two databases so resolution stops at the database question; the
    // collection is unknown until a database is picked.
    let connection = FakeConnection {
        databases: vec!["ufos".into(), "weather".into()],
        ..FakeConnection::single_namespace()
    };
    // Namespace extraction is skipped for empty prompts, so no scripted
    // responses are needed.
    let model = Arc::new(ScriptedModel::new(&[]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(connection, model, None, telemetry);

    let history = vec![
        request_turn("how many docs are in sightings?"),
        response_turn(Intent::AskForNamespace, &["What is the name of the database you would like this query to run against?\n\n"]),
    ];

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("", None);
    let result = controller
        .chat_handler(&request, &history, &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::AskForNamespace);
    assert!(stream.all_markdown().contains("name of the database"));
    assert!(
        stream
            .links
            .iter()
            .any(|(title, link)| title == "ufos"
                && matches!(link, CommandLink::SelectDatabase { name } if name == "ufos"))
    );
}

#[tokio::test]
async fn test_empty_prompt_after_collection_question_retains_database() {
    let connection = FakeConnection {
        collections: vec!["sightings".into(), "pilots".into()],
        ..FakeConnection::single_namespace()
    };
    let model = Arc::new(ScriptedModel::new(&[]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(connection, model, None, telemetry);

    let mut asked = ChatResultMetadata::new(Intent::AskForNamespace, "chat-1");
    asked.database_name = Some("ufos".into());
    let history = vec![
        request_turn("how many docs are in sightings?"),
        Turn::Response(ResponseTurn::new(
            vec!["And which collection would you like to query within this database?\n\n".into()],
            ChatResult::new(asked),
        )),
    ];

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("", None);
    let result = controller
        .chat_handler(&request, &history, &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::AskForNamespace);
    assert_eq!(result.metadata.database_name.as_deref(), Some("ufos"));
    assert_eq!(result.metadata.collection_name, None);
    assert!(stream.all_markdown().contains("which collection"));
    assert!(
        stream
            .links
            .iter()
            .any(|(_, link)| matches!(link, CommandLink::SelectCollection { name } if name == "pilots"))
    );
}

// ============================================================================
// NAMESPACE RESOLUTION
// ============================================================================

#[tokio::test]
async fn test_single_database_and_collection_auto_resolve() {
    // Extraction finds nothing; both enumerations return exactly one name,
    // so no question is ever rendered.
    let model = Arc::new(ScriptedModel::new(&[
        "No names found.",
        "```javascript\nuse('ufos');\ndb.getCollection('sightings').countDocuments();\n```",
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("how many docs are in sightings?", Some(Command::Query));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Query);
    assert_eq!(result.metadata.database_name.as_deref(), Some("ufos"));
    assert_eq!(result.metadata.collection_name.as_deref(), Some("sightings"));

    // No choice lists rendered.
    assert!(stream.links.is_empty());

    // The resolved names reach the query prompt.
    let query_messages = model.request_at(1);
    assert!(query_messages[0].content.contains("Database name: ufos"));
    assert!(query_messages[0].content.contains("Collection name: sightings"));

    // Runnable content gets both follow-up actions.
    assert_eq!(stream.actions.len(), 2);
    assert!(matches!(stream.actions[0], StreamAction::RunQuery { .. }));
}

#[tokio::test]
async fn test_extracted_namespace_skips_enumeration() {
    let model = Arc::new(ScriptedModel::new(&[
        "DATABASE_NAME: ufos\nCOLLECTION_NAME: sightings",
        "Here is the query.",
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection {
            // Empty enumerations would be fatal if they were consulted.
            databases: vec![],
            collections: vec![],
            ..FakeConnection::single_namespace()
        },
        model,
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new(
        "find all sightings in the ufos database from 1947",
        Some(Command::Query),
    );
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Query);
    assert_eq!(result.metadata.database_name.as_deref(), Some("ufos"));
}

#[tokio::test]
async fn test_many_databases_render_capped_choice_list() {
    let connection = FakeConnection {
        databases: (0..14).map(|i| format!("db{i}")).collect(),
        ..FakeConnection::single_namespace()
    };
    let model = Arc::new(ScriptedModel::new(&["No names found."]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(connection, model, None, telemetry);

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("count the documents", Some(Command::Query));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::AskForNamespace);
    let select_links: Vec<_> = stream
        .links
        .iter()
        .filter(|(_, link)| matches!(link, CommandLink::SelectDatabase { .. }))
        .collect();
    assert_eq!(select_links.len(), 10);
    assert!(
        stream
            .links
            .iter()
            .any(|(title, link)| title == "Show more"
                && matches!(link, CommandLink::ShowMoreDatabases))
    );
}

#[tokio::test]
async fn test_empty_database_enumeration_aborts_the_turn() {
    let connection = FakeConnection {
        databases: vec![],
        ..FakeConnection::single_namespace()
    };
    let model = Arc::new(ScriptedModel::new(&["No names found."]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(connection, model, None, telemetry);

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("count the documents", Some(Command::Query));
    let err = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No databases"));
}

// ============================================================================
// CONNECTION HANDLING
// ============================================================================

#[tokio::test]
async fn test_disconnected_query_asks_to_connect() {
    let connection = FakeConnection {
        active: None,
        ..FakeConnection::single_namespace()
    };
    let model = Arc::new(ScriptedModel::new(&[]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(connection, model.clone(), None, telemetry);

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("find all sightings", Some(Command::Query));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::AskToConnect);
    assert!(stream.all_markdown().contains("aren't currently connected"));
    // One link per saved connection plus the add-new affordance.
    let connect_links: Vec<_> = stream
        .links
        .iter()
        .filter(|(_, link)| matches!(link, CommandLink::Connect { .. }))
        .collect();
    assert_eq!(connect_links.len(), 3);
    // No model call was made.
    assert_eq!(model.request_count(), 0);
}

// ============================================================================
// INTENT ROUTING
// ============================================================================

#[tokio::test]
async fn test_free_form_request_routes_through_classifier() {
    let model = Arc::new(ScriptedModel::new(&[
        "Docs",
        "An index is a data structure that speeds up queries.",
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is an index?", None);
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    // The docs route with no docs backend falls to the general model.
    assert_eq!(result.metadata.intent, Intent::Docs);
    // First request was the classifier.
    let classifier_messages = model.request_at(0);
    assert!(classifier_messages[0].content.contains("intent"));
}

#[tokio::test]
async fn test_unrecognized_classification_falls_to_generic() {
    let model = Arc::new(ScriptedModel::new(&[
        "I believe this is a Query",
        "Generic answer.",
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model,
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("tell me something", None);
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Generic);
}

// ============================================================================
// DOCS FLOW
// ============================================================================

#[tokio::test]
async fn test_docs_backend_answer_carries_conversation_id() {
    let model = Arc::new(ScriptedModel::new(&[]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        Some(Arc::new(HealthyDocsBackend)),
        telemetry.clone(),
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is sharding?", Some(Command::Docs));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Docs);
    assert_eq!(result.metadata.docs_conversation_id.as_deref(), Some("conv-7"));
    assert!(stream.all_markdown().contains("Sharding distributes data"));
    // The general model was never consulted.
    assert_eq!(model.request_count(), 0);
    assert!(telemetry.failures().is_empty());
}

#[tokio::test]
async fn test_docs_failure_falls_back_with_citation_and_one_failure_event() {
    let model = Arc::new(ScriptedModel::new(&["Sharding splits data."]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model,
        Some(Arc::new(FailingDocsBackend)),
        telemetry.clone(),
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is sharding?", Some(Command::Docs));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Docs);
    // Fallback answers carry no server-side conversation.
    assert_eq!(result.metadata.docs_conversation_id, None);
    assert!(stream.all_markdown().contains("Sharding splits data."));
    // Fixed citation rendered as a reference link.
    assert!(stream.all_markdown().contains("mongodb.com/docs"));
    // Exactly one failure event, despite the successful fallback.
    assert_eq!(telemetry.failures().len(), 1);
}

#[tokio::test]
async fn test_disabled_telemetry_suppresses_failure_events() {
    let model = Arc::new(ScriptedModel::new(&["Sharding splits data."]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = ParticipantController::new(
        Arc::new(FakeConnection::single_namespace()),
        model,
        Some(Arc::new(FailingDocsBackend)),
        telemetry.clone(),
        ParticipantConfig {
            telemetry_enabled: false,
            ..ParticipantConfig::default()
        },
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is sharding?", Some(Command::Docs));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    // The turn still succeeds via fallback, but the sink sees nothing.
    assert_eq!(result.metadata.intent, Intent::Docs);
    assert!(telemetry.events.lock().unwrap().is_empty());
}

// ============================================================================
// SCHEMA FLOW
// ============================================================================

#[tokio::test]
async fn test_schema_prompt_states_sampled_count() {
    let model = Arc::new(ScriptedModel::new(&[
        "DATABASE_NAME: ufos\nCOLLECTION_NAME: sightings",
        "The schema has a year field.",
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is the schema of sightings in ufos?", Some(Command::Schema));
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Schema);
    let schema_messages = model.request_at(1);
    assert!(schema_messages[0].content.contains("Amount of documents sampled: 1."));
    assert!(schema_messages.last().unwrap().content.contains("\"year\""));
}

// ============================================================================
// MODEL FAILURES AND CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_filtered_response_records_sentinel_error() {
    struct FilteringModel;

    #[async_trait]
    impl ModelProvider for FilteringModel {
        fn max_input_tokens(&self) -> usize {
            100_000
        }
        fn count_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        async fn send_request(
            &self,
            _messages: Vec<PromptMessage>,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<ModelEvent>, ModelError> {
            Err(ModelError::Filtered)
        }
    }

    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = ParticipantController::new(
        Arc::new(FakeConnection::single_namespace()),
        Arc::new(FilteringModel),
        None,
        telemetry.clone(),
        ParticipantConfig::default(),
    );

    let mut stream = RecordingStream::default();
    // No command: the classifier call itself fails, degrading to the generic
    // handler, whose call also fails with the filtered error.
    let request = ChatRequest::new("something disallowed", None);
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result.error_details.as_ref().map(|e| e.message.as_str()),
        Some("Response was filtered")
    );
    assert!(!telemetry.failures().is_empty());
}

#[tokio::test]
async fn test_cancelled_turn_resolves_without_error() {
    let model = Arc::new(ScriptedModel::new(&["never read"]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model,
        None,
        telemetry,
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new("what is an index?", None);
    let result = controller
        .chat_handler(&request, &[], &mut stream, &cancel)
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::CancelledRequest);
}

// ============================================================================
// EXPORT TO LANGUAGE
// ============================================================================

#[tokio::test]
async fn test_export_to_language_targets_requested_language() {
    use mdb_participant::types::ExportToLanguageOptions;

    let model = Arc::new(ScriptedModel::new(&["```python\nprint('hi')\n```"]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let controller = controller(
        FakeConnection::single_namespace(),
        model.clone(),
        None,
        telemetry,
    );

    let mut stream = RecordingStream::default();
    let request = ChatRequest::new(
        "db.sightings.find({ year: 1947 })",
        Some(Command::ExportToLanguage),
    )
    .with_export_options(ExportToLanguageOptions {
        language: "python".into(),
        include_driver_syntax: true,
    });
    let result = controller
        .chat_handler(&request, &[], &mut stream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.intent, Intent::Generic);
    let messages = model.request_at(0);
    assert!(messages[0].content.contains("to the python language"));
    assert!(messages.last().unwrap().content.ends_with("Include driver syntax."));
}
