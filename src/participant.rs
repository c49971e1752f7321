//! Chat participant controller
//!
//! Orchestrates one request turn end to end: route the request to a handler,
//! resolve the target namespace when one is needed, enrich and assemble the
//! prompt, dispatch to a backend and post-process the streamed answer. The
//! controller holds no per-turn state; everything durable lives in the turn
//! history or the per-chat metadata store.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ParticipantConfig;
use crate::dispatch::{BackendDispatcher, DocsOutcome, ModelOutcome};
use crate::docs_chatbot::DocsChatbotClient;
use crate::enrichment::{QUERY_SAMPLE_SIZE, SCHEMA_SAMPLE_SIZE, simplified_schema};
use crate::error::{FILTERED_ERROR_MESSAGE, FailureCategory, ModelError, ParticipantError};
use crate::history::{chat_id_for_history, docs_history_window, last_response_intent, namespace_from_history};
use crate::metadata::ChatMetadataStore;
use crate::namespace::{
    NamespaceEvent, NamespaceState, NamespaceStep, merge_candidates, transition,
};
use crate::postprocess::attach_runnable_actions;
use crate::prompts::{
    ExportToLanguagePrompt, GenericPrompt, IntentPrompt, NamespacePrompt, PromptContext,
    PromptIntent, QueryPrompt, QueryPromptArgs, SchemaPrompt, SchemaPromptArgs,
    messages_contain_user_input, parse_namespace_response,
};
use crate::provider::{ConnectionProvider, DocsBackend, ModelProvider};
use crate::stream::{CommandLink, ResponseStream};
use crate::telemetry::{AnswerBackend, NullSink, TelemetryEvent, TelemetrySink};
use crate::types::{ChatRequest, ChatResult, ChatResultMetadata, Command, Intent, Namespace};

const EMPTY_REQUEST_MESSAGE: &str = "Please specify a question when using this command. \
Usage: @MongoDB /query find documents where \"name\" contains \"database\".";

const ASK_TO_CONNECT_MESSAGE: &str = "Looks like you aren't currently connected, first let's get \
you connected to the cluster we'd like to create this query to run against.\n\n";

const DATABASE_QUESTION: &str =
    "What is the name of the database you would like this query to run against?\n\n";

const COLLECTION_QUESTION: &str =
    "And which collection would you like to query within this database?\n\n";

const OFF_TOPIC_MESSAGE: &str = "I'm sorry, I can only answer questions about MongoDB.\n\n";

const FILTERED_MESSAGE: &str =
    "The response was filtered by the content safety service. Please rephrase your prompt.\n\n";

/// How a free-form request was routed.
enum Classified {
    Intent(PromptIntent),
    Cancelled,
}

/// Where namespace resolution left the turn.
enum NamespaceResolution {
    Resolved(Namespace),
    /// The user was asked to pick a name; the turn ends here.
    Asked(ChatResult),
    Cancelled,
}

pub struct ParticipantController {
    connection: Arc<dyn ConnectionProvider>,
    model: Arc<dyn ModelProvider>,
    dispatcher: BackendDispatcher,
    telemetry: Arc<dyn TelemetrySink>,
    metadata: ChatMetadataStore,
}

impl ParticipantController {
    pub fn new(
        connection: Arc<dyn ConnectionProvider>,
        model: Arc<dyn ModelProvider>,
        docs: Option<Arc<dyn DocsBackend>>,
        telemetry: Arc<dyn TelemetrySink>,
        config: ParticipantConfig,
    ) -> Self {
        // A host-supplied docs backend wins; otherwise one is built from the
        // configured base URL, if any.
        let docs = docs.or_else(|| {
            config.docs_chatbot_base_url.as_ref().map(|url| {
                Arc::new(DocsChatbotClient::with_timeout(
                    url.clone(),
                    config.docs_request_timeout,
                )) as Arc<dyn DocsBackend>
            })
        });
        let telemetry: Arc<dyn TelemetrySink> = if config.telemetry_enabled {
            telemetry
        } else {
            Arc::new(NullSink)
        };
        let dispatcher =
            BackendDispatcher::new(model.clone(), docs, telemetry.clone(), config.docs_link);
        Self {
            connection,
            model,
            dispatcher,
            telemetry,
            metadata: ChatMetadataStore::new(),
        }
    }

    /// Handle one chat request turn.
    pub async fn chat_handler(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        let chat_id = chat_id_for_history(history);
        debug!(chat_id = %chat_id, command = ?request.command, "handling chat request");

        if request.is_prompt_empty() {
            // An empty prompt mid namespace resolution means the user wants
            // the pending question again; anywhere else it's a usage error.
            if last_response_intent(history) == Some(Intent::AskForNamespace) {
                return self
                    .handle_query(request, history, &chat_id, stream, cancel)
                    .await;
            }
            return Ok(ChatResult::with_error(
                ChatResultMetadata::new(Intent::EmptyRequest, chat_id),
                EMPTY_REQUEST_MESSAGE,
            ));
        }

        match request.command {
            Some(Command::Query) => {
                self.handle_query(request, history, &chat_id, stream, cancel)
                    .await
            }
            Some(Command::Schema) => {
                self.handle_schema(request, history, &chat_id, stream, cancel)
                    .await
            }
            Some(Command::Docs) => {
                self.handle_docs(request, history, &chat_id, stream, cancel)
                    .await
            }
            Some(Command::ExportToLanguage) => match &request.export_options {
                Some(_) => {
                    self.handle_export_to_language(request, history, &chat_id, stream, cancel)
                        .await
                }
                // Without a target language there is nothing to transpile to.
                None => {
                    self.handle_generic(request, history, &chat_id, stream, cancel)
                        .await
                }
            },
            None => match self.classify_intent(request, history, cancel).await {
                Classified::Cancelled => Ok(cancelled_result(&chat_id)),
                Classified::Intent(PromptIntent::Query) => {
                    self.handle_query(request, history, &chat_id, stream, cancel)
                        .await
                }
                Classified::Intent(PromptIntent::Schema) => {
                    self.handle_schema(request, history, &chat_id, stream, cancel)
                        .await
                }
                Classified::Intent(PromptIntent::Docs) => {
                    self.handle_docs(request, history, &chat_id, stream, cancel)
                        .await
                }
                Classified::Intent(PromptIntent::Default) => {
                    self.handle_generic(request, history, &chat_id, stream, cancel)
                        .await
                }
            },
        }
    }

    /// Classify a command-less request. Skipped entirely when the assembled
    /// prompt carries no user input; any classifier failure falls back to the
    /// generic handler rather than failing the turn.
    async fn classify_intent(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        cancel: &CancellationToken,
    ) -> Classified {
        let connection_names = self.connection.connection_names();
        let ctx = PromptContext {
            request,
            history,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = IntentPrompt.build_messages(&ctx);

        if !messages_contain_user_input(&input.messages) {
            return Classified::Intent(PromptIntent::Default);
        }

        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        match self.dispatcher.answer_silent(input.messages, cancel).await {
            Ok(ModelOutcome::Cancelled) => Classified::Cancelled,
            Ok(ModelOutcome::Content(response)) => {
                let intent = IntentPrompt.intent_from_response(&response);
                debug!(?intent, "intent classified");
                Classified::Intent(intent)
            }
            Err(err) => {
                warn!(error = %err, "intent classification failed, using the default handler");
                Classified::Intent(PromptIntent::Default)
            }
        }
    }

    /// Ask the user to connect when no connection is active. Returns the
    /// finished turn result when the question was rendered.
    fn ensure_connected(&self, chat_id: &str, stream: &mut dyn ResponseStream) -> Option<ChatResult> {
        if self.connection.active_connection_name().is_some() {
            return None;
        }

        stream.markdown(ASK_TO_CONNECT_MESSAGE);
        for name in self.connection.connection_names() {
            stream.command_link(
                &name,
                CommandLink::Connect {
                    connection_id: Some(name.clone()),
                },
            );
        }
        stream.command_link("Add new connection", CommandLink::Connect { connection_id: None });

        Some(ChatResult::new(ChatResultMetadata::new(
            Intent::AskToConnect,
            chat_id,
        )))
    }

    /// Extract namespace candidates from the prompt via the model. Extraction
    /// is best-effort; failures degrade to no candidates.
    async fn extract_namespace_candidates(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        connection_names: &[String],
        cancel: &CancellationToken,
    ) -> Option<(Option<String>, Option<String>)> {
        if request.is_prompt_empty() {
            return Some((None, None));
        }

        let ctx = PromptContext {
            request,
            history,
            connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = NamespacePrompt.build_messages(&ctx);
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        match self.dispatcher.answer_silent(input.messages, cancel).await {
            Ok(ModelOutcome::Cancelled) => None,
            Ok(ModelOutcome::Content(response)) => Some(parse_namespace_response(&response)),
            Err(err) => {
                warn!(error = %err, "namespace extraction failed, relying on history and metadata");
                Some((None, None))
            }
        }
    }

    /// Resolve the (database, collection) pair a data-backed request targets.
    /// Drives the resolution machine, performing its enumeration effects and
    /// rendering its questions.
    async fn resolve_namespace(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<NamespaceResolution> {
        let connection_names = self.connection.connection_names();

        let Some(extracted) = self
            .extract_namespace_candidates(request, history, &connection_names, cancel)
            .await
        else {
            return Ok(NamespaceResolution::Cancelled);
        };

        let stored = self.metadata.get(chat_id);
        let fallback = merge_candidates(
            namespace_from_history(&request.prompt, history),
            (stored.database_name, stored.collection_name),
        );
        let (database, collection) = merge_candidates(extracted, fallback);

        let mut state = NamespaceState::Unresolved;
        let mut event = NamespaceEvent::Candidates {
            database,
            collection,
        };

        loop {
            let (next_state, step) = transition(state, event);
            state = next_state;

            match step {
                NamespaceStep::FetchDatabases => {
                    let names = self
                        .connection
                        .list_databases(cancel)
                        .await
                        .inspect_err(|_| {
                            self.telemetry.track(TelemetryEvent::ResponseFailed {
                                category: FailureCategory::DataAccess,
                            });
                        })
                        .context("failed to list databases of the active connection")?;
                    event = NamespaceEvent::Databases(names);
                }
                NamespaceStep::FetchCollections { database } => {
                    let names = self
                        .connection
                        .list_collections(&database, cancel)
                        .await
                        .inspect_err(|_| {
                            self.telemetry.track(TelemetryEvent::ResponseFailed {
                                category: FailureCategory::DataAccess,
                            });
                        })
                        .with_context(|| {
                            format!("failed to list collections of the database \"{database}\"")
                        })?;
                    event = NamespaceEvent::Collections(names);
                }
                NamespaceStep::AskDatabase { choices, truncated } => {
                    stream.markdown(DATABASE_QUESTION);
                    for name in &choices {
                        stream.command_link(
                            name,
                            CommandLink::SelectDatabase { name: name.clone() },
                        );
                    }
                    if truncated {
                        stream.command_link("Show more", CommandLink::ShowMoreDatabases);
                    }
                    return Ok(NamespaceResolution::Asked(ChatResult::new(
                        ChatResultMetadata::new(Intent::AskForNamespace, chat_id),
                    )));
                }
                NamespaceStep::AskCollection {
                    database,
                    choices,
                    truncated,
                } => {
                    stream.markdown(COLLECTION_QUESTION);
                    for name in &choices {
                        stream.command_link(
                            name,
                            CommandLink::SelectCollection { name: name.clone() },
                        );
                    }
                    if truncated {
                        stream.command_link(
                            "Show more",
                            CommandLink::ShowMoreCollections {
                                database: database.clone(),
                            },
                        );
                    }
                    let mut metadata = ChatResultMetadata::new(Intent::AskForNamespace, chat_id);
                    metadata.database_name = Some(database);
                    return Ok(NamespaceResolution::Asked(ChatResult::new(metadata)));
                }
                NamespaceStep::Done(namespace) => {
                    info!(namespace = %namespace, "namespace resolved");
                    self.metadata.set_namespace(chat_id, &namespace);
                    return Ok(NamespaceResolution::Resolved(namespace));
                }
                NamespaceStep::Fail(err) => return Err(err.into()),
            }
        }
    }

    async fn handle_query(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        if let Some(result) = self.ensure_connected(chat_id, stream) {
            return Ok(result);
        }

        let namespace = match self
            .resolve_namespace(request, history, chat_id, stream, cancel)
            .await?
        {
            NamespaceResolution::Resolved(namespace) => namespace,
            NamespaceResolution::Asked(result) => return Ok(result),
            NamespaceResolution::Cancelled => return Ok(cancelled_result(chat_id)),
        };

        // Enrichment is best-effort: a sampling failure degrades the prompt,
        // it never fails the turn.
        let sample_documents = match self
            .connection
            .sample_documents(&namespace, QUERY_SAMPLE_SIZE, cancel)
            .await
        {
            Ok(documents) => documents,
            Err(err) => {
                warn!(error = %err, namespace = %namespace, "sampling failed, proceeding without enrichment");
                stream.markdown(
                    "An error occurred while sampling documents, proceeding without sample documents.\n\n",
                );
                Vec::new()
            }
        };
        let schema = if sample_documents.is_empty() {
            None
        } else {
            Some(simplified_schema(&sample_documents))
        };

        let connection_names = self.connection.connection_names();
        let ctx = PromptContext {
            request,
            history,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = QueryPrompt.build_messages(
            &ctx,
            &QueryPromptArgs {
                database_name: &namespace.database,
                collection_name: &namespace.collection,
                schema: schema.as_deref(),
                sample_documents: &sample_documents,
            },
        );
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        let mut metadata = ChatResultMetadata::new(Intent::Query, chat_id);
        metadata.database_name = Some(namespace.database.clone());
        metadata.collection_name = Some(namespace.collection.clone());

        match self
            .dispatcher
            .answer_general(input.messages, stream, cancel)
            .await
        {
            Ok(ModelOutcome::Cancelled) => Ok(cancelled_result(chat_id)),
            Ok(ModelOutcome::Content(content)) => {
                let has_runnable_content = attach_runnable_actions(stream, &content);
                self.telemetry.track(TelemetryEvent::ResponseGenerated {
                    intent: Intent::Query,
                    backend: AnswerBackend::GeneralModel,
                    output_length: content.len(),
                    has_runnable_content,
                });
                Ok(ChatResult::new(metadata))
            }
            Err(err) => self.handle_model_failure(err, metadata, stream),
        }
    }

    async fn handle_schema(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        if let Some(result) = self.ensure_connected(chat_id, stream) {
            return Ok(result);
        }

        let namespace = match self
            .resolve_namespace(request, history, chat_id, stream, cancel)
            .await?
        {
            NamespaceResolution::Resolved(namespace) => namespace,
            NamespaceResolution::Asked(result) => return Ok(result),
            NamespaceResolution::Cancelled => return Ok(cancelled_result(chat_id)),
        };

        // The schema handler has nothing to say without documents, so
        // sampling failures are fatal here.
        let sample_documents = self
            .connection
            .sample_documents(&namespace, SCHEMA_SAMPLE_SIZE, cancel)
            .await
            .inspect_err(|_| {
                self.telemetry.track(TelemetryEvent::ResponseFailed {
                    category: FailureCategory::DataAccess,
                });
            })
            .with_context(|| format!("failed to sample documents from \"{namespace}\""))?;

        let mut metadata = ChatResultMetadata::new(Intent::Schema, chat_id);
        metadata.database_name = Some(namespace.database.clone());
        metadata.collection_name = Some(namespace.collection.clone());

        if sample_documents.is_empty() {
            stream.markdown(&format!(
                "Unable to generate a schema: no documents were found in \"{namespace}\".\n\n"
            ));
            return Ok(ChatResult::new(metadata));
        }

        let schema = simplified_schema(&sample_documents);
        let connection_names = self.connection.connection_names();
        let ctx = PromptContext {
            request,
            history,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = SchemaPrompt.build_messages(
            &ctx,
            &SchemaPromptArgs {
                database_name: &namespace.database,
                collection_name: &namespace.collection,
                schema: &schema,
                amount_of_documents_sampled: sample_documents.len(),
            },
        );
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        match self
            .dispatcher
            .answer_general(input.messages, stream, cancel)
            .await
        {
            Ok(ModelOutcome::Cancelled) => Ok(cancelled_result(chat_id)),
            Ok(ModelOutcome::Content(content)) => {
                self.telemetry.track(TelemetryEvent::ResponseGenerated {
                    intent: Intent::Schema,
                    backend: AnswerBackend::GeneralModel,
                    output_length: content.len(),
                    has_runnable_content: false,
                });
                Ok(ChatResult::new(metadata))
            }
            Err(err) => self.handle_model_failure(err, metadata, stream),
        }
    }

    async fn handle_docs(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        let stored = self.metadata.get(chat_id);
        let connection_names = self.connection.connection_names();

        // The docs backend keeps its own conversation state; the fallback
        // prompt only replays the recent docs window.
        let windowed = docs_history_window(history);
        let ctx = PromptContext {
            request,
            history: &windowed,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = GenericPrompt.build_messages(&ctx);
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        let outcome = match self
            .dispatcher
            .answer_docs(
                &request.prompt,
                stored.docs_conversation_id,
                input.messages,
                stream,
                cancel,
            )
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(cancelled_result(chat_id)),
            Err(err) => {
                let metadata = ChatResultMetadata::new(Intent::Docs, chat_id);
                return self.handle_model_failure(err, metadata, stream);
            }
        };

        render_references(stream, &outcome);

        if let Some(conversation_id) = &outcome.conversation_id {
            self.metadata.set_docs_conversation(chat_id, conversation_id);
        }

        self.telemetry.track(TelemetryEvent::ResponseGenerated {
            intent: Intent::Docs,
            backend: outcome.backend,
            output_length: outcome.content.len(),
            has_runnable_content: false,
        });

        let mut metadata = ChatResultMetadata::new(Intent::Docs, chat_id);
        metadata.docs_conversation_id = outcome.conversation_id;
        Ok(ChatResult::new(metadata))
    }

    async fn handle_generic(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        let connection_names = self.connection.connection_names();
        let ctx = PromptContext {
            request,
            history,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let input = GenericPrompt.build_messages(&ctx);
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        let metadata = ChatResultMetadata::new(Intent::Generic, chat_id);

        match self
            .dispatcher
            .answer_general(input.messages, stream, cancel)
            .await
        {
            Ok(ModelOutcome::Cancelled) => Ok(cancelled_result(chat_id)),
            Ok(ModelOutcome::Content(content)) => {
                let has_runnable_content = attach_runnable_actions(stream, &content);
                self.telemetry.track(TelemetryEvent::ResponseGenerated {
                    intent: Intent::Generic,
                    backend: AnswerBackend::GeneralModel,
                    output_length: content.len(),
                    has_runnable_content,
                });
                Ok(ChatResult::new(metadata))
            }
            Err(err) => self.handle_model_failure(err, metadata, stream),
        }
    }

    async fn handle_export_to_language(
        &self,
        request: &ChatRequest,
        history: &[crate::types::Turn],
        chat_id: &str,
        stream: &mut dyn ResponseStream,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ChatResult> {
        let options = request
            .export_options
            .as_ref()
            .context("export request is missing its target language options")?;

        let connection_names = self.connection.connection_names();
        let ctx = PromptContext {
            request,
            history,
            connection_names: &connection_names,
            model: Some(self.model.as_ref()),
        };
        let prompt = ExportToLanguagePrompt {
            language: &options.language,
            include_driver_syntax: options.include_driver_syntax,
        };
        let input = prompt.build_messages(&ctx);
        self.telemetry
            .track(TelemetryEvent::PromptSubmitted(input.stats.clone()));

        let metadata = ChatResultMetadata::new(Intent::Generic, chat_id);

        match self
            .dispatcher
            .answer_general(input.messages, stream, cancel)
            .await
        {
            Ok(ModelOutcome::Cancelled) => Ok(cancelled_result(chat_id)),
            Ok(ModelOutcome::Content(content)) => {
                self.telemetry.track(TelemetryEvent::ResponseGenerated {
                    intent: Intent::Generic,
                    backend: AnswerBackend::GeneralModel,
                    output_length: content.len(),
                    has_runnable_content: false,
                });
                Ok(ChatResult::new(metadata))
            }
            Err(err) => self.handle_model_failure(err, metadata, stream),
        }
    }

    /// Turn a model failure into the right user-facing outcome. Filtered and
    /// off-topic rejections resolve inline; everything else propagates.
    fn handle_model_failure(
        &self,
        err: ModelError,
        metadata: ChatResultMetadata,
        stream: &mut dyn ResponseStream,
    ) -> anyhow::Result<ChatResult> {
        self.telemetry.track(TelemetryEvent::ResponseFailed {
            category: FailureCategory::from_model_error(&err),
        });

        match err {
            ModelError::Filtered => {
                stream.markdown(FILTERED_MESSAGE);
                Ok(ChatResult::with_error(metadata, FILTERED_ERROR_MESSAGE))
            }
            ModelError::OffTopic => {
                stream.markdown(OFF_TOPIC_MESSAGE);
                Ok(ChatResult::new(metadata))
            }
            other => Err(ParticipantError::Model(other).into()),
        }
    }
}

fn cancelled_result(chat_id: &str) -> ChatResult {
    ChatResult::new(ChatResultMetadata::new(Intent::CancelledRequest, chat_id))
}

fn render_references(stream: &mut dyn ResponseStream, outcome: &DocsOutcome) {
    if outcome.references.is_empty() {
        return;
    }
    for reference in &outcome.references {
        stream.markdown(&format!("- [{}]({})\n", reference.title, reference.url));
    }
    stream.markdown("\n");
}
