//! Namespace resolution state machine
//!
//! Drives the "ask for database, then ask for collection, then proceed" flow.
//! The transition function is pure: it consumes events (merged candidates,
//! enumeration results) and emits the next effect to perform, so the whole
//! flow is testable without a model or a database connection.
//!
//! Fast paths: when an enumeration returns exactly one candidate it is
//! auto-selected without asking. An empty enumeration is fatal; there is
//! nothing meaningful to resolve against.

use crate::error::ParticipantError;
use crate::types::Namespace;

/// Choice lists rendered to the user are capped at this many entries, with a
/// "show more" affordance for the rest.
pub const MAX_VISIBLE_CHOICES: usize = 10;

/// Where the resolution flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceState {
    /// Nothing known yet.
    Unresolved,
    /// The user has been asked to pick a database.
    AwaitingDatabase,
    /// Database known; the user has been (or is about to be) asked to pick a
    /// collection.
    AwaitingCollection { database: String },
    /// Both names known.
    Resolved(Namespace),
}

/// Inputs the machine reacts to.
#[derive(Debug, Clone)]
pub enum NamespaceEvent {
    /// Result of merging model extraction, history and stored metadata.
    Candidates {
        database: Option<String>,
        collection: Option<String>,
    },
    /// Database names enumerated from the active connection.
    Databases(Vec<String>),
    /// Collection names enumerated from the selected database.
    Collections(Vec<String>),
}

/// The effect the caller must perform after a transition.
#[derive(Debug)]
pub enum NamespaceStep {
    /// Enumerate databases from the active connection.
    FetchDatabases,
    /// Enumerate collections of the given database.
    FetchCollections { database: String },
    /// Ask the user to pick a database from a capped, recency-ordered list.
    AskDatabase {
        choices: Vec<String>,
        truncated: bool,
    },
    /// Ask the user to pick a collection within the known database.
    AskCollection {
        database: String,
        choices: Vec<String>,
        truncated: bool,
    },
    /// Resolution finished.
    Done(Namespace),
    /// Fatal condition; the turn aborts with a descriptive error.
    Fail(ParticipantError),
}

fn cap_choices(mut names: Vec<String>) -> (Vec<String>, bool) {
    let truncated = names.len() > MAX_VISIBLE_CHOICES;
    names.truncate(MAX_VISIBLE_CHOICES);
    (names, truncated)
}

/// Pure transition function: `(state, event) -> (state, step)`.
pub fn transition(state: NamespaceState, event: NamespaceEvent) -> (NamespaceState, NamespaceStep) {
    match (state, event) {
        (
            _,
            NamespaceEvent::Candidates {
                database: Some(database),
                collection: Some(collection),
            },
        ) => {
            let namespace = Namespace::new(database, collection);
            (
                NamespaceState::Resolved(namespace.clone()),
                NamespaceStep::Done(namespace),
            )
        }

        (
            _,
            NamespaceEvent::Candidates {
                database: Some(database),
                collection: None,
            },
        ) => (
            NamespaceState::AwaitingCollection {
                database: database.clone(),
            },
            NamespaceStep::FetchCollections { database },
        ),

        (_, NamespaceEvent::Candidates { database: None, .. }) => {
            (NamespaceState::Unresolved, NamespaceStep::FetchDatabases)
        }

        (state, NamespaceEvent::Databases(names)) => match names.len() {
            0 => (state, NamespaceStep::Fail(ParticipantError::NoDatabases)),
            1 => {
                // Exactly one candidate: auto-select without asking.
                let database = names.into_iter().next().expect("one database");
                (
                    NamespaceState::AwaitingCollection {
                        database: database.clone(),
                    },
                    NamespaceStep::FetchCollections { database },
                )
            }
            _ => {
                let (choices, truncated) = cap_choices(names);
                (
                    NamespaceState::AwaitingDatabase,
                    NamespaceStep::AskDatabase { choices, truncated },
                )
            }
        },

        (NamespaceState::AwaitingCollection { database }, NamespaceEvent::Collections(names)) => {
            match names.len() {
                0 => (
                    NamespaceState::AwaitingCollection {
                        database: database.clone(),
                    },
                    NamespaceStep::Fail(ParticipantError::NoCollections { database }),
                ),
                1 => {
                    let collection = names.into_iter().next().expect("one collection");
                    let namespace = Namespace::new(database, collection);
                    (
                        NamespaceState::Resolved(namespace.clone()),
                        NamespaceStep::Done(namespace),
                    )
                }
                _ => {
                    let (choices, truncated) = cap_choices(names);
                    (
                        NamespaceState::AwaitingCollection {
                            database: database.clone(),
                        },
                        NamespaceStep::AskCollection {
                            database,
                            choices,
                            truncated,
                        },
                    )
                }
            }
        }

        // Collections arriving with no database selected cannot happen from
        // the driver loop; treat it as needing a database first.
        (state, NamespaceEvent::Collections(_)) => (state, NamespaceStep::FetchDatabases),
    }
}

/// Merge namespace candidates: explicit extraction always wins per field,
/// stored metadata is only a fallback.
pub fn merge_candidates(
    extracted: (Option<String>, Option<String>),
    fallback: (Option<String>, Option<String>),
) -> (Option<String>, Option<String>) {
    (
        extracted.0.or(fallback.0),
        extracted.1.or(fallback.1),
    )
}
