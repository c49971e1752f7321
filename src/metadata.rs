//! Per-chat-session metadata store
//!
//! Survives across turns when the model fails to re-derive the namespace from
//! free text. Keyed by the stable chat-session id; entries are never deleted
//! explicitly, their lifetime is the lifetime of the chat UI session.
//!
//! Writes happen only after a step fully succeeds. There is no concurrent
//! mutation of a single session under normal hosts; if overlapping requests
//! ever arrive, behavior is last-write-wins.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{ChatMetadata, Namespace};

#[derive(Debug, Default)]
pub struct ChatMetadataStore {
    inner: RwLock<HashMap<String, ChatMetadata>>,
}

impl ChatMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the metadata for a session, default-empty when unseen.
    pub fn get(&self, chat_id: &str) -> ChatMetadata {
        self.inner
            .read()
            .map(|map| map.get(chat_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Apply a mutation to the session's record, creating it if needed.
    pub fn update<F>(&self, chat_id: &str, apply: F)
    where
        F: FnOnce(&mut ChatMetadata),
    {
        if let Ok(mut map) = self.inner.write() {
            apply(map.entry(chat_id.to_string()).or_default());
        }
    }

    /// Record a fully resolved namespace.
    pub fn set_namespace(&self, chat_id: &str, namespace: &Namespace) {
        self.update(chat_id, |meta| {
            meta.database_name = Some(namespace.database.clone());
            meta.collection_name = Some(namespace.collection.clone());
        });
    }

    /// Record the docs backend conversation id for reuse on later turns.
    pub fn set_docs_conversation(&self, chat_id: &str, conversation_id: &str) {
        self.update(chat_id, |meta| {
            meta.docs_conversation_id = Some(conversation_id.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_session_is_empty() {
        let store = ChatMetadataStore::new();
        assert_eq!(store.get("nope"), ChatMetadata::default());
    }

    #[test]
    fn test_namespace_roundtrip() {
        let store = ChatMetadataStore::new();
        store.set_namespace("chat-1", &Namespace::new("ufos", "sightings"));
        let meta = store.get("chat-1");
        assert_eq!(meta.database_name.as_deref(), Some("ufos"));
        assert_eq!(meta.collection_name.as_deref(), Some("sightings"));
    }

    #[test]
    fn test_last_write_wins() {
        let store = ChatMetadataStore::new();
        store.set_namespace("chat-1", &Namespace::new("a", "b"));
        store.set_namespace("chat-1", &Namespace::new("c", "d"));
        assert_eq!(store.get("chat-1").database_name.as_deref(), Some("c"));
    }

    #[test]
    fn test_docs_conversation_is_independent_of_namespace() {
        let store = ChatMetadataStore::new();
        store.set_docs_conversation("chat-1", "conv-9");
        store.set_namespace("chat-1", &Namespace::new("a", "b"));
        let meta = store.get("chat-1");
        assert_eq!(meta.docs_conversation_id.as_deref(), Some("conv-9"));
        assert_eq!(meta.collection_name.as_deref(), Some("b"));
    }
}
