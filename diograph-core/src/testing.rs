//! Testing utilities.
//!
//! - `RecordingStore`, a [`DocumentStore`] that records every write and can
//!   be told to fail
//! - Sample documents for both graph kinds

use crate::graph::{props, GraphDocument};
use crate::persist::{decode, DocumentStore, MemoryDocumentStore, PersistError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A single recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RecordedWrite {
    /// The written bytes parsed as a graph document.
    pub fn document(&self) -> Result<GraphDocument, PersistError> {
        decode(&self.bytes)
    }
}

/// An in-memory document store that keeps a log of writes.
///
/// Use this to count debounced saves and to inject persistence failures.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryDocumentStore,
    writes: Mutex<Vec<RecordedWrite>>,
    fail_saves: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    /// Successful writes to `name`.
    pub fn writes_to(&self, name: &str) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|write| write.name == name)
            .collect()
    }

    /// The underlying storage.
    pub fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn load(&self, name: &str) -> Result<Vec<u8>, PersistError> {
        self.inner.load(name).await
    }

    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<(), PersistError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistError::Io(std::io::Error::other(format!(
                "refusing to write {name}"
            ))));
        }

        self.inner.save(name, bytes.clone()).await?;
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(RecordedWrite {
                name: name.to_string(),
                bytes,
            });
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PersistError> {
        self.inner.delete(name).await
    }
}

/// A small diograph document: a root diory linked to two children, one of
/// them also reachable through the alias key `"alias"`.
pub fn sample_diograph() -> GraphDocument {
    props(json!({
        "/": {
            "id": "/",
            "text": "Root",
            "links": [{"id": "first"}, {"id": "second", "path": "second.jpg"}],
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-01T00:00:00.000Z",
        },
        "first": {
            "id": "first",
            "text": "First diory",
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-02T00:00:00.000Z",
        },
        "second": {
            "id": "second",
            "text": "Second diory",
            "image": "second.jpg",
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-03T00:00:00.000Z",
        },
        "alias": {
            "id": "first",
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-01T00:00:00.000Z",
        },
    }))
}

/// A diosphere document with a root room and one room behind a door.
pub fn sample_diosphere() -> GraphDocument {
    props(json!({
        "/": {
            "id": "/",
            "text": "Home",
            "doors": [{"id": "work"}],
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-01T00:00:00.000Z",
        },
        "work": {
            "id": "work",
            "text": "Work",
            "created": "2022-01-01T00:00:00.000Z",
            "modified": "2022-01-01T00:00:00.000Z",
        },
    }))
}
