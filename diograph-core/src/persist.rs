//! Graph persistence.
//!
//! A graph is stored as one JSON document. The [`DocumentStore`] trait is
//! the storage boundary: it moves opaque bytes by name and knows nothing
//! about graphs. [`PersistentGraph`] wires one graph to one document through
//! a [`SaveScheduler`], so mutations are written back debounced.

use crate::debounce::SaveScheduler;
use crate::graph::{EntityKind, Graph, GraphDocument, MergeReport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Save scheduling requires a tokio runtime")]
    NoRuntime,

    #[error("Save scheduler has stopped")]
    SchedulerStopped,
}

impl PersistError {
    /// Check if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::NotFound(_))
    }
}

/// Named blob storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. A missing document is [`PersistError::NotFound`].
    async fn load(&self, name: &str) -> Result<Vec<u8>, PersistError>;

    /// Write a document, replacing any previous content.
    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<(), PersistError>;

    /// Remove a document.
    async fn delete(&self, name: &str) -> Result<(), PersistError>;
}

// =============================================================================
// Codec
// =============================================================================

/// Serialize a graph to document bytes.
pub fn encode<K: EntityKind>(graph: &Graph<K>) -> Result<Vec<u8>, PersistError> {
    Ok(serde_json::to_vec_pretty(&graph.to_document())?)
}

/// Parse document bytes. Empty input is an empty document.
pub fn decode(bytes: &[u8]) -> Result<GraphDocument, PersistError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(GraphDocument::new());
    }

    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Object(document) => Ok(document),
        _ => Err(PersistError::InvalidDocument(
            "top level must be a JSON object".to_string(),
        )),
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Documents held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored document, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.documents.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert a document directly.
    pub async fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.documents.lock().await.insert(name.into(), bytes.into());
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, name: &str) -> Result<Vec<u8>, PersistError> {
        self.documents
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(name.to_string()))
    }

    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<(), PersistError> {
        self.documents.lock().await.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PersistError> {
        self.documents
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PersistError::NotFound(name.to_string()))
    }
}

/// Documents stored as files under a root directory.
///
/// Names are relative paths; parent directories are created on save.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a document. Names that would escape the root are rejected.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, PersistError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));

        if name.is_empty() || escapes {
            return Err(PersistError::InvalidDocument(format!(
                "document name {name:?} must be a relative path inside the store"
            )));
        }

        Ok(self.root.join(relative))
    }
}

fn not_found_as(name: &str, error: std::io::Error) -> PersistError {
    if error.kind() == std::io::ErrorKind::NotFound {
        PersistError::NotFound(name.to_string())
    } else {
        PersistError::Io(error)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn load(&self, name: &str) -> Result<Vec<u8>, PersistError> {
        let path = self.path_of(name)?;
        fs::read(&path).await.map_err(|e| not_found_as(name, e))
    }

    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<(), PersistError> {
        let path = self.path_of(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PersistError> {
        let path = self.path_of(name)?;
        fs::remove_file(&path).await.map_err(|e| not_found_as(name, e))
    }
}

/// Encode an id as a single path segment.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. Distinct ids give distinct segments, and an empty id becomes `%`.
pub fn sanitize_segment(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }

    let mut segment = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            segment.push(char::from(byte));
        } else {
            segment.push_str(&format!("%{byte:02X}"));
        }
    }
    segment
}

// =============================================================================
// PersistentGraph
// =============================================================================

/// A graph bound to a document, saved debounced on every mutation.
///
/// Do not hold the [`lock`](Self::lock) guard across [`flush`](Self::flush)
/// or [`close`](Self::close): the save action locks the graph to encode it.
pub struct PersistentGraph<K: EntityKind> {
    name: String,
    store: Arc<dyn DocumentStore>,
    graph: Arc<Mutex<Graph<K>>>,
    scheduler: Option<SaveScheduler>,
    load_report: MergeReport,
}

impl<K: EntityKind> PersistentGraph<K> {
    /// Load `name` from `store` and start saving it back.
    ///
    /// A missing document opens as an empty graph. Entries that fail to
    /// merge are skipped and listed in [`load_report`](Self::load_report).
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        name: impl Into<String>,
        quiet: Duration,
    ) -> Result<Self, PersistError> {
        let name = name.into();

        let document = match store.load(&name).await {
            Ok(bytes) => decode(&bytes)?,
            Err(PersistError::NotFound(_)) => {
                debug!(document = %name, kind = K::NAME, "no document yet; starting empty");
                GraphDocument::new()
            }
            Err(e) => return Err(e),
        };

        let mut graph = Graph::new();
        let load_report = graph.merge(document);
        if !load_report.is_clean() {
            warn!(
                document = %name,
                skipped = load_report.failures.len(),
                "document loaded with skipped entries"
            );
        }

        let graph = Arc::new(Mutex::new(graph));
        let scheduler = SaveScheduler::spawn(quiet, {
            let graph = Arc::downgrade(&graph);
            let store = Arc::clone(&store);
            let name = name.clone();
            move || {
                let graph = graph.clone();
                let store = Arc::clone(&store);
                let name = name.clone();
                async move {
                    let Some(graph) = graph.upgrade() else {
                        return Ok(());
                    };
                    let bytes = encode(&*graph.lock().await)?;
                    store.save(&name, bytes).await
                }
            }
        })?;
        graph.lock().await.attach_saver(scheduler.handle());

        Ok(Self {
            name,
            store,
            graph,
            scheduler: Some(scheduler),
            load_report,
        })
    }

    /// Document name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What happened when the document was merged on open.
    pub fn load_report(&self) -> &MergeReport {
        &self.load_report
    }

    /// Access the graph. Mutations through the guard schedule a save.
    pub async fn lock(&self) -> MutexGuard<'_, Graph<K>> {
        self.graph.lock().await
    }

    /// Write the current state now, bypassing the debounce window.
    pub async fn save_now(&self) -> Result<(), PersistError> {
        let bytes = encode(&*self.graph.lock().await)?;
        self.store.save(&self.name, bytes).await
    }

    /// Write now if a save is pending. Returns whether a write happened.
    pub async fn flush(&self) -> Result<bool, PersistError> {
        match &self.scheduler {
            Some(scheduler) => scheduler.flush().await,
            None => Err(PersistError::SchedulerStopped),
        }
    }

    /// Write any pending save and stop saving.
    pub async fn close(mut self) -> Result<bool, PersistError> {
        self.graph.lock().await.detach_saver();
        match self.scheduler.take() {
            Some(scheduler) => scheduler.flush_and_stop().await,
            None => Ok(false),
        }
    }

    /// Stop saving and remove the document.
    pub async fn delete(mut self) -> Result<(), PersistError> {
        self.graph.lock().await.detach_saver();
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await?;
        }
        self.store.delete(&self.name).await
    }
}

impl<K: EntityKind> std::fmt::Debug for PersistentGraph<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentGraph")
            .field("name", &self.name)
            .field("kind", &K::NAME)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
