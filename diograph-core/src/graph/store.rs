//! The keyed entity store.

use super::edge::EdgeRef;
use super::entity::{Entity, EntityKind, Props};
use super::error::GraphError;
use super::query::Query;
use crate::debounce::SaveHandle;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Serialized form of a graph: key → entity document.
pub type GraphDocument = Props;

/// A document entry that could not be merged.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeFailure {
    /// Key of the entry in the document.
    pub key: String,
    /// Why it was skipped.
    pub error: GraphError,
}

/// Outcome of [`Graph::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Keys added, in key order.
    pub added: Vec<String>,
    /// Entries skipped.
    pub failures: Vec<MergeFailure>,
}

impl MergeReport {
    /// Whether every entry was merged.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A keyed collection of entities of one kind.
///
/// Keys are usually the entity's own id. A key may also be an alias: the
/// entity stored under it has a different id, and lookups through the
/// alias resolve (one hop) to the entity stored under that id.
///
/// Every mutating operation asks the attached [`SaveHandle`], if any, for
/// a debounced save. Reads, queries and merges do not.
pub struct Graph<K: EntityKind> {
    entities: BTreeMap<String, Entity<K>>,
    saver: Option<SaveHandle>,
}

impl<K: EntityKind> Graph<K> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            saver: None,
        }
    }

    /// Create a graph hydrated from a document. Bad entries are logged and
    /// skipped.
    pub fn from_document(document: GraphDocument) -> Self {
        let mut graph = Self::new();
        graph.merge(document);
        graph
    }

    /// Parse a JSON document. Fails only when the text is not a JSON object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let document: GraphDocument = serde_json::from_str(text)?;
        Ok(Self::from_document(document))
    }

    /// Attach the handle that mutations will trigger.
    pub fn attach_saver(&mut self, saver: SaveHandle) {
        self.saver = Some(saver);
    }

    /// Detach and return the save handle.
    pub fn detach_saver(&mut self) -> Option<SaveHandle> {
        self.saver.take()
    }

    fn request_save(&self) {
        if let Some(saver) = &self.saver {
            saver.trigger();
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `key` is present (as an id or an alias).
    pub fn contains_key(&self, key: &str) -> bool {
        self.entities.contains_key(key)
    }

    /// Every (key, entity) pair in key order, aliases included.
    pub fn entities(&self) -> impl Iterator<Item = (&str, &Entity<K>)> {
        self.entities.iter().map(|(key, entity)| (key.as_str(), entity))
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// Add every entry of `document`, keyed as in the document.
    ///
    /// Entries that fail (duplicate key or id, or not an object) are logged
    /// and reported; the rest are still added.
    pub fn merge(&mut self, document: GraphDocument) -> MergeReport {
        let mut report = MergeReport::default();

        for (key, value) in document {
            let result = match value {
                Value::Object(props) => self
                    .insert("merge", props, Some(key.as_str()))
                    .map(|_| ()),
                other => Err(GraphError::InvalidEntity {
                    operation: "merge",
                    key: key.clone(),
                    reason: format!("expected an object, found {}", json_type(&other)),
                }),
            };

            match result {
                Ok(()) => report.added.push(key),
                Err(error) => {
                    warn!(
                        kind = K::NAME,
                        key = %key,
                        error = %error,
                        "skipped entity while merging"
                    );
                    report.failures.push(MergeFailure { key, error });
                }
            }
        }

        report
    }

    /// Empty the graph.
    pub fn reset(&mut self) -> &mut Self {
        self.entities.clear();
        self
    }

    /// A new graph with the entities matching `query`, keyed by their true
    /// ids. The result has no aliases and no save handle.
    pub fn query(&self, query: &Query) -> Graph<K> {
        let mut result = Graph::new();

        for (key, entity) in &self.entities {
            if !query.matches(entity) {
                continue;
            }
            // The canonical entry wins over any alias copy.
            if key == entity.id() || !result.entities.contains_key(entity.id()) {
                result
                    .entities
                    .insert(entity.id().to_string(), entity.clone());
            }
        }

        result
    }

    /// Serialize every key to its entity document.
    pub fn to_document(&self) -> GraphDocument {
        self.entities
            .iter()
            .map(|(key, entity)| (key.clone(), Value::Object(entity.to_document())))
            .collect()
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_document())
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Insert without requesting a save. Returns the key used.
    fn insert(
        &mut self,
        operation: &'static str,
        props: Props,
        key: Option<&str>,
    ) -> Result<String, GraphError> {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            // Key occupancy is checked before construction; the entity's own
            // id is not checked, which is what allows aliases.
            if self.entities.contains_key(key) {
                return Err(GraphError::already_exists(operation, key));
            }
            self.entities.insert(key.to_string(), Entity::new(props));
            return Ok(key.to_string());
        }

        let entity = Entity::new(props);
        if self.entities.contains_key(entity.id()) {
            return Err(GraphError::already_exists(operation, entity.id()));
        }
        let key = entity.id().to_string();
        self.entities.insert(key.clone(), entity);
        Ok(key)
    }

    /// Add an entity built from `props`.
    ///
    /// With `key`, fails if the key is taken and stores the entity under
    /// `key` (possibly an alias). Without, the entity is stored under its
    /// own (possibly generated) id, failing if that id is taken.
    pub fn add_entity(
        &mut self,
        props: Props,
        key: Option<&str>,
    ) -> Result<&Entity<K>, GraphError> {
        let key = self.insert("add_entity", props, key)?;
        self.request_save();
        self.entity_at("add_entity", &key)
    }

    /// Resolve a lookup key to the key of the canonical entity.
    fn resolve(&self, operation: &'static str, id: &str) -> Result<String, GraphError> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| GraphError::not_found(operation, id))?;

        if entity.id() != id {
            if !self.entities.contains_key(entity.id()) {
                return Err(GraphError::not_found(operation, entity.id()));
            }
            return Ok(entity.id().to_string());
        }

        Ok(id.to_string())
    }

    fn entity_at(&self, operation: &'static str, key: &str) -> Result<&Entity<K>, GraphError> {
        self.entities
            .get(key)
            .ok_or_else(|| GraphError::not_found(operation, key))
    }

    fn entity_at_mut(
        &mut self,
        operation: &'static str,
        key: &str,
    ) -> Result<&mut Entity<K>, GraphError> {
        self.entities
            .get_mut(key)
            .ok_or_else(|| GraphError::not_found(operation, key))
    }

    /// Look up an entity by id or alias.
    pub fn get_entity(&self, id: &str) -> Result<&Entity<K>, GraphError> {
        let key = self.resolve("get_entity", id)?;
        self.entity_at("get_entity", &key)
    }

    /// Apply `props` to the entity found by `id` (or alias).
    ///
    /// An `id` in `props` equal to the lookup id is ignored.
    pub fn update_entity(&mut self, id: &str, mut props: Props) -> Result<&Entity<K>, GraphError> {
        let key = self.resolve("update_entity", id)?;
        if props.get("id").and_then(Value::as_str) == Some(id) {
            props.remove("id");
        }

        self.entity_at_mut("update_entity", &key)?.update(props);
        self.request_save();
        self.entity_at("update_entity", &key)
    }

    /// Remove the entry stored under `id`. Removing an alias leaves the
    /// canonical entity in place; edges pointing at a removed entity stay.
    pub fn remove_entity(&mut self, id: &str) -> Result<bool, GraphError> {
        if self.entities.remove(id).is_none() {
            return Err(GraphError::not_found("remove_entity", id));
        }
        self.request_save();
        Ok(true)
    }

    /// Add an edge (link or door) from `id` to `target`.
    ///
    /// Both ends must be keys of this graph.
    pub fn add_edge(
        &mut self,
        id: &str,
        target: impl Into<EdgeRef>,
    ) -> Result<&Entity<K>, GraphError> {
        let target = target.into();
        self.require_keys("add_edge", id, &target.id)?;

        let key = self.resolve("add_edge", id)?;
        self.entity_at_mut("add_edge", &key)?.add_edge(target)?;
        self.request_save();
        self.entity_at("add_edge", &key)
    }

    /// Remove the edge from `id` to `target_id`.
    ///
    /// Both ends must be keys of this graph.
    pub fn remove_edge(&mut self, id: &str, target_id: &str) -> Result<&Entity<K>, GraphError> {
        self.require_keys("remove_edge", id, target_id)?;

        let key = self.resolve("remove_edge", id)?;
        self.entity_at_mut("remove_edge", &key)?
            .remove_edge(target_id)?;
        self.request_save();
        self.entity_at("remove_edge", &key)
    }

    fn require_keys(
        &self,
        operation: &'static str,
        id: &str,
        target_id: &str,
    ) -> Result<(), GraphError> {
        for key in [id, target_id] {
            if !self.entities.contains_key(key) {
                return Err(GraphError::not_found(operation, key));
            }
        }
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<K: EntityKind> Default for Graph<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones carry the entities only; the copy never triggers saves.
impl<K: EntityKind> Clone for Graph<K> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            saver: None,
        }
    }
}

impl<K: EntityKind> fmt::Debug for Graph<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("kind", &K::NAME)
            .field("entities", &self.entities)
            .field("persisted", &self.saver.is_some())
            .finish()
    }
}

impl<K: EntityKind> Serialize for Graph<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}
