//! Entities: the nodes of a graph.

use super::edge::EdgeRef;
use super::error::GraphError;
use crate::schema::{decode_field, is_present, FieldRejection, FieldSchema};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::warn;
use uuid::Uuid;

/// A partial set of entity fields keyed by document field name.
///
/// `Value::Null` clears a field.
pub type Props = Map<String, Value>;

/// Turn a JSON value into props. Anything but an object yields empty props.
pub fn props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => Props::new(),
    }
}

/// Generate a fresh, globally unique entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as an ISO-8601 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What distinguishes one kind of entity from another.
pub trait EntityKind: Debug + Clone + Default + PartialEq + Send + Sync + 'static {
    /// The kind's own fields (everything except id, edges and timestamps).
    type Fields: FieldSchema;

    /// Name used in diagnostics ("diory", "room").
    const NAME: &'static str;

    /// Document name of the edge list ("links", "doors").
    const EDGE_FIELD: &'static str;

    /// Whether edges of this kind keep their `path`.
    const EDGE_PATHS: bool;
}

/// A single node of a graph: identity, typed optional fields, outgoing
/// edges and timestamps.
///
/// The edge list is `None` whenever it would be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<K: EntityKind> {
    id: String,
    fields: K::Fields,
    edges: Option<Vec<EdgeRef>>,
    created: Option<String>,
    modified: Option<String>,
}

impl<K: EntityKind> Entity<K> {
    /// Create an entity from props.
    ///
    /// The id comes from `props["id"]` when present, otherwise a fresh one
    /// is generated. Both timestamps are stamped unless supplied.
    pub fn new(props: Props) -> Self {
        let id = match props.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => new_id(),
        };
        Self::with_id(id, props)
    }

    /// Create an entity with an explicit id, ignoring any id in `props`.
    pub fn with_id(id: impl Into<String>, mut props: Props) -> Self {
        props.remove("id");
        let mut entity = Self {
            id: id.into(),
            fields: K::Fields::default(),
            edges: None,
            created: None,
            modified: None,
        };
        entity.update_with(props, false);
        entity
    }

    /// Alias for [`Entity::new`] that reads as the inverse of
    /// [`Entity::to_document`].
    pub fn from_document(document: Props) -> Self {
        Self::new(document)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &K::Fields {
        &self.fields
    }

    /// Outgoing edges, or `None` when there are none.
    pub fn edges(&self) -> Option<&[EdgeRef]> {
        self.edges.as_deref()
    }

    /// Whether an edge to `id` exists.
    pub fn has_edge(&self, id: &str) -> bool {
        self.edges
            .as_ref()
            .is_some_and(|edges| edges.iter().any(|edge| edge.id == id))
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    pub fn modified(&self) -> Option<&str> {
        self.modified.as_deref()
    }

    /// Current value of any field by document name, including `id`, the
    /// edge field and timestamps.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "created" => self.created.clone().map(Value::String),
            "modified" => self.modified.clone().map(Value::String),
            f if f == K::EDGE_FIELD => self
                .edges
                .as_ref()
                .map(|edges| Value::Array(edges.iter().map(EdgeRef::to_value).collect())),
            _ => self.fields.value_of(field),
        }
    }

    /// Apply props and re-stamp `modified`.
    pub fn update(&mut self, props: Props) -> &mut Self {
        self.update_with(props, true)
    }

    /// Apply props. With `modify = false`, `modified` is only stamped when
    /// it is still unset.
    pub fn update_with(&mut self, props: Props, modify: bool) -> &mut Self {
        self.update_reporting(props, modify);
        self
    }

    /// Apply props and return every field that was dropped.
    ///
    /// Rejected fields are also logged at `warn` level. They never fail the
    /// update.
    pub fn update_reporting(&mut self, props: Props, modify: bool) -> Vec<FieldRejection> {
        let mut rejections = Vec::new();

        for (field, value) in props {
            if let Err(rejection) = self.assign(&field, value) {
                warn!(
                    kind = K::NAME,
                    id = %self.id,
                    field = %rejection.field(),
                    reason = %rejection,
                    "dropped field"
                );
                rejections.push(rejection);
            }
        }

        if self.created.is_none() {
            self.created = Some(now_timestamp());
        }

        if modify || self.modified.is_none() {
            self.modified = Some(now_timestamp());
        }

        rejections
    }

    fn assign(&mut self, field: &str, value: Value) -> Result<(), FieldRejection> {
        match field {
            "id" => {
                if value.as_str() == Some(self.id.as_str()) {
                    Ok(())
                } else {
                    Err(FieldRejection::Immutable {
                        field: field.to_string(),
                    })
                }
            }
            "created" => {
                if let Some(created) = &self.created {
                    return if value.as_str() == Some(created.as_str()) {
                        Ok(())
                    } else {
                        Err(FieldRejection::Immutable {
                            field: field.to_string(),
                        })
                    };
                }
                self.created = decode_field(field, value)?;
                Ok(())
            }
            "modified" => {
                self.modified = decode_field(field, value)?;
                Ok(())
            }
            f if f == K::EDGE_FIELD => {
                let edges: Option<Vec<EdgeRef>> = decode_field(field, value)?;
                self.edges = edges.map(dedup_edges::<K>).filter(|edges| !edges.is_empty());
                Ok(())
            }
            _ => self.fields.assign(field, value),
        }
    }

    /// Add an edge to `edge.id`.
    ///
    /// Fails with `AlreadyExists` if an edge to that id is already present.
    pub fn add_edge(&mut self, edge: impl Into<EdgeRef>) -> Result<&mut Self, GraphError> {
        let edge = edge.into();
        if self.has_edge(&edge.id) {
            return Err(GraphError::already_exists("add_edge", edge.id));
        }

        self.edges
            .get_or_insert_with(Vec::new)
            .push(edge.normalized(K::EDGE_PATHS));

        Ok(self.update(Props::new()))
    }

    /// Remove the edge to `id`.
    ///
    /// Fails with `NotFound` if there is no such edge. Removing the last
    /// edge unsets the edge list.
    pub fn remove_edge(&mut self, id: &str) -> Result<&mut Self, GraphError> {
        let edges = match self.edges.as_mut() {
            Some(edges) if edges.iter().any(|edge| edge.id == id) => edges,
            _ => return Err(GraphError::not_found("remove_edge", id)),
        };

        edges.retain(|edge| edge.id != id);
        if edges.is_empty() {
            self.edges = None;
        }

        Ok(self.update(Props::new()))
    }

    /// Plain record of the entity: `id` plus every present field.
    pub fn to_document(&self) -> Props {
        let mut document = Props::new();
        document.insert("id".to_string(), Value::String(self.id.clone()));

        for &field in <K::Fields as FieldSchema>::FIELDS {
            if let Some(value) = self.fields.value_of(field) {
                if is_present(&value) {
                    document.insert(field.to_string(), value);
                }
            }
        }

        for field in [K::EDGE_FIELD, "created", "modified"] {
            if let Some(value) = self.field_value(field) {
                if is_present(&value) {
                    document.insert(field.to_string(), value);
                }
            }
        }

        document
    }
}

fn dedup_edges<K: EntityKind>(edges: Vec<EdgeRef>) -> Vec<EdgeRef> {
    let mut unique: Vec<EdgeRef> = Vec::with_capacity(edges.len());
    for edge in edges {
        if !unique.iter().any(|existing| existing.id == edge.id) {
            unique.push(edge.normalized(K::EDGE_PATHS));
        }
    }
    unique
}

impl<K: EntityKind> Serialize for Entity<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de, K: EntityKind> Deserialize<'de> for Entity<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Props::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{Diory, Room};
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entity_creation() {
        let diory = Diory::new(props(json!({"id": "d1", "text": "hello"})));
        assert_eq!(diory.id(), "d1");
        assert_eq!(diory.text(), Some("hello"));
        assert!(diory.created().is_some());
        assert_eq!(diory.created(), diory.modified());
        assert!(diory.edges().is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Diory::new(Props::new());
        let b = Diory::new(Props::new());
        assert!(!a.id().is_empty());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_explicit_id_wins() {
        let diory = Diory::with_id("explicit", props(json!({"id": "ignored"})));
        assert_eq!(diory.id(), "explicit");
    }

    #[test]
    fn test_supplied_timestamps_survive_construction() {
        let diory = Diory::new(props(json!({
            "id": "d1",
            "created": "2020-01-01T00:00:00.000Z",
            "modified": "2021-01-01T00:00:00.000Z",
        })));
        assert_eq!(diory.created(), Some("2020-01-01T00:00:00.000Z"));
        assert_eq!(diory.modified(), Some("2021-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_update_restamps_modified_only() {
        let mut diory = Diory::new(props(json!({
            "id": "d1",
            "text": "hello",
            "created": "2020-01-01T00:00:00.000Z",
            "modified": "2020-01-01T00:00:00.000Z",
        })));
        let before = diory.to_document();

        sleep(Duration::from_millis(5));
        diory.update(Props::new());
        let after = diory.to_document();

        assert_ne!(before["modified"], after["modified"]);
        assert_eq!(before["created"], after["created"]);
        assert_eq!(before["text"], after["text"]);
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn test_quiet_update_keeps_modified() {
        let mut diory = Diory::new(props(json!({
            "id": "d1",
            "modified": "2020-01-01T00:00:00.000Z",
        })));
        diory.update_with(props(json!({"text": "quiet"})), false);
        assert_eq!(diory.text(), Some("quiet"));
        assert_eq!(diory.modified(), Some("2020-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_unknown_and_immutable_fields_are_dropped() {
        let mut diory = Diory::new(props(json!({"id": "d1", "created": "then"})));

        let rejections = diory.update_reporting(
            props(json!({
                "id": "other",
                "colour": "red",
                "created": "now",
                "text": "kept",
            })),
            true,
        );

        assert_eq!(diory.id(), "d1");
        assert_eq!(diory.created(), Some("then"));
        assert_eq!(diory.text(), Some("kept"));
        assert!(!diory.to_document().contains_key("colour"));

        let fields: Vec<_> = rejections.iter().map(|r| r.field()).collect();
        assert_eq!(fields.len(), 3);
        assert!(fields.contains(&"id"));
        assert!(fields.contains(&"colour"));
        assert!(fields.contains(&"created"));
    }

    #[test]
    fn test_wrongly_typed_value_is_dropped() {
        let mut diory = Diory::new(props(json!({"id": "d1", "text": "keep"})));
        let rejections = diory.update_reporting(props(json!({"text": 42})), true);
        assert_eq!(rejections.len(), 1);
        assert_eq!(diory.text(), Some("keep"));
    }

    #[test]
    fn test_null_clears_field() {
        let mut diory = Diory::new(props(json!({"id": "d1", "text": "hello"})));
        diory.update(props(json!({"text": null})));
        assert_eq!(diory.text(), None);
        assert!(!diory.to_document().contains_key("text"));
    }

    #[test]
    fn test_empty_values_are_omitted_from_document() {
        let diory = Diory::new(props(json!({"id": "d1", "text": "", "links": []})));
        let document = diory.to_document();
        assert!(!document.contains_key("text"));
        assert!(!document.contains_key("links"));
        assert!(diory.edges().is_none());
    }

    #[test]
    fn test_add_and_remove_edge() {
        let mut diory = Diory::new(props(json!({"id": "d1"})));
        diory.add_edge(EdgeRef::new("d2").with_path("sub")).unwrap();

        assert_eq!(
            diory.edges(),
            Some(&[EdgeRef::new("d2").with_path("sub")][..])
        );

        let err = diory.add_edge("d2").unwrap_err();
        assert!(err.is_already_exists());

        diory.remove_edge("d2").unwrap();
        assert!(diory.edges().is_none());
        assert!(!diory.to_document().contains_key("links"));

        let err = diory.remove_edge("d2").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_doors_drop_path() {
        let mut room = Room::new(props(json!({"id": "r1"})));
        room.add_edge(EdgeRef::new("r2").with_path("ignored")).unwrap();
        assert_eq!(room.edges(), Some(&[EdgeRef::new("r2")][..]));
        assert_eq!(room.to_document()["doors"], json!([{"id": "r2"}]));
    }

    #[test]
    fn test_edges_from_props_are_deduplicated() {
        let diory = Diory::new(props(json!({
            "id": "d1",
            "links": [{"id": "a"}, {"id": "b"}, {"id": "a", "path": "dup"}],
        })));
        let ids: Vec<_> = diory.edges().unwrap().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_document_round_trip() {
        let diory = Diory::new(props(json!({
            "id": "d1",
            "text": "hello",
            "latlng": "60.1, 24.9",
            "links": [{"id": "d2"}],
        })));
        let restored = Diory::from_document(diory.to_document());
        assert_eq!(restored, diory);

        let text = serde_json::to_string(&diory).unwrap();
        let parsed: Diory = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, diory);
    }
}
