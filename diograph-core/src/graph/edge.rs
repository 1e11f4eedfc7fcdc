//! Edge references between entities of the same kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A directed reference to another entity by id.
///
/// Edges do not own their targets; a target may be removed while edges to
/// it remain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    /// Id of the target entity.
    pub id: String,
    /// Optional auxiliary path (links only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl EdgeRef {
    /// Create an edge to `id` without a path.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
        }
    }

    /// Set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Drop an empty path, and drop any path at all when the kind's edges
    /// do not carry one.
    pub(crate) fn normalized(mut self, keep_path: bool) -> Self {
        if !keep_path || self.path.as_deref() == Some("") {
            self.path = None;
        }
        self
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(path) = &self.path {
            object.insert("path".to_string(), Value::String(path.clone()));
        }
        Value::Object(object)
    }
}

impl From<&str> for EdgeRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EdgeRef {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
