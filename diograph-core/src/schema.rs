//! Compile-time field schemas for entity kinds.
//!
//! Each entity kind declares the set of fields it recognises as a plain
//! struct of `Option<T>` fields deriving [`FieldSchema`]. Updates address
//! fields by their document name; anything outside the schema is rejected
//! and dropped rather than stored.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

pub use diograph_macros::FieldSchema;
pub use serde_json::Value;

/// Why a field in an update was dropped.
///
/// A rejection is not an operation failure: the rest of the update still
/// applies and the caller gets the entity back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldRejection {
    /// The field exists but may not be written (e.g. `id`, or `created`
    /// once set).
    #[error("field '{field}' is immutable")]
    Immutable { field: String },

    /// The field is not part of this entity kind's schema.
    #[error("field '{field}' is not valid")]
    Unknown { field: String },

    /// The field is known but the value does not have its type.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl FieldRejection {
    /// Name of the rejected field.
    pub fn field(&self) -> &str {
        match self {
            FieldRejection::Immutable { field }
            | FieldRejection::Unknown { field }
            | FieldRejection::InvalidValue { field, .. } => field,
        }
    }
}

/// A fixed set of named, typed, optional fields.
///
/// Implemented by `#[derive(FieldSchema)]`; see `diograph_macros`.
pub trait FieldSchema: Debug + Clone + Default + PartialEq + Send + Sync + 'static {
    /// Document names of every recognised field, in declaration order.
    const FIELDS: &'static [&'static str];

    /// Assign a field by document name. `Value::Null` clears it.
    fn assign(&mut self, field: &str, value: Value) -> Result<(), FieldRejection>;

    /// Current value of a field, or `None` when unset or unknown.
    fn value_of(&self, field: &str) -> Option<Value>;

    /// Whether `field` belongs to this schema.
    fn recognises(field: &str) -> bool {
        Self::FIELDS.contains(&field)
    }
}

/// Decode a field value; `null` clears the field.
pub fn decode_field<T: DeserializeOwned>(
    field: &str,
    value: Value,
) -> Result<Option<T>, FieldRejection> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| FieldRejection::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

/// Encode a field value for output.
pub fn encode_field<T: Serialize>(value: &Option<T>) -> Option<Value> {
    value.as_ref().and_then(|v| serde_json::to_value(v).ok())
}

/// Whether a value counts as present for output and query purposes.
///
/// Empty strings, empty collections, zero and `false` are all absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
