//! Substring queries over entity fields.

use super::entity::{Entity, EntityKind, Props};
use crate::schema::is_present;
use serde_json::Value;

/// A partial-field pattern.
///
/// An entity matches when every named field is present on it and its string
/// value contains the pattern, ignoring case. The empty query matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    terms: Vec<(String, String)>,
}

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query on `text` alone.
    pub fn text(pattern: impl Into<String>) -> Self {
        Self::new().field("text", pattern)
    }

    /// Add a term.
    pub fn field(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.terms.push((field.into(), pattern.into()));
        self
    }

    /// Build a query from props. Non-string patterns match against their
    /// JSON text.
    pub fn from_props(props: &Props) -> Self {
        props
            .iter()
            .map(|(field, pattern)| match pattern {
                Value::String(s) => (field.clone(), s.clone()),
                other => (field.clone(), other.to_string()),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The (field, pattern) terms.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().map(|(f, p)| (f.as_str(), p.as_str()))
    }

    /// Whether `entity` satisfies every term.
    pub fn matches<K: EntityKind>(&self, entity: &Entity<K>) -> bool {
        self.terms.iter().all(|(field, pattern)| {
            match entity.field_value(field) {
                Some(value) if is_present(&value) => value
                    .as_str()
                    .is_some_and(|haystack| contains_ignore_case(haystack, pattern)),
                _ => false,
            }
        })
    }
}

impl<F: Into<String>, P: Into<String>> FromIterator<(F, P)> for Query {
    fn from_iter<I: IntoIterator<Item = (F, P)>>(iter: I) -> Self {
        Self {
            terms: iter
                .into_iter()
                .map(|(field, pattern)| (field.into(), pattern.into()))
                .collect(),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::props;
    use crate::kinds::Diory;
    use serde_json::json;

    fn diory(value: serde_json::Value) -> Diory {
        Diory::new(props(value))
    }

    #[test]
    fn test_case_insensitive_substring() {
        let entity = diory(json!({"id": "1", "text": "XABCY"}));
        assert!(Query::text("abc").matches(&entity));
        assert!(Query::text("xAbC").matches(&entity));
        assert!(!Query::text("abd").matches(&entity));
    }

    #[test]
    fn test_missing_or_empty_field_never_matches() {
        let missing = diory(json!({"id": "2"}));
        let empty = diory(json!({"id": "3", "text": ""}));
        assert!(!Query::text("").matches(&missing));
        assert!(!Query::text("").matches(&empty));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(Query::new().matches(&diory(json!({"id": "2"}))));
    }

    #[test]
    fn test_all_terms_must_match() {
        let entity = diory(json!({"id": "1", "text": "Helsinki", "date": "2021-05-01"}));
        let query = Query::text("hels").field("date", "2021");
        assert!(query.matches(&entity));

        let query = Query::text("hels").field("date", "2022");
        assert!(!query.matches(&entity));
    }

    #[test]
    fn test_non_string_fields_do_not_match() {
        let entity = diory(json!({"id": "1", "links": [{"id": "abc"}]}));
        assert!(!Query::new().field("links", "abc").matches(&entity));
    }

    #[test]
    fn test_id_is_queryable() {
        let entity = diory(json!({"id": "Some-ID"}));
        assert!(Query::new().field("id", "some").matches(&entity));
    }

    #[test]
    fn test_from_props() {
        let query = Query::from_props(&props(json!({"text": "abc", "date": 2021})));
        let terms: Vec<_> = query.terms().collect();
        assert!(terms.contains(&("text", "abc")));
        assert!(terms.contains(&("date", "2021")));
    }
}
