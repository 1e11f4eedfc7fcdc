//! Diories and the diograph.

use crate::graph::{EdgeRef, Entity, EntityKind, Graph, Props};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder written in place of image data by
/// [`Diory::to_document_without_image`].
const OMITTED_IMAGE: &str = "[omitted]";

/// A content descriptor attached to a diory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataObject {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@type")]
    pub kind: String,
    #[serde(rename = "contentUrl")]
    pub content_url: String,
    #[serde(rename = "encodingFormat")]
    pub encoding_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Fields a diory recognises besides id, links and timestamps.
#[derive(Debug, Clone, Default, PartialEq, FieldSchema)]
pub struct DioryFields {
    pub text: Option<String>,
    /// Image URL or inline data.
    pub image: Option<String>,
    /// Geolocation as free-form "lat, lng" text.
    pub latlng: Option<String>,
    pub date: Option<String>,
    pub data: Option<Vec<DataObject>>,
}

/// Marker for the diory kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DioryKind;

impl EntityKind for DioryKind {
    type Fields = DioryFields;
    const NAME: &'static str = "diory";
    const EDGE_FIELD: &'static str = "links";
    const EDGE_PATHS: bool = true;
}

/// A content node.
pub type Diory = Entity<DioryKind>;

/// A graph of diories connected by links.
pub type Diograph = Graph<DioryKind>;

impl Entity<DioryKind> {
    pub fn text(&self) -> Option<&str> {
        self.fields().text.as_deref()
    }

    pub fn image(&self) -> Option<&str> {
        self.fields().image.as_deref()
    }

    pub fn latlng(&self) -> Option<&str> {
        self.fields().latlng.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.fields().date.as_deref()
    }

    pub fn data(&self) -> Option<&[DataObject]> {
        self.fields().data.as_deref()
    }

    pub fn links(&self) -> Option<&[EdgeRef]> {
        self.edges()
    }

    /// `contentUrl` of the first content descriptor.
    pub fn content_url(&self) -> Option<&str> {
        self.data()
            .and_then(|data| data.first())
            .map(|object| object.content_url.as_str())
    }

    /// Point the first content descriptor at `url`.
    ///
    /// Does nothing when the diory has no content. `modified` is left alone.
    pub fn set_content_url(&mut self, url: impl Into<String>) -> &mut Self {
        let Some(mut data) = self.fields().data.clone() else {
            return self;
        };
        let Some(first) = data.first_mut() else {
            return self;
        };
        first.content_url = url.into();

        let Ok(value) = serde_json::to_value(&data) else {
            return self;
        };
        let mut props = Props::new();
        props.insert("data".to_string(), value);
        self.update_with(props, false)
    }

    /// Document form with `image` replaced by a placeholder, for logging or
    /// display where inline image data would be noise.
    pub fn to_document_without_image(&self) -> Props {
        let mut document = self.to_document();
        document.insert(
            "image".to_string(),
            Value::String(OMITTED_IMAGE.to_string()),
        );
        document
    }
}
