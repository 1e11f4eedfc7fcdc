//! Graph store for diories and rooms.
//!
//! This crate provides:
//! - One generic entity graph, instantiated for diories (linked by links)
//!   and rooms (linked by doors)
//! - Compile-time field schemas via `#[derive(FieldSchema)]`
//! - Substring queries, alias keys and JSON round-trips
//! - Debounced persistence through a pluggable document store
//!
//! # Quick Start
//!
//! ```ignore
//! use diograph_core::{props, Diograph, Query};
//! use serde_json::json;
//!
//! let mut diograph = Diograph::new();
//! diograph.add_entity(props(json!({"id": "a", "text": "Helsinki"})), None)?;
//! diograph.add_entity(props(json!({"id": "b", "text": "Tampere"})), None)?;
//! diograph.add_edge("a", "b")?;
//!
//! let found = diograph.query(&Query::text("hels"));
//! assert_eq!(found.len(), 1);
//! ```

// The FieldSchema derive names this crate by its external path.
extern crate self as diograph_core;

pub mod client;
pub mod debounce;
pub mod graph;
pub mod kinds;
pub mod persist;
pub mod schema;
pub mod testing;

// Re-export for convenience
pub use schema::FieldSchema;

// Primary public API
pub use client::{room_document_name, ClientConfig, ClientError, DioryClient, ROOT_ID};
pub use debounce::{SaveHandle, SaveScheduler};
pub use graph::{
    props, EdgeRef, Entity, EntityKind, Graph, GraphDocument, GraphError, MergeReport, Props, Query,
};
pub use kinds::{DataObject, Diograph, Diory, Diosphere, Room};
pub use persist::{
    DocumentStore, FsDocumentStore, MemoryDocumentStore, PersistError, PersistentGraph,
};
pub use testing::RecordingStore;
