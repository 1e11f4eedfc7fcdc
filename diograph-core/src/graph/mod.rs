//! Generic entity graph store.
//!
//! One engine serves both graphs of the system: diories connected by links
//! (a diograph) and rooms connected by doors (the diosphere). An entity
//! kind supplies its field schema and the name of its edge field; the store,
//! its aliasing rules and the query matcher are shared.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Graph<K>                           │
//! │                                                           │
//! │  key ──► Entity<K> { id, K::Fields, edges, timestamps }   │
//! │  alias ─► Entity<K> { id ≠ key }  ──(one hop)──► key = id │
//! │                                                           │
//! │  mutations ──► SaveHandle::trigger() ──► SaveScheduler    │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod edge;
mod entity;
mod error;
mod query;
mod store;

pub use edge::EdgeRef;
pub use entity::{new_id, now_timestamp, props, Entity, EntityKind, Props};
pub use error::GraphError;
pub use query::Query;
pub use store::{Graph, GraphDocument, MergeFailure, MergeReport};
